//! Raw element types as returned by the Overpass API (`out geom`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level Overpass JSON response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverpassResponse {
    /// Returned elements. Missing in some error responses.
    #[serde(default)]
    pub elements: Vec<RawElement>,
    /// Server-side diagnostic. Overpass answers timeouts and query failures
    /// with HTTP 200, no elements, and a remark.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

impl OverpassResponse {
    /// Returns the remark if it reports a failed query rather than an
    /// informational note.
    #[must_use]
    pub fn runtime_error(&self) -> Option<&str> {
        self.remark.as_deref().filter(|remark| {
            let lower = remark.to_ascii_lowercase();
            lower.contains("runtime error") || lower.contains("timed out")
        })
    }
}

/// A way element with its inline geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    /// `OpenStreetMap` way id.
    pub id: i64,
    /// OSM tags (`name`, `highway`, ...).
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Node positions in way order.
    #[serde(default)]
    pub geometry: Option<Vec<RawPoint>>,
}

impl RawElement {
    /// Returns the `name` tag if present and not blank.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.tags
            .get("name")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Returns the `highway` tag if present and not blank.
    #[must_use]
    pub fn highway(&self) -> Option<&str> {
        self.tags
            .get("highway")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Number of points in the inline geometry.
    #[must_use]
    pub fn point_count(&self) -> usize {
        self.geometry.as_ref().map_or(0, Vec::len)
    }
}

/// A single geometry point in Overpass `(lat, lon)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawPoint {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}
