#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Database row types.
//!
//! These types represent the shapes of data as retrieved from the
//! `streets`, `street_actions`, `district_actions`, and `profiles` tables. They are distinct
//! from the API response types in `canvass_map_server_models` and the
//! import types in `canvass_map_street_models`.

use std::collections::BTreeMap;

use canvass_map_street_models::{ActionType, DistrictId, ProgressStatus, StreetStatus};
use serde::{Deserialize, Serialize};

/// A street row joined with its status for one action type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetRow {
    /// Primary key (UUID).
    pub id: String,
    /// `OpenStreetMap` way id.
    pub osm_id: i64,
    /// Display name.
    pub name: String,
    /// Search key.
    pub normalized_name: String,
    /// District.
    pub district: DistrictId,
    /// `highway` tag value.
    pub street_type: Option<String>,
    /// `GeoJSON` `LineString` geometry.
    pub geometry: serde_json::Value,
    /// Status for the requested action type (`not_done` when no row).
    pub status: StreetStatus,
}

/// A street search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreetSearchRow {
    /// Primary key (UUID).
    pub id: String,
    /// Display name.
    pub name: String,
    /// `highway` tag value.
    pub street_type: Option<String>,
    /// Status for the requested action type.
    pub status: StreetStatus,
}

/// Parameters for a street search within one district.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreetSearchQuery {
    /// District to search.
    pub district: DistrictId,
    /// Already-normalized search text.
    pub normalized_query: String,
    /// Action type whose status is reported and filtered.
    pub action_type: ActionType,
    /// Keep only streets with this status.
    pub status: Option<StreetStatus>,
    /// Maximum number of hits.
    pub limit: u32,
}

/// Street totals and per-action completion counts for one district.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictCompletion {
    /// Streets in the district.
    pub total_streets: u64,
    /// Streets marked `done`, per action type. Missing means zero.
    pub done: BTreeMap<ActionType, u64>,
}

impl DistrictCompletion {
    /// Streets marked `done` for `action_type`.
    #[must_use]
    pub fn done_for(&self, action_type: ActionType) -> u64 {
        self.done.get(&action_type).copied().unwrap_or(0)
    }
}

/// New values for a district action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistrictActionUpdate {
    /// Reported state.
    pub status: ProgressStatus,
    /// Reported completion, 0-100.
    pub percentage: u8,
    /// Free-form notes; `None` clears them.
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_action_counts_as_zero() {
        let completion = DistrictCompletion {
            total_streets: 40,
            done: BTreeMap::from([(ActionType::Poster, 10)]),
        };
        assert_eq!(completion.done_for(ActionType::Poster), 10);
        assert_eq!(completion.done_for(ActionType::Leafleting), 0);
    }
}
