#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street, district, and field-action types for the canvass map.
//!
//! A district is one of the 20 Paris arrondissements. Streets are imported
//! from `OpenStreetMap` per district, and volunteers mark each street as done
//! independently for each [`ActionType`].

pub mod profile;
pub mod raw;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Number of districts the city is partitioned into.
pub const DISTRICT_COUNT: u8 = 20;

/// A district identifier, guaranteed to be in `1..=20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct DistrictId(u8);

impl DistrictId {
    /// Creates a district identifier from a numeric value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not in the range 1-20.
    pub const fn new(value: u8) -> Result<Self, InvalidDistrictError> {
        if value >= 1 && value <= DISTRICT_COUNT {
            Ok(Self(value))
        } else {
            Err(InvalidDistrictError {
                value: value as i64,
            })
        }
    }

    /// Returns the numeric value of this district.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Returns every district in ascending order.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=DISTRICT_COUNT).map(Self)
    }

    /// Returns the French ordinal label (`"1er"`, `"2e"`, ...).
    #[must_use]
    pub fn label(self) -> String {
        if self.0 == 1 {
            "1er".to_string()
        } else {
            format!("{}e", self.0)
        }
    }
}

impl TryFrom<u8> for DistrictId {
    type Error = InvalidDistrictError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<i64> for DistrictId {
    type Error = InvalidDistrictError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| InvalidDistrictError { value })
            .and_then(Self::new)
    }
}

impl From<DistrictId> for u8 {
    fn from(id: DistrictId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DistrictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DistrictId {
    type Err = InvalidDistrictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| InvalidDistrictError { value: 0 })?;
        Self::try_from(value)
    }
}

/// Error returned when a value is not a valid [`DistrictId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDistrictError {
    /// The invalid district value that was provided.
    pub value: i64,
}

impl std::fmt::Display for InvalidDistrictError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid district {}: expected 1-{DISTRICT_COUNT}",
            self.value
        )
    }
}

impl std::error::Error for InvalidDistrictError {}

/// Parses a comma-separated district list such as `"1,2, 3"`.
///
/// Entries that are not valid district numbers are skipped.
#[must_use]
pub fn parse_district_list(list: &str) -> Vec<DistrictId> {
    list.split(',')
        .filter_map(|s| s.parse::<DistrictId>().ok())
        .collect()
}

/// Renders districts as the stored comma-separated list, ascending and
/// without duplicates.
#[must_use]
pub fn format_district_list(districts: &[DistrictId]) -> String {
    let mut sorted = districts.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// A geographic bounding box in WGS84 coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern latitude boundary.
    pub south: f64,
    /// Western longitude boundary.
    pub west: f64,
    /// Northern latitude boundary.
    pub north: f64,
    /// Eastern longitude boundary.
    pub east: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Returns `true` if the box is non-empty and within WGS84 bounds.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.south < self.north
            && self.west < self.east
            && (-90.0..=90.0).contains(&self.south)
            && (-90.0..=90.0).contains(&self.north)
            && (-180.0..=180.0).contains(&self.west)
            && (-180.0..=180.0).contains(&self.east)
    }
}

/// The geographic region used to scope a geodata query to one district.
#[derive(Debug, Clone, PartialEq)]
pub enum RegionDescriptor {
    /// A numeric bounding box.
    BoundingBox(BoundingBox),
    /// The `name` tag of an administrative boundary area.
    NamedArea(String),
}

impl std::fmt::Display for RegionDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BoundingBox(b) => {
                write!(f, "bbox({},{},{},{})", b.south, b.west, b.north, b.east)
            }
            Self::NamedArea(name) => write!(f, "area \"{name}\""),
        }
    }
}

/// Field operation category tracked independently per street.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    /// Handing out leaflets
    #[default]
    Leafleting,
    /// Door-to-door canvassing
    DoorToDoor,
    /// Poster placement
    Poster,
}

impl ActionType {
    /// Returns all action types.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Leafleting, Self::DoorToDoor, Self::Poster]
    }
}

/// Completion status of one street for one action type.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StreetStatus {
    /// No volunteer has marked this street yet (also the implicit default).
    #[default]
    NotDone,
    /// The street has been covered.
    Done,
}

/// A single street segment, normalized and ready for storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetRecord {
    /// `OpenStreetMap` way id; unique key for idempotent writes.
    pub external_id: i64,
    /// Street name as supplied upstream (or synthesized).
    pub name: String,
    /// Search key derived from `name`.
    pub normalized_name: String,
    /// District the segment belongs to.
    pub district: DistrictId,
    /// `[longitude, latitude]` pairs, at least two.
    pub geometry: Vec<[f64; 2]>,
    /// `highway` tag value.
    pub street_type: Option<String>,
}

impl StreetRecord {
    /// Returns the geometry as a `GeoJSON` `LineString` object.
    #[must_use]
    pub fn geometry_geojson(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "LineString",
            "coordinates": self.geometry,
        })
    }
}

/// The mutable completion state for one street and one action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetActionRecord {
    /// Street row UUID.
    pub street_id: String,
    /// Which action this state tracks.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Done / not done.
    pub status: StreetStatus,
    /// Profile UUID of the user who last changed the status.
    pub responsible_id: Option<String>,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

/// Highest completion percentage of a district action.
pub const MAX_PERCENTAGE: u8 = 100;

/// Overall state of one action type across a whole district.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProgressStatus {
    /// Nothing done yet.
    #[default]
    NotStarted,
    /// Partly done.
    InProgress,
    /// Finished.
    Completed,
}

impl ProgressStatus {
    /// Status implied by a completion percentage: 0 is not started, 100 or
    /// more is completed, anything else is in progress.
    #[must_use]
    pub const fn from_percentage(percentage: u8) -> Self {
        match percentage {
            0 => Self::NotStarted,
            MAX_PERCENTAGE.. => Self::Completed,
            _ => Self::InProgress,
        }
    }
}

/// District-wide progress of one action type, maintained by hand by the
/// district's manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistrictAction {
    /// Row UUID.
    pub id: String,
    /// District.
    pub district: DistrictId,
    /// Action type.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Reported state.
    pub status: ProgressStatus,
    /// Reported completion, 0-100.
    pub percentage: u8,
    /// Profile UUID of the last editor.
    pub responsible_id: Option<String>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Last write.
    pub updated_at: DateTime<Utc>,
}

/// Dashboard role of a user.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    /// Can edit every district and manage users.
    Admin,
    /// Can edit only the districts assigned to them.
    #[default]
    Manager,
}

/// A dashboard user and the districts assigned to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Profile UUID.
    pub id: String,
    /// Login name.
    pub username: String,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Role.
    pub role: UserRole,
    /// Assigned districts.
    pub districts: Vec<DistrictId>,
    /// Whether the account is enabled.
    pub is_active: bool,
}

impl Profile {
    /// Returns `true` if this user may change street statuses in `district`.
    #[must_use]
    pub fn can_edit(&self, district: DistrictId) -> bool {
        self.role == UserRole::Admin || self.districts.contains(&district)
    }
}
