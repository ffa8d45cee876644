#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the canvass map server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the database row types to allow independent evolution of the API
//! contract.

use canvass_map_database_models::{
    DistrictActionUpdate, DistrictCompletion, StreetRow, StreetSearchRow,
};
use canvass_map_street_models::{
    ActionType, DistrictAction, DistrictId, MAX_PERCENTAGE, Profile, ProgressStatus,
    StreetStatus, UserRole,
};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, feature::Id};
use serde::{Deserialize, Serialize};

/// Maximum number of street search hits.
pub const SEARCH_LIMIT: u32 = 100;

/// Recent district actions returned when no limit is given.
pub const RECENT_ACTIONS_DEFAULT: u32 = 5;

/// Upper bound on the recent district actions limit.
pub const RECENT_ACTIONS_MAX: u32 = 50;

/// Server health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Human-readable error message.
    pub error: String,
}

/// Completion of one action type in a district.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiActionProgress {
    /// Streets marked done.
    pub done: u64,
    /// `done` as a rounded percentage of the district's streets.
    pub percentage: u32,
}

impl ApiActionProgress {
    /// Progress of `done` streets out of `total`.
    #[must_use]
    pub fn new(done: u64, total: u64) -> Self {
        Self {
            done,
            percentage: completion_percentage(done, total),
        }
    }
}

/// Rounded `done / total` percentage, 0 when `total` is 0.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn completion_percentage(done: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    (done as f64 / total as f64 * 100.0).round() as u32
}

/// Per-district completion statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDistrictStats {
    /// Streets in the district.
    pub total_streets: u64,
    /// Leafleting progress.
    pub leafleting: ApiActionProgress,
    /// Door-to-door progress.
    pub door_to_door: ApiActionProgress,
    /// Poster progress.
    pub poster: ApiActionProgress,
}

impl From<DistrictCompletion> for ApiDistrictStats {
    fn from(completion: DistrictCompletion) -> Self {
        let total = completion.total_streets;
        let progress = |action| ApiActionProgress::new(completion.done_for(action), total);
        Self {
            total_streets: total,
            leafleting: progress(ActionType::Leafleting),
            door_to_door: progress(ActionType::DoorToDoor),
            poster: progress(ActionType::Poster),
        }
    }
}

/// Query parameters for the district streets endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreetsQueryParams {
    /// Action type whose status is reported. Defaults to leafleting.
    #[serde(rename = "type")]
    pub action_type: Option<ActionType>,
}

/// Query parameters for the street search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQueryParams {
    /// Search text; blank matches every street.
    pub q: Option<String>,
    /// Action type whose status is reported. Defaults to leafleting.
    #[serde(rename = "type")]
    pub action_type: Option<ActionType>,
    /// Keep only streets with this status.
    pub status: Option<StreetStatus>,
}

/// Body of the street action patch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionPatchBody {
    /// Action type to update. Defaults to leafleting.
    #[serde(rename = "type", default)]
    pub action_type: ActionType,
    /// New status.
    pub status: StreetStatus,
}

/// A street search hit as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiStreetListItem {
    /// Street UUID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `highway` tag value.
    pub street_type: Option<String>,
    /// Status for the requested action type.
    pub status: StreetStatus,
}

impl From<StreetSearchRow> for ApiStreetListItem {
    fn from(row: StreetSearchRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            street_type: row.street_type,
            status: row.status,
        }
    }
}

/// Query parameters for the recent district actions endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecentActionsParams {
    /// Number of actions to return.
    pub limit: Option<u32>,
}

impl RecentActionsParams {
    /// The requested limit, defaulted and clamped to `1..=`[`RECENT_ACTIONS_MAX`].
    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(RECENT_ACTIONS_DEFAULT)
            .clamp(1, RECENT_ACTIONS_MAX)
    }
}

/// One action type of a district, with its stored progress if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDistrictActionSlot {
    /// Action type.
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Stored progress; `None` until someone records some.
    pub action: Option<DistrictAction>,
}

/// Pairs every action type with its stored progress in one district,
/// in [`ActionType::all`] order.
#[must_use]
pub fn district_action_slots(actions: &[DistrictAction]) -> Vec<ApiDistrictActionSlot> {
    ActionType::all()
        .iter()
        .map(|&action_type| ApiDistrictActionSlot {
            action_type,
            action: actions
                .iter()
                .find(|a| a.action_type == action_type)
                .cloned(),
        })
        .collect()
}

/// Aggregate of a set of district actions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiActionTypeSummary {
    /// Rounded mean percentage, 0 when there are no actions.
    pub average_percentage: u32,
    /// Actions marked completed.
    pub completed: u64,
    /// Actions counted.
    pub total: u64,
}

impl ApiActionTypeSummary {
    /// Summarizes `actions`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn from_actions<'a>(actions: impl IntoIterator<Item = &'a DistrictAction>) -> Self {
        let mut sum = 0_u64;
        let mut summary = Self::default();
        for action in actions {
            sum += u64::from(action.percentage);
            summary.total += 1;
            if action.status == ProgressStatus::Completed {
                summary.completed += 1;
            }
        }
        if summary.total > 0 {
            summary.average_percentage = (sum as f64 / summary.total as f64).round() as u32;
        }
        summary
    }
}

/// City-wide district action progress, overall and per action type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiActionsSummary {
    /// Every action.
    pub overall: ApiActionTypeSummary,
    /// Leafleting actions.
    pub leafleting: ApiActionTypeSummary,
    /// Door-to-door actions.
    pub door_to_door: ApiActionTypeSummary,
    /// Poster actions.
    pub poster: ApiActionTypeSummary,
}

impl From<&[DistrictAction]> for ApiActionsSummary {
    fn from(actions: &[DistrictAction]) -> Self {
        let of_type = |action_type: ActionType| {
            ApiActionTypeSummary::from_actions(
                actions.iter().filter(|a| a.action_type == action_type),
            )
        };
        Self {
            overall: ApiActionTypeSummary::from_actions(actions),
            leafleting: of_type(ActionType::Leafleting),
            door_to_door: of_type(ActionType::DoorToDoor),
            poster: of_type(ActionType::Poster),
        }
    }
}

/// Body of the district action update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DistrictActionBody {
    /// Completion, 0-100.
    pub percentage: u8,
    /// Explicit state; derived from `percentage` when absent.
    pub status: Option<ProgressStatus>,
    /// Notes; blank clears them.
    pub notes: Option<String>,
}

impl DistrictActionBody {
    /// Validates the body.
    ///
    /// # Errors
    ///
    /// Returns a message if `percentage` is above 100.
    pub fn into_update(self) -> Result<DistrictActionUpdate, String> {
        if self.percentage > MAX_PERCENTAGE {
            return Err(format!(
                "percentage must be between 0 and {MAX_PERCENTAGE}, got {}",
                self.percentage
            ));
        }
        Ok(DistrictActionUpdate {
            status: self
                .status
                .unwrap_or_else(|| ProgressStatus::from_percentage(self.percentage)),
            percentage: self.percentage,
            notes: non_blank(self.notes),
        })
    }
}

/// Body of the profile creation request. The id is the account id issued by
/// the session layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfileBody {
    /// Account UUID.
    pub id: String,
    /// Login name.
    pub username: String,
    /// First name.
    pub first_name: Option<String>,
    /// Last name.
    pub last_name: Option<String>,
    /// Role; defaults to manager.
    #[serde(default)]
    pub role: UserRole,
    /// Assigned districts.
    #[serde(default)]
    pub districts: Vec<DistrictId>,
}

impl NewProfileBody {
    /// Builds an active profile with the given canonical id.
    ///
    /// # Errors
    ///
    /// Returns a message if the username is blank.
    pub fn into_profile(self, id: String) -> Result<Profile, String> {
        let username = self.username.trim().to_string();
        if username.is_empty() {
            return Err("username must not be blank".to_string());
        }
        Ok(Profile {
            id,
            username,
            first_name: non_blank(self.first_name),
            last_name: non_blank(self.last_name),
            role: self.role,
            districts: sorted_districts(self.districts),
            is_active: true,
        })
    }
}

/// Body of the profile update request. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdateBody {
    /// First name; blank clears it.
    pub first_name: Option<String>,
    /// Last name; blank clears it.
    pub last_name: Option<String>,
    /// Role.
    pub role: Option<UserRole>,
    /// Replaces the assigned districts.
    pub districts: Option<Vec<DistrictId>>,
    /// Enables or disables the account.
    pub is_active: Option<bool>,
}

impl ProfileUpdateBody {
    /// Applies the present fields to `profile`.
    pub fn apply(self, profile: &mut Profile) {
        if let Some(first_name) = self.first_name {
            profile.first_name = non_blank(Some(first_name));
        }
        if let Some(last_name) = self.last_name {
            profile.last_name = non_blank(Some(last_name));
        }
        if let Some(role) = self.role {
            profile.role = role;
        }
        if let Some(districts) = self.districts {
            profile.districts = sorted_districts(districts);
        }
        if let Some(is_active) = self.is_active {
            profile.is_active = is_active;
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn sorted_districts(mut districts: Vec<DistrictId>) -> Vec<DistrictId> {
    districts.sort_unstable();
    districts.dedup();
    districts
}

/// Builds the `GeoJSON` feature collection for a district's streets.
///
/// Each feature's id is the street UUID; properties carry `id`, `name`,
/// `osmId`, `streetType`, and `status`.
///
/// # Errors
///
/// Returns a [`geojson::Error`] if a stored geometry is not valid
/// `GeoJSON`.
pub fn streets_feature_collection(rows: Vec<StreetRow>) -> Result<FeatureCollection, geojson::Error> {
    let features = rows
        .into_iter()
        .map(street_feature)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    })
}

fn street_feature(row: StreetRow) -> Result<Feature, geojson::Error> {
    let geometry = Geometry::from_json_value(row.geometry)?;

    let mut properties = JsonObject::new();
    properties.insert("id".to_string(), row.id.clone().into());
    properties.insert("name".to_string(), row.name.into());
    properties.insert("osmId".to_string(), row.osm_id.into());
    properties.insert(
        "streetType".to_string(),
        row.street_type.map_or(serde_json::Value::Null, Into::into),
    );
    properties.insert("status".to_string(), row.status.as_ref().into());

    Ok(Feature {
        bbox: None,
        geometry: Some(geometry),
        id: Some(Id::String(row.id)),
        properties: Some(properties),
        foreign_members: None,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn percentage_rounds_and_handles_empty_districts() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 200), 1);
        assert_eq!(completion_percentage(40, 40), 100);
    }

    #[test]
    fn stats_serialize_in_camel_case() {
        let stats = ApiDistrictStats::from(DistrictCompletion {
            total_streets: 10,
            done: BTreeMap::from([(ActionType::DoorToDoor, 5)]),
        });
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalStreets"], 10);
        assert_eq!(json["doorToDoor"]["done"], 5);
        assert_eq!(json["doorToDoor"]["percentage"], 50);
        assert_eq!(json["leafleting"]["percentage"], 0);
    }

    #[test]
    fn patch_body_defaults_to_leafleting() {
        let body: ActionPatchBody = serde_json::from_str(r#"{"status":"done"}"#).unwrap();
        assert_eq!(body.action_type, ActionType::Leafleting);
        assert_eq!(body.status, StreetStatus::Done);
    }

    #[test]
    fn patch_body_rejects_unknown_values() {
        assert!(serde_json::from_str::<ActionPatchBody>(r#"{"type":"tractage","status":"done"}"#).is_err());
        assert!(serde_json::from_str::<ActionPatchBody>(r#"{"type":"poster","status":"fait"}"#).is_err());
        assert!(serde_json::from_str::<ActionPatchBody>(r#"{"type":"poster"}"#).is_err());
    }

    fn action(district: u8, action_type: ActionType, percentage: u8) -> DistrictAction {
        DistrictAction {
            id: format!("{district}-{action_type}"),
            district: DistrictId::new(district).unwrap(),
            action_type,
            status: ProgressStatus::from_percentage(percentage),
            percentage,
            responsible_id: None,
            notes: None,
            updated_at: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
        }
    }

    #[test]
    fn recent_limit_defaults_and_clamps() {
        assert_eq!(RecentActionsParams::default().limit(), RECENT_ACTIONS_DEFAULT);
        assert_eq!(RecentActionsParams { limit: Some(0) }.limit(), 1);
        assert_eq!(RecentActionsParams { limit: Some(12) }.limit(), 12);
        assert_eq!(RecentActionsParams { limit: Some(10_000) }.limit(), RECENT_ACTIONS_MAX);
    }

    #[test]
    fn every_action_type_gets_a_slot() {
        let slots = district_action_slots(&[action(4, ActionType::Poster, 40)]);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots[0].action_type, ActionType::Leafleting);
        assert!(slots[0].action.is_none());
        assert_eq!(slots[2].action_type, ActionType::Poster);
        assert_eq!(slots[2].action.as_ref().unwrap().percentage, 40);
    }

    #[test]
    fn summary_averages_and_counts_completed() {
        let actions = vec![
            action(1, ActionType::Leafleting, 100),
            action(2, ActionType::Leafleting, 25),
            action(2, ActionType::Poster, 0),
        ];
        let summary = ApiActionsSummary::from(actions.as_slice());

        assert_eq!(summary.leafleting.total, 2);
        assert_eq!(summary.leafleting.completed, 1);
        assert_eq!(summary.leafleting.average_percentage, 63);
        assert_eq!(summary.door_to_door, ApiActionTypeSummary::default());
        assert_eq!(summary.overall.total, 3);
        assert_eq!(summary.overall.average_percentage, 42);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["doorToDoor"]["averagePercentage"], 0);
    }

    #[test]
    fn action_body_derives_status_from_percentage() {
        let body: DistrictActionBody =
            serde_json::from_str(r#"{"percentage":100,"notes":"  "}"#).unwrap();
        let update = body.into_update().unwrap();
        assert_eq!(update.status, ProgressStatus::Completed);
        assert_eq!(update.notes, None);

        let body: DistrictActionBody =
            serde_json::from_str(r#"{"percentage":100,"status":"in_progress","notes":"Reste la rue Saint-Maur"}"#)
                .unwrap();
        let update = body.into_update().unwrap();
        assert_eq!(update.status, ProgressStatus::InProgress);
        assert_eq!(update.notes.as_deref(), Some("Reste la rue Saint-Maur"));
    }

    #[test]
    fn action_body_rejects_out_of_range_percentage() {
        let body: DistrictActionBody = serde_json::from_str(r#"{"percentage":101}"#).unwrap();
        assert!(body.into_update().is_err());
        assert!(serde_json::from_str::<DistrictActionBody>(r#"{"percentage":-1}"#).is_err());
        assert!(serde_json::from_str::<DistrictActionBody>(r#"{"percentage":50,"status":"termine"}"#).is_err());
    }

    #[test]
    fn new_profile_defaults_to_active_manager() {
        let body: NewProfileBody = serde_json::from_str(
            r#"{"id":"x","username":" jeanne ","firstName":"Jeanne","districts":[11,3,11]}"#,
        )
        .unwrap();
        let profile = body.into_profile("id".to_string()).unwrap();
        assert_eq!(profile.username, "jeanne");
        assert_eq!(profile.role, UserRole::Manager);
        assert!(profile.is_active);
        assert_eq!(
            profile.districts,
            vec![DistrictId::new(3).unwrap(), DistrictId::new(11).unwrap()]
        );
    }

    #[test]
    fn new_profile_validation() {
        let body: NewProfileBody =
            serde_json::from_str(r#"{"id":"x","username":"   "}"#).unwrap();
        assert!(body.into_profile("id".to_string()).is_err());
        assert!(serde_json::from_str::<NewProfileBody>(r#"{"id":"x","username":"a","districts":[21]}"#).is_err());
        assert!(serde_json::from_str::<NewProfileBody>(r#"{"id":"x","username":"a","role":"responsable"}"#).is_err());
    }

    #[test]
    fn profile_update_touches_only_present_fields() {
        let mut profile = NewProfileBody {
            id: String::new(),
            username: "jeanne".to_string(),
            first_name: Some("Jeanne".to_string()),
            last_name: Some("Martin".to_string()),
            role: UserRole::Manager,
            districts: vec![DistrictId::new(3).unwrap()],
        }
        .into_profile("id".to_string())
        .unwrap();

        let update: ProfileUpdateBody =
            serde_json::from_str(r#"{"lastName":"","districts":[20,12],"isActive":false}"#)
                .unwrap();
        update.apply(&mut profile);

        assert_eq!(profile.first_name.as_deref(), Some("Jeanne"));
        assert_eq!(profile.last_name, None);
        assert_eq!(profile.role, UserRole::Manager);
        assert_eq!(
            profile.districts,
            vec![DistrictId::new(12).unwrap(), DistrictId::new(20).unwrap()]
        );
        assert!(!profile.is_active);
    }

    #[test]
    fn feature_collection_carries_street_properties() {
        let rows = vec![StreetRow {
            id: "6f1c2b9e-0000-4000-8000-000000000001".to_string(),
            osm_id: 4040,
            name: "Rue Oberkampf".to_string(),
            normalized_name: "rue oberkampf".to_string(),
            district: DistrictId::new(11).unwrap(),
            street_type: Some("residential".to_string()),
            geometry: serde_json::json!({
                "type": "LineString",
                "coordinates": [[2.37, 48.86], [2.38, 48.865]],
            }),
            status: StreetStatus::Done,
        }];

        let collection = streets_feature_collection(rows).unwrap();
        let json = serde_json::to_value(&collection).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        let feature = &json["features"][0];
        assert_eq!(feature["id"], "6f1c2b9e-0000-4000-8000-000000000001");
        assert_eq!(feature["geometry"]["type"], "LineString");
        assert_eq!(feature["properties"]["osmId"], 4040);
        assert_eq!(feature["properties"]["streetType"], "residential");
        assert_eq!(feature["properties"]["status"], "done");
    }

    #[test]
    fn invalid_geometry_is_an_error() {
        let rows = vec![StreetRow {
            id: "x".to_string(),
            osm_id: 1,
            name: "Broken".to_string(),
            normalized_name: "broken".to_string(),
            district: DistrictId::new(1).unwrap(),
            street_type: None,
            geometry: serde_json::json!({ "type": "Nope" }),
            status: StreetStatus::NotDone,
        }];
        assert!(streets_feature_collection(rows).is_err());
    }
}
