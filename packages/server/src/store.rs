//! Storage seam for the API handlers.
//!
//! [`ApiStore`] lists every read and write the handlers perform.
//! [`PostgresApiStore`] delegates to [`canvass_map_database::queries`].

use std::sync::Arc;

use async_trait::async_trait;
use canvass_map_database::{DbError, queries};
use canvass_map_database_models::{
    DistrictActionUpdate, DistrictCompletion, StreetRow, StreetSearchQuery, StreetSearchRow,
};
use canvass_map_street_models::{
    ActionType, DistrictAction, DistrictId, Profile, StreetActionRecord, StreetStatus,
};
use switchy_database::Database;

/// Everything the API reads and writes.
#[async_trait]
pub trait ApiStore: Send + Sync {
    /// Street total and per-action `done` counts for a district.
    async fn district_completion(
        &self,
        district: DistrictId,
    ) -> Result<DistrictCompletion, DbError>;

    /// A district's streets with their status for `action_type`, by name.
    async fn streets_for_district(
        &self,
        district: DistrictId,
        action_type: ActionType,
    ) -> Result<Vec<StreetRow>, DbError>;

    /// Street search within one district.
    async fn search_streets(
        &self,
        query: &StreetSearchQuery,
    ) -> Result<Vec<StreetSearchRow>, DbError>;

    /// District of a street, or `None` if it does not exist.
    async fn street_district(&self, street_id: &str) -> Result<Option<DistrictId>, DbError>;

    /// Sets one street's status for one action type.
    async fn upsert_street_action(
        &self,
        street_id: &str,
        action_type: ActionType,
        status: StreetStatus,
        responsible_id: &str,
    ) -> Result<StreetActionRecord, DbError>;

    /// District actions for one district, or for all of them.
    async fn district_actions(
        &self,
        district: Option<DistrictId>,
    ) -> Result<Vec<DistrictAction>, DbError>;

    /// The `limit` most recently updated district actions.
    async fn recent_district_actions(&self, limit: u32) -> Result<Vec<DistrictAction>, DbError>;

    /// Sets a district's progress for one action type.
    async fn upsert_district_action(
        &self,
        district: DistrictId,
        action_type: ActionType,
        update: &DistrictActionUpdate,
        responsible_id: &str,
    ) -> Result<DistrictAction, DbError>;

    /// Profile by id.
    async fn profile(&self, id: &str) -> Result<Option<Profile>, DbError>;

    /// Profile by username.
    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>, DbError>;

    /// Every profile, newest first.
    async fn profiles(&self) -> Result<Vec<Profile>, DbError>;

    /// Inserts a profile.
    async fn create_profile(&self, profile: &Profile) -> Result<Profile, DbError>;

    /// Overwrites a profile, or returns `None` if it does not exist.
    async fn update_profile(&self, profile: &Profile) -> Result<Option<Profile>, DbError>;
}

/// [`ApiStore`] backed by the application database.
pub struct PostgresApiStore {
    db: Arc<dyn Database>,
}

impl PostgresApiStore {
    /// Wraps an open connection.
    #[must_use]
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ApiStore for PostgresApiStore {
    async fn district_completion(
        &self,
        district: DistrictId,
    ) -> Result<DistrictCompletion, DbError> {
        queries::district_completion(self.db.as_ref(), district).await
    }

    async fn streets_for_district(
        &self,
        district: DistrictId,
        action_type: ActionType,
    ) -> Result<Vec<StreetRow>, DbError> {
        queries::streets_for_district(self.db.as_ref(), district, action_type).await
    }

    async fn search_streets(
        &self,
        query: &StreetSearchQuery,
    ) -> Result<Vec<StreetSearchRow>, DbError> {
        queries::search_streets(self.db.as_ref(), query).await
    }

    async fn street_district(&self, street_id: &str) -> Result<Option<DistrictId>, DbError> {
        queries::get_street_district(self.db.as_ref(), street_id).await
    }

    async fn upsert_street_action(
        &self,
        street_id: &str,
        action_type: ActionType,
        status: StreetStatus,
        responsible_id: &str,
    ) -> Result<StreetActionRecord, DbError> {
        queries::upsert_street_action(
            self.db.as_ref(),
            street_id,
            action_type,
            status,
            responsible_id,
        )
        .await
    }

    async fn district_actions(
        &self,
        district: Option<DistrictId>,
    ) -> Result<Vec<DistrictAction>, DbError> {
        queries::list_district_actions(self.db.as_ref(), district).await
    }

    async fn recent_district_actions(&self, limit: u32) -> Result<Vec<DistrictAction>, DbError> {
        queries::recent_district_actions(self.db.as_ref(), limit).await
    }

    async fn upsert_district_action(
        &self,
        district: DistrictId,
        action_type: ActionType,
        update: &DistrictActionUpdate,
        responsible_id: &str,
    ) -> Result<DistrictAction, DbError> {
        queries::upsert_district_action(
            self.db.as_ref(),
            district,
            action_type,
            update,
            responsible_id,
        )
        .await
    }

    async fn profile(&self, id: &str) -> Result<Option<Profile>, DbError> {
        queries::get_profile(self.db.as_ref(), id).await
    }

    async fn profile_by_username(&self, username: &str) -> Result<Option<Profile>, DbError> {
        queries::get_profile_by_username(self.db.as_ref(), username).await
    }

    async fn profiles(&self) -> Result<Vec<Profile>, DbError> {
        queries::list_profiles(self.db.as_ref()).await
    }

    async fn create_profile(&self, profile: &Profile) -> Result<Profile, DbError> {
        queries::create_profile(self.db.as_ref(), profile).await
    }

    async fn update_profile(&self, profile: &Profile) -> Result<Option<Profile>, DbError> {
        queries::update_profile(self.db.as_ref(), profile).await
    }
}
