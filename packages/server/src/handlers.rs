//! HTTP handler functions for the canvass map API.
//!
//! The session layer in front of this server authenticates users and
//! forwards their profile id in the `X-User-Id` header.

use actix_web::error::QueryPayloadError;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use canvass_map_database_models::StreetSearchQuery;
use canvass_map_server_models::{
    ActionPatchBody, ApiActionsSummary, ApiDistrictStats, ApiErrorBody, ApiHealth,
    ApiStreetListItem, DistrictActionBody, NewProfileBody, ProfileUpdateBody,
    RecentActionsParams, SEARCH_LIMIT, SearchQueryParams, StreetsQueryParams,
    district_action_slots, streets_feature_collection,
};
use canvass_map_street::normalize::normalize_name;
use canvass_map_street_models::{ActionType, DistrictId, Profile, UserRole};
use serde::de::DeserializeOwned;

use crate::AppState;
use crate::store::ApiStore;

/// Header carrying the authenticated caller's profile UUID.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Errors returned by the API handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody {
            error: self.to_string(),
        })
    }
}

impl From<canvass_map_database::DbError> for ApiError {
    fn from(e: canvass_map_database::DbError) -> Self {
        log::error!("Database error: {e}");
        Self::Internal(e.to_string())
    }
}

/// Turns query string errors (such as an unknown `type`) into the JSON
/// error body used by every other failure.
#[allow(clippy::needless_pass_by_value)]
pub fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(format!("Invalid query string: {err}")).into()
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/districts/{id}/stats`
///
/// Street total and per-action completion for one district.
pub async fn district_stats(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let district = parse_district(&path)?;
    caller_id(&req)?;

    let completion = state.store.district_completion(district).await?;
    Ok(HttpResponse::Ok().json(ApiDistrictStats::from(completion)))
}

/// `GET /api/districts/{id}/streets?type=`
///
/// All streets of a district as a `GeoJSON` `FeatureCollection`, with each
/// street's status for the requested action type.
pub async fn district_streets(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<StreetsQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let district = parse_district(&path)?;
    caller_id(&req)?;

    let action_type = params.action_type.unwrap_or_default();
    let rows = state.store.streets_for_district(district, action_type).await?;

    let collection = streets_feature_collection(rows).map_err(|e| {
        log::error!("Invalid stored geometry in district {district}: {e}");
        ApiError::Internal(e.to_string())
    })?;

    Ok(HttpResponse::Ok().json(collection))
}

/// `GET /api/districts/{id}/streets/search?q=&type=&status=`
///
/// Up to [`SEARCH_LIMIT`] streets whose normalized name contains the
/// normalized query, ordered by name.
pub async fn search_streets(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Query<SearchQueryParams>,
) -> Result<HttpResponse, ApiError> {
    let district = parse_district(&path)?;
    caller_id(&req)?;

    let query = StreetSearchQuery {
        district,
        normalized_query: normalize_name(params.q.as_deref().unwrap_or_default()),
        action_type: params.action_type.unwrap_or_default(),
        status: params.status,
        limit: SEARCH_LIMIT,
    };

    let rows = state.store.search_streets(&query).await?;
    let items: Vec<ApiStreetListItem> = rows.into_iter().map(ApiStreetListItem::from).collect();

    Ok(HttpResponse::Ok().json(items))
}

/// `PATCH /api/streets/{id}/action`
///
/// Sets the caller-visible status of one street for one action type. The
/// caller must be an admin or be assigned to the street's district.
pub async fn update_street_action(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let body: ActionPatchBody = parse_json_body(&body)?;
    let street_id = parse_uuid(&path, "street ID")?;

    let store = state.store.as_ref();

    let district = store
        .street_district(&street_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Street not found".to_string()))?;

    let profile = store.profile(&caller).await?;
    authorize(profile.as_ref(), district)?;

    let action = store
        .upsert_street_action(&street_id, body.action_type, body.status, &caller)
        .await?;

    log::info!(
        "Street {street_id} ({}) marked {} by {caller}",
        body.action_type,
        body.status
    );

    Ok(HttpResponse::Ok().json(action))
}

/// `GET /api/actions`
///
/// Every district action, ordered by district and type.
pub async fn list_actions(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    caller_id(&req)?;

    let actions = state.store.district_actions(None).await?;
    Ok(HttpResponse::Ok().json(actions))
}

/// `GET /api/actions/summary`
///
/// City-wide average progress and completed counts, overall and per
/// action type.
pub async fn actions_summary(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    caller_id(&req)?;

    let actions = state.store.district_actions(None).await?;
    Ok(HttpResponse::Ok().json(ApiActionsSummary::from(actions.as_slice())))
}

/// `GET /api/actions/recent?limit=`
pub async fn recent_actions(
    state: web::Data<AppState>,
    req: HttpRequest,
    params: web::Query<RecentActionsParams>,
) -> Result<HttpResponse, ApiError> {
    caller_id(&req)?;

    let actions = state.store.recent_district_actions(params.limit()).await?;
    Ok(HttpResponse::Ok().json(actions))
}

/// `GET /api/districts/{id}/actions`
///
/// One entry per action type, with the stored progress when there is one.
pub async fn district_actions(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let district = parse_district(&path)?;
    caller_id(&req)?;

    let actions = state.store.district_actions(Some(district)).await?;
    Ok(HttpResponse::Ok().json(district_action_slots(&actions)))
}

/// `PUT /api/districts/{id}/actions/{type}`
///
/// Records a district's progress for one action type. Same permission rule
/// as street updates.
pub async fn update_district_action(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let (district, action_type) = path.into_inner();
    let district = parse_district(&district)?;
    let action_type: ActionType = action_type
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid action type '{action_type}'")))?;
    let update = parse_json_body::<DistrictActionBody>(&body)?
        .into_update()
        .map_err(ApiError::BadRequest)?;

    let store = state.store.as_ref();
    let profile = store.profile(&caller).await?;
    authorize(profile.as_ref(), district)?;

    let action = store
        .upsert_district_action(district, action_type, &update, &caller)
        .await?;

    log::info!(
        "District {district} {action_type} set to {}% ({}) by {caller}",
        action.percentage,
        action.status
    );

    Ok(HttpResponse::Ok().json(action))
}

/// `GET /api/me`
pub async fn current_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let profile = require_profile(state.store.as_ref(), &caller).await?;
    Ok(HttpResponse::Ok().json(profile))
}

/// `GET /api/profiles`
///
/// Every profile, newest first. Admins only.
pub async fn list_profiles(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let store = state.store.as_ref();
    require_admin(&require_profile(store, &caller).await?)?;

    Ok(HttpResponse::Ok().json(store.profiles().await?))
}

/// `POST /api/profiles`
///
/// Creates the profile of an account issued by the session layer. Admins
/// only.
pub async fn create_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let body: NewProfileBody = parse_json_body(&body)?;
    let id = parse_uuid(&body.id, "profile ID")?;
    let profile = body.into_profile(id).map_err(ApiError::BadRequest)?;

    let store = state.store.as_ref();
    require_admin(&require_profile(store, &caller).await?)?;

    if store.profile(&profile.id).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Profile {} already exists",
            profile.id
        )));
    }
    if store.profile_by_username(&profile.username).await?.is_some() {
        return Err(ApiError::Conflict(format!(
            "Username '{}' is already taken",
            profile.username
        )));
    }

    let created = store.create_profile(&profile).await?;
    log::info!(
        "Profile {} ({}, {}) created by {caller}",
        created.id,
        created.username,
        created.role
    );

    Ok(HttpResponse::Created().json(created))
}

/// `PATCH /api/profiles/{id}`
///
/// Changes names, role, assigned districts, or the active flag. Admins
/// only.
pub async fn update_profile(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_id(&req)?;
    let body: ProfileUpdateBody = parse_json_body(&body)?;
    let id = parse_uuid(&path, "profile ID")?;

    let store = state.store.as_ref();
    require_admin(&require_profile(store, &caller).await?)?;

    let mut profile = require_profile(store, &id).await?;
    body.apply(&mut profile);

    let updated = store
        .update_profile(&profile)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;
    log::info!("Profile {} updated by {caller}", updated.id);

    Ok(HttpResponse::Ok().json(updated))
}

/// Parses a district path segment.
fn parse_district(raw: &str) -> Result<DistrictId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid district ID".to_string()))
}

/// Parses a UUID and returns its canonical hyphenated form.
fn parse_uuid(raw: &str, what: &str) -> Result<String, ApiError> {
    uuid::Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what}")))
}

/// Returns the caller's profile id from [`USER_ID_HEADER`].
fn caller_id(req: &HttpRequest) -> Result<String, ApiError> {
    let raw = req
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    uuid::Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| ApiError::Unauthorized)
}

fn parse_json_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))
}

async fn require_profile(store: &dyn ApiStore, id: &str) -> Result<Profile, ApiError> {
    store
        .profile(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))
}

fn require_admin(profile: &Profile) -> Result<(), ApiError> {
    if profile.role == UserRole::Admin {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Forbidden - admin only".to_string()))
    }
}

/// Checks that `profile` may edit streets in `district`.
fn authorize(profile: Option<&Profile>, district: DistrictId) -> Result<(), ApiError> {
    let profile = profile.ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    if profile.can_edit(district) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "Forbidden - not assigned to district {district}"
        )))
    }
}
