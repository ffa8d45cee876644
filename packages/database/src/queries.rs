//! Query functions for streets, street actions, district actions, and
//! profiles.
//!
//! All statements are raw parameterized SQL. UUID and `JSONB` columns are
//! bound as text and cast server-side (`$n::text::uuid`) and read back as
//! text (`id::text`).

use std::collections::BTreeMap;

use canvass_map_database_models::{
    DistrictActionUpdate, DistrictCompletion, StreetRow, StreetSearchQuery, StreetSearchRow,
};
use canvass_map_street_models::{
    ActionType, DistrictAction, DistrictId, Profile, ProgressStatus, StreetActionRecord,
    StreetRecord, StreetStatus, UserRole, format_district_list, parse_district_list,
};
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};

use crate::DbError;

/// Columns bound per street in [`upsert_streets`].
const STREET_COLUMNS: usize = 6;

/// Builds `($1, $2), ($3, $4), ...` for `rows` rows, applying `casts[i]`
/// (e.g., `"::text::jsonb"`) to the i-th column's placeholder.
#[must_use]
pub fn values_placeholders(rows: usize, casts: &[&str]) -> String {
    let cols = casts.len();
    (0..rows)
        .map(|r| {
            let cells = casts
                .iter()
                .enumerate()
                .map(|(c, cast)| format!("${}{cast}", r * cols + c + 1))
                .collect::<Vec<_>>()
                .join(", ");
            format!("({cells})")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn district_value(district: DistrictId) -> DatabaseValue {
    DatabaseValue::Int32(i32::from(district.value()))
}

fn optional_string(value: Option<&str>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |v| DatabaseValue::String(v.to_string()))
}

fn conversion(message: impl Into<String>) -> DbError {
    DbError::Conversion {
        message: message.into(),
    }
}

fn read_district(row: &Row) -> Result<DistrictId, DbError> {
    let raw: i32 = row
        .to_value("district")
        .map_err(|e| conversion(format!("Failed to read district: {e}")))?;
    DistrictId::try_from(i64::from(raw)).map_err(|e| conversion(e.to_string()))
}

fn read_action_type(row: &Row) -> Result<ActionType, DbError> {
    let raw: String = row.to_value("type").unwrap_or_default();
    raw.parse()
        .map_err(|_| conversion(format!("Unknown action type '{raw}'")))
}

fn read_timestamp(row: &Row, column: &str) -> chrono::DateTime<chrono::Utc> {
    let naive: chrono::NaiveDateTime = row.to_value(column).unwrap_or_default();
    chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc)
}

fn read_status(row: &Row) -> Result<StreetStatus, DbError> {
    let raw: String = row.to_value("status").unwrap_or_default();
    raw.parse()
        .map_err(|_| conversion(format!("Unknown street status '{raw}'")))
}

/// Inserts or replaces streets keyed on `osm_id` in a single statement.
///
/// Callers must not pass two records with the same external id.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails; nothing is written then.
pub async fn upsert_streets(db: &dyn Database, records: &[StreetRecord]) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    let placeholders = values_placeholders(
        records.len(),
        &["", "::text", "::text", "", "::text::jsonb", "::text"],
    );
    let sql = format!(
        "INSERT INTO streets (osm_id, name, normalized_name, district, geometry, street_type)
         VALUES {placeholders}
         ON CONFLICT (osm_id) DO UPDATE SET
             name = EXCLUDED.name,
             normalized_name = EXCLUDED.normalized_name,
             district = EXCLUDED.district,
             geometry = EXCLUDED.geometry,
             street_type = EXCLUDED.street_type,
             updated_at = NOW() AT TIME ZONE 'UTC'"
    );

    let mut params = Vec::with_capacity(records.len() * STREET_COLUMNS);
    for record in records {
        params.push(DatabaseValue::Int64(record.external_id));
        params.push(DatabaseValue::String(record.name.clone()));
        params.push(DatabaseValue::String(record.normalized_name.clone()));
        params.push(district_value(record.district));
        params.push(DatabaseValue::String(record.geometry_geojson().to_string()));
        params.push(optional_string(record.street_type.as_deref()));
    }

    Ok(db.exec_raw_params(&sql, &params).await?)
}

/// Deletes every street. Their street actions go with them through the
/// `ON DELETE CASCADE` foreign key, in the same statement. Returns the
/// number of streets deleted.
///
/// # Errors
///
/// Returns [`DbError`] if the delete fails; nothing is deleted then.
pub async fn delete_all_streets(db: &dyn Database) -> Result<u64, DbError> {
    Ok(db.exec_raw_params(DELETE_ALL_STREETS_SQL, &[]).await?)
}

/// Statement run by [`delete_all_streets`].
const DELETE_ALL_STREETS_SQL: &str = "DELETE FROM streets";

/// Counts stored streets.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn count_streets(db: &dyn Database) -> Result<u64, DbError> {
    let rows = db
        .query_raw_params("SELECT COUNT(*) AS count FROM streets", &[])
        .await?;
    let count: i64 = rows
        .first()
        .and_then(|row| row.to_value("count").ok())
        .unwrap_or(0);
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Returns the street total and per-action `done` counts for a district.
///
/// # Errors
///
/// Returns [`DbError`] if a query fails.
pub async fn district_completion(
    db: &dyn Database,
    district: DistrictId,
) -> Result<DistrictCompletion, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT COUNT(*) AS total FROM streets WHERE district = $1",
            &[district_value(district)],
        )
        .await?;
    let total: i64 = rows
        .first()
        .and_then(|row| row.to_value("total").ok())
        .unwrap_or(0);

    let rows = db
        .query_raw_params(
            "SELECT a.type AS type, COUNT(*) AS done
             FROM street_actions a
             JOIN streets s ON s.id = a.street_id
             WHERE s.district = $1 AND a.status = 'done'
             GROUP BY a.type",
            &[district_value(district)],
        )
        .await?;

    let mut done = BTreeMap::new();
    for row in &rows {
        let action: String = row.to_value("type").unwrap_or_default();
        let count: i64 = row.to_value("done").unwrap_or(0);
        match action.parse::<ActionType>() {
            Ok(action) => {
                done.insert(action, u64::try_from(count).unwrap_or(0));
            }
            Err(_) => log::warn!("Ignoring unknown action type '{action}' in district {district}"),
        }
    }

    Ok(DistrictCompletion {
        total_streets: u64::try_from(total).unwrap_or(0),
        done,
    })
}

/// Lists a district's streets with their status for `action_type`,
/// ordered by name.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be decoded.
pub async fn streets_for_district(
    db: &dyn Database,
    district: DistrictId,
    action_type: ActionType,
) -> Result<Vec<StreetRow>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT s.id::text AS id, s.osm_id, s.name, s.normalized_name, s.district,
                    s.street_type, s.geometry::text AS geometry,
                    COALESCE(a.status, 'not_done') AS status
             FROM streets s
             LEFT JOIN street_actions a ON a.street_id = s.id AND a.type = $2
             WHERE s.district = $1
             ORDER BY s.name",
            &[
                district_value(district),
                DatabaseValue::String(action_type.as_ref().to_string()),
            ],
        )
        .await?;

    let mut streets = Vec::with_capacity(rows.len());
    for row in &rows {
        let geometry_text: String = row.to_value("geometry").unwrap_or_default();
        let geometry = serde_json::from_str(&geometry_text)
            .map_err(|e| conversion(format!("Invalid street geometry: {e}")))?;

        streets.push(StreetRow {
            id: row.to_value("id").unwrap_or_default(),
            osm_id: row.to_value("osm_id").unwrap_or(0),
            name: row.to_value("name").unwrap_or_default(),
            normalized_name: row.to_value("normalized_name").unwrap_or_default(),
            district: read_district(row)?,
            street_type: row.to_value("street_type").unwrap_or(None),
            geometry,
            status: read_status(row)?,
        });
    }

    Ok(streets)
}

/// Searches a district's streets by normalized-name substring.
///
/// The status filter is applied before the limit.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be decoded.
pub async fn search_streets(
    db: &dyn Database,
    query: &StreetSearchQuery,
) -> Result<Vec<StreetSearchRow>, DbError> {
    let mut sql = String::from(
        "SELECT s.id::text AS id, s.name, s.street_type,
                COALESCE(a.status, 'not_done') AS status
         FROM streets s
         LEFT JOIN street_actions a ON a.street_id = s.id AND a.type = $2
         WHERE s.district = $1
           AND s.normalized_name LIKE '%' || $3::text || '%'",
    );
    let mut params = vec![
        district_value(query.district),
        DatabaseValue::String(query.action_type.as_ref().to_string()),
        DatabaseValue::String(query.normalized_query.clone()),
    ];

    if let Some(status) = query.status {
        params.push(DatabaseValue::String(status.as_ref().to_string()));
        sql.push_str(&format!(
            " AND COALESCE(a.status, 'not_done') = ${}",
            params.len()
        ));
    }

    params.push(DatabaseValue::Int64(i64::from(query.limit)));
    sql.push_str(&format!(" ORDER BY s.name LIMIT ${}", params.len()));

    let rows = db.query_raw_params(&sql, &params).await?;

    rows.iter()
        .map(|row| {
            Ok(StreetSearchRow {
                id: row.to_value("id").unwrap_or_default(),
                name: row.to_value("name").unwrap_or_default(),
                street_type: row.to_value("street_type").unwrap_or(None),
                status: read_status(row)?,
            })
        })
        .collect()
}

/// Returns the district of a street, or `None` if the street does not
/// exist.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn get_street_district(
    db: &dyn Database,
    street_id: &str,
) -> Result<Option<DistrictId>, DbError> {
    let rows = db
        .query_raw_params(
            "SELECT district FROM streets WHERE id = $1::text::uuid",
            &[DatabaseValue::String(street_id.to_string())],
        )
        .await?;

    rows.first().map(read_district).transpose()
}

/// Loads a profile by id, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the role is unknown.
pub async fn get_profile(db: &dyn Database, id: &str) -> Result<Option<Profile>, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1::text::uuid"),
            &[DatabaseValue::String(id.to_string())],
        )
        .await?;

    rows.first().map(read_profile).transpose()
}

/// Columns selected for every profile read.
const PROFILE_COLUMNS: &str =
    "id::text AS id, username, first_name, last_name, role, districts, is_active";

fn read_profile(row: &Row) -> Result<Profile, DbError> {
    let role: String = row.to_value("role").unwrap_or_default();
    let role = role
        .parse::<UserRole>()
        .map_err(|_| conversion(format!("Unknown role '{role}'")))?;
    let districts: Option<String> = row.to_value("districts").unwrap_or(None);

    Ok(Profile {
        id: row.to_value("id").unwrap_or_default(),
        username: row.to_value("username").unwrap_or_default(),
        first_name: row.to_value("first_name").unwrap_or(None),
        last_name: row.to_value("last_name").unwrap_or(None),
        role,
        districts: districts.as_deref().map(parse_district_list).unwrap_or_default(),
        is_active: row.to_value("is_active").unwrap_or(false),
    })
}

fn profile_params(profile: &Profile) -> Vec<DatabaseValue> {
    vec![
        DatabaseValue::String(profile.id.clone()),
        DatabaseValue::String(profile.username.clone()),
        optional_string(profile.first_name.as_deref()),
        optional_string(profile.last_name.as_deref()),
        DatabaseValue::String(profile.role.as_ref().to_string()),
        DatabaseValue::String(format_district_list(&profile.districts)),
        DatabaseValue::Bool(profile.is_active),
    ]
}

/// Loads a profile by username, or `None` if it does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the role is unknown.
pub async fn get_profile_by_username(
    db: &dyn Database,
    username: &str,
) -> Result<Option<Profile>, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE username = $1"),
            &[DatabaseValue::String(username.to_string())],
        )
        .await?;

    rows.first().map(read_profile).transpose()
}

/// Lists every profile, newest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a role is unknown.
pub async fn list_profiles(db: &dyn Database) -> Result<Vec<Profile>, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at DESC"),
            &[],
        )
        .await?;

    rows.iter().map(read_profile).collect()
}

/// Inserts a profile and returns the stored row.
///
/// # Errors
///
/// Returns [`DbError`] if the insert fails (for instance on a duplicate id
/// or username).
pub async fn create_profile(db: &dyn Database, profile: &Profile) -> Result<Profile, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "INSERT INTO profiles (id, username, first_name, last_name, role, districts, is_active)
                 VALUES ($1::text::uuid, $2, $3, $4, $5, $6, $7)
                 RETURNING {PROFILE_COLUMNS}"
            ),
            &profile_params(profile),
        )
        .await?;

    rows.first()
        .map(read_profile)
        .transpose()?
        .ok_or_else(|| conversion("Profile insert returned no row"))
}

/// Overwrites a profile's editable columns. Returns the stored row, or
/// `None` if no profile has that id.
///
/// # Errors
///
/// Returns [`DbError`] if the update fails.
pub async fn update_profile(
    db: &dyn Database,
    profile: &Profile,
) -> Result<Option<Profile>, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "UPDATE profiles SET
                     username = $2,
                     first_name = $3,
                     last_name = $4,
                     role = $5,
                     districts = $6,
                     is_active = $7,
                     updated_at = NOW() AT TIME ZONE 'UTC'
                 WHERE id = $1::text::uuid
                 RETURNING {PROFILE_COLUMNS}"
            ),
            &profile_params(profile),
        )
        .await?;

    rows.first().map(read_profile).transpose()
}

/// Sets the status of one street for one action type, creating the row on
/// first write. Returns the stored row.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails or returns no row.
pub async fn upsert_street_action(
    db: &dyn Database,
    street_id: &str,
    action_type: ActionType,
    status: StreetStatus,
    responsible_id: &str,
) -> Result<StreetActionRecord, DbError> {
    let rows = db
        .query_raw_params(
            "INSERT INTO street_actions (street_id, type, status, responsible_id, updated_at)
             VALUES ($1::text::uuid, $2, $3, $4::text::uuid, NOW() AT TIME ZONE 'UTC')
             ON CONFLICT (street_id, type) DO UPDATE SET
                 status = EXCLUDED.status,
                 responsible_id = EXCLUDED.responsible_id,
                 updated_at = EXCLUDED.updated_at
             RETURNING street_id::text AS street_id, type, status,
                       responsible_id::text AS responsible_id, updated_at",
            &[
                DatabaseValue::String(street_id.to_string()),
                DatabaseValue::String(action_type.as_ref().to_string()),
                DatabaseValue::String(status.as_ref().to_string()),
                DatabaseValue::String(responsible_id.to_string()),
            ],
        )
        .await?;

    let row = rows
        .first()
        .ok_or_else(|| conversion("Street action upsert returned no row"))?;

    Ok(StreetActionRecord {
        street_id: row.to_value("street_id").unwrap_or_default(),
        action_type: read_action_type(row)?,
        status: read_status(row)?,
        responsible_id: row.to_value("responsible_id").unwrap_or(None),
        updated_at: read_timestamp(row, "updated_at"),
    })
}

/// Columns selected for every district action read.
const DISTRICT_ACTION_COLUMNS: &str = "id::text AS id, district, type, status, percentage,
     responsible_id::text AS responsible_id, notes, updated_at";

fn read_district_action(row: &Row) -> Result<DistrictAction, DbError> {
    let status: String = row.to_value("status").unwrap_or_default();
    let percentage: i32 = row.to_value("percentage").unwrap_or(0);

    Ok(DistrictAction {
        id: row.to_value("id").unwrap_or_default(),
        district: read_district(row)?,
        action_type: read_action_type(row)?,
        status: status
            .parse::<ProgressStatus>()
            .map_err(|_| conversion(format!("Unknown progress status '{status}'")))?,
        percentage: u8::try_from(percentage)
            .map_err(|_| conversion(format!("Percentage out of range: {percentage}")))?,
        responsible_id: row.to_value("responsible_id").unwrap_or(None),
        notes: row.to_value("notes").unwrap_or(None),
        updated_at: read_timestamp(row, "updated_at"),
    })
}

/// Lists district actions ordered by district and type, for one district
/// or for all of them.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be decoded.
pub async fn list_district_actions(
    db: &dyn Database,
    district: Option<DistrictId>,
) -> Result<Vec<DistrictAction>, DbError> {
    let rows = match district {
        Some(district) => {
            db.query_raw_params(
                &format!(
                    "SELECT {DISTRICT_ACTION_COLUMNS} FROM district_actions
                     WHERE district = $1
                     ORDER BY district, type"
                ),
                &[district_value(district)],
            )
            .await?
        }
        None => {
            db.query_raw_params(
                &format!(
                    "SELECT {DISTRICT_ACTION_COLUMNS} FROM district_actions
                     ORDER BY district, type"
                ),
                &[],
            )
            .await?
        }
    };

    rows.iter().map(read_district_action).collect()
}

/// Returns the `limit` most recently updated district actions, newest
/// first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a row cannot be decoded.
pub async fn recent_district_actions(
    db: &dyn Database,
    limit: u32,
) -> Result<Vec<DistrictAction>, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "SELECT {DISTRICT_ACTION_COLUMNS} FROM district_actions
                 ORDER BY updated_at DESC
                 LIMIT $1"
            ),
            &[DatabaseValue::Int64(i64::from(limit))],
        )
        .await?;

    rows.iter().map(read_district_action).collect()
}

/// Sets a district's progress for one action type, creating the row on
/// first write. Returns the stored row.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails or returns no row.
pub async fn upsert_district_action(
    db: &dyn Database,
    district: DistrictId,
    action_type: ActionType,
    update: &DistrictActionUpdate,
    responsible_id: &str,
) -> Result<DistrictAction, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "INSERT INTO district_actions
                     (district, type, status, percentage, notes, responsible_id, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6::text::uuid, NOW() AT TIME ZONE 'UTC')
                 ON CONFLICT (district, type) DO UPDATE SET
                     status = EXCLUDED.status,
                     percentage = EXCLUDED.percentage,
                     notes = EXCLUDED.notes,
                     responsible_id = EXCLUDED.responsible_id,
                     updated_at = EXCLUDED.updated_at
                 RETURNING {DISTRICT_ACTION_COLUMNS}"
            ),
            &[
                district_value(district),
                DatabaseValue::String(action_type.as_ref().to_string()),
                DatabaseValue::String(update.status.as_ref().to_string()),
                DatabaseValue::Int32(i32::from(update.percentage)),
                optional_string(update.notes.as_deref()),
                DatabaseValue::String(responsible_id.to_string()),
            ],
        )
        .await?;

    rows.first()
        .map(read_district_action)
        .transpose()?
        .ok_or_else(|| conversion("District action upsert returned no row"))
}
