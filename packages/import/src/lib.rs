#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street import tool for the canvass map.
//!
//! Loads an import profile, resolves the districts to import, and runs the
//! street pipeline against the application database or, for dry runs, an
//! in-memory store.

pub mod interactive;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use canvass_map_cli_utils::{IndicatifProgress, MultiProgress};
use canvass_map_database::{DbError, db, run_migrations};
use canvass_map_street::StreetError;
use canvass_map_street::area::resolver_for;
use canvass_map_street::config::ImportConfig;
use canvass_map_street::ingest::{ImportReport, Importer};
use canvass_map_street::overpass::{GeometrySource, OverpassClient};
use canvass_map_street::profiles::{all_profiles, find_profile, parse_profile};
use canvass_map_street::progress::ProgressCallback;
use canvass_map_street::store::{DatabaseStreetStore, MemoryStreetStore, StreetStore};
use canvass_map_street_models::profile::ImportProfile;
use canvass_map_street_models::{DistrictId, InvalidDistrictError};

/// Errors surfaced by the import tool.
#[derive(Debug, thiserror::Error)]
pub enum ImportCliError {
    #[error("Invalid district list '{input}': {source}")]
    InvalidDistricts {
        input: String,
        source: InvalidDistrictError,
    },

    #[error("Failed to read profile file {path}: {source}")]
    ProfileFile {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error(transparent)]
    Street(#[from] StreetError),

    #[error(transparent)]
    Database(#[from] DbError),
}

/// Settings for one import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub profile: ImportProfile,
    /// Districts to import in order; empty means all.
    pub districts: Vec<DistrictId>,
    /// Write to memory instead of the database.
    pub dry_run: bool,
    /// Never clear existing streets, whatever the profile says.
    pub keep_existing: bool,
}

/// Parses a comma-separated district list. `None` or a blank string
/// selects every district.
///
/// # Errors
///
/// Returns [`ImportCliError::InvalidDistricts`] if any entry is not a
/// district number.
pub fn parse_districts(input: Option<&str>) -> Result<Vec<DistrictId>, ImportCliError> {
    let Some(input) = input.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(Vec::new());
    };

    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<DistrictId>()
                .map_err(|source| ImportCliError::InvalidDistricts {
                    input: input.to_string(),
                    source,
                })
        })
        .collect()
}

/// Loads a profile from a TOML file, or from the embedded registry by id.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the id is
/// unknown.
pub fn load_profile(id: &str, file: Option<&Path>) -> Result<ImportProfile, ImportCliError> {
    let Some(path) = file else {
        return Ok(find_profile(id)?);
    };

    let toml_str = std::fs::read_to_string(path).map_err(|source| ImportCliError::ProfileFile {
        path: path.display().to_string(),
        source,
    })?;
    log::info!("Loaded profile from {}", path.display());
    Ok(parse_profile(&toml_str)?)
}

/// Runs an import and returns its report.
///
/// # Errors
///
/// Returns an error if the environment configuration is invalid, the
/// database is unreachable, or clearing existing streets fails.
pub async fn run_import(
    options: &ImportOptions,
    multi: &MultiProgress,
) -> Result<ImportReport, ImportCliError> {
    let config = ImportConfig::from_env()?;
    log::debug!("Using Overpass endpoint {}", config.overpass_url);
    let client = OverpassClient::new(&config)?;
    let progress = IndicatifProgress::districts_bar(
        multi,
        &format!("Importing with profile '{}'", options.profile.id),
    );

    if options.dry_run {
        log::info!("Dry run: streets are kept in memory only");
        let store = MemoryStreetStore::new();
        let report = import_into(options, client, &store, progress).await?;
        log::info!(
            "Dry run: {} street(s) would be stored",
            store.count_streets().await?
        );
        return Ok(report);
    }

    let db = db::connect_from_env()
        .await
        .map_err(|e| ImportCliError::Connection(e.to_string()))?;
    run_migrations(db.as_ref()).await?;

    let store = DatabaseStreetStore::new(db.as_ref());
    let report = import_into(options, client, &store, progress).await?;
    log::info!("{} street(s) now stored", store.count_streets().await?);

    Ok(report)
}

async fn import_into<S: GeometrySource>(
    options: &ImportOptions,
    source: S,
    store: &dyn StreetStore,
    progress: Arc<dyn ProgressCallback>,
) -> Result<ImportReport, StreetError> {
    let mut importer = Importer::new(&options.profile, source, store).with_progress(progress);
    if options.keep_existing {
        importer = importer.clear_existing(false);
    }
    importer.run(&options.districts).await
}

/// Runs database migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn migrate() -> Result<(), ImportCliError> {
    log::info!("Running database migrations...");
    let db = db::connect_from_env()
        .await
        .map_err(|e| ImportCliError::Connection(e.to_string()))?;
    run_migrations(db.as_ref()).await?;
    log::info!("Migrations complete.");
    Ok(())
}

/// Renders the embedded profiles as a table.
#[must_use]
pub fn format_profiles() -> String {
    let mut out = format!("{:<18} {:<8} NAME\n", "ID", "CLEARS");
    out.push_str(&"-".repeat(60));
    out.push('\n');
    for profile in all_profiles() {
        writeln!(
            out,
            "{:<18} {:<8} {}",
            profile.id(),
            if profile.clear_existing { "yes" } else { "no" },
            profile.name()
        )
        .unwrap();
        if let Some(description) = &profile.description {
            writeln!(out, "{:<27} {description}", "").unwrap();
        }
    }
    out
}

/// Renders the query region each district resolves to under `profile`.
#[must_use]
pub fn format_regions(profile: &ImportProfile) -> String {
    let resolver = resolver_for(&profile.area);
    let mut out = format!("Profile '{}'\n", profile.id);
    for district in DistrictId::all() {
        writeln!(out, "{:>4}  {}", district.label(), resolver.resolve(district))
            .unwrap();
    }
    out
}

/// Renders an import report as a per-district table with totals.
#[must_use]
pub fn format_report(report: &ImportReport) -> String {
    let mut out = format!(
        "{:<6} {:>8} {:>8} {:>9} {:>6} {:>8} {:>7}\n",
        "DIST", "FETCHED", "RECORDS", "EXCLUDED", "DUPES", "WRITTEN", "FAILED"
    );
    out.push_str(&"-".repeat(60));
    out.push('\n');

    for (district, outcome) in &report.districts {
        write!(
            out,
            "{:<6} {:>8} {:>8} {:>9} {:>6} {:>8} {:>7}",
            district.label(),
            outcome.fetched,
            outcome.records,
            outcome.excluded.excluded(),
            outcome.excluded.duplicates,
            outcome.upsert.written,
            outcome.upsert.failed_batches
        )
        .unwrap();
        if let Some(error) = &outcome.fetch_error {
            write!(
                out,
                "  gave up after {} attempt(s): {error}",
                outcome.fetch_attempts
            )
            .unwrap();
        }
        out.push('\n');
    }

    out.push_str(&"-".repeat(60));
    out.push('\n');
    if let Some(cleared) = report.cleared {
        writeln!(out, "Cleared before import: {cleared}").unwrap();
    }
    writeln!(out, "Total written: {}", report.total_written).unwrap();

    let failed = report.failed_districts();
    if !failed.is_empty() {
        writeln!(
            out,
            "No data after retries: {}",
            failed
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
        .unwrap();
    }
    let excluded = report.total_excluded();
    let upsert = report.total_upsert();
    writeln!(
        out,
        "Excluded: {}  Duplicates: {}  Batches: {}",
        excluded.excluded(),
        excluded.duplicates,
        upsert.batches
    )
    .unwrap();
    if upsert.failed_batches > 0 {
        writeln!(out, "Failed batches: {}", upsert.failed_batches).unwrap();
    }

    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use canvass_map_street::progress::null_progress;
    use canvass_map_street::retry::RetryPolicy;
    use canvass_map_street_models::StreetRecord;
    use canvass_map_street_models::profile::Backoff;
    use canvass_map_street_models::raw::RawElement;

    use super::*;

    struct EmptySource;

    #[async_trait]
    impl GeometrySource for EmptySource {
        async fn fetch(&self, _query: &str) -> Result<Vec<RawElement>, StreetError> {
            Ok(Vec::new())
        }
    }

    fn district(n: u8) -> DistrictId {
        DistrictId::new(n).unwrap()
    }

    fn options(profile_id: &str, keep_existing: bool) -> ImportOptions {
        ImportOptions {
            profile: find_profile(profile_id).unwrap(),
            districts: vec![district(3)],
            dry_run: true,
            keep_existing,
        }
    }

    async fn seeded_store() -> MemoryStreetStore {
        let store = MemoryStreetStore::new();
        store
            .upsert_streets(&[StreetRecord {
                external_id: 1,
                name: "Rue Réaumur".to_string(),
                normalized_name: "rue reaumur".to_string(),
                district: district(3),
                geometry: vec![[2.35, 48.866], [2.356, 48.867]],
                street_type: Some("secondary".to_string()),
            }])
            .await
            .unwrap();
        store
    }

    #[test]
    fn blank_district_list_selects_all() {
        assert!(parse_districts(None).unwrap().is_empty());
        assert!(parse_districts(Some("  ")).unwrap().is_empty());
    }

    #[test]
    fn district_list_keeps_order() {
        assert_eq!(
            parse_districts(Some("11, 3,20,")).unwrap(),
            vec![district(11), district(3), district(20)]
        );
    }

    #[test]
    fn invalid_district_is_an_error() {
        assert!(matches!(
            parse_districts(Some("1,21")),
            Err(ImportCliError::InvalidDistricts { .. })
        ));
        assert!(matches!(
            parse_districts(Some("1,deux")),
            Err(ImportCliError::InvalidDistricts { .. })
        ));
    }

    #[test]
    fn unknown_profile_is_an_error() {
        assert!(matches!(
            load_profile("nope", None),
            Err(ImportCliError::Street(StreetError::Config { .. }))
        ));
    }

    #[test]
    fn missing_profile_file_is_an_error() {
        assert!(matches!(
            load_profile("ignored", Some(Path::new("/nonexistent/profile.toml"))),
            Err(ImportCliError::ProfileFile { .. })
        ));
    }

    #[tokio::test]
    async fn keep_existing_overrides_profile_clear() {
        let store = seeded_store().await;
        let report = import_into(
            &options("named_streets", true),
            EmptySource,
            &store,
            null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(report.cleared, None);
        assert_eq!(store.count_streets().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clearing_profile_empties_store() {
        let store = seeded_store().await;
        let report = import_into(
            &options("named_streets", false),
            EmptySource,
            &store,
            null_progress(),
        )
        .await
        .unwrap();

        assert_eq!(report.cleared, Some(1));
        assert_eq!(store.count_streets().await.unwrap(), 0);
        assert!(report.districts.contains_key(&district(3)));
    }

    #[test]
    fn profile_table_lists_every_profile() {
        let table = format_profiles();
        for profile in all_profiles() {
            assert!(table.contains(profile.id()));
        }
    }

    #[test]
    fn regions_cover_every_district() {
        let profile = find_profile("admin_boundaries").unwrap();
        let regions = format_regions(&profile);
        assert!(regions.contains("Paris 1er Arrondissement"));
        assert!(regions.contains("Paris 20e Arrondissement"));
    }

    #[tokio::test]
    async fn report_mentions_failed_districts() {
        struct DownSource;

        #[async_trait]
        impl GeometrySource for DownSource {
            async fn fetch(&self, _query: &str) -> Result<Vec<RawElement>, StreetError> {
                Err(StreetError::UpstreamStatus { status: 504 })
            }
        }

        let store = MemoryStreetStore::new();
        let opts = options("filtered_streets", true);
        let report = Importer::new(&opts.profile, DownSource, &store)
            .retry_policy(RetryPolicy::new(2, Duration::ZERO, Backoff::Fixed))
            .run(&opts.districts)
            .await
            .unwrap();

        let table = format_report(&report);
        assert!(table.contains("gave up after 2 attempt(s)"));
        assert!(table.contains("No data after retries: 3"));
        assert!(table.contains("Total written: 0"));
        assert!(table.contains("Excluded: 0  Duplicates: 0  Batches: 0"));
        assert!(!table.contains("Failed batches"));
    }
}
