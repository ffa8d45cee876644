//! District-by-district import driver.
//!
//! [`Importer::run`] optionally clears existing streets, then walks the
//! requested districts strictly in order. Each district moves through
//! [`DistrictPhase`]s; a district whose fetch is given up ends `Done` with
//! zero records and the run carries on with the next one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use canvass_map_street_models::DistrictId;
use canvass_map_street_models::profile::{ImportMode, ImportProfile};
use serde::Serialize;

use crate::StreetError;
use crate::area::{AreaResolver, resolver_for};
use crate::normalize::{ExclusionCounts, RecordNormalizer, TypeFilter};
use crate::overpass::{GeometryFetcher, GeometrySource};
use crate::progress::{ProgressCallback, null_progress};
use crate::retry::RetryPolicy;
use crate::store::StreetStore;
use crate::upsert::{BatchUpserter, UpsertSummary};

/// Where a district is in its import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistrictPhase {
    /// Not started.
    Idle,
    /// First fetch attempt in flight.
    Fetching,
    /// A later fetch attempt in flight.
    Retrying {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Filtering and deduplicating fetched ways.
    Normalizing,
    /// Writing batches.
    Writing,
    /// Finished, whether or not anything was written.
    Done,
}

impl std::fmt::Display for DistrictPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Fetching => f.write_str("fetching"),
            Self::Retrying { attempt } => write!(f, "retrying (attempt {attempt})"),
            Self::Normalizing => f.write_str("normalizing"),
            Self::Writing => f.write_str("writing"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// What happened to one district.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DistrictOutcome {
    /// Raw ways returned by the geodata service.
    pub fetched: usize,
    /// Fetch attempts made.
    pub fetch_attempts: u32,
    /// Last fetch error when the district was given up.
    pub fetch_error: Option<String>,
    /// Records left after normalization.
    pub records: usize,
    /// Why the other ways were dropped.
    pub excluded: ExclusionCounts,
    /// Batch write totals.
    pub upsert: UpsertSummary,
}

/// Summary of a whole import run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Profile the run used.
    pub profile_id: String,
    /// Streets deleted before importing, if the run cleared first.
    pub cleared: Option<u64>,
    /// Per-district outcomes.
    pub districts: BTreeMap<DistrictId, DistrictOutcome>,
    /// Rows written across all districts.
    pub total_written: u64,
}

impl ImportReport {
    /// Districts whose fetch was given up.
    #[must_use]
    pub fn failed_districts(&self) -> Vec<DistrictId> {
        self.districts
            .iter()
            .filter(|(_, o)| o.fetch_error.is_some())
            .map(|(d, _)| *d)
            .collect()
    }

    /// Exclusion counts summed over every district.
    #[must_use]
    pub fn total_excluded(&self) -> ExclusionCounts {
        let mut total = ExclusionCounts::default();
        for outcome in self.districts.values() {
            total.add(&outcome.excluded);
        }
        total
    }

    /// Batch write totals summed over every district.
    #[must_use]
    pub fn total_upsert(&self) -> UpsertSummary {
        let mut total = UpsertSummary::default();
        for outcome in self.districts.values() {
            total.add(&outcome.upsert);
        }
        total
    }
}

/// Runs the area, fetch, normalize, and write stages for each district.
pub struct Importer<'a, S> {
    profile_id: String,
    resolver: Box<dyn AreaResolver>,
    fetcher: GeometryFetcher<S>,
    normalizer: RecordNormalizer,
    mode: ImportMode,
    store: &'a dyn StreetStore,
    batch_size: usize,
    clear_existing: bool,
    district_delay: Duration,
    progress: Arc<dyn ProgressCallback>,
}

impl<'a, S: GeometrySource> Importer<'a, S> {
    /// Builds an importer configured entirely by `profile`.
    #[must_use]
    pub fn new(profile: &ImportProfile, source: S, store: &'a dyn StreetStore) -> Self {
        let types = TypeFilter::new(profile.excluded_types.iter().cloned());
        if !types.is_empty() {
            log::debug!(
                "Profile '{}' excludes types: {}",
                profile.id,
                profile.excluded_types.join(", ")
            );
        }

        Self {
            profile_id: profile.id.clone(),
            resolver: resolver_for(&profile.area),
            fetcher: GeometryFetcher::new(
                source,
                RetryPolicy::from_config(&profile.retry),
                profile.retry.retry_malformed,
                profile.query_timeout_secs,
            ),
            normalizer: RecordNormalizer::new(profile.mode, Box::new(types)),
            mode: profile.mode,
            store,
            batch_size: profile.batch_size,
            clear_existing: profile.clear_existing,
            district_delay: profile.district_delay(),
            progress: null_progress(),
        }
    }

    /// Reports one step per district to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Overrides the profile's `clear_existing` setting.
    #[must_use]
    pub const fn clear_existing(mut self, clear: bool) -> Self {
        self.clear_existing = clear;
        self
    }

    /// Overrides the profile's pause between districts.
    #[must_use]
    pub const fn district_delay(mut self, delay: Duration) -> Self {
        self.district_delay = delay;
        self
    }

    /// Overrides the profile's retry policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.fetcher = self.fetcher.with_policy(policy);
        self
    }

    /// Imports `districts` in order, or all 20 when empty.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError`] only if clearing existing streets fails, in
    /// which case no district is processed. Fetch and write failures are
    /// logged and reflected in the report.
    pub async fn run(&self, districts: &[DistrictId]) -> Result<ImportReport, StreetError> {
        let districts = dedup_in_order(districts);
        let mut report = ImportReport {
            profile_id: self.profile_id.clone(),
            ..ImportReport::default()
        };

        log::info!(
            "Importing {} district(s) with profile '{}'",
            districts.len(),
            self.profile_id
        );

        if self.clear_existing {
            let deleted = self.store.clear_streets().await.inspect_err(|e| {
                log::error!("Failed to clear existing streets, aborting import: {e}");
            })?;
            log::info!("Cleared {deleted} existing street(s)");
            report.cleared = Some(deleted);
        }

        self.progress.set_total(districts.len() as u64);

        for (i, &district) in districts.iter().enumerate() {
            if i > 0 && !self.district_delay.is_zero() {
                log::debug!("Waiting {:?} before next district", self.district_delay);
                tokio::time::sleep(self.district_delay).await;
            }

            self.progress
                .set_message(format!("District {}", district.label()));

            let outcome = self.import_district(district).await;
            report.total_written += outcome.upsert.written;
            report.districts.insert(district, outcome);

            self.progress.inc(1);
        }

        let failed = report.failed_districts();
        let summary = format!(
            "Imported {} street(s) across {} district(s)",
            report.total_written,
            report.districts.len()
        );
        if failed.is_empty() {
            log::info!("{summary}");
        } else {
            log::warn!(
                "{summary}; {} district(s) returned no data after retries: {}",
                failed.len(),
                failed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        self.progress.finish(summary);

        Ok(report)
    }

    /// Runs every stage for a single district. Never fails.
    pub async fn import_district(&self, district: DistrictId) -> DistrictOutcome {
        let label = format!("District {}", district.label());
        log_phase(&label, DistrictPhase::Idle);

        let region = self.resolver.resolve(district);
        log_phase(&label, DistrictPhase::Fetching);
        let fetched = self
            .fetcher
            .fetch(&label, &region, self.mode, |attempt| {
                log_phase(&label, DistrictPhase::Retrying { attempt });
            })
            .await;

        let mut outcome = DistrictOutcome {
            fetched: fetched.elements.len(),
            fetch_attempts: fetched.attempts,
            fetch_error: fetched.error,
            ..DistrictOutcome::default()
        };

        log_phase(&label, DistrictPhase::Normalizing);
        let normalized = self.normalizer.normalize(district, fetched.elements);
        outcome.records = normalized.records.len();
        outcome.excluded = normalized.excluded;

        log_phase(&label, DistrictPhase::Writing);
        outcome.upsert = BatchUpserter::new(self.store, self.batch_size)
            .upsert(&label, &normalized.records)
            .await;

        log_phase(&label, DistrictPhase::Done);
        log::info!(
            "{label}: {} way(s) fetched, {} record(s), {} excluded, {} duplicate(s), {} written",
            outcome.fetched,
            outcome.records,
            outcome.excluded.excluded(),
            outcome.excluded.duplicates,
            outcome.upsert.written
        );

        outcome
    }
}

fn log_phase(label: &str, phase: DistrictPhase) {
    log::debug!("{label}: {phase}");
}

fn dedup_in_order(districts: &[DistrictId]) -> Vec<DistrictId> {
    if districts.is_empty() {
        return DistrictId::all().collect();
    }
    let mut seen = std::collections::BTreeSet::new();
    districts
        .iter()
        .copied()
        .filter(|d| seen.insert(*d))
        .collect()
}
