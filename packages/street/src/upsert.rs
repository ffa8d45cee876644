//! Fixed-size batch writes.
//!
//! Records are split into chunks of `batch_size` and written one chunk per
//! store call, in order. A failing chunk is logged and skipped; the
//! remaining chunks are still attempted.

use canvass_map_street_models::StreetRecord;
use serde::Serialize;

use crate::store::StreetStore;

/// Totals from one [`BatchUpserter::upsert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    /// Rows reported written by the store.
    pub written: u64,
    /// Store calls made.
    pub batches: usize,
    /// Store calls that failed.
    pub failed_batches: usize,
}

impl UpsertSummary {
    /// Adds another summary's totals into this one.
    pub const fn add(&mut self, other: &Self) {
        self.written += other.written;
        self.batches += other.batches;
        self.failed_batches += other.failed_batches;
    }
}

/// Writes records to a [`StreetStore`] in fixed-size batches.
pub struct BatchUpserter<'a> {
    store: &'a dyn StreetStore,
    batch_size: usize,
}

impl<'a> BatchUpserter<'a> {
    /// Creates an upserter. A `batch_size` of zero is treated as one.
    #[must_use]
    pub fn new(store: &'a dyn StreetStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Writes `records` in batches, never failing as a whole.
    pub async fn upsert(&self, label: &str, records: &[StreetRecord]) -> UpsertSummary {
        let mut summary = UpsertSummary::default();
        let total_batches = records.len().div_ceil(self.batch_size);

        for (i, chunk) in records.chunks(self.batch_size).enumerate() {
            summary.batches += 1;
            match self.store.upsert_streets(chunk).await {
                Ok(written) => {
                    summary.written += written;
                    log::debug!(
                        "{label}: batch {}/{total_batches} wrote {written} row(s)",
                        i + 1
                    );
                }
                Err(e) => {
                    summary.failed_batches += 1;
                    log::error!(
                        "{label}: batch {}/{total_batches} ({} record(s)) failed, skipping: {e}",
                        i + 1,
                        chunk.len()
                    );
                }
            }
        }

        summary
    }
}
