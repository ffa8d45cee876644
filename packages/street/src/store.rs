//! Street persistence seam.
//!
//! [`DatabaseStreetStore`] writes through to the `streets` table.
//! [`MemoryStreetStore`] keeps records in a map keyed by way id with the
//! same overwrite semantics; dry runs and tests use it.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use canvass_map_street_models::StreetRecord;
use switchy_database::Database;

use crate::StreetError;

/// Storage for imported streets, keyed on the external id.
#[async_trait]
pub trait StreetStore: Send + Sync {
    /// Inserts `records`, replacing any existing row with the same
    /// external id. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError`] if the write fails. A failed call writes
    /// nothing.
    async fn upsert_streets(&self, records: &[StreetRecord]) -> Result<u64, StreetError>;

    /// Deletes every street together with its action rows. Returns the
    /// number of streets deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError`] if the delete fails.
    async fn clear_streets(&self) -> Result<u64, StreetError>;

    /// Number of stored streets.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError`] if the count fails.
    async fn count_streets(&self) -> Result<u64, StreetError>;
}

/// [`StreetStore`] backed by the application database.
pub struct DatabaseStreetStore<'a> {
    db: &'a dyn Database,
}

impl<'a> DatabaseStreetStore<'a> {
    /// Wraps an open connection.
    #[must_use]
    pub const fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StreetStore for DatabaseStreetStore<'_> {
    async fn upsert_streets(&self, records: &[StreetRecord]) -> Result<u64, StreetError> {
        Ok(canvass_map_database::queries::upsert_streets(self.db, records).await?)
    }

    async fn clear_streets(&self) -> Result<u64, StreetError> {
        Ok(canvass_map_database::queries::delete_all_streets(self.db).await?)
    }

    async fn count_streets(&self) -> Result<u64, StreetError> {
        Ok(canvass_map_database::queries::count_streets(self.db).await?)
    }
}

/// In-memory [`StreetStore`].
#[derive(Default)]
pub struct MemoryStreetStore {
    rows: Mutex<BTreeMap<i64, StreetRecord>>,
}

impl MemoryStreetStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored record, ordered by external id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StreetRecord> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    fn poisoned() -> StreetError {
        StreetError::Config {
            message: "in-memory street store lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl StreetStore for MemoryStreetStore {
    async fn upsert_streets(&self, records: &[StreetRecord]) -> Result<u64, StreetError> {
        let mut rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        for record in records {
            rows.insert(record.external_id, record.clone());
        }
        Ok(records.len() as u64)
    }

    async fn clear_streets(&self) -> Result<u64, StreetError> {
        let mut rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        let deleted = rows.len() as u64;
        rows.clear();
        Ok(deleted)
    }

    async fn count_streets(&self) -> Result<u64, StreetError> {
        let rows = self.rows.lock().map_err(|_| Self::poisoned())?;
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use canvass_map_street_models::DistrictId;

    use super::*;

    fn record(id: i64, name: &str) -> StreetRecord {
        StreetRecord {
            external_id: id,
            name: name.to_string(),
            normalized_name: name.to_lowercase(),
            district: DistrictId::new(1).unwrap(),
            geometry: vec![[2.34, 48.86], [2.35, 48.86]],
            street_type: None,
        }
    }

    #[tokio::test]
    async fn memory_store_overwrites_by_external_id() {
        let store = MemoryStreetStore::new();
        store
            .upsert_streets(&[record(1, "Rue A"), record(2, "Rue B")])
            .await
            .unwrap();
        store.upsert_streets(&[record(1, "Rue A bis")]).await.unwrap();

        let rows = store.snapshot();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Rue A bis");
        assert_eq!(store.count_streets().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn memory_store_clears() {
        let store = MemoryStreetStore::new();
        store.upsert_streets(&[record(1, "Rue A")]).await.unwrap();
        assert_eq!(store.clear_streets().await.unwrap(), 1);
        assert_eq!(store.count_streets().await.unwrap(), 0);
    }
}
