//! Import profile schema, deserialized from TOML.
//!
//! A profile bundles the knobs that used to differ between one-off import
//! runs: how a district is turned into a query region, which ways are kept,
//! how hard to retry the upstream API, and how fast to go.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, DistrictId};

/// Largest accepted `batch_size`.
pub const MAX_BATCH_SIZE: usize = 1000;

/// A named street-import configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportProfile {
    /// Unique profile identifier (e.g., `"named_streets"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Longer explanation shown by `profiles`.
    #[serde(default)]
    pub description: Option<String>,
    /// How districts map to query regions.
    pub area: AreaStrategy,
    /// Whether unnamed ways are imported.
    #[serde(default)]
    pub mode: ImportMode,
    /// `highway` values dropped from the import.
    #[serde(default)]
    pub excluded_types: Vec<String>,
    /// Upstream retry policy.
    pub retry: RetryConfig,
    /// Records per upsert call.
    pub batch_size: usize,
    /// Pause between two districts, in seconds.
    pub district_delay_secs: u64,
    /// Delete all streets (and their actions) before importing.
    #[serde(default)]
    pub clear_existing: bool,
    /// Server-side Overpass `[timeout:N]`, in seconds.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u32,
}

const fn default_query_timeout_secs() -> u32 {
    300
}

impl ImportProfile {
    /// Returns the profile identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the human-readable profile name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pause inserted between two districts.
    #[must_use]
    pub const fn district_delay(&self) -> Duration {
        Duration::from_secs(self.district_delay_secs)
    }

    /// Checks the invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidProfileError`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), InvalidProfileError> {
        let fail = |message: String| {
            Err(InvalidProfileError {
                profile: self.id.clone(),
                message,
            })
        };

        if self.id.trim().is_empty() {
            return fail("empty id".to_string());
        }
        if self.name.trim().is_empty() {
            return fail("empty name".to_string());
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return fail(format!(
                "batch_size {} outside 1-{MAX_BATCH_SIZE}",
                self.batch_size
            ));
        }
        if self.retry.max_attempts == 0 {
            return fail("retry.max_attempts must be at least 1".to_string());
        }
        if let AreaStrategy::Hybrid { overrides } = &self.area {
            let mut seen = std::collections::BTreeSet::new();
            for o in overrides {
                if !o.bbox.is_valid() {
                    return fail(format!("override for district {} has an invalid bbox", o.district));
                }
                if !seen.insert(o.district) {
                    return fail(format!("duplicate override for district {}", o.district));
                }
            }
        }
        if self.excluded_types.iter().any(|t| t.trim().is_empty()) {
            return fail("excluded_types contains a blank entry".to_string());
        }

        Ok(())
    }
}

/// How a district is turned into a query region.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AreaStrategy {
    /// Use a built-in bounding box table.
    BoundingBox {
        /// Which table.
        table: BoundingBoxTable,
    },
    /// Use the district's administrative boundary by name.
    NamedArea,
    /// Named area, except for districts with a hand-corrected box.
    Hybrid {
        /// Per-district bounding boxes that replace the named area.
        #[serde(default)]
        overrides: Vec<BoundingBoxOverride>,
    },
}

/// Built-in bounding box tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundingBoxTable {
    /// Boxes hugging each district.
    Tight,
    /// Boxes widened so nothing on the edges is missed.
    Padded,
}

/// A hand-corrected bounding box for one district.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBoxOverride {
    /// District the box applies to.
    pub district: DistrictId,
    /// The corrected box.
    pub bbox: BoundingBox,
}

/// Which ways are imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Only ways that carry a `name` tag.
    #[default]
    NamedOnly,
    /// Every `highway` way; missing names are synthesized.
    AllWays,
}

/// Retry settings for upstream geodata requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before each retry, in seconds (base delay for exponential).
    pub delay_secs: u64,
    /// Delay growth between attempts.
    #[serde(default)]
    pub backoff: Backoff,
    /// Whether an unparsable body is retried like a network error.
    #[serde(default = "default_retry_malformed")]
    pub retry_malformed: bool,
}

const fn default_retry_malformed() -> bool {
    true
}

impl RetryConfig {
    /// Base delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles after every retry.
    Exponential,
}

/// Error returned when a profile violates a rule checked by
/// [`ImportProfile::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidProfileError {
    /// Offending profile id.
    pub profile: String,
    /// What is wrong.
    pub message: String,
}

impl std::fmt::Display for InvalidProfileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid import profile '{}': {}", self.profile, self.message)
    }
}

impl std::error::Error for InvalidProfileError {}
