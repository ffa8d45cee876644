#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Street import pipeline for the canvass map.
//!
//! Each district goes through the same four stages, strictly one district
//! at a time:
//!
//! 1. [`area`] resolves the district to a query region.
//! 2. [`overpass`] fetches raw ways for the region, retrying per the
//!    profile's [`retry::RetryPolicy`].
//! 3. [`normalize`] filters, deduplicates, and reshapes the ways into
//!    [`canvass_map_street_models::StreetRecord`]s.
//! 4. [`upsert`] writes the records in fixed-size batches keyed on the
//!    `OpenStreetMap` id.
//!
//! [`ingest::Importer`] drives the stages. Import variants are described by
//! TOML profiles embedded at compile time (see [`profiles`]).

pub mod area;
pub mod config;
pub mod ingest;
pub mod normalize;
pub mod overpass;
pub mod profiles;
pub mod progress;
pub mod retry;
pub mod store;
pub mod upsert;

use thiserror::Error;

/// Errors that can occur during street import operations.
#[derive(Debug, Error)]
pub enum StreetError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
    },

    /// Upstream body could not be decoded, or reported a failed query.
    #[error("Malformed upstream response: {message}")]
    MalformedResponse {
        /// Description of what went wrong.
        message: String,
    },

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] canvass_map_database::DbError),

    /// Invalid configuration or profile.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of what went wrong.
        message: String,
    },
}

impl StreetError {
    /// Returns `true` for failures worth another attempt against the
    /// geodata service. Malformed bodies are reported separately so the
    /// retry predicate can decide per profile.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Http(_) | Self::UpstreamStatus { .. })
    }
}
