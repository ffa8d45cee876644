//! Process-level settings for the import pipeline, read from the
//! environment once at startup and passed into the components.

use std::time::Duration;

use crate::StreetError;

/// Public Overpass endpoint used when `OVERPASS_URL` is unset.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

/// User-Agent sent to Overpass when `OVERPASS_USER_AGENT` is unset.
pub const DEFAULT_USER_AGENT: &str = "CanvassMap/0.1 (street import)";

/// Client-side request timeout when `OVERPASS_TIMEOUT_SECS` is unset.
/// Slightly above the longest server-side query timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(330);

/// Endpoint and HTTP client settings for the geodata service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportConfig {
    /// Overpass interpreter URL.
    pub overpass_url: String,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            overpass_url: DEFAULT_OVERPASS_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ImportConfig {
    /// Reads `OVERPASS_URL`, `OVERPASS_USER_AGENT`, and
    /// `OVERPASS_TIMEOUT_SECS`, falling back to the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`StreetError::Config`] if `OVERPASS_TIMEOUT_SECS` is not a
    /// positive integer.
    pub fn from_env() -> Result<Self, StreetError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StreetError> {
        let defaults = Self::default();
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let request_timeout = match non_blank("OVERPASS_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(StreetError::Config {
                        message: format!("OVERPASS_TIMEOUT_SECS must be a positive integer, got '{raw}'"),
                    });
                }
            },
            None => defaults.request_timeout,
        };

        Ok(Self {
            overpass_url: non_blank("OVERPASS_URL").unwrap_or(defaults.overpass_url),
            user_agent: non_blank("OVERPASS_USER_AGENT").unwrap_or(defaults.user_agent),
            request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn falls_back_to_defaults() {
        let config = ImportConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ImportConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = ImportConfig::from_lookup(lookup(&[
            ("OVERPASS_URL", "http://localhost:12345/api/interpreter"),
            ("OVERPASS_USER_AGENT", "test-agent"),
            ("OVERPASS_TIMEOUT_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.overpass_url, "http://localhost:12345/api/interpreter");
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn blank_values_use_defaults() {
        let config = ImportConfig::from_lookup(lookup(&[("OVERPASS_URL", "  ")])).unwrap();
        assert_eq!(config.overpass_url, DEFAULT_OVERPASS_URL);
    }

    #[test]
    fn rejects_bad_timeout() {
        assert!(ImportConfig::from_lookup(lookup(&[("OVERPASS_TIMEOUT_SECS", "0")])).is_err());
        assert!(ImportConfig::from_lookup(lookup(&[("OVERPASS_TIMEOUT_SECS", "soon")])).is_err());
    }
}
