//! Compile-time registry of import profiles.
//!
//! Each entry is a `(id, toml_content)` pair embedded via `include_str!`.
//! Adding a profile requires creating a TOML file in `profiles/` and adding
//! a corresponding entry here.

use canvass_map_street_models::profile::ImportProfile;

use crate::StreetError;

/// Profile used when none is given on the command line.
pub const DEFAULT_PROFILE_ID: &str = "filtered_streets";

/// Number of registered profiles. Enforced by a test.
#[cfg(test)]
const EXPECTED_PROFILE_COUNT: usize = 5;

/// Embedded TOML profile definitions.
const PROFILE_TOMLS: &[(&str, &str)] = &[
    (
        "filtered_streets",
        include_str!("../profiles/filtered_streets.toml"),
    ),
    ("named_streets", include_str!("../profiles/named_streets.toml")),
    (
        "admin_boundaries",
        include_str!("../profiles/admin_boundaries.toml"),
    ),
    ("all_ways", include_str!("../profiles/all_ways.toml")),
    ("hybrid", include_str!("../profiles/hybrid.toml")),
];

/// Returns all registered profiles.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse or validate. Since
/// these are compile-time constants, failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_profiles() -> Vec<ImportProfile> {
    PROFILE_TOMLS
        .iter()
        .map(|(id, toml_str)| {
            let profile: ImportProfile = toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse import profile '{id}': {e}"));
            if let Err(e) = profile.validate() {
                panic!("{e}");
            }
            profile
        })
        .collect()
}

/// Looks up a profile by id.
///
/// # Errors
///
/// Returns [`StreetError::Config`] listing the known ids if `id` is not
/// registered.
pub fn find_profile(id: &str) -> Result<ImportProfile, StreetError> {
    let wanted = id.trim();
    all_profiles()
        .into_iter()
        .find(|p| p.id == wanted)
        .ok_or_else(|| StreetError::Config {
            message: format!(
                "unknown import profile '{wanted}' (known: {})",
                PROFILE_TOMLS
                    .iter()
                    .map(|(id, _)| *id)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        })
}

/// Parses and validates a profile from TOML text, for profiles kept
/// outside the binary.
///
/// # Errors
///
/// Returns [`StreetError::Config`] if the text is not a valid profile.
pub fn parse_profile(toml_str: &str) -> Result<ImportProfile, StreetError> {
    let profile: ImportProfile =
        toml::de::from_str(toml_str).map_err(|e| StreetError::Config {
            message: format!("invalid profile TOML: {e}"),
        })?;
    profile.validate().map_err(|e| StreetError::Config {
        message: e.to_string(),
    })?;
    Ok(profile)
}
