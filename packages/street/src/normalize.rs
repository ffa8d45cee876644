//! Raw way to [`StreetRecord`] conversion.
//!
//! Elements pass through a fixed sequence: validity filter, type
//! exclusion, deduplication by way id, name normalization, and coordinate
//! reprojection from Overpass `(lat, lon)` to `GeoJSON` `[lon, lat]`.
//! Every dropped element is counted under exactly one reason.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use canvass_map_street_models::profile::ImportMode;
use canvass_map_street_models::raw::RawElement;
use canvass_map_street_models::{DistrictId, StreetRecord};
use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization as _;

/// Anything that is not a lowercase ASCII letter, digit, or whitespace.
static NON_SEARCHABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid regex"));

/// Reduces a street name to its search key.
///
/// Lowercases, decomposes (NFD), drops combining diacritical marks
/// (U+0300 to U+036F), then removes everything but `[a-z0-9\s]` and trims.
/// Used both at import time and on search queries.
///
/// ```
/// use canvass_map_street::normalize::normalize_name;
///
/// assert_eq!(normalize_name("Rue de l'Église"), "rue de leglise");
/// ```
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let stripped: String = name
        .to_lowercase()
        .nfd()
        .filter(|c| !('\u{0300}'..='\u{036f}').contains(c))
        .collect();

    NON_SEARCHABLE.replace_all(&stripped, "").trim().to_string()
}

/// Decides whether a way with the given `highway` value is imported.
pub trait TypePredicate: Send + Sync {
    /// Returns `true` to keep the way.
    fn accepts(&self, street_type: Option<&str>) -> bool;
}

impl<F> TypePredicate for F
where
    F: Fn(Option<&str>) -> bool + Send + Sync,
{
    fn accepts(&self, street_type: Option<&str>) -> bool {
        self(street_type)
    }
}

/// Rejects ways whose `highway` value is in an exclusion set.
///
/// Ways without a type are always accepted.
#[derive(Debug, Clone, Default)]
pub struct TypeFilter {
    excluded: BTreeSet<String>,
}

impl TypeFilter {
    /// Rejects the listed `highway` values.
    #[must_use]
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded
                .into_iter()
                .map(|s| s.into().trim().to_string())
                .collect(),
        }
    }

    /// Returns `true` when nothing is excluded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }
}

impl TypePredicate for TypeFilter {
    fn accepts(&self, street_type: Option<&str>) -> bool {
        street_type.is_none_or(|t| !self.excluded.contains(t))
    }
}

/// Per-reason counts of dropped elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionCounts {
    /// Fewer than two geometry points.
    pub no_geometry: usize,
    /// No usable name (named-only mode).
    pub no_name: usize,
    /// No `highway` tag (all-ways mode).
    pub no_type: usize,
    /// Rejected by the type predicate.
    pub excluded_type: usize,
    /// Same way id seen earlier in the batch.
    pub duplicates: usize,
}

impl ExclusionCounts {
    /// Elements dropped for any reason other than duplication.
    #[must_use]
    pub const fn excluded(&self) -> usize {
        self.no_geometry + self.no_name + self.no_type + self.excluded_type
    }

    /// Adds another district's counts into this one.
    pub const fn add(&mut self, other: &Self) {
        self.no_geometry += other.no_geometry;
        self.no_name += other.no_name;
        self.no_type += other.no_type;
        self.excluded_type += other.excluded_type;
        self.duplicates += other.duplicates;
    }
}

/// Records produced from one district's elements.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    /// Unique, valid records in first-seen order.
    pub records: Vec<StreetRecord>,
    /// Why the other elements were dropped.
    pub excluded: ExclusionCounts,
}

/// Turns raw ways into storable records.
pub struct RecordNormalizer {
    mode: ImportMode,
    types: Box<dyn TypePredicate>,
}

impl RecordNormalizer {
    /// Normalizer for `mode` that drops types rejected by `types`.
    #[must_use]
    pub fn new(mode: ImportMode, types: Box<dyn TypePredicate>) -> Self {
        Self { mode, types }
    }

    /// Normalizer that keeps every type.
    #[must_use]
    pub fn accept_all(mode: ImportMode) -> Self {
        Self::new(mode, Box::new(TypeFilter::default()))
    }

    /// Filters, deduplicates, and converts `elements` for `district`.
    ///
    /// When a way id repeats, the last occurrence's data wins but the
    /// record keeps the position of the first occurrence.
    #[must_use]
    pub fn normalize(&self, district: DistrictId, elements: Vec<RawElement>) -> Normalized {
        let mut out = Normalized::default();
        let mut positions: HashMap<i64, usize> = HashMap::new();

        for element in elements {
            if element.point_count() < 2 {
                out.excluded.no_geometry += 1;
                continue;
            }

            let street_type = element.highway().map(str::to_string);

            let name = match (self.mode, element.name()) {
                (_, Some(name)) if self.mode == ImportMode::NamedOnly || street_type.is_some() => {
                    name.to_string()
                }
                (ImportMode::NamedOnly, _) => {
                    out.excluded.no_name += 1;
                    continue;
                }
                (ImportMode::AllWays, _) => match &street_type {
                    Some(t) => format!("{t} #{}", element.id),
                    None => {
                        out.excluded.no_type += 1;
                        continue;
                    }
                },
            };

            if !self.types.accepts(street_type.as_deref()) {
                out.excluded.excluded_type += 1;
                continue;
            }

            let geometry = element
                .geometry
                .unwrap_or_default()
                .into_iter()
                .map(|p| [p.lon, p.lat])
                .collect();

            let record = StreetRecord {
                external_id: element.id,
                normalized_name: normalize_name(&name),
                name,
                district,
                geometry,
                street_type,
            };

            if let Some(&idx) = positions.get(&record.external_id) {
                out.excluded.duplicates += 1;
                out.records[idx] = record;
            } else {
                positions.insert(record.external_id, out.records.len());
                out.records.push(record);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use canvass_map_street_models::raw::RawPoint;

    use super::*;

    fn district() -> DistrictId {
        DistrictId::new(5).unwrap()
    }

    fn way(id: i64, name: Option<&str>, highway: Option<&str>, points: usize) -> RawElement {
        let mut tags = BTreeMap::new();
        if let Some(name) = name {
            tags.insert("name".to_string(), name.to_string());
        }
        if let Some(highway) = highway {
            tags.insert("highway".to_string(), highway.to_string());
        }
        #[allow(clippy::cast_precision_loss)]
        let geometry = (0..points)
            .map(|i| RawPoint {
                lat: 48.85 + i as f64 * 0.001,
                lon: 2.35 + i as f64 * 0.001,
            })
            .collect();
        RawElement {
            id,
            tags,
            geometry: Some(geometry),
        }
    }

    #[test]
    fn strips_accents_and_punctuation() {
        assert_eq!(normalize_name("Rue de l'Église"), "rue de leglise");
        assert_eq!(normalize_name("Boulevard Saint-Germain"), "boulevard saintgermain");
        assert_eq!(normalize_name("  Place du Châtelet  "), "place du chatelet");
        assert_eq!(normalize_name("Rue du 4 Septembre"), "rue du 4 septembre");
        assert_eq!(normalize_name("Œuvre"), "uvre");
        assert_eq!(normalize_name(""), "");
    }

    #[test]
    fn normalized_names_only_contain_search_charset() {
        for name in ["Allée d'Orléans", "Quai François-Mauriac", "Rue Ça & Là", "Straße"] {
            let normalized = normalize_name(name);
            assert!(
                normalized
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace()),
                "{name} -> {normalized}"
            );
        }
    }

    #[test]
    fn reprojects_to_lon_lat() {
        let normalizer = RecordNormalizer::accept_all(ImportMode::NamedOnly);
        let out = normalizer.normalize(district(), vec![way(1, Some("Rue Mouffetard"), Some("residential"), 2)]);
        assert_eq!(out.records[0].geometry[0], [2.35, 48.85]);
        assert_eq!(out.records[0].district, district());
        assert_eq!(out.records[0].street_type.as_deref(), Some("residential"));
    }

    #[test]
    fn duplicate_ids_keep_first_position_and_last_data() {
        let normalizer = RecordNormalizer::accept_all(ImportMode::NamedOnly);
        let out = normalizer.normalize(
            district(),
            vec![
                way(10, Some("Old"), Some("residential"), 2),
                way(11, Some("Other"), Some("residential"), 2),
                way(10, Some("New"), Some("residential"), 3),
            ],
        );
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].external_id, 10);
        assert_eq!(out.records[0].name, "New");
        assert_eq!(out.records[0].geometry.len(), 3);
        assert_eq!(out.excluded.duplicates, 1);
    }

    #[test]
    fn named_only_drops_unnamed_and_short_ways() {
        let normalizer = RecordNormalizer::accept_all(ImportMode::NamedOnly);
        let out = normalizer.normalize(
            district(),
            vec![
                way(1, Some("Rue A"), Some("residential"), 2),
                way(2, None, Some("service"), 4),
                way(3, Some("   "), Some("service"), 4),
                way(4, Some("Rue B"), Some("residential"), 1),
                RawElement {
                    id: 5,
                    tags: BTreeMap::new(),
                    geometry: None,
                },
            ],
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.excluded.no_name, 2);
        assert_eq!(out.excluded.no_geometry, 2);
    }

    #[test]
    fn all_ways_synthesizes_names_and_requires_type() {
        let normalizer = RecordNormalizer::accept_all(ImportMode::AllWays);
        let out = normalizer.normalize(
            district(),
            vec![
                way(42, None, Some("service"), 2),
                way(43, Some("Impasse"), None, 2),
            ],
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].name, "service #42");
        assert_eq!(out.records[0].normalized_name, "service 42");
        assert_eq!(out.excluded.no_type, 1);
    }

    #[test]
    fn type_filter_excludes_configured_types() {
        let filter = TypeFilter::new(["motorway", "footway", "path"]);
        let normalizer = RecordNormalizer::new(ImportMode::NamedOnly, Box::new(filter));
        let input = vec![
            way(1, Some("A"), Some("motorway"), 2),
            way(2, Some("B"), Some("residential"), 2),
            way(3, Some("C"), Some("footway"), 2),
            way(4, Some("D"), Some("primary"), 2),
            way(5, Some("E"), None, 2),
        ];
        let total = input.len();
        let out = normalizer.normalize(district(), input);

        assert_eq!(out.excluded.excluded_type, 2);
        assert_eq!(out.excluded.excluded() + out.records.len(), total);
    }

    #[test]
    fn closures_work_as_type_predicates() {
        let only_primary = |t: Option<&str>| t == Some("primary");
        let normalizer = RecordNormalizer::new(ImportMode::NamedOnly, Box::new(only_primary));
        let out = normalizer.normalize(
            district(),
            vec![
                way(1, Some("A"), Some("primary"), 2),
                way(2, Some("B"), Some("residential"), 2),
            ],
        );
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].external_id, 1);
    }

    #[test]
    fn counts_account_for_every_element() {
        let normalizer = RecordNormalizer::new(
            ImportMode::NamedOnly,
            Box::new(TypeFilter::new(["cycleway"])),
        );
        let input = vec![
            way(1, Some("A"), Some("residential"), 2),
            way(1, Some("A2"), Some("residential"), 2),
            way(2, None, Some("residential"), 2),
            way(3, Some("C"), Some("cycleway"), 2),
            way(4, Some("D"), Some("residential"), 0),
        ];
        let total = input.len();
        let out = normalizer.normalize(district(), input);
        assert_eq!(
            out.excluded.excluded() + out.excluded.duplicates + out.records.len(),
            total
        );
    }
}
