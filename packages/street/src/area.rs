//! District to query-region resolution.
//!
//! Three interchangeable strategies are available: a fixed bounding box
//! table, the district's administrative boundary looked up by name, and a
//! hybrid that uses the named boundary except where a hand-corrected box
//! has been configured.

use std::collections::BTreeMap;

use canvass_map_street_models::profile::{AreaStrategy, BoundingBoxTable};
use canvass_map_street_models::{BoundingBox, DistrictId, RegionDescriptor};

/// Boxes hugging each district, indexed by `district - 1`.
const TIGHT_BBOXES: [BoundingBox; 20] = [
    BoundingBox::new(48.854, 2.320, 48.870, 2.351),
    BoundingBox::new(48.863, 2.328, 48.872, 2.355),
    BoundingBox::new(48.855, 2.350, 48.868, 2.369),
    BoundingBox::new(48.845, 2.345, 48.862, 2.369),
    BoundingBox::new(48.836, 2.336, 48.854, 2.366),
    BoundingBox::new(48.839, 2.316, 48.859, 2.345),
    BoundingBox::new(48.845, 2.289, 48.864, 2.334),
    BoundingBox::new(48.863, 2.294, 48.884, 2.328),
    BoundingBox::new(48.871, 2.325, 48.884, 2.354),
    BoundingBox::new(48.867, 2.350, 48.884, 2.381),
    BoundingBox::new(48.845, 2.366, 48.867, 2.398),
    BoundingBox::new(48.820, 2.370, 48.852, 2.470),
    BoundingBox::new(48.815, 2.345, 48.845, 2.400),
    BoundingBox::new(48.815, 2.305, 48.840, 2.350),
    BoundingBox::new(48.830, 2.265, 48.860, 2.320),
    BoundingBox::new(48.840, 2.220, 48.880, 2.290),
    BoundingBox::new(48.875, 2.280, 48.900, 2.340),
    BoundingBox::new(48.880, 2.330, 48.902, 2.375),
    BoundingBox::new(48.870, 2.365, 48.905, 2.410),
    BoundingBox::new(48.845, 2.385, 48.877, 2.420),
];

/// Widened boxes so that streets on district edges are not missed.
const PADDED_BBOXES: [BoundingBox; 20] = [
    BoundingBox::new(48.8535, 2.3200, 48.8710, 2.3520),
    BoundingBox::new(48.8630, 2.3280, 48.8730, 2.3560),
    BoundingBox::new(48.8550, 2.3500, 48.8690, 2.3700),
    BoundingBox::new(48.8450, 2.3440, 48.8630, 2.3700),
    BoundingBox::new(48.8350, 2.3350, 48.8560, 2.3680),
    BoundingBox::new(48.8380, 2.3150, 48.8600, 2.3460),
    BoundingBox::new(48.8440, 2.2880, 48.8650, 2.3350),
    BoundingBox::new(48.8620, 2.2930, 48.8850, 2.3300),
    BoundingBox::new(48.8700, 2.3240, 48.8850, 2.3560),
    BoundingBox::new(48.8660, 2.3490, 48.8850, 2.3820),
    BoundingBox::new(48.8440, 2.3650, 48.8680, 2.4000),
    BoundingBox::new(48.8180, 2.3680, 48.8530, 2.4720),
    BoundingBox::new(48.8140, 2.3440, 48.8460, 2.4020),
    BoundingBox::new(48.8140, 2.3040, 48.8420, 2.3520),
    BoundingBox::new(48.8280, 2.2640, 48.8620, 2.3220),
    BoundingBox::new(48.8380, 2.2180, 48.8820, 2.2920),
    BoundingBox::new(48.8740, 2.2780, 48.9020, 2.3420),
    BoundingBox::new(48.8790, 2.3280, 48.9030, 2.3780),
    BoundingBox::new(48.8680, 2.3640, 48.9060, 2.4120),
    BoundingBox::new(48.8440, 2.3840, 48.8780, 2.4220),
];

/// Maps a district to the region its streets are queried from.
pub trait AreaResolver: Send + Sync {
    /// Returns the query region for `district`. Every district resolves.
    fn resolve(&self, district: DistrictId) -> RegionDescriptor;
}

/// Resolves districts through one of the built-in bounding box tables.
pub struct BoundingBoxResolver {
    table: BoundingBoxTable,
}

impl BoundingBoxResolver {
    /// Resolves every district from `table`.
    #[must_use]
    pub const fn new(table: BoundingBoxTable) -> Self {
        Self { table }
    }
}

impl AreaResolver for BoundingBoxResolver {
    fn resolve(&self, district: DistrictId) -> RegionDescriptor {
        RegionDescriptor::BoundingBox(table_bbox(self.table, district))
    }
}

/// Resolves districts to their `OpenStreetMap` administrative boundary name.
pub struct NamedAreaResolver;

impl AreaResolver for NamedAreaResolver {
    fn resolve(&self, district: DistrictId) -> RegionDescriptor {
        RegionDescriptor::NamedArea(area_name(district))
    }
}

/// Named boundaries, with hand-corrected boxes for specific districts.
pub struct HybridResolver {
    overrides: BTreeMap<DistrictId, BoundingBox>,
}

impl HybridResolver {
    /// Uses the named area except for districts listed in `overrides`.
    #[must_use]
    pub const fn new(overrides: BTreeMap<DistrictId, BoundingBox>) -> Self {
        Self { overrides }
    }
}

impl AreaResolver for HybridResolver {
    fn resolve(&self, district: DistrictId) -> RegionDescriptor {
        self.overrides.get(&district).map_or_else(
            || NamedAreaResolver.resolve(district),
            |bbox| RegionDescriptor::BoundingBox(*bbox),
        )
    }
}

/// Builds the resolver described by a profile's area strategy.
#[must_use]
pub fn resolver_for(strategy: &AreaStrategy) -> Box<dyn AreaResolver> {
    match strategy {
        AreaStrategy::BoundingBox { table } => Box::new(BoundingBoxResolver::new(*table)),
        AreaStrategy::NamedArea => Box::new(NamedAreaResolver),
        AreaStrategy::Hybrid { overrides } => Box::new(HybridResolver::new(
            overrides.iter().map(|o| (o.district, o.bbox)).collect(),
        )),
    }
}

/// Returns the `name` tag of the district's admin boundary in OSM
/// (e.g., `"Paris 1er Arrondissement"`).
#[must_use]
pub fn area_name(district: DistrictId) -> String {
    format!("Paris {} Arrondissement", district.label())
}

fn table_bbox(table: BoundingBoxTable, district: DistrictId) -> BoundingBox {
    let idx = usize::from(district.value()) - 1;
    match table {
        BoundingBoxTable::Tight => TIGHT_BBOXES[idx],
        BoundingBoxTable::Padded => PADDED_BBOXES[idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canvass_map_street_models::profile::BoundingBoxOverride;

    fn district(n: u8) -> DistrictId {
        DistrictId::new(n).unwrap()
    }

    #[test]
    fn every_table_box_is_valid() {
        for d in DistrictId::all() {
            for table in [BoundingBoxTable::Tight, BoundingBoxTable::Padded] {
                let bbox = table_bbox(table, d);
                assert!(bbox.is_valid(), "{table:?} box for {d} is invalid: {bbox:?}");
            }
        }
    }

    #[test]
    fn padded_boxes_cover_most_of_tight_boxes() {
        for d in DistrictId::all() {
            let tight = table_bbox(BoundingBoxTable::Tight, d);
            let padded = table_bbox(BoundingBoxTable::Padded, d);
            let overlap_south = tight.south.max(padded.south);
            let overlap_north = tight.north.min(padded.north);
            assert!(overlap_south < overlap_north, "district {d} boxes are disjoint");
        }
    }

    #[test]
    fn named_area_uses_french_ordinals() {
        assert_eq!(
            NamedAreaResolver.resolve(district(1)),
            RegionDescriptor::NamedArea("Paris 1er Arrondissement".to_string())
        );
        assert_eq!(
            NamedAreaResolver.resolve(district(17)),
            RegionDescriptor::NamedArea("Paris 17e Arrondissement".to_string())
        );
    }

    #[test]
    fn bounding_box_resolver_reads_table() {
        let resolver = BoundingBoxResolver::new(BoundingBoxTable::Tight);
        assert_eq!(
            resolver.resolve(district(12)),
            RegionDescriptor::BoundingBox(BoundingBox::new(48.820, 2.370, 48.852, 2.470))
        );
    }

    #[test]
    fn hybrid_prefers_override() {
        let bbox = BoundingBox::new(48.83, 2.37, 48.85, 2.42);
        let resolver = resolver_for(&AreaStrategy::Hybrid {
            overrides: vec![BoundingBoxOverride {
                district: district(12),
                bbox,
            }],
        });
        assert_eq!(resolver.resolve(district(12)), RegionDescriptor::BoundingBox(bbox));
        assert!(matches!(
            resolver.resolve(district(11)),
            RegionDescriptor::NamedArea(_)
        ));
    }

    #[test]
    fn every_strategy_resolves_every_district() {
        let strategies = [
            AreaStrategy::BoundingBox {
                table: BoundingBoxTable::Padded,
            },
            AreaStrategy::NamedArea,
            AreaStrategy::Hybrid {
                overrides: Vec::new(),
            },
        ];
        for strategy in &strategies {
            let resolver = resolver_for(strategy);
            for d in DistrictId::all() {
                match resolver.resolve(d) {
                    RegionDescriptor::BoundingBox(b) => assert!(b.is_valid()),
                    RegionDescriptor::NamedArea(name) => assert!(name.contains("Arrondissement")),
                }
            }
        }
    }
}
