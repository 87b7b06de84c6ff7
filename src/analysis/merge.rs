//! Risk merging: every polygon hit for a county on a day collapses into one
//! `CountyRisk`. Merges are max-based, so hit order never matters.

use std::collections::BTreeMap;

use crate::model::{County, CountyRisk, RiskPolygon};
use crate::spatial::ContainmentHit;

/// Folds one polygon into an existing county risk.
///
/// A significant overlay only sets the sticky flag; its numeric level is
/// not a risk level and is ignored.
pub fn merge_polygon(risk: &mut CountyRisk, polygon: &RiskPolygon) {
    if polygon.significant {
        risk.significant = true;
        return;
    }
    polygon.hazard.merge_into(risk, polygon.risk_level);
}

/// One `CountyRisk` per matched county, ordered by FIPS.
///
/// Hits referencing an index outside `counties` or `polygons` are ignored.
pub fn merge_hits(
    day: u8,
    hits: &[ContainmentHit],
    counties: &[County],
    polygons: &[RiskPolygon],
) -> Vec<CountyRisk> {
    let mut by_fips: BTreeMap<&str, CountyRisk> = BTreeMap::new();

    for hit in hits {
        let (Some(county), Some(polygon)) = (counties.get(hit.county), polygons.get(hit.polygon))
        else {
            continue;
        };
        let risk = by_fips
            .entry(county.fips.as_str())
            .or_insert_with(|| CountyRisk::new(county.clone(), day));
        merge_polygon(risk, polygon);
    }

    by_fips.into_values().collect()
}
