//! # County Matcher
//!
//! Spatial join of county representative points against outlook polygons.
//!
//! An R-tree over every county point is built once per run. Each outlook
//! polygon is split into single parts; each part queries the tree with its
//! bounding box (cheap, approximate) and every candidate is confirmed with an
//! exact point-in-polygon test. A part that cannot be evaluated is logged and
//! skipped without affecting the rest of the day.

use std::collections::BTreeMap;

use geo::{BoundingRect, Contains, CoordsIter, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};
use tracing::{debug, warn};

use crate::analysis::merge::merge_hits;
use crate::model::{County, CountyRisk, GeometryError, OutlookSet, RiskPolygon};

/// R-tree entry: county point tagged with its index in the catalog.
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// One confirmed containment: `county` index inside `polygon` index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContainmentHit {
    pub county: usize,
    pub polygon: usize,
}

/// Point index over a county catalog. Read-only once built.
pub struct CountyMatcher<'a> {
    counties: &'a [County],
    tree: RTree<IndexedPoint>,
}

impl<'a> CountyMatcher<'a> {
    /// Bulk-loads every county with a finite point.
    pub fn new(counties: &'a [County]) -> Self {
        let mut points = Vec::with_capacity(counties.len());
        for (idx, county) in counties.iter().enumerate() {
            let (x, y) = (county.point.x(), county.point.y());
            if !x.is_finite() || !y.is_finite() {
                warn!(fips = %county.fips, "county point is not finite, excluded from matching");
                continue;
            }
            points.push(GeomWithData::new([x, y], idx));
        }
        Self {
            counties,
            tree: RTree::bulk_load(points),
        }
    }

    /// Number of indexed county points.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// All (county, polygon) containments for one day's polygons, sorted.
    pub fn match_day(&self, day: u8, polygons: &[RiskPolygon]) -> Vec<ContainmentHit> {
        let mut hits = Vec::new();

        for (polygon_idx, risk_polygon) in polygons.iter().enumerate() {
            for part in risk_polygon.geometry.parts() {
                let envelope = match part_envelope(part) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!(
                            day,
                            hazard = %risk_polygon.hazard,
                            label = %risk_polygon.label,
                            "skipping malformed polygon part: {}", e
                        );
                        continue;
                    }
                };

                for candidate in self.tree.locate_in_envelope(&envelope) {
                    let county_idx = candidate.data;
                    if part.contains(&self.counties[county_idx].point) {
                        hits.push(ContainmentHit {
                            county: county_idx,
                            polygon: polygon_idx,
                        });
                    }
                }
            }
        }

        // A county inside two parts of one multi-polygon is one hit.
        hits.sort_unstable();
        hits.dedup();
        debug!(day, polygons = polygons.len(), hits = hits.len(), "matched day");
        hits
    }
}

/// Bounding box of a single polygon part, or why the part is unusable.
pub fn part_envelope(part: &Polygon<f64>) -> Result<AABB<[f64; 2]>, GeometryError> {
    let vertices = part.exterior().0.len();
    if vertices == 0 {
        return Err(GeometryError::EmptyRing);
    }
    if vertices < 4 {
        return Err(GeometryError::TooFewVertices(vertices));
    }
    if part.coords_iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(GeometryError::NonFiniteCoordinate);
    }
    let rect = part.bounding_rect().ok_or(GeometryError::EmptyRing)?;
    Ok(AABB::from_corners(
        [rect.min().x, rect.min().y],
        [rect.max().x, rect.max().y],
    ))
}

/// Matches every day of `outlooks` and merges hits into county risks.
///
/// Every day key 1-8 appears in the result; a day without polygons maps to
/// an empty list.
pub fn match_counties(outlooks: &OutlookSet, counties: &[County]) -> BTreeMap<u8, Vec<CountyRisk>> {
    let matcher = CountyMatcher::new(counties);
    outlooks
        .iter()
        .map(|(day, outlook)| {
            if outlook.polygons.is_empty() || matcher.is_empty() {
                return (day, Vec::new());
            }
            let hits = matcher.match_day(day, &outlook.polygons);
            (day, merge_hits(day, &hits, counties, &outlook.polygons))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
