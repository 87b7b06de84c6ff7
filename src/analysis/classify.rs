//! Threshold classification: filter merged county risks down to the CAT set,
//! rank them, and roll them up per state.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::alert::thresholds::{breached_thresholds, meets_threshold};
use crate::config::CatThresholds;
use crate::model::{CountyRisk, DataAvailability, DayResult, OutlookSet, RegionSummary};

/// Canonical ranking: descending (categorical, hail, tornado, wind,
/// significant), then ascending FIPS so equal risks have a stable order.
pub fn compare_risk(a: &CountyRisk, b: &CountyRisk) -> Ordering {
    b.ranking_key()
        .cmp(&a.ranking_key())
        .then_with(|| a.county.fips.cmp(&b.county.fips))
}

pub fn rank_county_risks(risks: &mut [CountyRisk]) {
    risks.sort_by(compare_risk);
}

/// Classifies a single day's merged risks.
pub fn classify_day(
    day: u8,
    county_risks: &[CountyRisk],
    availability: DataAvailability,
    thresholds: &CatThresholds,
) -> DayResult {
    let mut flagged: Vec<CountyRisk> = county_risks
        .iter()
        .filter(|risk| meets_threshold(risk, thresholds))
        .cloned()
        .collect();
    rank_county_risks(&mut flagged);

    for risk in &flagged {
        debug!(
            day,
            fips = %risk.county.fips,
            breaches = ?breached_thresholds(risk, thresholds),
            "county flagged"
        );
    }

    let region_summaries = aggregate_by_region(&flagged);
    DayResult {
        day,
        county_risks: flagged,
        region_summaries,
        availability,
    }
}

/// Classifies every day in `matched`, taking each day's availability from
/// the outlook set it was matched against.
///
/// `categorical_min` overrides the configured categorical bar for this run.
pub fn classify(
    matched: &BTreeMap<u8, Vec<CountyRisk>>,
    outlooks: &OutlookSet,
    thresholds: &CatThresholds,
    categorical_min: Option<u8>,
) -> Vec<DayResult> {
    let thresholds = thresholds.with_categorical_min(categorical_min);
    let results: Vec<DayResult> = matched
        .iter()
        .map(|(day, risks)| classify_day(*day, risks, outlooks.availability(*day), &thresholds))
        .collect();

    let flagged_days = results.iter().filter(|r| !r.county_risks.is_empty()).count();
    info!(days = results.len(), flagged_days, "classification complete");
    results
}

/// Groups flagged risks by state abbreviation.
pub fn aggregate_by_region(flagged: &[CountyRisk]) -> BTreeMap<String, RegionSummary> {
    let mut groups: BTreeMap<String, Vec<CountyRisk>> = BTreeMap::new();
    for risk in flagged {
        groups
            .entry(risk.county.state_abbr.clone())
            .or_default()
            .push(risk.clone());
    }

    groups
        .into_iter()
        .map(|(state, mut risks)| {
            rank_county_risks(&mut risks);
            let highest_risk = risks.iter().map(|r| r.categorical_level).max().unwrap_or(0);
            let summary = RegionSummary {
                count: risks.len(),
                highest_risk,
                county_risks: risks,
            };
            (state, summary)
        })
        .collect()
}
