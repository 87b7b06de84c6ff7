//! CAT threshold checking.
//!
//! A county-day is "CAT-level" when any single threshold is met: hatched
//! significant area, categorical level, or one of the per-hazard
//! probabilities. Thresholds come from `[thresholds]` in the config; the
//! categorical bar may be overridden per run (briefings use a lower one).
//! Overrides are trusted as given.

use crate::config::CatThresholds;
use crate::model::CountyRisk;

/// Which threshold flagged a record. Several can hold at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdBreach {
    Significant,
    Categorical,
    Hail,
    Tornado,
    Wind,
}

impl CatThresholds {
    /// Copy with the categorical minimum replaced when `categorical_min` is set.
    pub fn with_categorical_min(self, categorical_min: Option<u8>) -> Self {
        match categorical_min {
            Some(min) => Self { categorical_min: min, ..self },
            None => self,
        }
    }
}

/// Every threshold `risk` meets, in a fixed order.
pub fn breached_thresholds(risk: &CountyRisk, thresholds: &CatThresholds) -> Vec<ThresholdBreach> {
    let mut breaches = Vec::new();
    if risk.significant {
        breaches.push(ThresholdBreach::Significant);
    }
    if risk.categorical_level >= thresholds.categorical_min {
        breaches.push(ThresholdBreach::Categorical);
    }
    if risk.hail_prob >= thresholds.hail_prob_min {
        breaches.push(ThresholdBreach::Hail);
    }
    if risk.tornado_prob >= thresholds.tornado_prob_min {
        breaches.push(ThresholdBreach::Tornado);
    }
    if risk.wind_prob >= thresholds.wind_prob_min {
        breaches.push(ThresholdBreach::Wind);
    }
    breaches
}

/// True when at least one CAT threshold holds.
pub fn meets_threshold(risk: &CountyRisk, thresholds: &CatThresholds) -> bool {
    risk.significant
        || risk.categorical_level >= thresholds.categorical_min
        || risk.hail_prob >= thresholds.hail_prob_min
        || risk.tornado_prob >= thresholds.tornado_prob_min
        || risk.wind_prob >= thresholds.wind_prob_min
}
