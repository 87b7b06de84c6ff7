//! Data Source Verification Module
//!
//! Probes every configured upstream source (each SPC outlook layer and the
//! NWS alerts endpoint for each market region) and reports which ones are
//! reachable and returning usable data. Nothing here feeds the pipeline.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ingest::nws::{alerts_url, parse_alerts};
use crate::ingest::spc::{outlook_products, parse_collection, parse_features, OutlookProduct};
use crate::ingest::get_text;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub spc_results: Vec<SpcVerification>,
    pub nws_results: Vec<NwsVerification>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub spc_total: usize,
    pub spc_working: usize,
    pub spc_failed: usize,
    pub nws_total: usize,
    pub nws_working: usize,
    pub nws_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpcVerification {
    pub day: u8,
    pub hazard: String,
    pub url: String,
    pub status: VerificationStatus,
    pub reachable: bool,
    pub feature_count: usize,
    pub polygon_count: usize,
    pub last_modified: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NwsVerification {
    pub region: String,
    pub url: String,
    pub status: VerificationStatus,
    pub reachable: bool,
    pub relevant_alerts: usize,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl VerificationStatus {
    pub fn is_working(self) -> bool {
        !matches!(self, VerificationStatus::Failed)
    }
}

// ============================================================================
// SPC Verification
// ============================================================================

pub fn verify_spc_product(client: &reqwest::blocking::Client, product: &OutlookProduct) -> SpcVerification {
    let mut result = SpcVerification {
        day: product.day,
        hazard: product.hazard.to_string(),
        url: product.url.clone(),
        status: VerificationStatus::Failed,
        reachable: false,
        feature_count: 0,
        polygon_count: 0,
        last_modified: None,
        error_message: None,
    };

    match get_text(client, &product.url, None) {
        Ok(fetched) => {
            result.reachable = true;
            result.last_modified = fetched.last_modified;
            match parse_collection(&fetched.body) {
                Ok(collection) => {
                    result.feature_count = collection.features.len();
                    result.polygon_count = parse_features(&collection, product.day, product.hazard).len();
                    result.status = spc_status(result.feature_count, result.polygon_count);
                }
                Err(e) => result.error_message = Some(format!("Parse error: {}", e)),
            }
        }
        Err(e) => result.error_message = Some(format!("Request failed: {}", e)),
    }

    result
}

/// A parsed layer is a success when every feature became a polygon. An
/// empty layer is a valid "no risk" product.
pub fn spc_status(feature_count: usize, polygon_count: usize) -> VerificationStatus {
    if polygon_count == feature_count {
        VerificationStatus::Success
    } else {
        VerificationStatus::PartialSuccess
    }
}

// ============================================================================
// NWS Verification
// ============================================================================

pub fn verify_nws_region(client: &reqwest::blocking::Client, region: &str) -> NwsVerification {
    let url = alerts_url(region);
    let mut result = NwsVerification {
        region: region.to_string(),
        url: url.clone(),
        status: VerificationStatus::Failed,
        reachable: false,
        relevant_alerts: 0,
        error_message: None,
    };

    match get_text(client, &url, Some("application/geo+json")) {
        Ok(fetched) => {
            result.reachable = true;
            match parse_alerts(&fetched.body) {
                Ok(alerts) => {
                    result.relevant_alerts = alerts.len();
                    result.status = VerificationStatus::Success;
                }
                Err(e) => result.error_message = Some(format!("Parse error: {}", e)),
            }
        }
        Err(e) => result.error_message = Some(format!("Request failed: {}", e)),
    }

    result
}

// ============================================================================
// Report
// ============================================================================

/// Probes every SPC layer and the alerts endpoint for each of `regions`.
pub fn generate_report(client: &reqwest::blocking::Client, regions: &[String]) -> VerificationReport {
    let spc_results: Vec<SpcVerification> = outlook_products()
        .iter()
        .map(|product| verify_spc_product(client, product))
        .collect();

    let mut nws_results = Vec::with_capacity(regions.len());
    for (i, region) in regions.iter().enumerate() {
        if i > 0 {
            std::thread::sleep(crate::ingest::nws::REGION_PACING);
        }
        nws_results.push(verify_nws_region(client, region));
    }

    let summary = summarize(&spc_results, &nws_results);
    VerificationReport {
        timestamp: Utc::now().to_rfc3339(),
        spc_results,
        nws_results,
        summary,
    }
}

pub fn summarize(spc: &[SpcVerification], nws: &[NwsVerification]) -> VerificationSummary {
    let spc_working = spc.iter().filter(|r| r.status.is_working()).count();
    let nws_working = nws.iter().filter(|r| r.status.is_working()).count();
    VerificationSummary {
        spc_total: spc.len(),
        spc_working,
        spc_failed: spc.len() - spc_working,
        nws_total: nws.len(),
        nws_working,
        nws_failed: nws.len() - nws_working,
    }
}

/// Days whose every product failed verification.
pub fn unavailable_days(spc: &[SpcVerification]) -> Vec<u8> {
    let mut days: Vec<u8> = spc.iter().map(|r| r.day).collect();
    days.sort_unstable();
    days.dedup();
    days.into_iter()
        .filter(|day| {
            spc.iter()
                .filter(|r| r.day == *day)
                .all(|r| !r.status.is_working())
        })
        .collect()
}

/// Request timeout used by probes; shorter than a scan's.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
