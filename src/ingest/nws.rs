/// NWS Active Alerts Client
///
/// Pulls currently active alerts per state from api.weather.gov and keeps
/// only convective events. These are the evidence the escalation engine
/// uses to decide a forecast storm has actually arrived.
///
/// API Documentation: https://www.weather.gov/documentation/services-web-api

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::logging::{log_fetch_failure, log_fetch_summary, DataSource};
use crate::model::{ActiveAlert, CatError};

pub const NWS_BASE_URL: &str = "https://api.weather.gov";

/// NWS asks clients to pace requests.
pub const REGION_PACING: Duration = Duration::from_millis(500);

/// Events worth tracking for severe convective weather.
pub const RELEVANT_EVENTS: &[&str] = &[
    "Tornado Warning",
    "Severe Thunderstorm Warning",
    "Extreme Wind Warning",
    "Tornado Watch",
    "Severe Thunderstorm Watch",
];

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct AlertsResponse {
    #[serde(default)]
    features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
struct AlertFeature {
    properties: ActiveAlert,
}

// ============================================================================
// API Client Functions
// ============================================================================

pub fn alerts_url(region: &str) -> String {
    format!(
        "{}/alerts/active?area={}&status=actual&message_type=alert,update",
        NWS_BASE_URL, region
    )
}

/// Active relevant alerts for each region.
///
/// Every requested region gets a key; a region whose fetch failed maps to an
/// empty list after logging.
pub fn fetch_alerts_for_regions(
    client: &Client,
    regions: &[String],
    retry_delay: Duration,
) -> BTreeMap<String, Vec<ActiveAlert>> {
    let mut results = BTreeMap::new();
    let mut failed = 0;

    for (i, region) in regions.iter().enumerate() {
        if i > 0 {
            std::thread::sleep(REGION_PACING);
        }
        let url = alerts_url(region);
        let alerts = match fetch_region(client, &url, retry_delay) {
            Ok(alerts) => {
                debug!(region = %region, alerts = alerts.len(), "relevant alerts");
                alerts
            }
            Err(e) => {
                failed += 1;
                log_fetch_failure(DataSource::Nws, &url, &format!("{} alerts", region), &e);
                Vec::new()
            }
        };
        results.insert(region.clone(), alerts);
    }

    log_fetch_summary(DataSource::Nws, regions.len(), regions.len() - failed, failed);
    info!(
        alerts = results.values().map(Vec::len).sum::<usize>(),
        regions = regions.len(),
        "NWS alerts loaded"
    );
    results
}

fn fetch_region(client: &Client, url: &str, retry_delay: Duration) -> Result<Vec<ActiveAlert>, CatError> {
    let fetched = super::get_with_retry(client, url, Some("application/geo+json"), retry_delay)?;
    parse_alerts(&fetched.body)
}

/// Parses an alerts FeatureCollection, keeping only relevant events.
pub fn parse_alerts(text: &str) -> Result<Vec<ActiveAlert>, CatError> {
    let response: AlertsResponse = serde_json::from_str(text)?;
    Ok(response
        .features
        .into_iter()
        .map(|f| f.properties)
        .filter(|a| is_relevant_event(&a.event))
        .collect())
}

pub fn is_relevant_event(event: &str) -> bool {
    RELEVANT_EVENTS.contains(&event)
}

// ============================================================================
// Alert Analysis Helpers
// ============================================================================

/// region -> event -> count
pub fn summarize_alerts(
    alerts: &BTreeMap<String, Vec<ActiveAlert>>,
) -> BTreeMap<String, BTreeMap<String, usize>> {
    alerts
        .iter()
        .map(|(region, region_alerts)| {
            let mut counts = BTreeMap::new();
            for alert in region_alerts {
                *counts.entry(alert.event.clone()).or_insert(0) += 1;
            }
            (region.clone(), counts)
        })
        .collect()
}

/// Any observed or Warning-class alert.
pub fn has_confirmed_warnings(alerts: &[ActiveAlert]) -> bool {
    alerts.iter().any(ActiveAlert::is_confirmed)
}

// ============================================================================
// Tests
// ============================================================================
