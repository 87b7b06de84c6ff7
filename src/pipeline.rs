/// Scan pipeline.
///
/// `run_scan` is the pure core: outlooks and counties in, day results,
/// market results, and demand windows out. `run_live_scan` wraps it with
/// the network fetches and the freshness check.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::alert::staleness::{describe_freshness_at, is_stale_at};
use crate::analysis::classify::classify;
use crate::analysis::demand::compute_windows;
use crate::analysis::markets::classify_markets;
use crate::config::{AppConfig, CatThresholds, DemandSettings};
use crate::ingest::counties::{filter_by_regions, load_counties};
use crate::ingest::spc::fetch_outlooks;
use crate::ingest::build_client;
use crate::model::{CatError, County, DayResult, DemandWindow, Market, MarketResults, OutlookSet};
use crate::spatial::match_counties;

/// Per-run knobs on top of the configured thresholds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSettings {
    pub thresholds: CatThresholds,
    pub demand: DemandSettings,
    /// Restrict counties to these region abbreviations.
    pub regions: Option<Vec<String>>,
    /// Replace the configured categorical minimum for this run.
    pub categorical_min: Option<u8>,
}

impl ScanSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            thresholds: config.thresholds,
            demand: config.demand,
            regions: None,
            categorical_min: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub day_results: Vec<DayResult>,
    pub market_results: MarketResults,
    pub demand_windows: Vec<DemandWindow>,
}

impl ScanOutput {
    /// False only when every day is `Unknown`.
    pub fn any_data(&self) -> bool {
        self.day_results.iter().any(|r| !r.is_unknown())
    }

    pub fn markets_at_risk(&self) -> usize {
        self.market_results
            .values()
            .flatten()
            .map(|mr| mr.market.short_name.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Matches, merges, classifies, and aggregates one scan.
pub fn run_scan(
    outlooks: &OutlookSet,
    counties: &[County],
    markets: &[Market],
    settings: &ScanSettings,
    scan_date: NaiveDate,
) -> ScanOutput {
    let filtered;
    let counties = match &settings.regions {
        Some(regions) => {
            filtered = filter_by_regions(counties, regions);
            info!(counties = filtered.len(), regions = ?regions, "region filter applied");
            filtered.as_slice()
        }
        None => counties,
    };

    let matched = match_counties(outlooks, counties);
    let day_results = classify(&matched, outlooks, &settings.thresholds, settings.categorical_min);
    let market_results = classify_markets(&day_results, markets);
    let demand_windows = compute_windows(&market_results, scan_date, &settings.demand);

    ScanOutput {
        day_results,
        market_results,
        demand_windows,
    }
}

/// Sorted, de-duplicated regions spanned by `markets`.
pub fn market_regions(markets: &[Market]) -> Vec<String> {
    markets
        .iter()
        .flat_map(|m| m.states.iter())
        .map(|s| s.trim().to_ascii_uppercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Live scan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LiveScan {
    pub output: ScanOutput,
    /// Issue time of the newest outlook layer fetched.
    pub latest_update: Option<DateTime<Utc>>,
}

impl LiveScan {
    /// `"HH:MM UTC (Xh Ym ago)"` for the newest outlook, if known.
    pub fn freshness_at(&self, now: DateTime<Utc>) -> Option<String> {
        self.latest_update.map(|latest| describe_freshness_at(latest, now))
    }
}

/// Fetches outlooks and counties, then runs the scan for `scan_date`.
///
/// Fails only when the county catalog cannot be loaded; outlook failures
/// degrade to `Unknown` days.
pub fn run_live_scan(
    config: &AppConfig,
    settings: &ScanSettings,
    scan_date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<LiveScan, CatError> {
    let retry_delay = Duration::from_secs(config.http.retry_delay_secs);

    let client = build_client(&config.http, config.http.timeout_secs)?;
    let fetch = fetch_outlooks(&client, retry_delay);
    if !fetch.outlooks.any_scanned() {
        warn!("no SPC outlook data available, every day is unknown");
    }

    let latest_update = fetch.latest_update();
    if let Some(latest) = latest_update {
        if is_stale_at(latest, config.freshness.max_age_minutes, now) {
            warn!(
                max_age_minutes = config.freshness.max_age_minutes,
                "outlook data is stale: {}",
                describe_freshness_at(latest, now)
            );
        }
    }

    let download_client = build_client(&config.http, config.http.download_timeout_secs)?;
    let counties = load_counties(&download_client, &config.paths.county_cache)?;

    let output = run_scan(&fetch.outlooks, &counties, &config.markets, settings, scan_date);
    info!(
        flagged = output.day_results.iter().map(|r| r.county_risks.len()).sum::<usize>(),
        markets = output.markets_at_risk(),
        windows = output.demand_windows.len(),
        "scan complete"
    );
    Ok(LiveScan { output, latest_update })
}
