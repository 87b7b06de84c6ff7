//! `catmon` command-line entry point.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Local, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use catmon_service::alert::escalation::EscalationEngine;
use catmon_service::alert::state_store::JsonFileStore;
use catmon_service::config::AppConfig;
use catmon_service::delivery::WebhookDelivery;
use catmon_service::ingest::build_client;
use catmon_service::ingest::nws::{fetch_alerts_for_regions, summarize_alerts};
use catmon_service::logging::{init_logging, log_failure, DataSource, FailureType};
use catmon_service::model::{risk_name, ActiveAlert, CatError};
use catmon_service::pipeline::{market_regions, run_live_scan, LiveScan, ScanSettings};
use catmon_service::verify::{generate_report, PROBE_TIMEOUT};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "catmon")]
#[command(about = "Severe-weather CAT risk monitor for service markets")]
#[command(version)]
struct Args {
    /// Configuration file (defaults to $CATMON_CONFIG, then catmon.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Drop timestamps from console log lines
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flagged counties per forecast day
    Scan(ScanArgs),
    /// Markets at risk and their demand windows
    Markets(ScanArgs),
    /// Active NWS alerts for every market region
    Alerts,
    /// Scan, markets, alerts, and escalation delivery
    Full(ScanArgs),
    /// Probe every upstream source and print a JSON report
    Verify,
}

#[derive(clap::Args, Debug)]
struct ScanArgs {
    /// Only scan these regions, e.g. TX,OK
    #[arg(long, value_delimiter = ',')]
    states: Option<Vec<String>>,

    /// Override the categorical threshold for this run
    #[arg(long)]
    categorical_min: Option<u8>,
}

impl ScanArgs {
    fn settings(&self, config: &AppConfig) -> ScanSettings {
        ScanSettings {
            regions: self.states.clone(),
            categorical_min: self.categorical_min,
            ..ScanSettings::from_config(config)
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("catmon: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let level = config.log_level.as_deref().unwrap_or("info");
    if let Err(e) = init_logging(level, config.paths.log_file.as_deref(), !args.quiet) {
        eprintln!("catmon: {}", e);
        return ExitCode::FAILURE;
    }

    let scan_date = Local::now().date_naive();
    match run(&args.command, &config, scan_date) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_failure(DataSource::System, "catmon", args.command.name(), FailureType::Unexpected, &e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig, CatError> {
    match &args.config {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_from_env(),
    }
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Scan(_) => "scan",
            Command::Markets(_) => "markets",
            Command::Alerts => "alerts",
            Command::Full(_) => "full",
            Command::Verify => "verify",
        }
    }
}

/// One `scan_date` per invocation: demand windows, episode ids, and storm
/// dates all derive from it.
fn run(command: &Command, config: &AppConfig, scan_date: NaiveDate) -> Result<(), CatError> {
    match command {
        Command::Scan(scan) => {
            let live = live_scan(scan, config, scan_date)?;
            print_days(&live);
        }
        Command::Markets(scan) => {
            let live = live_scan(scan, config, scan_date)?;
            print_markets(&live);
        }
        Command::Alerts => {
            let alerts = fetch_market_alerts(config)?;
            print_alerts(&alerts);
        }
        Command::Full(scan) => {
            let live = live_scan(scan, config, scan_date)?;
            let alerts = fetch_market_alerts(config)?;
            print_days(&live);
            print_markets(&live);
            print_alerts(&alerts);
            escalate(&live, &alerts, config, scan_date)?;
        }
        Command::Verify => {
            let client = build_client(&config.http, PROBE_TIMEOUT.as_secs())?;
            let report = generate_report(&client, &market_regions(&config.markets));
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

fn live_scan(scan: &ScanArgs, config: &AppConfig, scan_date: NaiveDate) -> Result<LiveScan, CatError> {
    info!(%scan_date, "starting scan");
    run_live_scan(config, &scan.settings(config), scan_date, Utc::now())
}

fn fetch_market_alerts(config: &AppConfig) -> Result<BTreeMap<String, Vec<ActiveAlert>>, CatError> {
    let client = build_client(&config.http, config.http.timeout_secs)?;
    let retry_delay = std::time::Duration::from_secs(config.http.retry_delay_secs);
    Ok(fetch_alerts_for_regions(&client, &market_regions(&config.markets), retry_delay))
}

fn escalate(
    live: &LiveScan,
    alerts: &BTreeMap<String, Vec<ActiveAlert>>,
    config: &AppConfig,
    scan_date: NaiveDate,
) -> Result<(), CatError> {
    let Some(url) = AppConfig::webhook_url() else {
        warn!("ALERT_WEBHOOK_URL not set, skipping alert delivery");
        return Ok(());
    };

    let webhook = WebhookDelivery::new(build_client(&config.http, config.http.timeout_secs)?, url);
    let store = JsonFileStore::open(&config.paths.alert_state)?;
    let mut engine = EscalationEngine::new(store);
    let sent = engine.run(
        &live.output.market_results,
        &live.output.demand_windows,
        alerts,
        scan_date,
        Utc::now(),
        |notification| webhook.send(notification),
    )?;
    println!("\n  {} alert(s) delivered", sent);
    Ok(())
}

// ============================================================================
// Plain-text output
// ============================================================================

fn print_days(live: &LiveScan) {
    if !live.output.any_data() {
        println!("  No SPC outlook data was available. Risk is UNKNOWN, not clear.");
        return;
    }
    if let Some(freshness) = live.freshness_at(Utc::now()) {
        println!("  Data as of {}", freshness);
    }
    for result in &live.output.day_results {
        if result.is_unknown() {
            println!("\n  Day {}: data unavailable", result.day);
            continue;
        }
        if result.is_clear() {
            println!("\n  Day {}: no CAT-level risk", result.day);
            continue;
        }
        println!("\n  Day {}: {} flagged counties", result.day, result.county_risks.len());
        for (region, summary) in &result.region_summaries {
            println!(
                "    {}: {} counties, highest {}",
                region,
                summary.count,
                risk_name(summary.highest_risk)
            );
        }
    }
}

fn print_markets(live: &LiveScan) {
    println!("\n  MARKETS");
    if live.output.markets_at_risk() == 0 {
        println!("  No markets at CAT-level risk.");
        return;
    }
    for (day, results) in &live.output.market_results {
        if results.is_empty() {
            continue;
        }
        println!("\n  Day {}:", day);
        for mr in results {
            println!(
                "    {}: {}, {}/{} counties, hail {}% tornado {}% wind {}%{}",
                mr.market.short_name,
                risk_name(mr.highest_risk),
                mr.affected_counties,
                mr.total_counties,
                mr.max_hail,
                mr.max_tornado,
                mr.max_wind,
                if mr.significant { " (significant)" } else { "" }
            );
        }
    }

    if !live.output.demand_windows.is_empty() {
        println!("\n  DEMAND WINDOWS");
        for w in &live.output.demand_windows {
            println!(
                "    {}: {} to {} (storm day {}, {})",
                w.market.short_name, w.window_start, w.window_end, w.trigger_day, w.storm_date
            );
        }
    }
}

fn print_alerts(alerts: &BTreeMap<String, Vec<ActiveAlert>>) {
    println!("\n  ACTIVE ALERTS");
    let mut total = 0;
    for (region, counts) in summarize_alerts(alerts) {
        if counts.is_empty() {
            println!("    {}: no relevant alerts", region);
            continue;
        }
        total += counts.values().sum::<usize>();
        let parts: Vec<String> = counts.iter().map(|(event, n)| format!("{}: {}", event, n)).collect();
        println!("    {}: {}", region, parts.join(", "));
    }
    println!("    Total: {} relevant alert(s)", total);
}
