//! Live Source Integration Tests
//!
//! Hit the real SPC and NWS endpoints. Ignored by default; run with
//! `cargo test --test live_sources -- --ignored --nocapture` before
//! changing any source URL or parser.

use std::time::Duration;

use catmon_service::ingest::nws::fetch_alerts_for_regions;
use catmon_service::ingest::spc::{fetch_outlooks, outlook_products};
use catmon_service::model::forecast_days;
use catmon_service::verify::*;

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .user_agent("catmon-tests (ops@example.com)")
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

#[test]
#[ignore]
fn test_spc_product_verification() {
    let client = client();
    let products = outlook_products();

    println!("\nSPC outlook layers:");
    let mut results = Vec::new();
    for product in &products {
        let result = verify_spc_product(&client, product);
        println!(
            "  day {} {:<14} {:?} features={} polygons={}",
            result.day, result.hazard, result.status, result.feature_count, result.polygon_count
        );
        if let Some(error) = &result.error_message {
            println!("    error: {}", error);
        }
        results.push(result);
    }

    let summary = summarize(&results, &[]);
    println!("Summary: {}/{} working", summary.spc_working, summary.spc_total);
    assert_eq!(summary.spc_total, products.len());
    assert!(summary.spc_working > 0, "no SPC layer is reachable");
    assert!(
        !unavailable_days(&results).contains(&1),
        "day 1 outlook should always be published"
    );
}

#[test]
#[ignore]
fn test_live_outlook_fetch_covers_every_day() {
    let fetch = fetch_outlooks(&client(), Duration::from_millis(500));
    println!(
        "\nFetched {}/{} layers, {} polygons",
        fetch.succeeded,
        fetch.attempted,
        fetch.outlooks.polygon_count()
    );
    assert!(fetch.outlooks.any_scanned());
    assert!(fetch.latest_update().is_some(), "SPC always sends Last-Modified or Date");
    for day in forecast_days() {
        println!("  day {}: {:?}", day, fetch.outlooks.availability(day));
    }
}

#[test]
#[ignore]
fn test_nws_region_verification() {
    let client = client();
    let regions = vec!["TX".to_string(), "OK".to_string()];
    let report = generate_report(&client, &regions);

    for result in &report.nws_results {
        println!(
            "  {} {:?} relevant={} {}",
            result.region,
            result.status,
            result.relevant_alerts,
            result.error_message.as_deref().unwrap_or("")
        );
    }
    assert_eq!(report.summary.nws_total, 2);
    assert!(report.summary.nws_working > 0, "NWS alerts endpoint unreachable");

    let alerts = fetch_alerts_for_regions(&client, &regions, Duration::from_millis(500));
    assert_eq!(alerts.len(), 2, "every region gets an entry, even when empty");
}
