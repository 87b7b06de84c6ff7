//! Demand windows: when follow-on service requests are expected after a
//! storm hits a market.
//!
//! A multi-day episode produces one window per market, anchored on the
//! earliest forecast day the market appears.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::config::DemandSettings;
use crate::model::{DemandWindow, MarketResult, MarketResults};

/// Calendar date of a forecast day: day 1 is the scan date.
pub fn storm_date_for_day(scan_date: NaiveDate, day: u8) -> NaiveDate {
    scan_date + Duration::days(i64::from(day.max(1)) - 1)
}

/// One window per market present on any day, sorted by storm date then
/// market short name.
pub fn compute_windows(
    market_results: &MarketResults,
    scan_date: NaiveDate,
    settings: &DemandSettings,
) -> Vec<DemandWindow> {
    // short_name -> (earliest day, its result, highest level over all days)
    let mut per_market: BTreeMap<&str, (u8, &MarketResult, u8)> = BTreeMap::new();

    for (day, results) in market_results {
        for mr in results {
            per_market
                .entry(mr.market.short_name.as_str())
                .and_modify(|(first_day, first, highest)| {
                    if *day < *first_day {
                        *first_day = *day;
                        *first = mr;
                    }
                    *highest = (*highest).max(mr.highest_risk);
                })
                .or_insert((*day, mr, mr.highest_risk));
        }
    }

    let mut windows: Vec<DemandWindow> = per_market
        .into_values()
        .filter_map(|(first_day, first, highest_risk)| {
            let storm_date = storm_date_for_day(scan_date, first_day);
            let (Some(window_start), Some(window_end)) = (
                offset_date(storm_date, settings.window_start_days),
                offset_date(storm_date, settings.window_end_days),
            ) else {
                warn!(market = %first.market.short_name, ?settings, "demand window out of calendar range, skipped");
                return None;
            };
            Some(DemandWindow {
                market: first.market.clone(),
                storm_date,
                window_start,
                window_end,
                trigger_day: first_day,
                highest_risk,
            })
        })
        .collect();

    windows.sort_by(|a, b| {
        a.storm_date
            .cmp(&b.storm_date)
            .then_with(|| a.market.short_name.cmp(&b.market.short_name))
    });
    windows
}

fn offset_date(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    Duration::try_days(days).and_then(|d| date.checked_add_signed(d))
}

/// The window for a market short name, if the market is at risk this scan.
pub fn window_for_market<'a>(windows: &'a [DemandWindow], short_name: &str) -> Option<&'a DemandWindow> {
    windows.iter().find(|w| w.market.short_name == short_name)
}
