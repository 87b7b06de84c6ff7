//! Market classification: join each day's flagged counties to the
//! configured market county sets.
//!
//! Results are sparse. A market with no flagged member county on a day is
//! absent from that day's list; it never appears with a zero count.

use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::analysis::classify::rank_county_risks;
use crate::model::{CountyRisk, DayResult, Market, MarketResult, MarketResults};

/// Builds the market result for one market on one day, or `None` when no
/// member county is flagged.
pub fn classify_market(
    market: &Market,
    day: u8,
    flagged: &HashMap<&str, &CountyRisk>,
) -> Option<MarketResult> {
    let members: BTreeSet<&str> = market.fips_codes.iter().map(String::as_str).collect();
    let mut matched: Vec<CountyRisk> = members
        .iter()
        .filter_map(|fips| flagged.get(fips).map(|risk| (*risk).clone()))
        .collect();

    if matched.is_empty() {
        return None;
    }
    rank_county_risks(&mut matched);

    Some(MarketResult {
        market: market.clone(),
        day,
        highest_risk: matched.iter().map(|r| r.categorical_level).max().unwrap_or(0),
        affected_counties: matched.len(),
        total_counties: members.len(),
        max_hail: matched.iter().map(|r| r.hail_prob).max().unwrap_or(0),
        max_tornado: matched.iter().map(|r| r.tornado_prob).max().unwrap_or(0),
        max_wind: matched.iter().map(|r| r.wind_prob).max().unwrap_or(0),
        significant: matched.iter().any(|r| r.significant),
        county_risks: matched,
    })
}

/// day -> markets at risk that day, each list ordered by market short name.
///
/// Every classified day has a key, possibly with an empty list.
pub fn classify_markets(results: &[DayResult], markets: &[Market]) -> MarketResults {
    let mut market_results = MarketResults::new();

    for day_result in results {
        let flagged: HashMap<&str, &CountyRisk> = day_result
            .county_risks
            .iter()
            .map(|risk| (risk.county.fips.as_str(), risk))
            .collect();

        let mut day_markets: Vec<MarketResult> = markets
            .iter()
            .filter_map(|market| classify_market(market, day_result.day, &flagged))
            .collect();
        day_markets.sort_by(|a, b| a.market.short_name.cmp(&b.market.short_name));

        for mr in &day_markets {
            debug!(
                day = day_result.day,
                market = %mr.market.short_name,
                affected = mr.affected_counties,
                total = mr.total_counties,
                highest = mr.highest_risk,
                "market at risk"
            );
        }
        market_results.insert(day_result.day, day_markets);
    }

    market_results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::classify::aggregate_by_region;
    use crate::model::{County, DataAvailability};
    use geo::Point;

    fn risk(fips: &str, cat: u8, hail: u8, torn: u8, wind: u8, sig: bool) -> CountyRisk {
        CountyRisk {
            county: County {
                fips: fips.to_string(),
                name: format!("County {}", fips),
                state_fips: fips[..2].to_string(),
                state_abbr: "TX".to_string(),
                point: Point::new(0.0, 0.0),
            },
            day: 1,
            categorical_level: cat,
            hail_prob: hail,
            tornado_prob: torn,
            wind_prob: wind,
            significant: sig,
        }
    }

    fn day(day: u8, risks: Vec<CountyRisk>) -> DayResult {
        DayResult {
            day,
            region_summaries: aggregate_by_region(&risks),
            county_risks: risks,
            availability: DataAvailability::Scanned,
        }
    }

    fn market(short: &str, fips: &[&str]) -> Market {
        Market {
            name: format!("{} Metro", short),
            short_name: short.to_string(),
            fips_codes: fips.iter().map(|f| f.to_string()).collect(),
            states: vec!["TX".to_string()],
            owner: None,
        }
    }

    #[test]
    fn test_market_maxima_and_counts() {
        let results = vec![day(
            1,
            vec![
                risk("48113", 5, 30, 2, 15, false),
                risk("48439", 4, 15, 10, 45, true),
                risk("48201", 6, 60, 30, 60, false),
            ],
        )];
        let markets = vec![market("DFW", &["48113", "48439", "48085"])];
        let by_day = classify_markets(&results, &markets);
        let mr = &by_day[&1][0];
        assert_eq!(mr.affected_counties, 2);
        assert_eq!(mr.total_counties, 3);
        assert_eq!(mr.highest_risk, 5, "Harris is not a DFW county");
        assert_eq!((mr.max_hail, mr.max_tornado, mr.max_wind), (30, 10, 45));
        assert!(mr.significant);
    }

    #[test]
    fn test_quiet_market_is_absent_not_zero() {
        let results = vec![day(1, vec![risk("48201", 4, 0, 0, 0, false)])];
        let markets = vec![market("DFW", &["48113"]), market("HOU", &["48201"])];
        let by_day = classify_markets(&results, &markets);
        let names: Vec<_> = by_day[&1].iter().map(|m| m.market.short_name.as_str()).collect();
        assert_eq!(names, vec!["HOU"]);
        assert!(by_day.values().flatten().all(|m| m.affected_counties > 0));
    }

    #[test]
    fn test_day_with_no_flagged_counties_has_empty_list() {
        let results = vec![day(3, Vec::new())];
        let by_day = classify_markets(&results, &[market("DFW", &["48113"])]);
        assert!(by_day[&3].is_empty());
    }

    #[test]
    fn test_markets_sorted_by_short_name() {
        let results = vec![day(1, vec![risk("48113", 4, 0, 0, 0, false), risk("48201", 4, 0, 0, 0, false)])];
        let markets = vec![market("HOU", &["48201"]), market("DFW", &["48113"])];
        let by_day = classify_markets(&results, &markets);
        let names: Vec<_> = by_day[&1].iter().map(|m| m.market.short_name.as_str()).collect();
        assert_eq!(names, vec!["DFW", "HOU"]);
    }

    #[test]
    fn test_duplicate_member_codes_count_once() {
        let results = vec![day(1, vec![risk("48113", 4, 0, 0, 0, false)])];
        let by_day = classify_markets(&results, &[market("DFW", &["48113", "48113", "48439"])]);
        let mr = &by_day[&1][0];
        assert_eq!((mr.affected_counties, mr.total_counties), (1, 2));
    }
}
