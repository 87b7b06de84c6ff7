/// Per-market alert escalation.
///
/// Each market moves through `none < heads_up < plan_for_it < it_happened`
/// within a storm episode. A level is delivered at most once per episode
/// and never followed by an equal or lower one. State lives behind
/// `AlertStateStore`; delivery is whatever function the caller passes in.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::alert::state_store::AlertStateStore;
use crate::analysis::demand::{storm_date_for_day, window_for_market};
use crate::ingest::nws::has_confirmed_warnings;
use crate::logging::log_delivery_failure;
use crate::model::{
    risk_name, ActiveAlert, AlertLevel, AlertRecord, DeliveryError, DemandWindow, EpisodeId,
    Market, MarketResult, MarketResults, StateError,
};

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// Only confirmed warnings on this day can produce `it_happened`.
pub const NEAR_TERM_DAY: u8 = 1;

/// Last day on which ENHANCED or worse means `plan_for_it`.
pub const PLAN_FOR_IT_LAST_DAY: u8 = 3;
pub const PLAN_FOR_IT_MIN_LEVEL: u8 = 4;

/// First day on which SLIGHT or worse means `heads_up`.
pub const HEADS_UP_FIRST_DAY: u8 = 4;
pub const HEADS_UP_MIN_LEVEL: u8 = 3;

/// Escalation level a market result calls for, first match wins.
pub fn evaluate_trigger(day: u8, result: &MarketResult, alerts: &[ActiveAlert]) -> Option<AlertLevel> {
    if day == NEAR_TERM_DAY && has_confirmed_warnings(alerts) {
        Some(AlertLevel::ItHappened)
    } else if day <= PLAN_FOR_IT_LAST_DAY && result.highest_risk >= PLAN_FOR_IT_MIN_LEVEL {
        Some(AlertLevel::PlanForIt)
    } else if day >= HEADS_UP_FIRST_DAY && result.highest_risk >= HEADS_UP_MIN_LEVEL {
        Some(AlertLevel::HeadsUp)
    } else {
        None
    }
}

/// Send gate: first alert for the market, a new episode, or a strictly
/// higher level within the same episode.
pub fn should_send(previous: Option<&AlertRecord>, level: AlertLevel, episode: EpisodeId) -> bool {
    match previous {
        None => true,
        Some(prev) if prev.episode_id != episode => true,
        Some(prev) => level > prev.last_level,
    }
}

/// Alerts for every region the market spans, in region order. Regions are
/// matched on the upper-case abbreviation the alerts map is keyed by.
pub fn alerts_for_market(market: &Market, alerts_by_region: &BTreeMap<String, Vec<ActiveAlert>>) -> Vec<ActiveAlert> {
    market
        .states
        .iter()
        .filter_map(|state| alerts_by_region.get(&state.trim().to_ascii_uppercase()))
        .flatten()
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Notification payload
// ---------------------------------------------------------------------------

/// Structured payload handed to the delivery function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub market: String,
    pub short_name: String,
    pub owner: Option<String>,
    pub states: Vec<String>,
    pub level: AlertLevel,
    pub episode_id: EpisodeId,
    pub day: u8,
    pub storm_date: NaiveDate,
    pub highest_risk: u8,
    pub risk_name: String,
    pub affected_counties: usize,
    pub total_counties: usize,
    pub max_hail: u8,
    pub max_tornado: u8,
    pub max_wind: u8,
    pub significant: bool,
    pub window_start: Option<NaiveDate>,
    pub window_end: Option<NaiveDate>,
    /// event name -> active count across the market's regions
    pub alert_counts: BTreeMap<String, usize>,
}

impl Notification {
    pub fn new(
        result: &MarketResult,
        level: AlertLevel,
        episode_id: EpisodeId,
        window: Option<&DemandWindow>,
        alerts: &[ActiveAlert],
    ) -> Self {
        let mut alert_counts = BTreeMap::new();
        for alert in alerts {
            *alert_counts.entry(alert.event.clone()).or_insert(0) += 1;
        }

        Self {
            market: result.market.name.clone(),
            short_name: result.market.short_name.clone(),
            owner: result.market.owner.clone(),
            states: result.market.states.clone(),
            level,
            episode_id,
            day: result.day,
            storm_date: storm_date_for_day(episode_id.scan_date, result.day),
            highest_risk: result.highest_risk,
            risk_name: risk_name(result.highest_risk).to_string(),
            affected_counties: result.affected_counties,
            total_counties: result.total_counties,
            max_hail: result.max_hail,
            max_tornado: result.max_tornado,
            max_wind: result.max_wind,
            significant: result.significant,
            window_start: window.map(|w| w.window_start),
            window_end: window.map(|w| w.window_end),
            alert_counts,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct EscalationEngine<S: AlertStateStore> {
    store: S,
}

impl<S: AlertStateStore> EscalationEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Evaluates every market-day in day order and delivers what the send
    /// gate allows. Returns the number delivered.
    ///
    /// State is written after each successful delivery. A failed delivery is
    /// logged and left unrecorded so the next run tries again. A failed state
    /// write stops the run and is returned.
    pub fn run<F>(
        &mut self,
        market_results: &MarketResults,
        windows: &[DemandWindow],
        alerts_by_region: &BTreeMap<String, Vec<ActiveAlert>>,
        scan_date: NaiveDate,
        now: DateTime<Utc>,
        mut deliver: F,
    ) -> Result<usize, StateError>
    where
        F: FnMut(&Notification) -> Result<(), DeliveryError>,
    {
        let mut sent = 0;

        for (day, results) in market_results {
            for result in results {
                let short = result.market.short_name.as_str();
                let alerts = alerts_for_market(&result.market, alerts_by_region);

                let Some(level) = evaluate_trigger(*day, result, &alerts) else {
                    continue;
                };
                let episode = EpisodeId::new(scan_date, *day);

                if !should_send(self.store.get(short), level, episode) {
                    debug!(market = short, day, %level, %episode, "already sent, skipping");
                    continue;
                }

                let notification = Notification::new(
                    result,
                    level,
                    episode,
                    window_for_market(windows, short),
                    &alerts,
                );

                info!(market = short, day, %level, %episode, "sending alert");
                match deliver(&notification) {
                    Ok(()) => {
                        self.store.put(
                            short,
                            AlertRecord {
                                last_level: level,
                                episode_id: episode,
                                sent_at: now,
                            },
                        )?;
                        sent += 1;
                    }
                    Err(e) => log_delivery_failure(short, &format!("day {} {} alert", day, level), &e),
                }
            }
        }

        info!(sent, "escalation run complete");
        Ok(sent)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::state_store::MemoryStore;
    use chrono::TimeZone;

    fn scan_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 27).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 27, 15, 0, 0).unwrap()
    }

    fn market() -> Market {
        Market {
            name: "Oklahoma City".to_string(),
            short_name: "OKC".to_string(),
            fips_codes: vec!["40109".to_string()],
            states: vec!["OK".to_string()],
            owner: Some("Dana".to_string()),
        }
    }

    fn result(day: u8, highest: u8) -> MarketResult {
        MarketResult {
            market: market(),
            day,
            highest_risk: highest,
            affected_counties: 1,
            total_counties: 1,
            max_hail: 30,
            max_tornado: 10,
            max_wind: 15,
            significant: false,
            county_risks: Vec::new(),
        }
    }

    fn alert(event: &str, certainty: &str) -> ActiveAlert {
        ActiveAlert {
            event: event.to_string(),
            headline: None,
            severity: "Severe".to_string(),
            urgency: "Immediate".to_string(),
            certainty: certainty.to_string(),
            area_desc: "Oklahoma, OK".to_string(),
            onset: None,
            expires: None,
        }
    }

    fn by_day(day: u8, highest: u8) -> MarketResults {
        let mut map = MarketResults::new();
        map.insert(day, vec![result(day, highest)]);
        map
    }

    fn ok_alerts(alerts: Vec<ActiveAlert>) -> BTreeMap<String, Vec<ActiveAlert>> {
        let mut map = BTreeMap::new();
        map.insert("OK".to_string(), alerts);
        map
    }

    // --- Trigger table ---------------------------------------------------

    #[test]
    fn test_trigger_priority() {
        let warning = vec![alert("Tornado Warning", "Observed")];
        assert_eq!(evaluate_trigger(1, &result(1, 2), &warning), Some(AlertLevel::ItHappened));
        assert_eq!(evaluate_trigger(1, &result(1, 4), &[]), Some(AlertLevel::PlanForIt));
        assert_eq!(evaluate_trigger(3, &result(3, 4), &[]), Some(AlertLevel::PlanForIt));
        assert_eq!(evaluate_trigger(4, &result(4, 3), &[]), Some(AlertLevel::HeadsUp));
        assert_eq!(evaluate_trigger(8, &result(8, 6), &[]), Some(AlertLevel::HeadsUp));
    }

    #[test]
    fn test_lowercase_market_state_sees_region_alerts() {
        let mut lower = result(1, 4);
        lower.market.states = vec!["ok".to_string()];
        let alerts = alerts_for_market(&lower.market, &ok_alerts(vec![alert("Tornado Warning", "Observed")]));
        assert_eq!(alerts.len(), 1, "alerts map is keyed by upper-case region");
        assert_eq!(evaluate_trigger(1, &lower, &alerts), Some(AlertLevel::ItHappened));
    }

    #[test]
    fn test_no_trigger_cases() {
        let warning = vec![alert("Tornado Warning", "Observed")];
        assert_eq!(evaluate_trigger(2, &result(2, 3), &warning), None, "warnings count on day 1 only");
        assert_eq!(evaluate_trigger(1, &result(1, 3), &[]), None);
        assert_eq!(evaluate_trigger(4, &result(4, 2), &[]), None);
        let watch = vec![alert("Tornado Watch", "Possible")];
        assert_eq!(evaluate_trigger(1, &result(1, 3), &watch), None, "a watch is not confirmation");
    }

    // --- Send gate -------------------------------------------------------

    #[test]
    fn test_send_gate() {
        let episode = EpisodeId::new(scan_date(), 1);
        let prev = AlertRecord { last_level: AlertLevel::PlanForIt, episode_id: episode, sent_at: now() };
        assert!(should_send(None, AlertLevel::HeadsUp, episode));
        assert!(should_send(Some(&prev), AlertLevel::ItHappened, episode));
        assert!(!should_send(Some(&prev), AlertLevel::PlanForIt, episode));
        assert!(!should_send(Some(&prev), AlertLevel::HeadsUp, episode));
        assert!(should_send(Some(&prev), AlertLevel::HeadsUp, EpisodeId::new(scan_date(), 4)));
    }

    // --- Engine ------------------------------------------------------------

    #[test]
    fn test_plan_then_confirmed_then_suppressed() {
        let mut engine = EscalationEngine::new(MemoryStore::new());
        let mut delivered: Vec<Notification> = Vec::new();

        let first = engine
            .run(&by_day(1, 4), &[], &BTreeMap::new(), scan_date(), now(), |n| {
                delivered.push(n.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(delivered[0].level, AlertLevel::PlanForIt);

        let warnings = ok_alerts(vec![alert("Tornado Warning", "Observed")]);
        let second = engine
            .run(&by_day(1, 4), &[], &warnings, scan_date(), now(), |n| {
                delivered.push(n.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(second, 1);
        assert_eq!(delivered[1].level, AlertLevel::ItHappened);
        assert_eq!(delivered[1].alert_counts.get("Tornado Warning"), Some(&1));

        let more = ok_alerts(vec![
            alert("Tornado Warning", "Observed"),
            alert("Severe Thunderstorm Warning", "Observed"),
        ]);
        let third = engine
            .run(&by_day(1, 4), &[], &more, scan_date(), now(), |n| {
                delivered.push(n.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(third, 0, "it_happened already sent for this episode");
        assert_eq!(delivered.len(), 2);
    }

    #[test]
    fn test_never_deescalates_within_episode() {
        let mut engine = EscalationEngine::new(MemoryStore::new());
        let warnings = ok_alerts(vec![alert("Tornado Warning", "Observed")]);
        engine
            .run(&by_day(1, 4), &[], &warnings, scan_date(), now(), |_| Ok(()))
            .unwrap();

        let mut levels = Vec::new();
        let sent = engine
            .run(&by_day(1, 4), &[], &BTreeMap::new(), scan_date(), now(), |n| {
                levels.push(n.level);
                Ok(())
            })
            .unwrap();
        assert_eq!(sent, 0, "plan_for_it after it_happened is suppressed");
        assert!(levels.is_empty());
        assert_eq!(
            engine.store().get("OKC").map(|r| r.last_level),
            Some(AlertLevel::ItHappened)
        );
    }

    #[test]
    fn test_new_scan_date_is_new_episode() {
        let mut engine = EscalationEngine::new(MemoryStore::new());
        engine.run(&by_day(1, 4), &[], &BTreeMap::new(), scan_date(), now(), |_| Ok(())).unwrap();
        let tomorrow = scan_date().succ_opt().unwrap();
        let sent = engine
            .run(&by_day(1, 4), &[], &BTreeMap::new(), tomorrow, now(), |_| Ok(()))
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(
            engine.store().get("OKC").map(|r| r.episode_id.to_string()),
            Some("2026-04-28-day1".to_string())
        );
    }

    #[test]
    fn test_failed_delivery_is_not_recorded() {
        let mut engine = EscalationEngine::new(MemoryStore::new());
        let sent = engine
            .run(&by_day(2, 5), &[], &BTreeMap::new(), scan_date(), now(), |_| {
                Err(DeliveryError::Status(500))
            })
            .unwrap();
        assert_eq!(sent, 0);
        assert!(engine.store().get("OKC").is_none());

        let retried = engine
            .run(&by_day(2, 5), &[], &BTreeMap::new(), scan_date(), now(), |_| Ok(()))
            .unwrap();
        assert_eq!(retried, 1, "next run retries the undelivered alert");
    }

    #[test]
    fn test_notification_carries_window_and_storm_date() {
        let window = DemandWindow {
            market: market(),
            storm_date: NaiveDate::from_ymd_opt(2026, 4, 28).unwrap(),
            window_start: NaiveDate::from_ymd_opt(2026, 5, 12).unwrap(),
            window_end: NaiveDate::from_ymd_opt(2026, 5, 26).unwrap(),
            trigger_day: 2,
            highest_risk: 5,
        };
        let mut payloads = Vec::new();
        EscalationEngine::new(MemoryStore::new())
            .run(&by_day(2, 5), &[window.clone()], &BTreeMap::new(), scan_date(), now(), |n| {
                payloads.push(n.clone());
                Ok(())
            })
            .unwrap();
        let n = &payloads[0];
        assert_eq!(n.storm_date, window.storm_date);
        assert_eq!(n.window_start, Some(window.window_start));
        assert_eq!(n.window_end, Some(window.window_end));
        assert_eq!(n.risk_name, "MODERATE");
        assert_eq!(n.owner.as_deref(), Some("Dana"));

        let json = serde_json::to_value(n).unwrap();
        assert_eq!(json["level"], "plan_for_it");
        assert_eq!(json["episode_id"], "2026-04-27-day2");
    }
}
