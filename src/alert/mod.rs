/// Alerting: CAT thresholds, outlook freshness, and per-market escalation
/// with durable dedup state.

pub mod escalation;
pub mod staleness;
pub mod state_store;
pub mod thresholds;
