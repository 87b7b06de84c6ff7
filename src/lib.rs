//! Severe-weather CAT monitoring.
//!
//! Matches SPC convective outlooks against county points, flags
//! catastrophe-level risk per county and market, projects service demand
//! windows, and escalates per-market alerts at most once per level.

pub mod alert;
pub mod analysis;
pub mod config;
pub mod delivery;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod regions;
pub mod spatial;
pub mod verify;
