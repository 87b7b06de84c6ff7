/// Pure pipeline stages for the CAT monitoring service.
///
/// Everything here is a deterministic transform over already-fetched data:
/// no I/O, no clocks.
///
/// Submodules:
/// - `merge`   : folds polygon hits into one risk record per county-day.
/// - `classify`: applies CAT thresholds, ranks, and rolls up by state.
/// - `markets` : joins flagged counties to configured markets.
/// - `demand`  : derives demand windows from market results.

pub mod classify;
pub mod demand;
pub mod markets;
pub mod merge;
