//! Service configuration.
//!
//! Loaded from a TOML file (`catmon.toml` unless `CATMON_CONFIG` points
//! elsewhere). Every section except `[[markets]]` has defaults, so a file
//! listing only markets is a complete configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::model::{CatError, Market};
use crate::regions::{find_region_by_abbr, is_valid_county_fips};

pub const DEFAULT_CONFIG_PATH: &str = "catmon.toml";
pub const CONFIG_PATH_ENV: &str = "CATMON_CONFIG";
pub const WEBHOOK_URL_ENV: &str = "ALERT_WEBHOOK_URL";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// CAT classification thresholds. A county is flagged when ANY is met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatThresholds {
    /// ENH (level 4) or higher.
    pub categorical_min: u8,
    pub hail_prob_min: u8,
    pub tornado_prob_min: u8,
    pub wind_prob_min: u8,
}

impl Default for CatThresholds {
    fn default() -> Self {
        Self {
            categorical_min: 4,
            hail_prob_min: 15,
            tornado_prob_min: 5,
            wind_prob_min: 15,
        }
    }
}

/// Longest demand window offset accepted, in days after the storm.
pub const MAX_WINDOW_DAYS: i64 = 365;

/// Offsets (days after the storm) bounding expected service demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DemandSettings {
    pub window_start_days: i64,
    pub window_end_days: i64,
}

impl Default for DemandSettings {
    fn default() -> Self {
        Self {
            window_start_days: 14,
            window_end_days: 28,
        }
    }
}

impl DemandSettings {
    /// Windows must start after the storm and end after they start.
    pub fn validate(&self) -> Result<(), CatError> {
        if self.window_start_days <= 0 {
            return Err(CatError::Config(format!(
                "demand.window_start_days must be positive, got {}",
                self.window_start_days
            )));
        }
        if self.window_end_days > MAX_WINDOW_DAYS {
            return Err(CatError::Config(format!(
                "demand.window_end_days ({}) must be at most {}",
                self.window_end_days, MAX_WINDOW_DAYS
            )));
        }
        if self.window_end_days <= self.window_start_days {
            return Err(CatError::Config(format!(
                "demand.window_end_days ({}) must exceed window_start_days ({})",
                self.window_end_days, self.window_start_days
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    /// County boundaries are ~25 MB; they get a longer budget.
    pub download_timeout_secs: u64,
    pub retry_delay_secs: u64,
    /// NWS requires an identifying User-Agent.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            download_timeout_secs: 120,
            retry_delay_secs: 2,
            user_agent: "catmon_service (ops@example.com)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub county_cache: PathBuf,
    pub alert_state: PathBuf,
    pub log_file: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            county_cache: PathBuf::from("data/us_counties.geojson"),
            alert_state: PathBuf::from("data/alert_state.json"),
            log_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FreshnessSettings {
    /// Outlook data older than this is logged as stale.
    pub max_age_minutes: u64,
}

impl Default for FreshnessSettings {
    fn default() -> Self {
        Self { max_age_minutes: 360 }
    }
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub thresholds: CatThresholds,
    #[serde(default)]
    pub demand: DemandSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub freshness: FreshnessSettings,
    #[serde(default)]
    pub markets: Vec<Market>,
}

impl AppConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, CatError> {
        let mut config: AppConfig =
            toml::from_str(text).map_err(|e| CatError::Config(e.to_string()))?;
        config.validate()?;
        canonicalize_states(&mut config.markets);
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CatError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CatError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads from `$CATMON_CONFIG`, falling back to `catmon.toml`.
    pub fn load_from_env() -> Result<Self, CatError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), CatError> {
        self.demand.validate()?;
        validate_markets(&self.markets)
    }

    /// Webhook target for escalation alerts, if configured.
    pub fn webhook_url() -> Option<String> {
        std::env::var(WEBHOOK_URL_ENV).ok().filter(|url| !url.trim().is_empty())
    }
}

/// Market definitions must be unambiguous: unique short names, well-formed
/// county codes, known regions.
pub fn validate_markets(markets: &[Market]) -> Result<(), CatError> {
    let mut short_names = HashSet::new();
    for market in markets {
        if !short_names.insert(market.short_name.as_str()) {
            return Err(CatError::Config(format!(
                "duplicate market short_name '{}'",
                market.short_name
            )));
        }
        if market.fips_codes.is_empty() {
            return Err(CatError::Config(format!(
                "market '{}' has no counties",
                market.short_name
            )));
        }
        if let Some(bad) = market.fips_codes.iter().find(|f| !is_valid_county_fips(f)) {
            return Err(CatError::Config(format!(
                "market '{}' has malformed county FIPS '{}'",
                market.short_name, bad
            )));
        }
        if market.states.is_empty() {
            return Err(CatError::Config(format!(
                "market '{}' has no states",
                market.short_name
            )));
        }
        if let Some(bad) = market.states.iter().find(|s| find_region_by_abbr(s).is_none()) {
            return Err(CatError::Config(format!(
                "market '{}' references unknown state '{}'",
                market.short_name, bad
            )));
        }
    }
    Ok(())
}

/// Rewrites market states to the registry abbreviation (`" ok"` -> `"OK"`),
/// the form alert lookups are keyed by. Unknown states are left as-is.
pub fn canonicalize_states(markets: &mut [Market]) {
    for state in markets.iter_mut().flat_map(|m| m.states.iter_mut()) {
        if let Some(region) = find_region_by_abbr(state) {
            *state = region.abbr.to_string();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
