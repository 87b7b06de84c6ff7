/// Core data types for the severe-weather CAT monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// outlook polygons, counties, merged county risk, per-day classification
/// results, market results, demand windows, escalation records, and the
/// error types. It holds no I/O.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use geo::{MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Forecast days
// ---------------------------------------------------------------------------

/// SPC publishes outlooks for days 1 through 8.
pub const FIRST_FORECAST_DAY: u8 = 1;
pub const LAST_FORECAST_DAY: u8 = 8;

/// Every forecast day key, in order. Outlook sets always carry all of them.
pub fn forecast_days() -> std::ops::RangeInclusive<u8> {
    FIRST_FORECAST_DAY..=LAST_FORECAST_DAY
}

// ---------------------------------------------------------------------------
// Categorical levels
// ---------------------------------------------------------------------------

/// Highest categorical level (HIGH).
pub const MAX_CATEGORICAL_LEVEL: u8 = 6;

/// Maps an SPC categorical label (case-insensitive) to its ordinal level.
pub fn categorical_level_from_label(label: &str) -> Option<u8> {
    match label.trim().to_ascii_uppercase().as_str() {
        "TSTM" => Some(1),
        "MRGL" => Some(2),
        "SLGT" => Some(3),
        "ENH" => Some(4),
        "MDT" => Some(5),
        "HIGH" => Some(6),
        _ => None,
    }
}

/// Display name for a categorical level.
pub fn risk_name(level: u8) -> &'static str {
    match level {
        0 => "NONE",
        1 => "TSTM",
        2 => "MARGINAL",
        3 => "SLIGHT",
        4 => "ENHANCED",
        5 => "MODERATE",
        6 => "HIGH",
        _ => "UNKNOWN",
    }
}

// ---------------------------------------------------------------------------
// Outlook polygons
// ---------------------------------------------------------------------------

/// The outlook product a polygon came from. Each variant owns its merge rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HazardKind {
    Categorical,
    Hail,
    Tornado,
    Wind,
    /// Day 3-8 "any severe" probability, where hazards are not separated.
    CombinedProbability,
}

impl HazardKind {
    /// Folds `level` into `risk` with a max-merge on the field(s) this hazard
    /// owns. Commutative and idempotent.
    ///
    /// `CombinedProbability` raises both hail and wind. That double write is
    /// the long-standing "any severe" proxy and must stay until product
    /// decides otherwise.
    pub fn merge_into(self, risk: &mut CountyRisk, level: u8) {
        match self {
            HazardKind::Categorical => {
                let level = level.min(MAX_CATEGORICAL_LEVEL);
                risk.categorical_level = risk.categorical_level.max(level);
            }
            HazardKind::Hail => risk.hail_prob = risk.hail_prob.max(level),
            HazardKind::Tornado => risk.tornado_prob = risk.tornado_prob.max(level),
            HazardKind::Wind => risk.wind_prob = risk.wind_prob.max(level),
            HazardKind::CombinedProbability => {
                risk.hail_prob = risk.hail_prob.max(level);
                risk.wind_prob = risk.wind_prob.max(level);
            }
        }
    }

    /// Whether labels for this product are probabilities rather than
    /// categorical names.
    pub fn is_probabilistic(self) -> bool {
        !matches!(self, HazardKind::Categorical)
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HazardKind::Categorical => write!(f, "categorical"),
            HazardKind::Hail => write!(f, "hail"),
            HazardKind::Tornado => write!(f, "tornado"),
            HazardKind::Wind => write!(f, "wind"),
            HazardKind::CombinedProbability => write!(f, "probabilistic"),
        }
    }
}

/// Polygonal area of an outlook feature.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskGeometry {
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl RiskGeometry {
    /// Single-polygon parts. Containment is tested per part.
    pub fn parts(&self) -> &[Polygon<f64>] {
        match self {
            RiskGeometry::Polygon(poly) => std::slice::from_ref(poly),
            RiskGeometry::MultiPolygon(multi) => &multi.0,
        }
    }
}

/// A single risk area from an SPC outlook. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskPolygon {
    pub geometry: RiskGeometry,
    pub day: u8,
    pub hazard: HazardKind,
    /// Raw LABEL from the GeoJSON feature, e.g. "ENH", "0.15", "SIGN".
    pub label: String,
    /// 0-6 for categorical; integer percent for probability products.
    pub risk_level: u8,
    /// Hatched "significant severe" overlay. Not an ordinal level.
    pub significant: bool,
}

/// Outlook polygons for one forecast day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayOutlook {
    pub polygons: Vec<RiskPolygon>,
    pub availability: DataAvailability,
}

/// Outlook polygons keyed by forecast day. Every day 1-8 is always present
/// so that "nothing issued" and "not fetched" stay distinguishable.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlookSet {
    days: BTreeMap<u8, DayOutlook>,
}

impl Default for OutlookSet {
    fn default() -> Self {
        Self::new()
    }
}

impl OutlookSet {
    /// All days present, empty, and not yet scanned.
    pub fn new() -> Self {
        let days = forecast_days()
            .map(|day| {
                (
                    day,
                    DayOutlook {
                        polygons: Vec::new(),
                        availability: DataAvailability::Unknown,
                    },
                )
            })
            .collect();
        Self { days }
    }

    /// Records a successful fetch for `day`, even if it yielded no polygons.
    /// Days outside 1-8 are ignored.
    pub fn record_fetch(&mut self, day: u8, polygons: Vec<RiskPolygon>) {
        if let Some(outlook) = self.days.get_mut(&day) {
            outlook.availability = DataAvailability::Scanned;
            outlook.polygons.extend(polygons);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &DayOutlook)> {
        self.days.iter().map(|(day, outlook)| (*day, outlook))
    }

    pub fn availability(&self, day: u8) -> DataAvailability {
        self.days
            .get(&day)
            .map(|o| o.availability)
            .unwrap_or(DataAvailability::Unknown)
    }

    pub fn any_scanned(&self) -> bool {
        self.days.values().any(|o| o.availability.is_available())
    }

    pub fn polygon_count(&self) -> usize {
        self.days.values().map(|o| o.polygons.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Counties
// ---------------------------------------------------------------------------

/// A CONUS county with the single point used for containment tests.
#[derive(Debug, Clone, PartialEq)]
pub struct County {
    /// 5-digit zero-padded FIPS code.
    pub fips: String,
    pub name: String,
    /// 2-digit state FIPS.
    pub state_fips: String,
    /// "TX", "OK", etc.
    pub state_abbr: String,
    /// Representative interior point (lon, lat).
    pub point: Point<f64>,
}

/// Risk for one county on one day, accumulated over every polygon hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CountyRisk {
    pub county: County,
    pub day: u8,
    /// 0-6, max across merges.
    pub categorical_level: u8,
    pub hail_prob: u8,
    pub tornado_prob: u8,
    pub wind_prob: u8,
    /// Sticky once set.
    pub significant: bool,
}

impl CountyRisk {
    pub fn new(county: County, day: u8) -> Self {
        Self {
            county,
            day,
            categorical_level: 0,
            hail_prob: 0,
            tornado_prob: 0,
            wind_prob: 0,
            significant: false,
        }
    }

    /// Canonical ranking tuple. Higher sorts first everywhere downstream.
    pub fn ranking_key(&self) -> (u8, u8, u8, u8, bool) {
        (
            self.categorical_level,
            self.hail_prob,
            self.tornado_prob,
            self.wind_prob,
            self.significant,
        )
    }
}

// ---------------------------------------------------------------------------
// Classification results
// ---------------------------------------------------------------------------

/// Whether a forecast day could be scanned at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataAvailability {
    /// At least one outlook product for the day was fetched.
    Scanned,
    /// Every fetch for the day failed; absence of risk means nothing.
    Unknown,
}

impl DataAvailability {
    pub fn is_available(self) -> bool {
        matches!(self, DataAvailability::Scanned)
    }
}

/// Flagged counties of one state (region) on one day.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSummary {
    pub count: usize,
    pub highest_risk: u8,
    /// Ranked by `CountyRisk::ranking_key`, highest first.
    pub county_risks: Vec<CountyRisk>,
}

/// Classified results for a single forecast day.
#[derive(Debug, Clone, PartialEq)]
pub struct DayResult {
    pub day: u8,
    /// Counties meeting at least one CAT threshold, ranked.
    pub county_risks: Vec<CountyRisk>,
    /// state_abbr -> rollup of the flagged set.
    pub region_summaries: BTreeMap<String, RegionSummary>,
    pub availability: DataAvailability,
}

impl DayResult {
    /// Scanned and nothing met a threshold.
    pub fn is_clear(&self) -> bool {
        self.availability.is_available() && self.county_risks.is_empty()
    }

    /// Could not be scanned.
    pub fn is_unknown(&self) -> bool {
        !self.availability.is_available()
    }
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

/// A named service market: a fixed set of member counties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub name: String,
    pub short_name: String,
    pub fips_codes: Vec<String>,
    /// State abbreviations the market spans, used for alert lookups.
    pub states: Vec<String>,
    #[serde(default)]
    pub owner: Option<String>,
}

/// Risk assessment for a single market on a single day.
///
/// Only exists when at least one member county is flagged that day.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketResult {
    pub market: Market,
    pub day: u8,
    pub highest_risk: u8,
    pub affected_counties: usize,
    pub total_counties: usize,
    pub max_hail: u8,
    pub max_tornado: u8,
    pub max_wind: u8,
    pub significant: bool,
    pub county_risks: Vec<CountyRisk>,
}

/// day -> markets with risk that day. Sparse: quiet markets are absent.
pub type MarketResults = BTreeMap<u8, Vec<MarketResult>>;

/// Projected service-demand window for a market after a storm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandWindow {
    pub market: Market,
    pub storm_date: NaiveDate,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    /// Earliest forecast day (1-8) the market appeared on.
    pub trigger_day: u8,
    /// Max categorical level across every day the market appeared on.
    pub highest_risk: u8,
}

// ---------------------------------------------------------------------------
// Active alert evidence
// ---------------------------------------------------------------------------

/// One active NWS alert, deserialized from a feature's `properties`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAlert {
    /// e.g. "Tornado Warning"
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub urgency: String,
    /// "Observed", "Likely", "Possible"
    #[serde(default)]
    pub certainty: String,
    #[serde(default, rename = "areaDesc")]
    pub area_desc: String,
    #[serde(default)]
    pub onset: Option<String>,
    #[serde(default)]
    pub expires: Option<String>,
}

impl ActiveAlert {
    /// Observed certainty or a Warning-class event means the storm is
    /// happening, not just forecast.
    pub fn is_confirmed(&self) -> bool {
        self.certainty == "Observed" || self.event.contains("Warning")
    }
}

// ---------------------------------------------------------------------------
// Escalation records
// ---------------------------------------------------------------------------

/// Alert escalation levels, in ascending order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    None,
    HeadsUp,
    PlanForIt,
    ItHappened,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::None => write!(f, "none"),
            AlertLevel::HeadsUp => write!(f, "heads_up"),
            AlertLevel::PlanForIt => write!(f, "plan_for_it"),
            AlertLevel::ItHappened => write!(f, "it_happened"),
        }
    }
}

/// Storm episode identity used for dedup: (scan date, forecast day).
///
/// Serialized as `YYYY-MM-DD-dayN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EpisodeId {
    pub scan_date: NaiveDate,
    pub day: u8,
}

impl EpisodeId {
    pub fn new(scan_date: NaiveDate, day: u8) -> Self {
        Self { scan_date, day }
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-day{}", self.scan_date.format("%Y-%m-%d"), self.day)
    }
}

impl FromStr for EpisodeId {
    type Err = EpisodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (date, day) = s
            .rsplit_once("-day")
            .ok_or_else(|| EpisodeIdError(s.to_string()))?;
        let scan_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| EpisodeIdError(s.to_string()))?;
        let day = day.parse::<u8>().map_err(|_| EpisodeIdError(s.to_string()))?;
        Ok(Self { scan_date, day })
    }
}

impl TryFrom<String> for EpisodeId {
    type Error = EpisodeIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EpisodeId> for String {
    fn from(id: EpisodeId) -> Self {
        id.to_string()
    }
}

/// Last alert delivered for a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub last_level: AlertLevel,
    pub episode_id: EpisodeId,
    pub sent_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from fetching, parsing, configuring, or persisting.
#[derive(Debug, Error)]
pub enum CatError {
    /// Transport-level failure (timeout, connection refused, TLS).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-2xx response.
    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Download exceeded {limit} byte limit")]
    DownloadTooLarge { limit: u64 },
    #[error("Alert state error: {0}")]
    State(#[from] StateError),
}

/// A polygon or county shape that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("polygon exterior ring is empty")]
    EmptyRing,
    #[error("polygon ring has {0} vertices, need at least 4")]
    TooFewVertices(usize),
    #[error("geometry contains a non-finite coordinate")]
    NonFiniteCoordinate,
    #[error("unsupported geometry type: {0}")]
    Unsupported(String),
}

/// Durable alert-state failures. Surfaced to the caller, never retried.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("atomic replace of state file failed: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Notification delivery failures.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("delivery rejected with HTTP {0}")]
    Status(u16),
    #[error("delivery rate limited (retry after {0}s)")]
    RateLimited(u64),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid episode id: {0}")]
pub struct EpisodeIdError(pub String);

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
