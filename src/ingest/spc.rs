/// SPC Convective Outlook Client
///
/// Retrieves the Storm Prediction Center's day 1-8 convective outlooks as
/// GeoJSON layers and turns each feature into a `RiskPolygon`.
///
/// Products: https://www.spc.noaa.gov/products/outlook/
///
/// Days 1-2 publish separate categorical, hail, tornado, and wind layers.
/// Day 3 publishes categorical plus a combined severe probability. Days 4-8
/// publish only the combined probability.

use std::time::Duration;

use chrono::{DateTime, Utc};
use geo::{MultiPolygon, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson};
use reqwest::blocking::Client;
use tracing::{debug, info};

use crate::alert::staleness;
use crate::logging::{log_fetch_failure, log_fetch_summary, DataSource};
use crate::model::{
    categorical_level_from_label, CatError, GeometryError, HazardKind, OutlookSet, RiskGeometry,
    RiskPolygon,
};

pub const SPC_BASE_URL: &str = "https://www.spc.noaa.gov/products/outlook";
pub const SPC_DAY48_BASE_URL: &str = "https://www.spc.noaa.gov/products/exper/day4-8";

/// Probabilities never exceed 100 percent.
const MAX_PROBABILITY: u8 = 100;

// ============================================================================
// Product table
// ============================================================================

/// One outlook layer to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlookProduct {
    pub day: u8,
    pub hazard: HazardKind,
    pub url: String,
}

fn layer_url(day: u8, suffix: &str) -> String {
    format!("{}/day{}otlk_{}.lyr.geojson", SPC_BASE_URL, day, suffix)
}

/// Every layer the scan fetches, in day order.
pub fn outlook_products() -> Vec<OutlookProduct> {
    let mut products = Vec::new();
    for day in 1..=2u8 {
        for (hazard, suffix) in [
            (HazardKind::Categorical, "cat"),
            (HazardKind::Hail, "hail"),
            (HazardKind::Tornado, "torn"),
            (HazardKind::Wind, "wind"),
        ] {
            products.push(OutlookProduct { day, hazard, url: layer_url(day, suffix) });
        }
    }
    products.push(OutlookProduct { day: 3, hazard: HazardKind::Categorical, url: layer_url(3, "cat") });
    products.push(OutlookProduct {
        day: 3,
        hazard: HazardKind::CombinedProbability,
        url: layer_url(3, "prob"),
    });
    for day in 4..=8u8 {
        products.push(OutlookProduct {
            day,
            hazard: HazardKind::CombinedProbability,
            url: format!("{}/day{}prob.lyr.geojson", SPC_DAY48_BASE_URL, day),
        });
    }
    products
}

// ============================================================================
// Fetching
// ============================================================================

/// Result of a full outlook fetch.
#[derive(Debug, Clone, Default)]
pub struct OutlookFetch {
    pub outlooks: OutlookSet,
    /// `Last-Modified` (or `Date`) of every layer that came back.
    pub freshness_headers: Vec<String>,
    pub attempted: usize,
    pub succeeded: usize,
}

impl OutlookFetch {
    /// Issue time of the newest layer seen.
    pub fn latest_update(&self) -> Option<DateTime<Utc>> {
        staleness::latest_update(self.freshness_headers.iter().map(String::as_str))
    }
}

/// Fetches and parses every outlook layer.
///
/// A failed layer is logged and skipped; its day stays `Unknown` unless
/// another layer for that day succeeds. Never fails as a whole.
pub fn fetch_outlooks(client: &Client, retry_delay: Duration) -> OutlookFetch {
    let mut fetch = OutlookFetch::default();

    for product in outlook_products() {
        fetch.attempted += 1;
        match fetch_layer(client, &product, retry_delay) {
            Ok((polygons, last_modified)) => {
                debug!(day = product.day, hazard = %product.hazard, polygons = polygons.len(), "outlook layer");
                fetch.succeeded += 1;
                fetch.outlooks.record_fetch(product.day, polygons);
                fetch.freshness_headers.extend(last_modified);
            }
            Err(e) => log_fetch_failure(
                DataSource::Spc,
                &product.url,
                &format!("day {} {} outlook", product.day, product.hazard),
                &e,
            ),
        }
    }

    log_fetch_summary(
        DataSource::Spc,
        fetch.attempted,
        fetch.succeeded,
        fetch.attempted - fetch.succeeded,
    );
    info!(polygons = fetch.outlooks.polygon_count(), "outlooks loaded");
    fetch
}

fn fetch_layer(
    client: &Client,
    product: &OutlookProduct,
    retry_delay: Duration,
) -> Result<(Vec<RiskPolygon>, Option<String>), CatError> {
    let fetched = super::get_with_retry(client, &product.url, None, retry_delay)?;
    let collection = parse_collection(&fetched.body)?;
    Ok((
        parse_features(&collection, product.day, product.hazard),
        fetched.last_modified,
    ))
}

// ============================================================================
// Parsing
// ============================================================================

/// Parses a GeoJSON document that must be a FeatureCollection.
pub fn parse_collection(text: &str) -> Result<FeatureCollection, CatError> {
    match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => Ok(collection),
        _ => Err(CatError::Parse("expected a GeoJSON FeatureCollection".to_string())),
    }
}

/// Every usable feature of `collection` as a risk polygon.
pub fn parse_features(collection: &FeatureCollection, day: u8, hazard: HazardKind) -> Vec<RiskPolygon> {
    collection
        .features
        .iter()
        .filter_map(|feature| parse_feature(feature, day, hazard))
        .collect()
}

/// Skips features with no geometry, no label, a non-polygonal shape, or a
/// label that maps to no level.
pub fn parse_feature(feature: &Feature, day: u8, hazard: HazardKind) -> Option<RiskPolygon> {
    let geometry = feature.geometry.as_ref()?;
    let label = feature_label(feature)?;

    let geometry = match to_risk_geometry(geometry) {
        Ok(g) => g,
        Err(e) => {
            debug!(day, %hazard, label = %label, "skipping feature: {}", e);
            return None;
        }
    };

    if is_significant_label(&label) {
        return Some(RiskPolygon { geometry, day, hazard, label, risk_level: 0, significant: true });
    }

    let risk_level = label_to_risk_level(&label, hazard)?;
    Some(RiskPolygon { geometry, day, hazard, label, risk_level, significant: false })
}

/// `LABEL`, falling back to `LABEL2`, trimmed. Numeric values are accepted.
pub fn feature_label(feature: &Feature) -> Option<String> {
    let value = feature
        .property("LABEL")
        .filter(|v| !v.is_null())
        .or_else(|| feature.property("LABEL2"))?;
    let label = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!label.is_empty()).then_some(label)
}

/// Hatched significant-severe overlay.
pub fn is_significant_label(label: &str) -> bool {
    matches!(label.to_ascii_uppercase().as_str(), "SIGN" | "SIG")
}

/// Normalized level for a label.
///
/// Categorical products use the TSTM..HIGH table. Probability products take
/// a fraction (`0.15` -> 15) or a whole percent (`15` -> 15); a non-numeric
/// probability label is tried against the categorical table. Zero and
/// negative values have no level.
pub fn label_to_risk_level(label: &str, hazard: HazardKind) -> Option<u8> {
    if !hazard.is_probabilistic() {
        return categorical_level_from_label(label);
    }

    let Ok(value) = label.trim().parse::<f64>() else {
        return categorical_level_from_label(label);
    };
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let percent = if value < 1.0 { (value * 100.0).round() } else { value.trunc() };
    Some(percent.min(f64::from(MAX_PROBABILITY)) as u8)
}

/// Converts a GeoJSON geometry into a polygon or multi-polygon.
pub fn to_risk_geometry(geometry: &geojson::Geometry) -> Result<RiskGeometry, GeometryError> {
    match &geometry.value {
        geojson::Value::Polygon(_) => Polygon::<f64>::try_from(geometry.value.clone())
            .map(RiskGeometry::Polygon)
            .map_err(|e| GeometryError::Unsupported(e.to_string())),
        geojson::Value::MultiPolygon(_) => MultiPolygon::<f64>::try_from(geometry.value.clone())
            .map(RiskGeometry::MultiPolygon)
            .map_err(|e| GeometryError::Unsupported(e.to_string())),
        other => Err(GeometryError::Unsupported(geometry_type_name(other).to_string())),
    }
}

pub(crate) fn geometry_type_name(value: &geojson::Value) -> &'static str {
    match value {
        geojson::Value::Point(_) => "Point",
        geojson::Value::MultiPoint(_) => "MultiPoint",
        geojson::Value::LineString(_) => "LineString",
        geojson::Value::MultiLineString(_) => "MultiLineString",
        geojson::Value::Polygon(_) => "Polygon",
        geojson::Value::MultiPolygon(_) => "MultiPolygon",
        geojson::Value::GeometryCollection(_) => "GeometryCollection",
    }
}

// ============================================================================
// Tests
// ============================================================================
