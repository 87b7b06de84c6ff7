/// County boundary catalog.
///
/// US county polygons come from a public GeoJSON keyed by 5-digit FIPS
/// (~25 MB). The file is cached on disk and downloaded only when the cache
/// is missing or fails to parse. Each county is reduced to one
/// representative point: an interior point, which unlike a centroid always
/// lies inside the shape.

use std::io::Read;
use std::path::Path;

use geo::{Geometry, InteriorPoint, Point};
use geojson::feature::Id;
use geojson::{Feature, GeoJson};
use reqwest::blocking::Client;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::logging::{log_fetch_failure, DataSource};
use crate::model::{CatError, County};
use crate::regions::{find_region_by_abbr, find_region_by_fips, is_conus_fips, normalize_county_fips};

pub const COUNTY_GEOJSON_URL: &str =
    "https://raw.githubusercontent.com/plotly/datasets/master/geojson-counties-fips.json";

/// Refuse county downloads larger than this.
pub const MAX_DOWNLOAD_BYTES: u64 = 50 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Loads the county catalog from `cache_path`, downloading it first when
/// absent and re-downloading once when the cached copy is corrupt.
pub fn load_counties(client: &Client, cache_path: &Path) -> Result<Vec<County>, CatError> {
    load_counties_with(cache_path, |dest| {
        download_counties(client, COUNTY_GEOJSON_URL, dest)
            .map(|_| ())
            .inspect_err(|e| log_fetch_failure(DataSource::Counties, COUNTY_GEOJSON_URL, "county download", e))
    })
}

/// `load_counties` with the download step supplied by the caller.
pub fn load_counties_with<F>(cache_path: &Path, mut download: F) -> Result<Vec<County>, CatError>
where
    F: FnMut(&Path) -> Result<(), CatError>,
{
    if !cache_path.exists() {
        info!(path = %cache_path.display(), "county cache missing, downloading");
        download(cache_path)?;
    }

    match read_counties(cache_path) {
        Ok(counties) => Ok(counties),
        Err(e) => {
            warn!(path = %cache_path.display(), "county cache corrupt ({}), re-downloading", e);
            std::fs::remove_file(cache_path)?;
            download(cache_path)?;
            read_counties(cache_path)
        }
    }
}

fn read_counties(path: &Path) -> Result<Vec<County>, CatError> {
    let text = std::fs::read_to_string(path)?;
    parse_counties(&text)
}

/// Streams `url` into `dest` through a temp file in the same directory,
/// failing if the body exceeds `MAX_DOWNLOAD_BYTES`. Returns bytes written.
pub fn download_counties(client: &Client, url: &str, dest: &Path) -> Result<u64, CatError> {
    let response = client.get(url).send()?;
    let status = response.status();
    if !status.is_success() {
        return Err(CatError::HttpStatus { status: status.as_u16(), url: url.to_string() });
    }
    if response.content_length().is_some_and(|len| len > MAX_DOWNLOAD_BYTES) {
        return Err(CatError::DownloadTooLarge { limit: MAX_DOWNLOAD_BYTES });
    }

    let dir = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    let mut limited = response.take(MAX_DOWNLOAD_BYTES + 1);
    let written = std::io::copy(&mut limited, &mut tmp)?;
    if written > MAX_DOWNLOAD_BYTES {
        // tmp is removed on drop
        return Err(CatError::DownloadTooLarge { limit: MAX_DOWNLOAD_BYTES });
    }
    tmp.persist(dest).map_err(|e| CatError::Io(e.error))?;

    info!(bytes = written, path = %dest.display(), "county boundaries downloaded");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a county FeatureCollection. Features outside the CONUS, with an
/// unknown state, or without a usable shape are skipped.
pub fn parse_counties(text: &str) -> Result<Vec<County>, CatError> {
    let collection = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(collection) => collection,
        _ => return Err(CatError::Parse("county file is not a FeatureCollection".to_string())),
    };

    let total = collection.features.len();
    let counties: Vec<County> = collection.features.iter().filter_map(parse_county).collect();

    let skipped = total - counties.len();
    if skipped > 0 {
        debug!(skipped, "skipped non-CONUS or invalid county features");
    }
    info!(counties = counties.len(), "county catalog loaded");
    Ok(counties)
}

/// One county, or `None` when the feature is out of scope or unusable.
pub fn parse_county(feature: &Feature) -> Option<County> {
    let raw_id = match feature.id.as_ref()? {
        Id::String(s) => s.clone(),
        Id::Number(n) => n.to_string(),
    };
    let fips = normalize_county_fips(&raw_id)?;
    let state_fips = &fips[..2];
    if !is_conus_fips(state_fips) {
        return None;
    }
    let region = find_region_by_fips(state_fips)?;

    let geometry = Geometry::<f64>::try_from(feature.geometry.as_ref()?.value.clone()).ok()?;
    let Some(point) = representative_point(&geometry) else {
        debug!(fips = %fips, "county shape has no interior point");
        return None;
    };

    let name = feature
        .property("NAME")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("County {}", fips));

    Some(County {
        state_fips: state_fips.to_string(),
        fips,
        name,
        state_abbr: region.abbr.to_string(),
        point,
    })
}

/// Interior point of a polygonal county shape.
pub fn representative_point(geometry: &Geometry<f64>) -> Option<Point<f64>> {
    match geometry {
        Geometry::Polygon(p) => p.interior_point(),
        Geometry::MultiPolygon(mp) => mp.interior_point(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Region filter
// ---------------------------------------------------------------------------

/// Counties whose region abbreviation is in `regions` (case-insensitive).
/// Unknown abbreviations are logged and ignored.
pub fn filter_by_regions(counties: &[County], regions: &[String]) -> Vec<County> {
    let wanted: Vec<&str> = regions
        .iter()
        .filter_map(|abbr| match find_region_by_abbr(abbr) {
            Some(region) => Some(region.abbr),
            None => {
                warn!(region = %abbr, "unknown region in filter");
                None
            }
        })
        .collect();

    counties
        .iter()
        .filter(|c| wanted.contains(&c.state_abbr.as_str()))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, polygon};

    /// Dallas (square), Alaska (skipped), a numeric-id Oklahoma county,
    /// a point geometry (skipped), and an unknown state (skipped).
    const COUNTIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": "48113", "properties": {"NAME": "Dallas"},
             "geometry": {"type": "Polygon", "coordinates": [[[-97.0,32.5],[-96.5,32.5],[-96.5,33.0],[-97.0,33.0],[-97.0,32.5]]]}},
            {"type": "Feature", "id": "02020", "properties": {"NAME": "Anchorage"},
             "geometry": {"type": "Polygon", "coordinates": [[[-150,61],[-149,61],[-149,62],[-150,61]]]}},
            {"type": "Feature", "id": 40109, "properties": {},
             "geometry": {"type": "MultiPolygon", "coordinates": [[[[-97.7,35.3],[-97.1,35.3],[-97.1,35.7],[-97.7,35.7],[-97.7,35.3]]]]}},
            {"type": "Feature", "id": "48201", "properties": {"NAME": "Harris"},
             "geometry": {"type": "Point", "coordinates": [-95.4, 29.8]}},
            {"type": "Feature", "id": "99001", "properties": {"NAME": "Nowhere"},
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}}
        ]
    }"#;

    #[test]
    fn test_parse_keeps_only_conus_polygonal_counties() {
        let counties = parse_counties(COUNTIES).expect("valid county file");
        let fips: Vec<_> = counties.iter().map(|c| c.fips.as_str()).collect();
        assert_eq!(fips, vec!["48113", "40109"]);
    }

    #[test]
    fn test_county_fields() {
        let counties = parse_counties(COUNTIES).unwrap();
        let dallas = &counties[0];
        assert_eq!(dallas.name, "Dallas");
        assert_eq!((dallas.state_fips.as_str(), dallas.state_abbr.as_str()), ("48", "TX"));

        let oklahoma = &counties[1];
        assert_eq!(oklahoma.name, "County 40109", "missing NAME falls back to the FIPS");
        assert_eq!(oklahoma.state_abbr, "OK");
    }

    #[test]
    fn test_representative_point_lies_inside_shape() {
        let square = polygon![(x: -97.0, y: 32.5), (x: -96.5, y: 32.5), (x: -96.5, y: 33.0), (x: -97.0, y: 33.0)];
        let point = representative_point(&Geometry::Polygon(square.clone())).unwrap();
        assert!(square.contains(&point));
        assert_eq!(representative_point(&Geometry::Point(Point::new(0.0, 0.0))), None);
    }

    #[test]
    fn test_filter_by_regions() {
        let counties = parse_counties(COUNTIES).unwrap();
        let ok_only = filter_by_regions(&counties, &["ok".to_string(), "ZZ".to_string()]);
        assert_eq!(ok_only.len(), 1);
        assert_eq!(ok_only[0].fips, "40109");
        assert!(filter_by_regions(&counties, &[]).is_empty());
    }

    #[test]
    fn test_missing_cache_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("us_counties.geojson");
        let mut downloads = 0;
        let counties = load_counties_with(&cache, |dest| {
            downloads += 1;
            std::fs::write(dest, COUNTIES)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(downloads, 1);
        assert_eq!(counties.len(), 2);
    }

    #[test]
    fn test_valid_cache_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("us_counties.geojson");
        std::fs::write(&cache, COUNTIES).unwrap();
        let counties = load_counties_with(&cache, |_| panic!("cache hit must not download")).unwrap();
        assert_eq!(counties.len(), 2);
    }

    #[test]
    fn test_corrupt_cache_is_replaced_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("us_counties.geojson");
        std::fs::write(&cache, "{\"type\": \"FeatureColl").unwrap();
        let mut downloads = 0;
        let counties = load_counties_with(&cache, |dest| {
            downloads += 1;
            std::fs::write(dest, COUNTIES)?;
            Ok(())
        })
        .unwrap();
        assert_eq!(downloads, 1);
        assert_eq!(counties.len(), 2);
    }

    #[test]
    fn test_still_corrupt_after_redownload_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("us_counties.geojson");
        std::fs::write(&cache, "garbage").unwrap();
        let result = load_counties_with(&cache, |dest| {
            std::fs::write(dest, "still garbage")?;
            Ok(())
        });
        assert!(result.is_err());
    }
}
