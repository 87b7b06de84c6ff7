/// State registry for the CAT monitoring service.
///
/// Canonical list of CONUS states (plus DC) keyed by 2-digit state FIPS.
/// County FIPS codes carry their state in the first two digits, so this is
/// the single source of truth for turning a county into a region and for
/// deciding which boundary features are in scope.

// ---------------------------------------------------------------------------
// Region metadata
// ---------------------------------------------------------------------------

/// A US state (or DC) covered by SPC convective outlooks.
#[derive(Debug)]
pub struct Region {
    /// 2-digit state FIPS.
    pub fips: &'static str,
    /// USPS abbreviation, also the NWS alerts `area` parameter.
    pub abbr: &'static str,
}

/// All CONUS regions, ordered by FIPS.
pub static REGION_REGISTRY: &[Region] = &[
    Region { fips: "01", abbr: "AL" },
    Region { fips: "04", abbr: "AZ" },
    Region { fips: "05", abbr: "AR" },
    Region { fips: "06", abbr: "CA" },
    Region { fips: "08", abbr: "CO" },
    Region { fips: "09", abbr: "CT" },
    Region { fips: "10", abbr: "DE" },
    Region { fips: "11", abbr: "DC" },
    Region { fips: "12", abbr: "FL" },
    Region { fips: "13", abbr: "GA" },
    Region { fips: "16", abbr: "ID" },
    Region { fips: "17", abbr: "IL" },
    Region { fips: "18", abbr: "IN" },
    Region { fips: "19", abbr: "IA" },
    Region { fips: "20", abbr: "KS" },
    Region { fips: "21", abbr: "KY" },
    Region { fips: "22", abbr: "LA" },
    Region { fips: "23", abbr: "ME" },
    Region { fips: "24", abbr: "MD" },
    Region { fips: "25", abbr: "MA" },
    Region { fips: "26", abbr: "MI" },
    Region { fips: "27", abbr: "MN" },
    Region { fips: "28", abbr: "MS" },
    Region { fips: "29", abbr: "MO" },
    Region { fips: "30", abbr: "MT" },
    Region { fips: "31", abbr: "NE" },
    Region { fips: "32", abbr: "NV" },
    Region { fips: "33", abbr: "NH" },
    Region { fips: "34", abbr: "NJ" },
    Region { fips: "35", abbr: "NM" },
    Region { fips: "36", abbr: "NY" },
    Region { fips: "37", abbr: "NC" },
    Region { fips: "38", abbr: "ND" },
    Region { fips: "39", abbr: "OH" },
    Region { fips: "40", abbr: "OK" },
    Region { fips: "41", abbr: "OR" },
    Region { fips: "42", abbr: "PA" },
    Region { fips: "44", abbr: "RI" },
    Region { fips: "45", abbr: "SC" },
    Region { fips: "46", abbr: "SD" },
    Region { fips: "47", abbr: "TN" },
    Region { fips: "48", abbr: "TX" },
    Region { fips: "49", abbr: "UT" },
    Region { fips: "50", abbr: "VT" },
    Region { fips: "51", abbr: "VA" },
    Region { fips: "53", abbr: "WA" },
    Region { fips: "54", abbr: "WV" },
    Region { fips: "55", abbr: "WI" },
    Region { fips: "56", abbr: "WY" },
];

/// Alaska, Hawaii, and territories. SPC outlooks do not cover them.
pub static NON_CONUS_FIPS: &[&str] = &["02", "15", "60", "66", "69", "72", "78"];

/// Looks up a region by 2-digit state FIPS. Returns `None` if not found.
pub fn find_region_by_fips(state_fips: &str) -> Option<&'static Region> {
    REGION_REGISTRY.iter().find(|r| r.fips == state_fips)
}

/// Looks up a region by abbreviation (case-insensitive).
pub fn find_region_by_abbr(abbr: &str) -> Option<&'static Region> {
    REGION_REGISTRY
        .iter()
        .find(|r| r.abbr.eq_ignore_ascii_case(abbr.trim()))
}

pub fn is_conus_fips(state_fips: &str) -> bool {
    !NON_CONUS_FIPS.contains(&state_fips) && find_region_by_fips(state_fips).is_some()
}

/// County FIPS codes are exactly five ASCII digits.
pub fn is_valid_county_fips(fips: &str) -> bool {
    fips.len() == 5 && fips.chars().all(|c| c.is_ascii_digit())
}

/// Zero-pads a numeric county id to five digits. Returns `None` for
/// anything that is not 1-5 ASCII digits.
pub fn normalize_county_fips(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.len() > 5 || !raw.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>5}", raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_region_fips_are_two_digits() {
        for region in REGION_REGISTRY {
            assert_eq!(region.fips.len(), 2, "FIPS for '{}' should be 2 digits", region.abbr);
            assert!(
                region.fips.chars().all(|c| c.is_ascii_digit()),
                "FIPS for '{}' should be numeric, got '{}'",
                region.abbr,
                region.fips
            );
        }
    }

    #[test]
    fn test_no_duplicate_fips_or_abbreviations() {
        let mut fips = std::collections::HashSet::new();
        let mut abbrs = std::collections::HashSet::new();
        for region in REGION_REGISTRY {
            assert!(fips.insert(region.fips), "duplicate FIPS '{}'", region.fips);
            assert!(abbrs.insert(region.abbr), "duplicate abbreviation '{}'", region.abbr);
        }
    }

    #[test]
    fn test_registry_covers_lower_48_plus_dc() {
        assert_eq!(REGION_REGISTRY.len(), 49);
    }

    #[test]
    fn test_non_conus_prefixes_are_not_in_registry() {
        for prefix in NON_CONUS_FIPS {
            assert!(
                find_region_by_fips(prefix).is_none(),
                "non-CONUS prefix '{}' must not resolve to a region",
                prefix
            );
            assert!(!is_conus_fips(prefix));
        }
    }

    #[test]
    fn test_find_region_returns_correct_entry() {
        assert_eq!(find_region_by_fips("48").map(|r| r.abbr), Some("TX"));
        assert_eq!(find_region_by_abbr("ok").map(|r| r.fips), Some("40"));
        assert!(find_region_by_fips("99").is_none());
        assert!(find_region_by_abbr("XX").is_none());
    }

    #[test]
    fn test_county_fips_validation() {
        assert!(is_valid_county_fips("48113"));
        assert!(!is_valid_county_fips("4811"));
        assert!(!is_valid_county_fips("481130"));
        assert!(!is_valid_county_fips("48a13"));
    }

    #[test]
    fn test_normalize_county_fips_zero_pads() {
        assert_eq!(normalize_county_fips("1001"), Some("01001".to_string()));
        assert_eq!(normalize_county_fips("48113"), Some("48113".to_string()));
        assert_eq!(normalize_county_fips(""), None);
        assert_eq!(normalize_county_fips("123456"), None);
        assert_eq!(normalize_county_fips("12-45"), None);
    }
}
