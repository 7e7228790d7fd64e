//! Normalization for postcodes, join keys and CSV headers

/// Normalize a raw postcode: trim, drop every whitespace character, uppercase.
///
/// Returns `None` when no input was given or nothing is left after stripping.
pub fn normalize_postcode(raw: Option<&str>) -> Option<String> {
    let normalized = strip_whitespace_upper(raw?);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Normalize a sector key: trim and uppercase, inner spacing kept.
pub fn normalize_sector(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Normalize a CSV column name
pub fn normalize_header(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn strip_whitespace_upper(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postcode_spacing_and_case() {
        assert_eq!(normalize_postcode(Some(" ab1 2cd ")), Some("AB12CD".to_string()));
        assert_eq!(normalize_postcode(Some("sw1a\t1aa")), Some("SW1A1AA".to_string()));
    }

    #[test]
    fn test_postcode_idempotent() {
        let once = normalize_postcode(Some(" ab1 2cd ")).unwrap();
        let twice = normalize_postcode(Some(&once)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_postcode_absent_or_blank() {
        assert_eq!(normalize_postcode(None), None);
        assert_eq!(normalize_postcode(Some("")), None);
        assert_eq!(normalize_postcode(Some("   ")), None);
    }

    #[test]
    fn test_sector_and_header() {
        assert_eq!(normalize_sector(" leeds north "), "LEEDS NORTH");
        assert_eq!(normalize_header(" polygon_sector"), "POLYGON_SECTOR");
    }
}
