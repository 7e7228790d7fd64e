use serde::{Deserialize, Serialize};

use crate::normalize::{normalize_postcode, normalize_sector};

pub const POSTCODE_COLUMN: &str = "POSTCODE";
pub const SECTOR_COLUMN: &str = "POLYGON_SECTOR";
pub const HUB_ID_COLUMN: &str = "HUB_ID";

/// Raw row of the polygon sectors CSV (headers already normalized)
#[derive(Debug, Deserialize)]
pub struct PolygonRow {
    #[serde(rename = "POSTCODE", default)]
    pub postcode: Option<String>,
    #[serde(rename = "POLYGON_SECTOR", default)]
    pub sector: Option<String>,
}

/// Raw row of the unserviceable users CSV (headers already normalized)
#[derive(Debug, Deserialize)]
pub struct UnserviceableRow {
    #[serde(rename = "POLYGON_SECTOR", default)]
    pub sector: Option<String>,
    #[serde(rename = "HUB_ID", default)]
    pub hub_id: Option<String>,
}

/// Postcode to sector mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonEntry {
    pub postcode: String,
    pub sector: String,
}

/// A user who asked for delivery in a sector we do not serve yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnserviceableUser {
    pub sector: String,
    pub hub_id: Option<i64>,
}

impl PolygonRow {
    /// Normalized entry, or `None` when either key is blank
    pub fn to_entry(&self) -> Option<PolygonEntry> {
        let postcode = normalize_postcode(self.postcode.as_deref())?;
        let sector = normalize_sector(self.sector.as_deref()?);
        if sector.is_empty() {
            return None;
        }
        Some(PolygonEntry { postcode, sector })
    }
}

impl UnserviceableRow {
    pub fn to_user(&self) -> Option<UnserviceableUser> {
        let sector = normalize_sector(self.sector.as_deref()?);
        if sector.is_empty() {
            return None;
        }
        Some(UnserviceableUser {
            sector,
            hub_id: self.hub_id.as_deref().and_then(parse_hub_id),
        })
    }
}

/// Parse a hub id cell. Dataframe exports write integer columns with gaps as
/// floats, so `25.0` is accepted as 25.
pub fn parse_hub_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(id) = raw.parse::<i64>() {
        return Some(id);
    }
    match raw.parse::<f64>() {
        // i64::MAX as f64 rounds up to 2^63, which is out of range
        Ok(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
            Some(f as i64)
        }
        _ => None,
    }
}
