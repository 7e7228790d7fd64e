//! Reference data loading
//!
//! Downloads the polygon sector and unserviceable user CSVs, normalizes their
//! headers and key columns, and builds the in-memory lookup tables.

use chrono::{DateTime, Utc};
use csv::{ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SourcesConfig;
use crate::models::{
    PolygonEntry, PolygonRow, UnserviceableRow, UnserviceableUser, HUB_ID_COLUMN,
    POSTCODE_COLUMN, SECTOR_COLUMN,
};
use crate::normalize::normalize_header;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("fetching {origin}: {err}")]
    Http {
        origin: String,
        #[source]
        err: reqwest::Error,
    },

    #[error("fetching {origin}: HTTP {status}")]
    Status { origin: String, status: u16 },

    #[error("reading {origin}: {err}")]
    Io {
        origin: String,
        #[source]
        err: std::io::Error,
    },

    #[error("parsing {origin}: {err}")]
    Csv {
        origin: String,
        #[source]
        err: csv::Error,
    },

    #[error("{origin} returned an HTML page instead of CSV; large shared files need a direct download link")]
    HtmlPage { origin: String },

    #[error("{origin} has no {column} column")]
    MissingColumn { origin: String, column: &'static str },
}

/// Where a reference CSV comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    Path(PathBuf),
}

impl Source {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Source::Url(raw.to_string())
        } else {
            Source::Path(PathBuf::from(raw))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{}", url),
            Source::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Normalized reference tables, immutable once built
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    pub polygons: Vec<PolygonEntry>,
    pub unserviceable: Vec<UnserviceableUser>,
    /// Rows dropped for a blank key column, both sources combined
    pub skipped_rows: usize,
    pub loaded_at: DateTime<Utc>,
    sector_by_postcode: HashMap<String, usize>,
    users_by_sector: HashMap<String, Vec<usize>>,
    users_by_hub: HashMap<i64, usize>,
}

impl ReferenceTables {
    pub fn new(polygons: Vec<PolygonEntry>, unserviceable: Vec<UnserviceableUser>) -> Self {
        let mut sector_by_postcode = HashMap::with_capacity(polygons.len());
        for (i, entry) in polygons.iter().enumerate() {
            // First row wins for duplicated postcodes
            sector_by_postcode.entry(entry.postcode.clone()).or_insert(i);
        }

        let mut users_by_sector: HashMap<String, Vec<usize>> = HashMap::new();
        let mut users_by_hub: HashMap<i64, usize> = HashMap::new();
        for (i, user) in unserviceable.iter().enumerate() {
            users_by_sector.entry(user.sector.clone()).or_default().push(i);
            if let Some(hub_id) = user.hub_id {
                *users_by_hub.entry(hub_id).or_default() += 1;
            }
        }

        Self {
            polygons,
            unserviceable,
            skipped_rows: 0,
            loaded_at: Utc::now(),
            sector_by_postcode,
            users_by_sector,
            users_by_hub,
        }
    }

    /// Sector of a normalized postcode
    pub fn sector_for(&self, postcode: &str) -> Option<&str> {
        self.sector_by_postcode
            .get(postcode)
            .map(|&i| self.polygons[i].sector.as_str())
    }

    /// Unserviceable users recorded against a sector, in file order
    pub fn users_in_sector<'a>(
        &'a self,
        sector: &str,
    ) -> impl Iterator<Item = &'a UnserviceableUser> + 'a {
        self.users_by_sector
            .get(sector)
            .into_iter()
            .flatten()
            .map(move |&i| &self.unserviceable[i])
    }

    pub fn sector_interest(&self, sector: &str) -> usize {
        self.users_by_sector.get(sector).map_or(0, Vec::len)
    }

    pub fn hub_interest(&self, hub_id: i64) -> usize {
        self.users_by_hub.get(&hub_id).copied().unwrap_or(0)
    }
}

/// Fetches and parses both reference sources
#[derive(Debug, Clone)]
pub struct ReferenceLoader {
    client: reqwest::Client,
    polygon: Source,
    unserviceable: Source,
}

impl ReferenceLoader {
    pub fn new(sources: &SourcesConfig) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .timeout(sources.timeout())
            .build()
            .map_err(LoadError::Client)?;
        Ok(Self {
            client,
            polygon: Source::parse(&sources.polygon),
            unserviceable: Source::parse(&sources.unserviceable),
        })
    }

    pub fn polygon_source(&self) -> &Source {
        &self.polygon
    }

    pub fn unserviceable_source(&self) -> &Source {
        &self.unserviceable
    }

    /// Fetch both sources and build the tables
    pub async fn load(&self) -> Result<ReferenceTables, LoadError> {
        info!("Loading reference data from {} and {}", self.polygon, self.unserviceable);

        let (polygon_bytes, unserviceable_bytes) =
            tokio::try_join!(self.fetch(&self.polygon), self.fetch(&self.unserviceable))?;

        ensure_csv(&polygon_bytes, &self.polygon)?;
        ensure_csv(&unserviceable_bytes, &self.unserviceable)?;

        let (polygons, skipped_polygons) =
            parse_polygons(polygon_bytes.as_slice(), &self.polygon.to_string())?;
        let (unserviceable, skipped_users) =
            parse_unserviceable(unserviceable_bytes.as_slice(), &self.unserviceable.to_string())?;

        let mut tables = ReferenceTables::new(polygons, unserviceable);
        tables.skipped_rows = skipped_polygons + skipped_users;

        info!(
            "Loaded {} postcodes and {} unserviceable users ({} rows skipped)",
            tables.polygons.len(),
            tables.unserviceable.len(),
            tables.skipped_rows
        );
        Ok(tables)
    }

    async fn fetch(&self, source: &Source) -> Result<Vec<u8>, LoadError> {
        let origin = source.to_string();
        match source {
            Source::Url(url) => {
                debug!("Downloading {}", url);
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|err| LoadError::Http { origin: origin.clone(), err })?;
                let status = response.status();
                if !status.is_success() {
                    return Err(LoadError::Status { origin, status: status.as_u16() });
                }
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| LoadError::Http { origin, err })?;
                Ok(body.to_vec())
            }
            Source::Path(path) => {
                debug!("Reading {}", path.display());
                tokio::fs::read(path).await.map_err(|err| LoadError::Io { origin, err })
            }
        }
    }
}

/// Reject bodies that are an HTML page, such as a download confirmation
/// interstitial served in place of the file
fn ensure_csv(body: &[u8], source: &Source) -> Result<(), LoadError> {
    if looks_like_html(body) {
        return Err(LoadError::HtmlPage { origin: source.to_string() });
    }
    Ok(())
}

pub fn looks_like_html(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|&b| b == b'<')
}

/// Parse the postcode to sector CSV. Returns entries and the number of rows skipped.
pub fn parse_polygons<R: Read>(
    reader: R,
    origin: &str,
) -> Result<(Vec<PolygonEntry>, usize), LoadError> {
    let rows: Vec<PolygonRow> = read_rows(reader, origin, &[POSTCODE_COLUMN, SECTOR_COLUMN])?;
    let total = rows.len();
    let entries: Vec<PolygonEntry> = rows.iter().filter_map(PolygonRow::to_entry).collect();
    let skipped = total - entries.len();
    if skipped > 0 {
        warn!("{}: skipped {} rows with a blank postcode or sector", origin, skipped);
    }
    Ok((entries, skipped))
}

/// Parse the unserviceable users CSV. `HUB_ID` is optional.
pub fn parse_unserviceable<R: Read>(
    reader: R,
    origin: &str,
) -> Result<(Vec<UnserviceableUser>, usize), LoadError> {
    let rows: Vec<UnserviceableRow> = read_rows(reader, origin, &[SECTOR_COLUMN])?;
    let total = rows.len();
    let users: Vec<UnserviceableUser> = rows.iter().filter_map(UnserviceableRow::to_user).collect();
    let skipped = total - users.len();
    if skipped > 0 {
        warn!("{}: skipped {} rows with a blank sector", origin, skipped);
    }
    if users.iter().all(|u| u.hub_id.is_none()) && !users.is_empty() {
        debug!("{}: no {} values present", origin, HUB_ID_COLUMN);
    }
    Ok((users, skipped))
}

fn read_rows<R: Read, T: DeserializeOwned>(
    reader: R,
    origin: &str,
    required: &[&'static str],
) -> Result<Vec<T>, LoadError> {
    let csv_err = |err| LoadError::Csv { origin: origin.to_string(), err };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: StringRecord = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(normalize_header)
        .collect();
    for &column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(LoadError::MissingColumn { origin: origin.to_string(), column });
        }
    }
    reader.set_headers(headers);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(csv_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLYGONS: &str = " postcode ,Polygon_Sector,REGION\n\
        ab1 2cd,sector1,north\n\
        AB1 2CD,SECTOR9,north\n\
        ef3 4gh,Sector2,south\n\
        ,SECTOR3,east\n";

    const USERS: &str = "POLYGON_SECTOR, hub_id \n\
        sector1,25.0\n\
        SECTOR1,\n\
        sector2,25\n\
        ,7\n";

    #[test]
    fn test_parse_polygons_normalizes() {
        let (entries, skipped) = parse_polygons(POLYGONS.as_bytes(), "polygons").unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].postcode, "AB12CD");
        assert_eq!(entries[0].sector, "SECTOR1");
        assert_eq!(entries[2].sector, "SECTOR2");
    }

    #[test]
    fn test_parse_unserviceable_hub_ids() {
        let (users, skipped) = parse_unserviceable(USERS.as_bytes(), "users").unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(users[0].hub_id, Some(25));
        assert_eq!(users[1].hub_id, None);
        assert_eq!(users[1].sector, "SECTOR1");
    }

    #[test]
    fn test_hub_column_optional() {
        let (users, _) = parse_unserviceable("POLYGON_SECTOR\nS1\n".as_bytes(), "users").unwrap();
        assert_eq!(users, vec![UnserviceableUser { sector: "S1".to_string(), hub_id: None }]);
    }

    #[test]
    fn test_missing_column() {
        let err = parse_polygons("POSTCODE,SECTOR\nAB1,S\n".as_bytes(), "polygons").unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { column: "POLYGON_SECTOR", .. }));
    }

    #[test]
    fn test_first_postcode_wins() {
        let (entries, _) = parse_polygons(POLYGONS.as_bytes(), "polygons").unwrap();
        let tables = ReferenceTables::new(entries, Vec::new());
        assert_eq!(tables.sector_for("AB12CD"), Some("SECTOR1"));
        assert_eq!(tables.sector_for("ZZ99ZZ"), None);
    }

    #[test]
    fn test_interest_indexes() {
        let (users, _) = parse_unserviceable(USERS.as_bytes(), "users").unwrap();
        let tables = ReferenceTables::new(Vec::new(), users);
        assert_eq!(tables.sector_interest("SECTOR1"), 2);
        assert_eq!(tables.sector_interest("SECTOR4"), 0);
        assert_eq!(tables.hub_interest(25), 2);
        assert_eq!(tables.users_in_sector("SECTOR1").count(), 2);
    }

    #[test]
    fn test_source_parse() {
        assert!(matches!(Source::parse("https://example.com/a.csv"), Source::Url(_)));
        assert!(matches!(Source::parse("data/a.csv"), Source::Path(_)));
    }

    #[tokio::test]
    async fn test_load_from_files() {
        let mut polygons = tempfile::NamedTempFile::new().unwrap();
        polygons.write_all(POLYGONS.as_bytes()).unwrap();
        let mut users = tempfile::NamedTempFile::new().unwrap();
        users.write_all(USERS.as_bytes()).unwrap();

        let sources = SourcesConfig {
            polygon: polygons.path().display().to_string(),
            unserviceable: users.path().display().to_string(),
            ..SourcesConfig::default()
        };
        let tables = ReferenceLoader::new(&sources).unwrap().load().await.unwrap();
        assert_eq!(tables.polygons.len(), 3);
        assert_eq!(tables.unserviceable.len(), 3);
        assert_eq!(tables.skipped_rows, 2);
    }

    #[test]
    fn test_looks_like_html() {
        assert!(looks_like_html(b"\n  <!DOCTYPE html><html><body>Virus scan warning</body></html>"));
        assert!(looks_like_html(b"\xEF\xBB\xBF<html>"));
        assert!(!looks_like_html(POLYGONS.as_bytes()));
        assert!(!looks_like_html(b""));
    }

    #[tokio::test]
    async fn test_load_html_page_fails_clearly() {
        let mut polygons = tempfile::NamedTempFile::new().unwrap();
        polygons
            .write_all(b"<!DOCTYPE html><html><head><title>Google Drive - Virus scan warning</title></head></html>")
            .unwrap();
        let mut users = tempfile::NamedTempFile::new().unwrap();
        users.write_all(USERS.as_bytes()).unwrap();

        let sources = SourcesConfig {
            polygon: polygons.path().display().to_string(),
            unserviceable: users.path().display().to_string(),
            ..SourcesConfig::default()
        };
        let err = ReferenceLoader::new(&sources).unwrap().load().await.unwrap_err();
        assert!(matches!(err, LoadError::HtmlPage { .. }));
        assert!(err.to_string().contains("HTML page"));
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let sources = SourcesConfig {
            polygon: "/nonexistent/polygons.csv".to_string(),
            unserviceable: "/nonexistent/users.csv".to_string(),
            ..SourcesConfig::default()
        };
        let err = ReferenceLoader::new(&sources).unwrap().load().await.unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
