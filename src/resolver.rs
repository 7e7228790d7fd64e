//! Postcode availability lookup over the loaded reference tables

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{CountBasis, MessagingConfig};
use crate::hubs::HubDirectory;
use crate::loader::ReferenceTables;

/// Which optional enrichment steps the resolver performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub hub_enrichment: bool,
    pub count_basis: CountBasis,
}

impl From<&MessagingConfig> for ResolveOptions {
    fn from(m: &MessagingConfig) -> Self {
        Self {
            hub_enrichment: m.hub_enrichment,
            count_basis: m.count_basis,
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            hub_enrichment: false,
            count_basis: CountBasis::Sector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hub {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    /// Postcode is not in the polygon table
    NotFound,
    /// Sector is known and has interested users
    Unserviceable {
        sector: String,
        interest_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        hub: Option<Hub>,
    },
    /// Hub enrichment is on but no user in the sector carries a hub id
    HubMissing { sector: String },
    /// Sector is known but nobody in it is on the unserviceable list
    NoInterestData { sector: String },
}

/// Resolve a normalized postcode
pub fn resolve(
    postcode: &str,
    tables: &ReferenceTables,
    hubs: &HubDirectory,
    options: ResolveOptions,
) -> Resolution {
    let Some(sector) = tables.sector_for(postcode) else {
        debug!("Postcode {} not in polygon table", postcode);
        return Resolution::NotFound;
    };
    let sector = sector.to_string();

    let sector_count = tables.sector_interest(&sector);
    if sector_count == 0 {
        warn!("Sector {} for postcode {} has no unserviceable users", sector, postcode);
        return Resolution::NoInterestData { sector };
    }

    if !options.hub_enrichment {
        return Resolution::Unserviceable {
            sector,
            interest_count: sector_count,
            hub: None,
        };
    }

    let Some(hub_id) = tables.users_in_sector(&sector).find_map(|u| u.hub_id) else {
        return Resolution::HubMissing { sector };
    };

    let interest_count = match options.count_basis {
        CountBasis::Sector => sector_count,
        CountBasis::Hub => tables.hub_interest(hub_id),
    };

    Resolution::Unserviceable {
        sector,
        interest_count,
        hub: Some(Hub { id: hub_id, name: hubs.name(hub_id) }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hubs::UNKNOWN_HUB;
    use crate::models::{PolygonEntry, UnserviceableUser};

    fn entry(postcode: &str, sector: &str) -> PolygonEntry {
        PolygonEntry { postcode: postcode.to_string(), sector: sector.to_string() }
    }

    fn user(sector: &str, hub_id: Option<i64>) -> UnserviceableUser {
        UnserviceableUser { sector: sector.to_string(), hub_id }
    }

    fn tables() -> ReferenceTables {
        ReferenceTables::new(
            vec![
                entry("AB12CD", "SECTOR1"),
                entry("EF34GH", "SECTOR2"),
                entry("IJ56KL", "SECTOR3"),
                entry("MN78OP", "SECTOR4"),
            ],
            vec![
                user("SECTOR1", None),
                user("SECTOR1", Some(25)),
                user("SECTOR2", Some(25)),
                user("SECTOR2", Some(25)),
                user("SECTOR2", Some(25)),
                user("SECTOR3", None),
                user("SECTOR4", Some(999)),
            ],
        )
    }

    const ENRICHED: ResolveOptions = ResolveOptions {
        hub_enrichment: true,
        count_basis: CountBasis::Sector,
    };

    #[test]
    fn test_interest_count_per_sector() {
        let result = resolve("AB12CD", &tables(), &HubDirectory::default(), ResolveOptions::default());
        assert_eq!(
            result,
            Resolution::Unserviceable {
                sector: "SECTOR1".to_string(),
                interest_count: 2,
                hub: None,
            }
        );
    }

    #[test]
    fn test_not_found_ignores_unserviceable_table() {
        let result = resolve("ZZ99ZZ", &tables(), &HubDirectory::default(), ENRICHED);
        assert_eq!(result, Resolution::NotFound);
    }

    #[test]
    fn test_hub_enrichment_uses_first_hub_id() {
        let result = resolve("AB12CD", &tables(), &HubDirectory::default(), ENRICHED);
        assert_eq!(
            result,
            Resolution::Unserviceable {
                sector: "SECTOR1".to_string(),
                interest_count: 2,
                hub: Some(Hub { id: 25, name: "Swindon".to_string() }),
            }
        );
    }

    #[test]
    fn test_hub_count_basis() {
        let options = ResolveOptions { hub_enrichment: true, count_basis: CountBasis::Hub };
        match resolve("AB12CD", &tables(), &HubDirectory::default(), options) {
            Resolution::Unserviceable { interest_count, .. } => assert_eq!(interest_count, 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hub_missing() {
        let result = resolve("IJ56KL", &tables(), &HubDirectory::default(), ENRICHED);
        assert_eq!(result, Resolution::HubMissing { sector: "SECTOR3".to_string() });

        // Without enrichment the same sector is a plain count
        let result = resolve("IJ56KL", &tables(), &HubDirectory::default(), ResolveOptions::default());
        assert!(matches!(result, Resolution::Unserviceable { interest_count: 1, .. }));
    }

    #[test]
    fn test_unknown_hub_name() {
        match resolve("MN78OP", &tables(), &HubDirectory::default(), ENRICHED) {
            Resolution::Unserviceable { hub: Some(hub), .. } => assert_eq!(hub.name, UNKNOWN_HUB),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sector_without_interest() {
        let tables = ReferenceTables::new(vec![entry("QR12ST", "SECTOR9")], vec![]);
        let result = resolve("QR12ST", &tables, &HubDirectory::default(), ENRICHED);
        assert_eq!(result, Resolution::NoInterestData { sector: "SECTOR9".to_string() });
    }
}
