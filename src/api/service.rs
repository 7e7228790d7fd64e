//! Shared business logic for the checker
//!
//! Used by the page handler, the JSON API and the `lookup` binary.

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info};

use crate::cache::ReferenceCache;
use crate::config::Config;
use crate::hubs::HubDirectory;
use crate::loader::ReferenceLoader;
use crate::normalize::normalize_postcode;
use crate::resolver::{resolve, ResolveOptions, Resolution};
use crate::session::{GuardDecision, SessionStore};

/// Result of one postcode query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// No postcode, or only whitespace
    MissingPostcode,
    /// Reference data could not be loaded; `detail` only in debug mode
    LoadFailed { detail: Option<String> },
    /// Same postcode as the previous query in this session
    AlreadyProcessed { postcode: String },
    Resolved {
        postcode: String,
        #[serde(flatten)]
        resolution: Resolution,
    },
}

pub struct CheckerService {
    config: Config,
    cache: ReferenceCache,
    sessions: SessionStore,
    hubs: HubDirectory,
    options: ResolveOptions,
}

impl CheckerService {
    pub fn new(config: Config) -> Result<Self> {
        let loader = ReferenceLoader::new(&config.sources)?;
        let hubs = HubDirectory::new(&config.messaging.hub_overrides()?);
        let cache = ReferenceCache::new(loader, config.cache.ttl())
            .with_retry_backoff(config.cache.retry_backoff());
        let sessions =
            SessionStore::new(config.session.ttl()).with_max_sessions(config.session.max_sessions);
        let options = ResolveOptions::from(&config.messaging);

        info!(
            "Checker configured: {} hubs, hub enrichment {}, count basis {:?}",
            hubs.len(),
            options.hub_enrichment,
            options.count_basis
        );

        Ok(Self { config, cache, sessions, hubs, options })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &ReferenceCache {
        &self.cache
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Resolve a raw postcode without touching any session
    pub async fn check(&self, raw_postcode: Option<&str>) -> CheckOutcome {
        self.run(None, raw_postcode).await
    }

    /// Resolve a raw postcode for a page view, applying the duplicate-query guard
    pub async fn check_in_session(&self, session_id: &str, raw_postcode: Option<&str>) -> CheckOutcome {
        self.run(Some(session_id), raw_postcode).await
    }

    async fn run(&self, session_id: Option<&str>, raw_postcode: Option<&str>) -> CheckOutcome {
        let tables = match self.cache.get().await {
            Ok(tables) => tables,
            Err(e) => {
                error!("Reference data unavailable: {}", e);
                return CheckOutcome::LoadFailed {
                    detail: self.config.debug.then(|| e.to_string()),
                };
            }
        };

        let Some(postcode) = normalize_postcode(raw_postcode) else {
            return CheckOutcome::MissingPostcode;
        };

        if let Some(id) = session_id {
            if self.sessions.check_and_record(id, &postcode).await == GuardDecision::AlreadyProcessed {
                info!("Postcode {} already processed in this session", postcode);
                return CheckOutcome::AlreadyProcessed { postcode };
            }
        }

        let resolution = resolve(&postcode, &tables, &self.hubs, self.options);
        info!("Checked {}: {:?}", postcode, resolution);
        CheckOutcome::Resolved { postcode, resolution }
    }
}
