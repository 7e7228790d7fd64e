use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_POLYGON_SOURCE: &str =
    "https://drive.google.com/uc?id=19cdI-kinFtT1CqpYRVCfrXvvk16rTkKA";
pub const DEFAULT_UNSERVICEABLE_SOURCE: &str =
    "https://drive.google.com/uc?id=1nMI8Io9kLfOyNISUIFB44dzYWwi4hbE5&export=download";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Where the two reference CSVs come from
    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub session: SessionConfig,

    /// Copy and behavior differences between page variants
    #[serde(default)]
    pub messaging: MessagingConfig,

    /// Show underlying load errors to the visitor
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// URL or local path of the postcode to sector CSV
    #[serde(default = "default_polygon_source")]
    pub polygon: String,

    /// URL or local path of the unserviceable users CSV
    #[serde(default = "default_unserviceable_source")]
    pub unserviceable: String,

    /// Per-download timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Reload the reference tables after this many seconds. Unset keeps them
    /// for the process lifetime.
    pub ttl_secs: Option<u64>,

    /// After a failed reload, keep serving the previous tables this long
    /// before fetching again
    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a session is forgotten
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Live sessions kept at most; the least recently seen is dropped first
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// How the interest count is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CountBasis {
    /// Users in the same sector
    #[default]
    Sector,
    /// Users attached to the sector's hub
    Hub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    #[serde(default = "default_brand")]
    pub brand: String,

    /// Domain used for `https://<domain>/refer?postcode=..`
    #[serde(default = "default_referral_domain")]
    pub referral_domain: String,

    #[serde(default = "default_share_url")]
    pub share_url: String,

    /// Sign-up goal quoted in the unserviceable message
    #[serde(default = "default_signup_target")]
    pub signup_target: u32,

    /// Resolve and name the hub for unserviceable sectors
    #[serde(default = "default_true")]
    pub hub_enrichment: bool,

    #[serde(default)]
    pub count_basis: CountBasis,

    /// Extra or replacement hub names, keyed by hub id
    #[serde(default)]
    pub hub_names: HashMap<String, String>,
}

fn default_polygon_source() -> String {
    DEFAULT_POLYGON_SOURCE.to_string()
}

fn default_unserviceable_source() -> String {
    DEFAULT_UNSERVICEABLE_SOURCE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_retry_secs() -> u64 {
    60
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

fn default_max_sessions() -> usize {
    10_000
}

fn default_brand() -> String {
    "Modern Milkman".to_string()
}

fn default_referral_domain() -> String {
    "themodernmilkman.co.uk".to_string()
}

fn default_share_url() -> String {
    "https://themodernmilkman.co.uk/?utm_source=GetModernMilkmanToYourArea".to_string()
}

fn default_signup_target() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            polygon: default_polygon_source(),
            unserviceable: default_unserviceable_source(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: None,
            retry_secs: default_retry_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            referral_domain: default_referral_domain(),
            share_url: default_share_url(),
            signup_target: default_signup_target(),
            hub_enrichment: true,
            count_basis: CountBasis::default(),
            hub_names: HashMap::new(),
        }
    }
}

impl Config {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.messaging.hub_overrides()?;
        Ok(config)
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl MessagingConfig {
    /// Configured hub names with parsed ids
    pub fn hub_overrides(&self) -> Result<HashMap<i64, String>> {
        self.hub_names
            .iter()
            .map(|(id, name)| {
                let id: i64 = id
                    .trim()
                    .parse()
                    .with_context(|| format!("hub id '{}' is not an integer", id))?;
                Ok((id, name.clone()))
            })
            .collect()
    }
}
