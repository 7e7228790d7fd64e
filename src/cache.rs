//! Reference table cache
//!
//! Holds the loaded tables behind an `Arc` so every request shares one copy.
//! Tables are loaded on first use, reloaded once the TTL runs out, and can be
//! dropped or refreshed explicitly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::loader::{LoadError, ReferenceLoader, ReferenceTables};

#[derive(Default)]
struct CacheState {
    tables: Option<Arc<ReferenceTables>>,
    loaded: Option<Instant>,
    loads: u64,
    failures: u64,
    last_error: Option<String>,
    // Set after a failed reload while older tables are still held
    retry_at: Option<Instant>,
}

pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Snapshot of the cache for the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub loaded: bool,
    pub postcodes: usize,
    pub unserviceable_users: usize,
    pub skipped_rows: usize,
    pub loaded_at: Option<DateTime<Utc>>,
    pub age_secs: Option<u64>,
    pub ttl_secs: Option<u64>,
    pub loads: u64,
    pub failures: u64,
    pub last_error: Option<String>,
}

pub struct ReferenceCache {
    loader: ReferenceLoader,
    ttl: Option<Duration>,
    retry_backoff: Duration,
    state: RwLock<CacheState>,
    // Serializes loads so concurrent misses trigger one fetch
    load_lock: Mutex<()>,
}

impl ReferenceCache {
    pub fn new(loader: ReferenceLoader, ttl: Option<Duration>) -> Self {
        Self {
            loader,
            ttl,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            state: RwLock::new(CacheState::default()),
            load_lock: Mutex::new(()),
        }
    }

    /// How long previous tables are served after a failed reload
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn loader(&self) -> &ReferenceLoader {
        &self.loader
    }

    /// Cached tables, loading them first if absent or expired.
    ///
    /// When an expired reload fails the previous tables keep being served,
    /// without another fetch until the retry backoff has passed.
    pub async fn get(&self) -> Result<Arc<ReferenceTables>, LoadError> {
        if let Some(tables) = self.fresh().await {
            return Ok(tables);
        }

        let _guard = self.load_lock.lock().await;
        // Another request may have finished loading while we waited
        if let Some(tables) = self.fresh().await {
            return Ok(tables);
        }

        match self.reload().await {
            Ok(tables) => Ok(tables),
            Err(e) => match self.state.read().await.tables.clone() {
                Some(stale) => {
                    warn!("Reference reload failed, serving previous tables: {}", e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Drop the cached tables; the next `get` reloads them
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.tables = None;
        state.loaded = None;
        state.retry_at = None;
        info!("Reference cache invalidated");
    }

    /// Reload now. On failure the current tables are kept.
    pub async fn refresh(&self) -> Result<Arc<ReferenceTables>, LoadError> {
        let _guard = self.load_lock.lock().await;
        self.reload().await
    }

    pub async fn status(&self) -> CacheStatus {
        let state = self.state.read().await;
        let tables = state.tables.as_deref();
        CacheStatus {
            loaded: tables.is_some(),
            postcodes: tables.map_or(0, |t| t.polygons.len()),
            unserviceable_users: tables.map_or(0, |t| t.unserviceable.len()),
            skipped_rows: tables.map_or(0, |t| t.skipped_rows),
            loaded_at: tables.map(|t| t.loaded_at),
            age_secs: state.loaded.map(|at| at.elapsed().as_secs()),
            ttl_secs: self.ttl.map(|ttl| ttl.as_secs()),
            loads: state.loads,
            failures: state.failures,
            last_error: state.last_error.clone(),
        }
    }

    async fn fresh(&self) -> Option<Arc<ReferenceTables>> {
        let state = self.state.read().await;
        let tables = state.tables.as_ref()?;
        if state.retry_at.is_some_and(|at| Instant::now() < at) {
            return Some(Arc::clone(tables));
        }
        match (self.ttl, state.loaded) {
            (Some(ttl), Some(at)) if at.elapsed() >= ttl => None,
            _ => Some(Arc::clone(tables)),
        }
    }

    // Caller holds `load_lock`
    async fn reload(&self) -> Result<Arc<ReferenceTables>, LoadError> {
        match self.loader.load().await {
            Ok(tables) => {
                let tables = Arc::new(tables);
                let mut state = self.state.write().await;
                state.tables = Some(Arc::clone(&tables));
                state.loaded = Some(Instant::now());
                state.loads += 1;
                state.last_error = None;
                state.retry_at = None;
                Ok(tables)
            }
            Err(e) => {
                warn!("Failed to load reference data: {}", e);
                let mut state = self.state.write().await;
                state.failures += 1;
                state.last_error = Some(e.to_string());
                if state.tables.is_some() {
                    state.retry_at = Some(Instant::now() + self.retry_backoff);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourcesConfig;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    fn cache_in(dir: &TempDir, ttl: Option<Duration>) -> ReferenceCache {
        let polygons = dir.path().join("polygons.csv");
        let users = dir.path().join("users.csv");
        write(&polygons, "POSTCODE,POLYGON_SECTOR\nAB1 2CD,SECTOR1\n");
        write(&users, "POLYGON_SECTOR,HUB_ID\nSECTOR1,25\n");
        let sources = SourcesConfig {
            polygon: polygons.display().to_string(),
            unserviceable: users.display().to_string(),
            ..SourcesConfig::default()
        };
        ReferenceCache::new(ReferenceLoader::new(&sources).unwrap(), ttl)
    }

    #[tokio::test]
    async fn test_loads_once() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, None);

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.status().await.loads, 1);
    }

    #[tokio::test]
    async fn test_invalidate_reloads() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, None);
        cache.get().await.unwrap();

        write(&dir.path().join("users.csv"), "POLYGON_SECTOR,HUB_ID\nSECTOR1,25\nSECTOR1,25\n");
        assert_eq!(cache.get().await.unwrap().sector_interest("SECTOR1"), 1);

        cache.invalidate().await;
        assert!(!cache.status().await.loaded);
        assert_eq!(cache.get().await.unwrap().sector_interest("SECTOR1"), 2);
        assert_eq!(cache.status().await.loads, 2);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reloads() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Some(Duration::ZERO));
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(cache.status().await.loads, 2);
    }

    #[tokio::test]
    async fn test_failed_reload_backs_off() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Some(Duration::ZERO));
        cache.get().await.unwrap();
        std::fs::remove_file(dir.path().join("users.csv")).unwrap();

        for _ in 0..5 {
            assert_eq!(cache.get().await.unwrap().sector_for("AB12CD"), Some("SECTOR1"));
        }
        let status = cache.status().await;
        assert_eq!(status.failures, 1);
        assert_eq!(status.loads, 1);
    }

    #[tokio::test]
    async fn test_retry_after_backoff() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, Some(Duration::ZERO)).with_retry_backoff(Duration::ZERO);
        cache.get().await.unwrap();
        std::fs::remove_file(dir.path().join("users.csv")).unwrap();

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(cache.status().await.failures, 2);

        write(&dir.path().join("users.csv"), "POLYGON_SECTOR\nSECTOR1\n");
        cache.get().await.unwrap();
        assert_eq!(cache.status().await.loads, 2);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, None);
        std::fs::remove_file(dir.path().join("users.csv")).unwrap();

        assert!(cache.get().await.is_err());
        let status = cache.status().await;
        assert!(!status.loaded);
        assert_eq!(status.failures, 1);
        assert!(status.last_error.is_some());

        write(&dir.path().join("users.csv"), "POLYGON_SECTOR\nSECTOR1\n");
        assert!(cache.get().await.is_ok());
        assert!(cache.status().await.last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_tables() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir, None);
        cache.get().await.unwrap();
        std::fs::remove_file(dir.path().join("polygons.csv")).unwrap();

        assert!(cache.refresh().await.is_err());
        assert!(cache.status().await.loaded);
        assert_eq!(cache.get().await.unwrap().sector_for("AB12CD"), Some("SECTOR1"));
    }
}
