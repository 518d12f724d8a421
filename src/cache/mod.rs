// Result cache
//
// Content-addressed, TTL-bound records in front of the translator. The cache
// is optional: store failures are logged and read as misses, and a store
// that is unreachable at startup disables caching instead of failing.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use store::{CacheStore, FileStore, MemoryStore};

use crate::config::{CacheBackend, CacheConfig};
use crate::language::Direction;

/// Source of record timestamps and expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub original: String,
    pub translated: String,
    /// Elapsed inference time, e.g. "1.23s"
    pub translate_time: String,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub key: String,
    pub exists: bool,
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub namespace: String,
    pub total_keys: usize,
    pub sample_keys: Vec<String>,
}

/// Scope of a cached translation: the same text translated by another model
/// or in another direction is a different record.
pub fn scope_for(model_key: &str, direction: Direction) -> String {
    format!("{}:{}", model_key, direction.tag())
}

/// Formats an elapsed duration the way records and API responses show it
pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        namespace: &str,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            namespace: namespace.to_string(),
            ttl,
        }
    }

    /// Build the configured store and check it is reachable. `None` means
    /// caching is disabled, either by config or because the store is down.
    pub async fn connect(config: &CacheConfig) -> Option<Self> {
        if !config.enabled {
            info!("Result cache disabled by configuration");
            return None;
        }

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store: Arc<dyn CacheStore> = match config.backend {
            CacheBackend::Memory => Arc::new(MemoryStore::new(clock.clone())),
            CacheBackend::File => Arc::new(FileStore::new(&config.directory, clock.clone())),
        };

        if let Err(e) = store.ping().await {
            warn!("Cache store unavailable, continuing without cache: {}", e);
            return None;
        }

        info!(
            "Result cache ready ({:?}, ttl {}s)",
            config.backend, config.ttl_secs
        );
        Some(Self::new(
            store,
            clock,
            &config.namespace,
            Duration::from_secs(config.ttl_secs),
        ))
    }

    /// View of the same store whose keys live under `{namespace}:{scope}`.
    /// Clearing the parent namespace also clears every scope.
    pub fn scoped(&self, scope: &str) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            namespace: format!("{}:{}", self.namespace, scope),
            ttl: self.ttl,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `{namespace}:{sha256 hex}` of the text
    pub fn key_for(&self, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{}:{:x}", self.namespace, hasher.finalize())
    }

    pub async fn get(&self, text: &str) -> Option<CacheRecord> {
        let key = self.key_for(text);

        let raw = match self.store.get(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<CacheRecord>(&raw) {
            Ok(record) => {
                debug!("Cache hit: {}", key);
                Some(record)
            }
            Err(e) => {
                warn!("Discarding malformed cache record {}: {}", key, e);
                None
            }
        }
    }

    /// Store a result, replacing any record for the same text
    pub async fn put(&self, text: &str, translated: &str, elapsed: Duration) {
        let record = CacheRecord {
            key: self.key_for(text),
            original: text.to_string(),
            translated: translated.to_string(),
            translate_time: format_elapsed(elapsed),
            cached_at: self.clock.now(),
        };

        let result = match serde_json::to_string(&record) {
            Ok(value) => self.store.set_ex(&record.key, &value, self.ttl).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => debug!("Cached translation: {}", record.key),
            Err(e) => warn!("Cache write failed for {}: {}", record.key, e),
        }
    }

    pub async fn invalidate(&self, text: &str) -> bool {
        let key = self.key_for(text);
        match self.store.delete(&key).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!("Cache delete failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Remove every record under this namespace
    pub async fn clear_all(&self) -> usize {
        let keys = match self.store.keys(&self.prefix()).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Cache key listing failed: {}", e);
                return 0;
            }
        };

        let mut count = 0;
        for key in keys {
            match self.store.delete(&key).await {
                Ok(true) => count += 1,
                Ok(false) => {}
                Err(e) => warn!("Cache delete failed for {}: {}", key, e),
            }
        }

        info!("Cleared {} translation cache entries", count);
        count
    }

    pub async fn info(&self, text: &str) -> CacheInfo {
        let key = self.key_for(text);
        let ttl = match self.store.ttl(&key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                warn!("Cache TTL lookup failed for {}: {}", key, e);
                None
            }
        };

        CacheInfo {
            exists: ttl.is_some(),
            ttl_secs: ttl.map(|d| d.as_secs()),
            key,
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let keys = self.store.keys(&self.prefix()).await.unwrap_or_else(|e| {
            warn!("Cache key listing failed: {}", e);
            Vec::new()
        });

        CacheStats {
            namespace: self.namespace.clone(),
            total_keys: keys.len(),
            sample_keys: keys.into_iter().take(5).collect(),
        }
    }

    pub async fn is_reachable(&self) -> bool {
        self.store.ping().await.is_ok()
    }

    fn prefix(&self) -> String {
        format!("{}:", self.namespace)
    }
}
