use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::Clock;
use crate::error::{ParrotError, Result};

/// Expiring key-value store with `get/setex/delete/keys/ttl` semantics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value`, replacing any existing value, expiring after `ttl`
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Whether a live value was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Live keys starting with `prefix`
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remaining lifetime, `None` when the key is absent
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Reachability check
    async fn ping(&self) -> Result<()>;
}

fn remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (expires_at - now).to_std().ok().filter(|d| !d.is_zero())
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| ParrotError::Cache(format!("TTL out of range: {:?}", ttl)))
}

/// Process-local store, lost on restart
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn purge_expired(&self) {
        let now = self.clock.now();
        self.entries
            .lock()
            .retain(|_, (_, expires_at)| remaining(*expires_at, now).is_some());
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.purge_expired();
        Ok(self.entries.lock().get(key).map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = expiry(self.clock.now(), ttl)?;
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.purge_expired();
        Ok(self.entries.lock().remove(key).is_some())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.purge_expired();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .lock()
            .get(key)
            .and_then(|(_, expires_at)| remaining(*expires_at, now)))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredValue {
    key: String,
    value: String,
    expires_at: DateTime<Utc>,
}

/// One JSON document per key under a directory
pub struct FileStore {
    directory: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileStore {
    pub fn new(directory: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: directory.into(),
            clock,
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{}.json", file_name))
    }

    /// Read a stored value, removing it when expired or unreadable
    async fn read(&self, path: &Path) -> Option<StoredValue> {
        let content = tokio::fs::read_to_string(path).await.ok()?;

        match serde_json::from_str::<StoredValue>(&content) {
            Ok(stored) if remaining(stored.expires_at, self.clock.now()).is_some() => Some(stored),
            Ok(stored) => {
                debug!("Cache entry expired: {}", stored.key);
                let _ = tokio::fs::remove_file(path).await;
                None
            }
            Err(e) => {
                warn!("Failed to parse cache entry {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl CacheStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let stored = self.read(&self.path_for(key)).await;
        Ok(stored.filter(|s| s.key == key).map(|s| s.value))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let stored = StoredValue {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: expiry(self.clock.now(), ttl)?,
        };
        let content = serde_json::to_string_pretty(&stored)?;
        tokio::fs::write(self.path_for(key), content).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key);
        let existed = self.read(&path).await.is_some();
        if existed {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(existed)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stored) = self.read(&path).await {
                    if stored.key.starts_with(prefix) {
                        keys.push(stored.key);
                    }
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let stored = self.read(&self.path_for(key)).await;
        Ok(stored.and_then(|s| remaining(s.expires_at, self.clock.now())))
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.directory).await?;
        Ok(())
    }
}
