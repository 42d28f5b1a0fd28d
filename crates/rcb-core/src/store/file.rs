use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::CredentialStore;
use crate::{errors::Error, Result};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    /// Unix milliseconds; absent means the entry never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<i64>,
}

type StoreFileData = BTreeMap<String, StoredEntry>;

/// JSON-file backed store (one file, whole-file rewrite per `put`).
///
/// Writes go to a sibling temp file that is renamed over the original, so a crash
/// mid-write never leaves a truncated store behind.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreFileData> {
        let txt = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(persistence(&self.path, e)),
        };
        if txt.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&txt).map_err(|e| persistence(&self.path, e))
    }

    async fn save(&self, data: &StoreFileData) -> Result<()> {
        let txt = serde_json::to_string_pretty(data)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, txt)
            .await
            .map_err(|e| persistence(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| persistence(&self.path, e))
    }
}

fn persistence(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Persistence(format!("{}: {e}", path.display()))
}

fn is_live(entry: &StoredEntry, now_ms: i64) -> bool {
    entry.expires_at.map(|t| now_ms < t).unwrap_or(true)
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let data = self.load().await?;
        let now_ms = Utc::now().timestamp_millis();
        Ok(data
            .get(key)
            .filter(|e| is_live(e, now_ms))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let now_ms = Utc::now().timestamp_millis();
        data.retain(|_, e| is_live(e, now_ms));
        data.insert(
            key.to_string(),
            StoredEntry {
                value: value.to_string(),
                expires_at: ttl.map(|d| now_ms + d.as_millis() as i64),
            },
        );
        self.save(&data).await
    }
}
