use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::CredentialStore;
use crate::{errors::Error, Result};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_at(&self, key: &str, now: Instant) -> Result<Option<String>> {
        let map = self
            .entries
            .lock()
            .map_err(|_| Error::Persistence("memory store lock poisoned".to_string()))?;
        Ok(map
            .get(key)
            .filter(|e| e.expires_at.map(|t| now < t).unwrap_or(true))
            .map(|e| e.value.clone()))
    }

    /// Synchronous `put`. A zero TTL makes the entry read as absent immediately.
    pub fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut map = self
            .entries
            .lock()
            .map_err(|_| Error::Persistence("memory store lock poisoned".to_string()))?;
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_at(key, Instant::now())
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.insert(key, value, ttl)
    }
}
