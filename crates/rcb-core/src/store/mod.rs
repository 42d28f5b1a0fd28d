//! Durable key-value storage for credentials and the feed cursor.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

pub const ACCESS_TOKEN_KEY: &str = "fibapi.access_token";
pub const REFRESH_TOKEN_KEY: &str = "fibapi.refresh_token";
pub const FEED_CURSOR_KEY: &str = "last_notice_timestamp";

/// Single-key get/put store. Entries written with a TTL read as absent once expired.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;
}
