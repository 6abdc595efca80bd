//! Persistence contracts the core relies on.
//!
//! The multiplexer and the VOD cache never own storage. They call a
//! [`Gateway`] and treat every failure as non-fatal: errors are logged and
//! the caller keeps going with whatever it has in memory.

use std::path::PathBuf;

use api::media::{StreamKind, VodStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod database;
pub mod mem;

pub use database::DatabaseGateway;
pub use mem::MemoryGateway;

/// Client network metadata captured at request time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetInfo {
    pub remote_addr: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StreamStart {
    pub identity: String,
    pub stream_id: String,
    pub kind: StreamKind,
    pub title: String,
    pub net: NetInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryLink {
    pub token: String,
    pub identity: String,
    pub url: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Alias an identity is linked to, e.g. a chat account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedIdentity {
    pub alias_id: String,
    pub alias_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VodCacheEntry {
    pub id: String,
    pub media_type: StreamKind,
    pub title: String,
    pub series_title: Option<String>,
    pub season: Option<i32>,
    pub episode: Option<i32>,
    pub file_path: PathBuf,
    pub source_url: String,
    pub requested_by: String,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub final_size: Option<u64>,
    pub status: VodStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_access_at: DateTime<Utc>,
}

impl VodCacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Returns the id of the new history record
    async fn record_stream_start(&self, start: StreamStart) -> anyhow::Result<i64>;

    async fn create_temporary_link(&self, link: TemporaryLink) -> anyhow::Result<()>;

    async fn get_temporary_link(&self, token: &str) -> anyhow::Result<Option<TemporaryLink>>;

    /// Returns the number of removed links
    async fn delete_expired_links(&self, now: DateTime<Utc>) -> anyhow::Result<u64>;

    async fn upsert_vod_cache_entry(&self, entry: &VodCacheEntry) -> anyhow::Result<()>;

    async fn get_vod_cache_entry(&self, id: &str) -> anyhow::Result<Option<VodCacheEntry>>;

    async fn touch_vod_cache_entry(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<()>;

    /// Most recently created first
    async fn list_vod_cache_entries(&self, limit: u64) -> anyhow::Result<Vec<VodCacheEntry>>;

    /// Returns the removed rows so their files can be deleted too
    async fn delete_expired_vod_cache_entries(
        &self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<VodCacheEntry>>;

    async fn resolve_linked_identity(
        &self,
        identity: &str,
    ) -> anyhow::Result<Option<LinkedIdentity>>;
}
