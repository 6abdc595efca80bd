use serde::{Deserialize, Serialize};

use crate::media::{StreamKind, VodStatus};

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub id: String,
    pub kind: StreamKind,
    pub title: String,
    pub active: bool,
    pub started_at: i64,
    pub last_requested_at: i64,
    /// Next write sequence number of the ring
    pub head: u64,
    pub viewers: Vec<Viewer>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub identity: String,
    pub last_seen_at: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub identity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_kind: Option<StreamKind>,
    pub started_at: i64,
    pub last_active_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_name: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VodCache {
    pub id: String,
    pub media_type: StreamKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<i32>,
    pub status: VodStatus,
    pub downloaded_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_size: Option<u64>,
    pub requested_by: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub last_access_at: i64,
}

/// Result of asking for an entry to be cached
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    /// Already complete and unexpired
    Cached,
    /// A fetch for this id is already running
    Downloading,
    /// A new background fetch was launched
    Started,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CacheStart {
    pub state: CacheState,
    pub entry: VodCache,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TemporaryLink {
    pub token: String,
    pub path: String,
    pub expires_at: i64,
}
