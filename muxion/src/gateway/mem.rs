use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Gateway, LinkedIdentity, StreamStart, TemporaryLink, VodCacheEntry};

/// Process-local gateway, used when no database is configured
#[derive(Clone, Default)]
pub struct MemoryGateway {
    history: Arc<RwLock<Vec<(i64, StreamStart)>>>,
    history_seq: Arc<AtomicI64>,
    links: Arc<RwLock<HashMap<String, TemporaryLink>>>,
    vod: Arc<RwLock<HashMap<String, VodCacheEntry>>>,
    aliases: Arc<RwLock<HashMap<String, LinkedIdentity>>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn link_identity(&self, identity: &str, alias: LinkedIdentity) {
        self.aliases
            .write()
            .unwrap()
            .insert(identity.to_string(), alias);
    }

    pub fn history(&self) -> Vec<StreamStart> {
        self.history
            .read()
            .unwrap()
            .iter()
            .map(|(_, start)| start.clone())
            .collect()
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn record_stream_start(&self, start: StreamStart) -> anyhow::Result<i64> {
        let id = self.history_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.history.write().unwrap().push((id, start));
        Ok(id)
    }

    async fn create_temporary_link(&self, link: TemporaryLink) -> anyhow::Result<()> {
        self.links.write().unwrap().insert(link.token.clone(), link);
        Ok(())
    }

    async fn get_temporary_link(&self, token: &str) -> anyhow::Result<Option<TemporaryLink>> {
        Ok(self.links.read().unwrap().get(token).cloned())
    }

    async fn delete_expired_links(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut links = self.links.write().unwrap();
        let before = links.len();
        links.retain(|_, link| link.expires_at > now);
        Ok((before - links.len()) as u64)
    }

    async fn upsert_vod_cache_entry(&self, entry: &VodCacheEntry) -> anyhow::Result<()> {
        self.vod
            .write()
            .unwrap()
            .insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_vod_cache_entry(&self, id: &str) -> anyhow::Result<Option<VodCacheEntry>> {
        Ok(self.vod.read().unwrap().get(id).cloned())
    }

    async fn touch_vod_cache_entry(&self, id: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(entry) = self.vod.write().unwrap().get_mut(id) {
            entry.last_access_at = now;
        }
        Ok(())
    }

    async fn list_vod_cache_entries(&self, limit: u64) -> anyhow::Result<Vec<VodCacheEntry>> {
        let mut entries: Vec<VodCacheEntry> = self.vod.read().unwrap().values().cloned().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn delete_expired_vod_cache_entries(
        &self,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<VodCacheEntry>> {
        let mut vod = self.vod.write().unwrap();
        let expired: Vec<String> = vod
            .values()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.id.clone())
            .collect();
        Ok(expired.iter().filter_map(|id| vod.remove(id)).collect())
    }

    async fn resolve_linked_identity(
        &self,
        identity: &str,
    ) -> anyhow::Result<Option<LinkedIdentity>> {
        Ok(self.aliases.read().unwrap().get(identity).cloned())
    }
}
