//! Progressive on-disk cache for on-demand content.
//!
//! A cache request starts one background fetch per content id. The file can
//! be served while the fetch is still writing it, see [`serve`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use api::media::VodStatus;
use api::request::StartCache;
use api::response::CacheState;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::Config;
use crate::gateway::{Gateway, VodCacheEntry};
use crate::result::Result;
use crate::{metrics, AppError};

pub mod fetch;
pub mod range;
pub mod serve;

pub use serve::{part_path, serve_growing_file, ServeOptions};

const DEFAULT_EXTENSION: &str = "mp4";

#[derive(Debug, Clone)]
pub struct VodConfig {
    pub dir: PathBuf,
    pub default_ttl_days: u32,
    pub min_ttl_days: u32,
    pub max_ttl_days: u32,
    pub progress_interval: Duration,
    pub failed_ttl: Duration,
    pub serve: ServeOptions,
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl VodConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            dir: cfg.vod.dir.clone(),
            default_ttl_days: cfg.vod.default_ttl_days,
            min_ttl_days: cfg.vod.min_ttl_days,
            max_ttl_days: cfg.vod.max_ttl_days,
            progress_interval: Duration::from_millis(cfg.vod.progress_interval),
            failed_ttl: Duration::from_secs(cfg.vod.failed_ttl),
            serve: ServeOptions {
                poll_interval: Duration::from_millis(cfg.vod.poll_interval),
                range_wait_timeout: Duration::from_secs(cfg.vod.range_wait_timeout),
            },
            user_agent: cfg.upstream.user_agent.clone(),
            connect_timeout: Duration::from_secs(cfg.upstream.connect_timeout),
        }
    }

    /// Requested retention, clamped to the configured bounds
    pub fn ttl_days(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_ttl_days)
            .clamp(self.min_ttl_days, self.max_ttl_days)
    }
}

/// Ids with a fetch running in this process, with their latest progress
type InFlight = Arc<Mutex<HashMap<String, VodCacheEntry>>>;

/// Holds an id in the in-flight table; releasing happens on drop so a
/// panicking fetch cannot leave the id claimed forever.
pub(crate) struct FetchClaim {
    id: String,
    in_flight: InFlight,
}

impl FetchClaim {
    pub(crate) fn update(&self, entry: &VodCacheEntry) {
        if let Some(current) = self.in_flight.lock().unwrap().get_mut(&self.id) {
            *current = entry.clone();
        }
    }
}

impl Drop for FetchClaim {
    fn drop(&mut self) {
        self.in_flight.lock().unwrap().remove(&self.id);
    }
}

#[derive(Clone)]
pub struct VodCacheManager {
    pub(crate) config: VodConfig,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) client: reqwest::Client,
    in_flight: InFlight,
}

impl VodCacheManager {
    pub fn new(config: VodConfig, gateway: Arc<dyn Gateway>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            config,
            gateway,
            client,
            in_flight: Default::default(),
        })
    }

    pub fn config(&self) -> &VodConfig {
        &self.config
    }

    pub fn is_fetching(&self, id: &str) -> bool {
        self.in_flight.lock().unwrap().contains_key(id)
    }

    /// Cache file location: `<dir>/<sanitized id>.<ext>`, with the
    /// extension taken from the source url when it has a plausible one
    pub fn file_path(&self, id: &str, source_url: &str) -> PathBuf {
        self.config
            .dir
            .join(format!("{}.{}", sanitize_id(id), extension_of(source_url)))
    }

    /// Returns `Cached` for a ready entry whose file exists, `Downloading`
    /// when a fetch for the id already runs, otherwise starts one.
    pub async fn start_cache(&self, req: StartCache) -> Result<(CacheState, VodCacheEntry)> {
        if req.id.trim().is_empty() {
            return Err(AppError::bad_request("id is empty"));
        }
        match url::Url::parse(&req.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(AppError::bad_request(format!("invalid url: {}", req.url))),
        }

        if let Some(entry) = self.in_flight.lock().unwrap().get(&req.id) {
            return Ok((CacheState::Downloading, entry.clone()));
        }
        if let Some(entry) = self.ready_entry(&req.id).await {
            return Ok((CacheState::Cached, entry));
        }

        let now = Utc::now();
        let entry = self.new_entry(&req, now);
        let claim = {
            let mut in_flight = self.in_flight.lock().unwrap();
            if let Some(running) = in_flight.get(&req.id) {
                return Ok((CacheState::Downloading, running.clone()));
            }
            in_flight.insert(req.id.clone(), entry.clone());
            FetchClaim {
                id: req.id.clone(),
                in_flight: self.in_flight.clone(),
            }
        };
        // a fetch may have finished between the lookup and the claim
        if let Some(entry) = self.ready_entry(&req.id).await {
            drop(claim);
            return Ok((CacheState::Cached, entry));
        }

        // readers arriving before the first byte see a growing file, not
        // an expired copy still sitting under the final name
        if let Some(parent) = entry.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        remove_file(&entry.file_path).await;
        tokio::fs::File::create(part_path(&entry.file_path)).await?;

        if let Err(e) = self.gateway.upsert_vod_cache_entry(&entry).await {
            warn!("vod {} upsert error: {:?}", entry.id, e);
        }
        metrics::VOD_DOWNLOADING.inc();
        info!(
            "vod {} cache started by {} -> {}",
            entry.id,
            entry.requested_by,
            entry.file_path.display()
        );
        tokio::spawn(fetch::run(self.clone(), entry.clone(), claim));
        Ok((CacheState::Started, entry))
    }

    async fn ready_entry(&self, id: &str) -> Option<VodCacheEntry> {
        let entry = match self.gateway.get_vod_cache_entry(id).await {
            Ok(entry) => entry?,
            Err(e) => {
                warn!("vod {} lookup error: {:?}", id, e);
                return None;
            }
        };
        if entry.status != VodStatus::Ready || entry.is_expired(Utc::now()) {
            return None;
        }
        if tokio::fs::metadata(&entry.file_path).await.is_err() {
            return None;
        }
        self.touch(id).await;
        Some(entry)
    }

    fn new_entry(&self, req: &StartCache, now: DateTime<Utc>) -> VodCacheEntry {
        let ttl = chrono::Duration::days(self.config.ttl_days(req.ttl_days) as i64);
        VodCacheEntry {
            id: req.id.clone(),
            media_type: req.media_type,
            title: req.title.clone().unwrap_or_else(|| req.id.clone()),
            series_title: req.series_title.clone(),
            season: req.season,
            episode: req.episode,
            file_path: self.file_path(&req.id, &req.url),
            source_url: req.url.clone(),
            requested_by: req.user.clone(),
            downloaded_bytes: 0,
            total_bytes: None,
            final_size: None,
            status: VodStatus::Downloading,
            error: None,
            created_at: now,
            expires_at: now + ttl,
            last_access_at: now,
        }
    }

    /// Current state of an entry, preferring live progress of a running fetch
    pub async fn get(&self, id: &str) -> Result<VodCacheEntry> {
        if let Some(entry) = self.in_flight.lock().unwrap().get(id) {
            return Ok(entry.clone());
        }
        self.gateway
            .get_vod_cache_entry(id)
            .await?
            .ok_or_else(|| AppError::CacheNotFound(id.to_string()))
    }

    pub async fn list(&self, limit: u64) -> Result<Vec<VodCacheEntry>> {
        let mut entries = self.gateway.list_vod_cache_entries(limit).await?;
        let in_flight = self.in_flight.lock().unwrap();
        for entry in entries.iter_mut() {
            if let Some(running) = in_flight.get(&entry.id) {
                *entry = running.clone();
            }
        }
        Ok(entries)
    }

    pub async fn touch(&self, id: &str) {
        if let Err(e) = self.gateway.touch_vod_cache_entry(id, Utc::now()).await {
            warn!("vod {} touch error: {:?}", id, e);
        }
    }

    /// Deletes expired rows and their files. Returns the number of rows.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> anyhow::Result<usize> {
        let expired = self.gateway.delete_expired_vod_cache_entries(now).await?;
        for entry in expired.iter() {
            if self.is_fetching(&entry.id) {
                continue;
            }
            remove_file(&entry.file_path).await;
            remove_file(&part_path(&entry.file_path)).await;
            info!("vod {} expired, removed {}", entry.id, entry.file_path.display());
        }
        Ok(expired.len())
    }
}

pub(crate) async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("remove {} error: {:?}", path.display(), e);
        }
    }
}

/// Keeps `[A-Za-z0-9_-]`, replaces everything else so the id can never
/// leave the cache directory
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn extension_of(source_url: &str) -> String {
    url::Url::parse(source_url)
        .ok()
        .and_then(|url| {
            let name = url.path_segments()?.next_back()?.to_string();
            let (_, ext) = name.rsplit_once('.')?;
            (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
                .then(|| ext.to_ascii_lowercase())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("mv42"), "mv42");
        assert_eq!(sanitize_id("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_id("s01 e02"), "s01_e02");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("http://x/movie/1/42.mkv"), "mkv");
        assert_eq!(extension_of("http://x/movie/1/42.MP4?token=a"), "mp4");
        assert_eq!(extension_of("http://x/movie/1/42"), "mp4");
        assert_eq!(extension_of("http://x/movie/1/42.verylongext"), "mp4");
    }

    #[test]
    fn test_ttl_clamp() {
        let config = VodConfig::from_config(&Config::default());
        assert_eq!(config.ttl_days(None), 7);
        assert_eq!(config.ttl_days(Some(0)), 1);
        assert_eq!(config.ttl_days(Some(90)), 30);
        assert_eq!(config.ttl_days(Some(3)), 3);
    }
}
