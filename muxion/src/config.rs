use std::{env, fs, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub http: Http,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub session: Session,
    #[serde(default)]
    pub stream: Stream,
    #[serde(default)]
    pub cleanup: Cleanup,
    #[serde(default)]
    pub link: Link,
    #[serde(default)]
    pub vod: Vod,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub upstream: Upstream,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Http {
    #[serde(default = "default_http_listen")]
    pub listen: SocketAddr,
    #[serde(default)]
    pub cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    /// Seconds without any request before a viewer session is dropped
    #[serde(default)]
    pub timeout: SessionTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTimeout(pub u64);

impl Default for SessionTimeout {
    fn default() -> Self {
        SessionTimeout(30 * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    /// Seconds without upstream data or a new request before teardown
    #[serde(default = "default_stream_idle_timeout")]
    pub idle_timeout: u64,
    /// Number of chunks kept in each ring
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    /// Upper bound of a single chunk in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks buffered between a dispatcher and the HTTP writer
    #[serde(default = "default_client_queue")]
    pub client_queue: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cleanup {
    #[serde(default)]
    pub interval: CleanupInterval,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupInterval(pub u64);

impl Default for CleanupInterval {
    fn default() -> Self {
        CleanupInterval(5 * 60)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    #[serde(default = "default_link_ttl")]
    pub ttl: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vod {
    #[serde(default = "default_vod_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_ttl_days")]
    pub default_ttl_days: u32,
    #[serde(default = "default_min_ttl_days")]
    pub min_ttl_days: u32,
    #[serde(default = "default_max_ttl_days")]
    pub max_ttl_days: u32,
    /// Milliseconds between progress writes to the gateway
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Milliseconds between file growth checks while serving
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
    /// Seconds a range request may wait for its first byte
    #[serde(default = "default_range_wait_timeout")]
    pub range_wait_timeout: u64,
    /// Seconds a failed row is kept before the sweep removes it
    #[serde(default = "default_failed_ttl")]
    pub failed_ttl: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    /// e.g. `sqlite://tvmux.db?mode=rwc`; unset keeps everything in memory
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_db_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_db_connect_timeout")]
    pub connect_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_upstream_connect_timeout")]
    pub connect_timeout: u64,
}

fn default_http_listen() -> SocketAddr {
    SocketAddr::from_str(&format!(
        "0.0.0.0:{}",
        env::var("PORT").unwrap_or(String::from("8080"))
    ))
    .expect("invalid listen address")
}

fn default_log_level() -> String {
    env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            "debug".to_string()
        } else {
            "info".to_string()
        }
    })
}

fn default_stream_idle_timeout() -> u64 {
    120
}

fn default_ring_capacity() -> usize {
    256
}

fn default_chunk_size() -> usize {
    32 * 1024
}

fn default_client_queue() -> usize {
    64
}

fn default_link_ttl() -> u64 {
    60 * 60
}

fn default_vod_dir() -> PathBuf {
    PathBuf::from("vod_cache")
}

fn default_ttl_days() -> u32 {
    7
}

fn default_min_ttl_days() -> u32 {
    1
}

fn default_max_ttl_days() -> u32 {
    30
}

fn default_progress_interval() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    500
}

fn default_range_wait_timeout() -> u64 {
    60
}

fn default_failed_ttl() -> u64 {
    10 * 60
}

fn default_db_max_connections() -> u32 {
    5
}

fn default_db_connect_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    format!("tvmux/{}", env!("CARGO_PKG_VERSION"))
}

fn default_upstream_connect_timeout() -> u64 {
    10
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: default_http_listen(),
            cors: Default::default(),
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for Stream {
    fn default() -> Self {
        Self {
            idle_timeout: default_stream_idle_timeout(),
            ring_capacity: default_ring_capacity(),
            chunk_size: default_chunk_size(),
            client_queue: default_client_queue(),
        }
    }
}

impl Default for Link {
    fn default() -> Self {
        Self {
            ttl: default_link_ttl(),
        }
    }
}

impl Default for Vod {
    fn default() -> Self {
        Self {
            dir: default_vod_dir(),
            default_ttl_days: default_ttl_days(),
            min_ttl_days: default_min_ttl_days(),
            max_ttl_days: default_max_ttl_days(),
            progress_interval: default_progress_interval(),
            poll_interval: default_poll_interval(),
            range_wait_timeout: default_range_wait_timeout(),
            failed_ttl: default_failed_ttl(),
        }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_db_max_connections(),
            connect_timeout: default_db_connect_timeout(),
        }
    }
}

impl Default for Upstream {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: default_user_agent(),
            connect_timeout: default_upstream_connect_timeout(),
        }
    }
}

impl Upstream {
    /// Upstream location of a stream id, `{base_url}/{kind}/{id}`
    pub fn stream_url(&self, kind: api::media::StreamKind, id: &str) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}/{}", base.trim_end_matches('/'), kind, id))
    }
}

impl Config {
    pub fn parse(path: Option<String>) -> anyhow::Result<Self> {
        let result = fs::read_to_string(path.unwrap_or(String::from("tvmux.toml")))
            .or(fs::read_to_string("/etc/tvmux/tvmux.toml"))
            .unwrap_or("".to_string());
        let cfg: Self = toml::from_str(result.as_str())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.stream.ring_capacity == 0 {
            anyhow::bail!("stream.ring_capacity must be greater than 0");
        }
        if self.stream.chunk_size == 0 {
            anyhow::bail!("stream.chunk_size must be greater than 0");
        }
        if self.stream.client_queue == 0 {
            anyhow::bail!("stream.client_queue must be greater than 0");
        }
        if self.cleanup.interval.0 == 0 {
            anyhow::bail!("cleanup.interval must be greater than 0");
        }
        if self.vod.min_ttl_days > self.vod.max_ttl_days {
            anyhow::bail!(
                "vod.min_ttl_days ({}) is greater than vod.max_ttl_days ({})",
                self.vod.min_ttl_days,
                self.vod.max_ttl_days
            );
        }
        if let Some(base) = &self.upstream.base_url {
            url::Url::parse(base)
                .map_err(|e| anyhow::anyhow!("upstream.base_url error : {}", e))?;
        }
        Ok(())
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session.timeout.0)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup.interval.0)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream.idle_timeout)
    }

    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link.ttl)
    }
}
