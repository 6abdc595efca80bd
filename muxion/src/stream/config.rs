use std::time::Duration;

use crate::config::Config;

#[derive(Clone)]
pub struct ManagerConfig {
    pub ring_capacity: usize,
    pub chunk_size: usize,
    pub client_queue: usize,
    pub idle_timeout: Duration,
    pub user_agent: String,
    pub connect_timeout: Duration,
}

impl ManagerConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            ring_capacity: cfg.stream.ring_capacity,
            chunk_size: cfg.stream.chunk_size,
            client_queue: cfg.stream.client_queue,
            idle_timeout: Duration::from_secs(cfg.stream.idle_timeout),
            user_agent: cfg.upstream.user_agent.clone(),
            connect_timeout: Duration::from_secs(cfg.upstream.connect_timeout),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
