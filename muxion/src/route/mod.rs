use std::net::SocketAddr;
use std::sync::Arc;

use http::{header, HeaderMap};

use crate::config::Config;
use crate::gateway::{Gateway, NetInfo};
use crate::link::LinkService;
use crate::stream::Manager;
use crate::vod::VodCacheManager;

pub mod link;
pub mod session;
pub mod stream;
pub mod vod;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: Arc<dyn Gateway>,
    pub manager: Manager,
    pub vod: VodCacheManager,
    pub links: LinkService,
    pub client: reqwest::Client,
}

/// Client address and agent. Proxy headers win over the peer address.
pub(crate) fn net_info(headers: &HeaderMap, peer: Option<SocketAddr>) -> NetInfo {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };
    let remote_addr = header_str("x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .or_else(|| header_str("x-real-ip").map(str::to_string))
        .or_else(|| peer.map(|addr| addr.ip().to_string()));
    NetInfo {
        remote_addr,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    #[test]
    fn test_net_info_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("VLC/3.0"));
        let peer: SocketAddr = "192.0.2.1:50000".parse().unwrap();
        let net = net_info(&headers, Some(peer));
        assert_eq!(net.remote_addr.as_deref(), Some("203.0.113.7"));
        assert_eq!(net.user_agent.as_deref(), Some("VLC/3.0"));

        assert_eq!(net_info(&HeaderMap::new(), None), NetInfo::default());
    }

    #[test]
    fn test_net_info_falls_back_to_peer() {
        let peer: SocketAddr = "192.0.2.1:50000".parse().unwrap();
        let net = net_info(&HeaderMap::new(), Some(peer));
        assert_eq!(net.remote_addr.as_deref(), Some("192.0.2.1"));
        assert!(net.user_agent.is_none());
    }
}
