use lazy_static::lazy_static;
use prometheus::{Gauge, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref STREAM: Gauge = Gauge::new("stream", "active upstream streams").unwrap();
    pub static ref VIEWER: Gauge = Gauge::new("viewer", "registered stream viewers").unwrap();
    pub static ref UPSTREAM_BYTES: IntCounter =
        IntCounter::new("upstream_bytes", "bytes read from upstream streams").unwrap();
    pub static ref FAST_FORWARD: IntCounter =
        IntCounter::new("fast_forward", "lagging viewers skipped forward").unwrap();
    pub static ref VOD_DOWNLOADING: Gauge =
        Gauge::new("vod_downloading", "vod fetches in flight").unwrap();
    pub static ref VOD_READY: IntCounter =
        IntCounter::new("vod_ready", "vod fetches completed").unwrap();
    pub static ref VOD_FAILED: IntCounter =
        IntCounter::new("vod_failed", "vod fetches failed").unwrap();
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("tvmux".to_string()), None).unwrap();
    pub static ref ENCODER: TextEncoder = TextEncoder::new();
}
