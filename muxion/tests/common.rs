#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use muxion::config::Config;
use muxion::AppState;
use tokio::net::TcpListener;

pub const MOVIE_SIZE: usize = 256 * 1024;
const MOVIE_CHUNK: usize = 16 * 1024;

/// Local stand-in for the IPTV provider.
///
/// - `/live/{id}` streams `"{id}-{seq}\n"` lines forever
/// - `/movie/{id}` and `/series/{id}` send [`movie_bytes`] slowly, honoring
///   a single `bytes=start-end` range
/// - anything under `/fail/` answers 500
/// - `/partial/{id}` answers 206 with a short body
#[derive(Clone)]
pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl Upstream {
    pub async fn start() -> anyhow::Result<Self> {
        let hits: Arc<Mutex<HashMap<String, usize>>> = Default::default();
        let app = Router::new()
            .route("/live/{id}", get(live))
            .route("/movie/{id}", get(movie))
            .route("/series/{id}", get(movie))
            .route("/fail/{id}", get(fail))
            .route("/partial/{id}", get(partial))
            .with_state(hits.clone());
        let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move { axum::serve(listener, app).await });
        Ok(Self { addr, hits })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

fn hit(hits: &Mutex<HashMap<String, usize>>, path: String) {
    *hits.lock().unwrap().entry(path).or_default() += 1;
}

async fn live(
    State(hits): State<Arc<Mutex<HashMap<String, usize>>>>,
    Path(id): Path<String>,
) -> Response {
    hit(&hits, format!("/live/{}", id));
    let body = async_stream::stream! {
        let mut seq = 0u64;
        loop {
            yield Ok::<_, Infallible>(Bytes::from(format!("{}-{:08}\n", id, seq)));
            seq += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    axum::http::Response::builder()
        .header(header::CONTENT_TYPE, "video/mp2t")
        .body(Body::from_stream(body))
        .unwrap()
}

async fn movie(
    State(hits): State<Arc<Mutex<HashMap<String, usize>>>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    hit(&hits, uri.path().to_string());
    let data = movie_bytes();
    let (status, start, end) = match headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes="))
        .and_then(|value| value.split_once('-'))
    {
        Some((start, end)) => {
            let start: usize = start.parse().unwrap_or(0);
            let end: usize = end.parse().unwrap_or(MOVIE_SIZE - 1).min(MOVIE_SIZE - 1);
            (StatusCode::PARTIAL_CONTENT, start, end)
        }
        None => (StatusCode::OK, 0, MOVIE_SIZE - 1),
    };
    let slice = Bytes::from(data[start..=end].to_vec());
    let length = slice.len();
    let body = async_stream::stream! {
        let mut slice = slice;
        while !slice.is_empty() {
            let n = slice.len().min(MOVIE_CHUNK);
            yield Ok::<_, Infallible>(slice.split_to(n));
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    let mut builder = axum::http::Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, length)
        .header(header::ACCEPT_RANGES, "bytes");
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", start, end, MOVIE_SIZE),
        );
    }
    builder.body(Body::from_stream(body)).unwrap()
}

async fn fail(
    State(hits): State<Arc<Mutex<HashMap<String, usize>>>>,
    Path(id): Path<String>,
) -> StatusCode {
    hit(&hits, format!("/fail/{}", id));
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn partial(
    State(hits): State<Arc<Mutex<HashMap<String, usize>>>>,
    Path(id): Path<String>,
) -> (StatusCode, [(header::HeaderName, &'static str); 1], String) {
    hit(&hits, format!("/partial/{}", id));
    (
        StatusCode::PARTIAL_CONTENT,
        [(header::CONTENT_RANGE, "bytes 0-7/100")],
        format!("{}-part\n", id),
    )
}

pub fn movie_bytes() -> Vec<u8> {
    (0..MOVIE_SIZE).map(|i| (i % 251) as u8).collect()
}

pub fn config(upstream: &Upstream, vod_dir: &FsPath) -> Config {
    let mut cfg = Config::default();
    cfg.upstream.base_url = Some(upstream.base_url());
    cfg.vod.dir = vod_dir.to_path_buf();
    cfg.vod.progress_interval = 50;
    cfg.vod.poll_interval = 20;
    cfg.vod.range_wait_timeout = 10;
    cfg.stream.ring_capacity = 64;
    cfg.stream.chunk_size = 1024;
    cfg
}

/// Serves the muxion router for `state` on a random local port
pub async fn spawn_app(state: AppState) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await?;
    let addr = listener.local_addr()?;
    let app = muxion::router(state).into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(addr)
}

/// Polls `f` until it holds or five seconds pass
pub async fn eventually<F, Fut>(mut f: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..250 {
        if f().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
