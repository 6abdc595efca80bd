use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use axum::extract::Request;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, Level};

use crate::config::Config;
use crate::gateway::{DatabaseGateway, Gateway, MemoryGateway};
use crate::link::LinkService;
use crate::session::SessionRegistry;
use crate::stream::config::ManagerConfig;
use crate::stream::Manager;
use crate::vod::{VodCacheManager, VodConfig};

pub use crate::error::AppError;
pub use crate::route::AppState;

pub mod config;
pub mod entity;
pub mod gateway;
pub mod link;
pub mod migration;
pub mod route;
pub mod session;
pub mod stream;
pub mod tick;
pub mod vod;

mod convert;
mod error;
mod metrics;
mod result;

/// Wires the gateway, the registries and the managers together
pub async fn new_state(cfg: Config) -> anyhow::Result<AppState> {
    let gateway: Arc<dyn Gateway> = match &cfg.database.url {
        Some(url) => {
            info!("using database gateway");
            Arc::new(DatabaseGateway::new(&cfg.database, url).await?)
        }
        None => {
            info!("no database configured, keeping state in memory");
            Arc::new(MemoryGateway::new())
        }
    };
    let sessions = SessionRegistry::new(gateway.clone());
    let manager = Manager::new(ManagerConfig::from_config(&cfg), sessions, gateway.clone())?;
    let vod = VodCacheManager::new(VodConfig::from_config(&cfg), gateway.clone())?;
    let links = LinkService::new(gateway.clone(), cfg.link_ttl());
    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(cfg.upstream.connect_timeout))
        .build()?;
    Ok(AppState {
        config: cfg,
        gateway,
        manager,
        vod,
        links,
        client,
    })
}

pub fn router(state: AppState) -> Router {
    let cors = state.config.http.cors;
    Router::new()
        .merge(
            route::stream::route()
                .merge(route::session::route())
                .merge(route::vod::route())
                .merge(route::link::route()),
        )
        .route(api::path::METRICS, get(metrics))
        .with_state(state)
        .layer(if cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        })
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let span = info_span!(
                        "http_request",
                        uri = ?request.uri(),
                        method = ?request.method(),
                        span_id = tracing::field::Empty,
                    );
                    span.record(
                        "span_id",
                        span.id().unwrap_or(tracing::Id::from_u64(42)).into_u64(),
                    );
                    span
                })
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO))
                .on_failure(tower_http::trace::DefaultOnFailure::new().level(Level::INFO)),
        )
}

pub async fn server_up<F>(cfg: Config, listener: TcpListener, signal: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    metrics_register();
    let state = new_state(cfg).await?;
    tokio::spawn(tick::cleanup_tick(state.clone()));

    axum::serve(
        listener,
        router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await
    .unwrap_or_else(|e| error!("Application error: {e}"));
    state.manager.shutdown().await;
    Ok(())
}

static METRICS_REGISTER: Once = Once::new();

pub fn metrics_register() {
    METRICS_REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(metrics::STREAM.clone()),
            Box::new(metrics::VIEWER.clone()),
            Box::new(metrics::UPSTREAM_BYTES.clone()),
            Box::new(metrics::FAST_FORWARD.clone()),
            Box::new(metrics::VOD_DOWNLOADING.clone()),
            Box::new(metrics::VOD_READY.clone()),
            Box::new(metrics::VOD_FAILED.clone()),
        ];
        for collector in collectors {
            if let Err(e) = metrics::REGISTRY.register(collector) {
                error!("metrics register error: {:?}", e);
            }
        }
    });
}

async fn metrics() -> String {
    metrics::ENCODER
        .encode_to_string(&metrics::REGISTRY.gather())
        .unwrap_or_else(|e| {
            error!("metrics encode error: {:?}", e);
            String::new()
        })
}
