use api::media::VodStatus;
use api::response::CacheState;
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use http::{HeaderMap, Method, StatusCode};

use crate::error::AppError;
use crate::route::AppState;
use crate::vod::serve_growing_file;

const DEFAULT_LIST_LIMIT: u64 = 100;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::VOD, get(index).post(start))
        .route(&api::path::vod_status("{id}"), get(status))
        .route(&api::path::vod_file("{id}"), get(file))
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<api::request::StartCache>,
) -> crate::result::Result<(StatusCode, Json<api::response::CacheStart>)> {
    let (cache_state, entry) = state.vod.start_cache(req).await?;
    let code = match cache_state {
        CacheState::Started => StatusCode::ACCEPTED,
        CacheState::Cached | CacheState::Downloading => StatusCode::OK,
    };
    Ok((
        code,
        Json(api::response::CacheStart {
            state: cache_state,
            entry: entry.into(),
        }),
    ))
}

async fn index(
    State(state): State<AppState>,
    Query(req): Query<api::request::QueryList>,
) -> crate::result::Result<Json<Vec<api::response::VodCache>>> {
    let limit = req.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    Ok(Json(
        state
            .vod
            .list(limit)
            .await?
            .into_iter()
            .map(|entry| entry.into())
            .collect(),
    ))
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> crate::result::Result<Json<api::response::VodCache>> {
    Ok(Json(state.vod.get(&id).await?.into()))
}

/// GET and HEAD; HEAD is routed here by axum too
async fn file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> crate::result::Result<Response> {
    let entry = state.vod.get(&id).await?;
    if entry.status == VodStatus::Failed {
        return Err(AppError::CacheNotFound(format!(
            "{}: {}",
            id,
            entry.error.unwrap_or_default()
        )));
    }
    state.vod.touch(&id).await;
    serve_growing_file(
        &entry.file_path,
        None,
        entry.total_bytes,
        &method,
        &headers,
        &state.vod.config().serve,
    )
    .await
}
