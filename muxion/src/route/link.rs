use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::{header, HeaderMap, StatusCode};
use tracing::debug;

use crate::error::AppError;
use crate::route::AppState;

/// Upstream response headers passed through to the client
const PASS_HEADERS: [header::HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_RANGE,
    header::ACCEPT_RANGES,
    header::LAST_MODIFIED,
];

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::LINKS, post(create))
        .route(&api::path::link("{token}"), get(proxy))
}

async fn create(
    State(state): State<AppState>,
    Json(req): Json<api::request::CreateLink>,
) -> crate::result::Result<Json<api::response::TemporaryLink>> {
    let link = state.links.generate(&req.user, &req.url, req.title).await?;
    Ok(Json(link.into()))
}

async fn proxy(
    State(state): State<AppState>,
    Path(token): Path<String>,
    headers: HeaderMap,
) -> crate::result::Result<Response> {
    let link = state.links.get(&token).await?;
    let mut request = state
        .client
        .get(&link.url)
        .header(header::USER_AGENT, state.config.upstream.user_agent.as_str());
    if let Some(range) = headers.get(header::RANGE) {
        request = request.header(header::RANGE, range.clone());
    }
    let response = request.send().await.map_err(AppError::upstream)?;
    let status = response.status();
    debug!("link {} upstream status {}", token, status);
    if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
        return Err(AppError::upstream(format!("upstream status {}", status)));
    }

    let mut builder = http::Response::builder().status(status);
    for name in PASS_HEADERS.iter() {
        if let Some(value) = response.headers().get(name) {
            builder = builder.header(name, value.clone());
        }
    }
    Ok(builder.body(Body::from_stream(response.bytes_stream()))?)
}
