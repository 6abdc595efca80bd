use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::FromStr;

use api::media::StreamKind;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::response::Response;
use axum::routing::{delete, get};
use axum::{Json, Router};
use http::{header, HeaderMap, StatusCode};

use crate::error::AppError;
use crate::route::{net_info, AppState};
use crate::stream::StreamRequest;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(&api::path::stream("{kind}", "{stream}"), get(watch))
        .route(api::path::STREAMS, get(index))
        .route(
            &api::path::stream_viewer("{stream}", "{user}"),
            delete(remove_viewer),
        )
}

/// Joins the shared upstream fetch and streams the viewer's queue back.
/// Dropping the body on disconnect ends the viewer's dispatcher, which
/// deregisters it.
async fn watch(
    State(state): State<AppState>,
    Path((kind, stream)): Path<(String, String)>,
    Query(req): Query<api::request::QueryViewer>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> crate::result::Result<Response> {
    let kind = StreamKind::from_str(&kind)
        .map_err(|_| AppError::bad_request(format!("unknown stream kind: {}", kind)))?;
    if req.user.trim().is_empty() {
        return Err(AppError::bad_request("user is required"));
    }
    let url = state
        .config
        .upstream
        .stream_url(kind, &stream)
        .ok_or_else(|| AppError::from(anyhow::anyhow!("upstream.base_url is not configured")))?;

    let net = net_info(&headers, Some(peer));
    state
        .manager
        .sessions()
        .register_user(&req.user, net.clone())
        .await;
    let mut subscription = state
        .manager
        .request_stream(StreamRequest {
            identity: req.user,
            stream_id: stream.clone(),
            kind,
            title: req.title.unwrap_or(stream),
            url: url.clone(),
            net,
            headers,
        })
        .await?;

    let content_type = match kind {
        StreamKind::Live => "video/mp2t".to_string(),
        _ => mime_guess::from_path(&url)
            .first_or_octet_stream()
            .to_string(),
    };
    let body = async_stream::stream! {
        while let Some(chunk) = subscription.receiver.recv().await {
            yield Ok::<_, Infallible>(chunk);
        }
    };
    Ok(http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(body))?)
}

async fn index(
    State(state): State<AppState>,
) -> crate::result::Result<Json<Vec<api::response::Stream>>> {
    Ok(Json(
        state
            .manager
            .info(vec![])
            .await
            .into_iter()
            .map(|handle| handle.into())
            .collect(),
    ))
}

async fn remove_viewer(
    State(state): State<AppState>,
    Path((stream, user)): Path<(String, String)>,
) -> crate::result::Result<StatusCode> {
    state.manager.remove_client(&stream, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}
