use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;

use crate::error::AppError;
use crate::route::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::SESSIONS, get(index))
        .route(
            &api::path::session("{user}"),
            get(show).delete(disconnect),
        )
}

async fn index(
    State(state): State<AppState>,
) -> crate::result::Result<Json<Vec<api::response::UserSession>>> {
    let mut sessions = state.manager.sessions().list().await;
    sessions.sort_by(|a, b| a.identity.cmp(&b.identity));
    Ok(Json(sessions.into_iter().map(|s| s.into()).collect()))
}

async fn show(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> crate::result::Result<Json<api::response::UserSession>> {
    state
        .manager
        .sessions()
        .get_user_session(&user)
        .await
        .map(|session| Json(session.into()))
        .ok_or_else(|| AppError::session_not_found(user))
}

async fn disconnect(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> crate::result::Result<StatusCode> {
    state.manager.disconnect_user(&user).await;
    Ok(StatusCode::NO_CONTENT)
}
