use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions: usize,
    pub streams: usize,
    pub links: u64,
    pub vod: usize,
}

pub async fn cleanup_tick(state: AppState) {
    loop {
        tokio::time::sleep(state.config.cleanup_interval()).await;
        let report = do_cleanup(&state, Utc::now()).await;
        if report != CleanupReport::default() {
            info!(?report, "cleanup");
        } else {
            debug!("cleanup: nothing to do");
        }
    }
}

/// One sweep at `now`. Every step runs even when an earlier one failed.
pub async fn do_cleanup(state: &AppState, now: DateTime<Utc>) -> CleanupReport {
    let now_ms = now.timestamp_millis();
    let mut report = CleanupReport::default();

    let expired = state
        .manager
        .sessions()
        .expire_idle(now_ms, state.config.session_timeout())
        .await;
    report.sessions = expired.len();
    for session in expired {
        info!("user session expired: {}", session.identity);
        if let Some(stream_id) = session.stream_id {
            if let Err(e) = state
                .manager
                .remove_client(&stream_id, &session.identity)
                .await
            {
                debug!("expire {} from {}: {}", session.identity, stream_id, e);
            }
        }
    }

    report.streams = state
        .manager
        .sweep_idle(now_ms, state.config.stream_idle_timeout())
        .await
        .len();

    match state.gateway.delete_expired_links(now).await {
        Ok(n) => report.links = n,
        Err(e) => error!("delete expired links error: {:?}", e),
    }

    match state.vod.purge_expired(now).await {
        Ok(n) => report.vod = n,
        Err(e) => error!("purge expired vod error: {:?}", e),
    }

    report
}
