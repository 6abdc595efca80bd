use std::sync::Arc;
use std::time::Duration;

use api::media::StreamKind;
use chrono::Utc;
use futures_util::StreamExt;
use http::HeaderMap;
use muxion::config::SessionTimeout;
use muxion::gateway::{Gateway, MemoryGateway, NetInfo};
use muxion::session::SessionRegistry;
use muxion::stream::config::ManagerConfig;
use muxion::stream::{Manager, StreamRequest, Subscription};
use muxion::AppState;
use tempfile::TempDir;
use tokio::time::timeout;

mod common;
use common::{eventually, Upstream};

fn request(upstream: &Upstream, user: &str, stream: &str) -> StreamRequest {
    StreamRequest {
        identity: user.to_string(),
        stream_id: stream.to_string(),
        kind: StreamKind::Live,
        title: format!("Channel {}", stream),
        url: upstream.url(&format!("/live/{}", stream)),
        net: NetInfo::default(),
        headers: HeaderMap::new(),
    }
}

async fn setup() -> anyhow::Result<(Upstream, AppState, TempDir)> {
    let upstream = Upstream::start().await?;
    let dir = TempDir::new()?;
    let state = muxion::new_state(common::config(&upstream, dir.path())).await?;
    Ok((upstream, state, dir))
}

async fn next_line(subscription: &mut Subscription) -> anyhow::Result<String> {
    let chunk = timeout(Duration::from_secs(5), subscription.receiver.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("viewer queue closed"))?;
    Ok(String::from_utf8_lossy(&chunk).to_string())
}

async fn closed(subscription: &mut Subscription) -> bool {
    loop {
        match timeout(Duration::from_secs(5), subscription.receiver.recv()).await {
            Ok(Some(_)) => continue,
            Ok(None) => return true,
            Err(_) => return false,
        }
    }
}

#[tokio::test]
async fn test_two_viewers_share_one_upstream_fetch() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut alice = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut bob = manager.request_stream(request(&upstream, "bob", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    assert!(next_line(&mut alice).await?.starts_with("ch1-"));
    assert!(next_line(&mut bob).await?.starts_with("ch1-"));

    let handle = manager.get("ch1").await.expect("stream ch1");
    assert_eq!(handle.session.viewer_count(), 2);
    assert_eq!(handle.buffer.viewer_count(), 2);
    assert_eq!(upstream.hits("/live/ch1"), 1);
    assert_eq!(manager.stream_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_requests_open_one_upstream() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;

    let mut tasks = vec![];
    for i in 0..8 {
        let manager = state.manager.clone();
        let req = request(&upstream, &format!("viewer{}", i), "ch7");
        tasks.push(tokio::spawn(async move { manager.request_stream(req).await }));
    }
    let mut subscriptions = vec![];
    for task in tasks {
        subscriptions.push(task.await?.map_err(|e| anyhow::anyhow!("{}", e))?);
    }
    for subscription in subscriptions.iter_mut() {
        next_line(subscription).await?;
    }
    assert_eq!(upstream.hits("/live/ch7"), 1);
    assert_eq!(state.manager.get("ch7").await.unwrap().session.viewer_count(), 8);
    Ok(())
}

#[tokio::test]
async fn test_last_viewer_leaving_tears_down() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut alice = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut bob = manager.request_stream(request(&upstream, "bob", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    next_line(&mut alice).await?;
    let handle = manager.get("ch1").await.unwrap();

    manager.remove_client("ch1", "alice").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(closed(&mut alice).await);
    assert!(handle.session.is_active());
    assert_eq!(handle.session.viewer_count(), 1);
    next_line(&mut bob).await?;

    manager.remove_client("ch1", "bob").await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(closed(&mut bob).await);
    assert!(!handle.session.is_active());
    assert!(!handle.buffer.is_active());
    assert!(manager.get("ch1").await.is_none());

    // removing again is an error, not a panic
    assert!(manager.remove_client("ch1", "bob").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_switching_streams_leaves_the_previous_one() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut first = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    next_line(&mut first).await?;
    let ch1 = manager.get("ch1").await.unwrap();

    let mut second = manager.request_stream(request(&upstream, "alice", "ch2")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(next_line(&mut second).await?.starts_with("ch2-"));
    assert!(closed(&mut first).await);
    assert!(!ch1.session.is_active());

    let session = manager.sessions().get_user_session("alice").await.unwrap();
    assert_eq!(session.stream_id.as_deref(), Some("ch2"));
    Ok(())
}

#[tokio::test]
async fn test_rejoin_replaces_the_old_delivery() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut first = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let mut second = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    assert!(closed(&mut first).await);
    next_line(&mut second).await?;

    let handle = manager.get("ch1").await.unwrap();
    assert_eq!(handle.buffer.viewer_count(), 1);
    assert!(handle.session.is_active());
    assert_eq!(upstream.hits("/live/ch1"), 1);
    Ok(())
}

#[tokio::test]
async fn test_dropped_receiver_deregisters_viewer() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = state.manager.clone();

    let mut alice = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    next_line(&mut alice).await?;
    let handle = manager.get("ch1").await.unwrap();
    drop(alice);

    let handle = &handle;
    assert!(eventually(|| async move { !handle.session.is_active() }).await);
    assert!(manager.get("ch1").await.is_none());
    let session = manager.sessions().get_user_session("alice").await.unwrap();
    assert!(session.stream_id.is_none());
    Ok(())
}

#[tokio::test]
async fn test_upstream_failure_closes_viewers() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut req = request(&upstream, "alice", "bad");
    req.url = upstream.url("/fail/bad");
    let mut alice = manager.request_stream(req).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    assert!(closed(&mut alice).await);
    assert!(eventually(|| async move { manager.get("bad").await.is_none() }).await);
    assert!(eventually(|| async move {
        manager
            .sessions()
            .get_user_session("alice")
            .await
            .is_some_and(|session| session.stream_id.is_none())
    })
    .await);
    Ok(())
}

#[tokio::test]
async fn test_non_200_upstream_delivers_nothing() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut req = request(&upstream, "alice", "p1");
    req.url = upstream.url("/partial/p1");
    let mut alice = manager.request_stream(req).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let first = timeout(Duration::from_secs(5), alice.receiver.recv()).await?;
    assert!(first.is_none());
    assert_eq!(upstream.hits("/partial/p1"), 1);
    assert!(eventually(|| async move { manager.get("p1").await.is_none() }).await);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_user() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;
    let manager = &state.manager;

    let mut alice = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    next_line(&mut alice).await?;

    assert_eq!(manager.disconnect_user("alice").await.as_deref(), Some("ch1"));
    assert!(closed(&mut alice).await);
    assert!(manager.get("ch1").await.is_none());
    assert_eq!(manager.disconnect_user("alice").await, None);
    Ok(())
}

#[tokio::test]
async fn test_history_recorded_once_per_stream() -> anyhow::Result<()> {
    let upstream = Upstream::start().await?;
    let gateway = MemoryGateway::new();
    let shared: Arc<dyn Gateway> = Arc::new(gateway.clone());
    let manager = Manager::new(
        ManagerConfig::default(),
        SessionRegistry::new(shared.clone()),
        shared,
    )?;

    let _alice = manager.request_stream(request(&upstream, "alice", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;
    let _bob = manager.request_stream(request(&upstream, "bob", "ch1")).await.map_err(|e| anyhow::anyhow!("{e}"))?;

    let history = gateway.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].identity, "alice");
    assert_eq!(history[0].stream_id, "ch1");
    assert_eq!(history[0].title, "Channel ch1");
    Ok(())
}

#[tokio::test]
async fn test_cleanup_expires_idle_user_and_stream() -> anyhow::Result<()> {
    let upstream = Upstream::start().await?;
    let dir = TempDir::new()?;
    let mut cfg = common::config(&upstream, dir.path());
    cfg.session.timeout = SessionTimeout(60);
    let state = muxion::new_state(cfg).await?;

    let mut alice = state
        .manager
        .request_stream(request(&upstream, "alice", "live5"))
        .await.map_err(|e| anyhow::anyhow!("{e}"))?;
    next_line(&mut alice).await?;
    let handle = state.manager.get("live5").await.unwrap();

    let report = muxion::tick::do_cleanup(&state, Utc::now() + chrono::Duration::seconds(61)).await;
    assert_eq!(report.sessions, 1);
    assert!(state.manager.sessions().get_user_session("alice").await.is_none());
    assert!(!handle.session.is_active());
    assert!(closed(&mut alice).await);
    Ok(())
}

#[tokio::test]
async fn test_cleanup_tears_down_stalled_stream() -> anyhow::Result<()> {
    let (upstream, state, _dir) = setup().await?;

    let mut alice = state
        .manager
        .request_stream(request(&upstream, "alice", "ch9"))
        .await.map_err(|e| anyhow::anyhow!("{e}"))?;
    next_line(&mut alice).await?;
    let handle = state.manager.get("ch9").await.unwrap();

    // session timeout is 30 minutes, stream idle timeout two
    let report = muxion::tick::do_cleanup(&state, Utc::now() + chrono::Duration::seconds(180)).await;
    assert_eq!(report.sessions, 0);
    assert_eq!(report.streams, 1);
    assert!(!handle.session.is_active());
    assert!(closed(&mut alice).await);
    Ok(())
}

#[tokio::test]
async fn test_http_viewer_lifecycle() -> anyhow::Result<()> {
    let (_upstream, state, _dir) = setup().await?;
    let addr = common::spawn_app(state.clone()).await?;
    let client = reqwest::Client::new();

    let response = client
        .get(format!(
            "http://{addr}{}?user=alice&title=News",
            api::path::stream("live", "ch1")
        ))
        .send()
        .await?
        .error_for_status()?;
    assert_eq!(response.headers()["content-type"], "video/mp2t");
    let mut body = response.bytes_stream();
    let chunk = timeout(Duration::from_secs(5), body.next())
        .await?
        .expect("a chunk")?;
    assert!(!chunk.is_empty());

    let streams: Vec<api::response::Stream> = client
        .get(format!("http://{addr}{}", api::path::STREAMS))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].id, "ch1");
    assert_eq!(streams[0].title, "News");
    assert_eq!(streams[0].viewers[0].identity, "alice");

    let session: api::response::UserSession = client
        .get(format!("http://{addr}{}", api::path::session("alice")))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(session.stream_id.as_deref(), Some("ch1"));
    assert_eq!(session.remote_addr.as_deref(), Some("127.0.0.1"));

    drop(body);
    let manager = &state.manager;
    assert!(eventually(|| async move { manager.get("ch1").await.is_none() }).await);
    Ok(())
}

#[tokio::test]
async fn test_http_bad_requests() -> anyhow::Result<()> {
    let (_upstream, state, _dir) = setup().await?;
    let addr = common::spawn_app(state).await?;
    let client = reqwest::Client::new();

    let status = client
        .get(format!("http://{addr}/stream/radio/ch1?user=alice"))
        .send()
        .await?
        .status();
    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);

    let status = client
        .get(format!("http://{addr}{}", api::path::session("nobody")))
        .send()
        .await?
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);

    let status = client
        .delete(format!(
            "http://{addr}{}",
            api::path::stream_viewer("ch1", "alice")
        ))
        .send()
        .await?
        .status();
    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
    Ok(())
}
