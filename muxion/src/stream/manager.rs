use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use api::media::StreamKind;
use bytes::Bytes;
use chrono::Utc;
use http::HeaderMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, NetInfo, StreamStart};
use crate::result::Result;
use crate::session::SessionRegistry;
use crate::stream::buffer::StreamBuffer;
use crate::stream::config::ManagerConfig;
use crate::stream::session::StreamSession;
use crate::stream::{dispatcher, upstream};
use crate::{metrics, AppError};

/// A live stream: its bookkeeping plus its ring
#[derive(Clone)]
pub struct StreamHandle {
    pub session: Arc<StreamSession>,
    pub buffer: Arc<StreamBuffer>,
}

impl StreamHandle {
    fn same(&self, other: &StreamHandle) -> bool {
        Arc::ptr_eq(&self.buffer, &other.buffer)
    }
}

#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub identity: String,
    pub stream_id: String,
    pub kind: StreamKind,
    pub title: String,
    pub url: String,
    pub net: NetInfo,
    /// Client request headers, merged into the upstream request
    pub headers: HeaderMap,
}

/// What a viewer reads from: chunks arrive on `receiver` until the stream
/// stops or the viewer is removed, then the channel closes.
pub struct Subscription {
    pub buffer: Arc<StreamBuffer>,
    pub receiver: mpsc::Receiver<Bytes>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    NoViewers,
    UpstreamEnded,
    UpstreamError,
    IdleTimeout,
    Shutdown,
}

impl std::fmt::Display for TeardownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            TeardownReason::NoViewers => "no viewers",
            TeardownReason::UpstreamEnded => "upstream ended",
            TeardownReason::UpstreamError => "upstream error",
            TeardownReason::IdleTimeout => "idle timeout",
            TeardownReason::Shutdown => "shutdown",
        };
        f.write_str(reason)
    }
}

#[derive(Clone)]
pub struct Manager {
    stream_map: Arc<RwLock<HashMap<String, StreamHandle>>>,
    sessions: SessionRegistry,
    gateway: Arc<dyn Gateway>,
    pub(crate) client: reqwest::Client,
    pub(crate) config: ManagerConfig,
}

impl Manager {
    pub fn new(
        config: ManagerConfig,
        sessions: SessionRegistry,
        gateway: Arc<dyn Gateway>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Manager {
            stream_map: Default::default(),
            sessions,
            gateway,
            client,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Joins the viewer to `stream_id`, starting the upstream fetch if this
    /// is the first viewer. A viewer already watching another stream is
    /// moved off it first.
    pub async fn request_stream(&self, req: StreamRequest) -> Result<Subscription> {
        if let Some(previous) = self
            .sessions
            .assign_stream(&req.identity, &req.stream_id, req.kind)
            .await
        {
            if let Err(e) = self.remove_client(&previous, &req.identity).await {
                debug!("switch {} off {}: {}", req.identity, previous, e);
            }
        }

        let now = Utc::now().timestamp_millis();
        let mut stream_map = self.stream_map.write().await;
        if let Some(handle) = stream_map.get(&req.stream_id).cloned() {
            if let Some(token) = handle.buffer.register(&req.identity) {
                handle.session.see_viewer(&req.identity, now);
                handle.session.touch(now);
                let receiver = self.spawn_dispatcher(&handle, &req.identity, token);
                drop(stream_map);
                info!(
                    "stream : {}, viewer {} joined, viewers : {}",
                    req.stream_id,
                    req.identity,
                    handle.buffer.viewer_count()
                );
                return Ok(Subscription {
                    buffer: handle.buffer,
                    receiver,
                });
            }
            // stopped but not removed yet
            stream_map.remove(&req.stream_id);
        }

        let handle = StreamHandle {
            session: Arc::new(StreamSession::new(
                req.stream_id.clone(),
                req.kind,
                req.title.clone(),
                req.url.clone(),
            )),
            buffer: Arc::new(StreamBuffer::new(
                req.stream_id.clone(),
                req.url.clone(),
                self.config.ring_capacity,
            )),
        };
        let token = handle
            .buffer
            .register(&req.identity)
            .ok_or_else(|| AppError::stream_not_found(&req.stream_id))?;
        handle.session.see_viewer(&req.identity, now);
        stream_map.insert(req.stream_id.clone(), handle.clone());
        let receiver = self.spawn_dispatcher(&handle, &req.identity, token);
        tokio::spawn(upstream::pump(
            self.clone(),
            handle.clone(),
            req.headers.clone(),
        ));
        drop(stream_map);

        metrics::STREAM.inc();
        info!(
            "add stream : {} ({}), first viewer : {}",
            req.stream_id, req.kind, req.identity
        );

        if let Err(e) = self
            .gateway
            .record_stream_start(StreamStart {
                identity: req.identity,
                stream_id: req.stream_id,
                kind: req.kind,
                title: req.title,
                net: req.net,
            })
            .await
        {
            warn!("record stream history error: {:?}", e);
        }

        Ok(Subscription {
            buffer: handle.buffer,
            receiver,
        })
    }

    fn spawn_dispatcher(
        &self,
        handle: &StreamHandle,
        identity: &str,
        token: u64,
    ) -> mpsc::Receiver<Bytes> {
        let (sender, receiver) = mpsc::channel(self.config.client_queue);
        tokio::spawn(dispatcher::run(
            self.clone(),
            handle.clone(),
            identity.to_string(),
            token,
            sender,
        ));
        receiver
    }

    /// Deregisters a viewer; the last viewer out tears the stream down
    pub async fn remove_client(&self, stream_id: &str, identity: &str) -> Result<()> {
        let handle = self
            .get(stream_id)
            .await
            .ok_or_else(|| AppError::stream_not_found(stream_id))?;
        match handle.buffer.unregister(identity) {
            Some(remaining) => {
                self.viewer_left(&handle, identity, remaining).await;
                Ok(())
            }
            None => Err(AppError::session_not_found(format!(
                "{} is not watching {}",
                identity, stream_id
            ))),
        }
    }

    /// Dispatcher-side removal, ignored when the viewer re-registered since
    pub(crate) async fn remove_client_token(
        &self,
        handle: &StreamHandle,
        identity: &str,
        token: u64,
    ) {
        if let Some(remaining) = handle.buffer.unregister_token(identity, token) {
            self.viewer_left(handle, identity, remaining).await;
        }
    }

    async fn viewer_left(&self, handle: &StreamHandle, identity: &str, remaining: usize) {
        let stream_id = &handle.session.stream_id;
        handle.session.remove_viewer(identity);
        self.sessions.release_stream(identity, stream_id).await;
        info!(
            "stream : {}, viewer {} left, viewers : {}",
            stream_id, identity, remaining
        );
        if remaining == 0 {
            self.teardown_if_unwatched(handle).await;
        }
    }

    async fn teardown_if_unwatched(&self, handle: &StreamHandle) {
        let mut stream_map = self.stream_map.write().await;
        // a viewer may have joined between the unregister and this lock
        if handle.buffer.viewer_count() > 0 {
            return;
        }
        if stream_map
            .get(&handle.session.stream_id)
            .is_some_and(|current| current.same(handle))
        {
            stream_map.remove(&handle.session.stream_id);
        }
        drop(stream_map);
        self.stop_stream(handle, TeardownReason::NoViewers);
    }

    /// Removes the stream from the table and stops it. Safe to call more
    /// than once; only the first call has any effect.
    pub async fn teardown(&self, handle: &StreamHandle, reason: TeardownReason) {
        let mut stream_map = self.stream_map.write().await;
        if stream_map
            .get(&handle.session.stream_id)
            .is_some_and(|current| current.same(handle))
        {
            stream_map.remove(&handle.session.stream_id);
        }
        drop(stream_map);
        self.stop_stream(handle, reason);
    }

    fn stop_stream(&self, handle: &StreamHandle, reason: TeardownReason) {
        if handle.buffer.stop() {
            handle.session.deactivate();
            metrics::STREAM.dec();
            info!(
                "remove stream : {}, reason : {}, chunks : {}",
                handle.session.stream_id,
                reason,
                handle.buffer.head()
            );
        }
    }

    /// Clears the user's assignment and deregisters them from the stream
    /// they were watching. Returns that stream.
    pub async fn disconnect_user(&self, identity: &str) -> Option<String> {
        let stream_id = self.sessions.disconnect_user(identity).await?;
        if let Err(e) = self.remove_client(&stream_id, identity).await {
            debug!("disconnect {} from {}: {}", identity, stream_id, e);
        }
        Some(stream_id)
    }

    pub async fn get(&self, stream_id: &str) -> Option<StreamHandle> {
        self.stream_map.read().await.get(stream_id).cloned()
    }

    pub async fn stream_count(&self) -> usize {
        self.stream_map.read().await.len()
    }

    pub async fn info(&self, streams: Vec<String>) -> Vec<StreamHandle> {
        let mut streams = streams;
        streams.retain(|stream| !stream.trim().is_empty());
        let stream_map = self.stream_map.read().await;
        let mut handles: Vec<StreamHandle> = stream_map
            .iter()
            .filter(|(stream, _)| streams.is_empty() || streams.contains(stream))
            .map(|(_, handle)| handle.clone())
            .collect();
        drop(stream_map);
        handles.sort_by(|a, b| a.session.stream_id.cmp(&b.session.stream_id));
        handles
    }

    /// Tears down every stream not requested within `timeout` of `now` (ms).
    /// Returns the ids removed.
    pub async fn sweep_idle(&self, now: i64, timeout: Duration) -> Vec<String> {
        let timeout = timeout.as_millis() as i64;
        let idle: Vec<StreamHandle> = self
            .stream_map
            .read()
            .await
            .values()
            .filter(|handle| now - handle.session.last_requested() > timeout)
            .cloned()
            .collect();

        let mut removed = vec![];
        for handle in idle {
            // re-check, the stream may have been requested since the scan
            if now - handle.session.last_requested() > timeout {
                self.teardown(&handle, TeardownReason::IdleTimeout).await;
                removed.push(handle.session.stream_id.clone());
            }
        }
        removed
    }

    pub async fn shutdown(&self) {
        let handles: Vec<StreamHandle> = self
            .stream_map
            .write()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in handles {
            self.stop_stream(&handle, TeardownReason::Shutdown);
        }
    }
}
