use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::metrics;
use crate::stream::buffer::Next;
use crate::stream::manager::{Manager, StreamHandle};

/// Last-seen and session liveness are refreshed at most this often (ms)
const SEEN_INTERVAL: i64 = 1000;

enum Exit {
    /// The HTTP side dropped its receiver
    Closed,
    Stopped,
    /// Removed by the manager or replaced by a newer registration
    Detached,
}

/// Moves chunks from the ring into one viewer's queue. Dropping `sender`
/// on return is what closes the viewer's queue.
pub(crate) async fn run(
    manager: Manager,
    handle: StreamHandle,
    identity: String,
    token: u64,
    sender: mpsc::Sender<Bytes>,
) {
    metrics::VIEWER.inc();
    let buffer = &handle.buffer;
    let mut seen_at = 0;
    let exit = loop {
        let next = tokio::select! {
            next = buffer.next(&identity, token) => next,
            _ = sender.closed() => break Exit::Closed,
        };
        match next {
            Next::Chunk { chunk, skipped } => {
                if skipped > 0 {
                    metrics::FAST_FORWARD.inc();
                    debug!(
                        "stream : {}, viewer {} lagging, skipped {} chunks",
                        buffer.stream_id, identity, skipped
                    );
                }
                tokio::select! {
                    result = sender.send(chunk) => {
                        if result.is_err() {
                            break Exit::Closed;
                        }
                    }
                    _ = buffer.detached(&identity, token) => {
                        break if buffer.is_active() { Exit::Detached } else { Exit::Stopped };
                    }
                }
                let now = Utc::now().timestamp_millis();
                if now - seen_at >= SEEN_INTERVAL {
                    handle.session.see_viewer(&identity, now);
                    manager.sessions().touch(&identity, now).await;
                    seen_at = now;
                }
            }
            Next::Stopped => break Exit::Stopped,
            Next::Detached => break Exit::Detached,
        }
    };
    drop(sender);
    metrics::VIEWER.dec();

    match exit {
        Exit::Closed => {
            debug!("stream : {}, viewer {} closed", buffer.stream_id, identity);
            manager.remove_client_token(&handle, &identity, token).await;
        }
        Exit::Stopped => {
            manager
                .sessions()
                .release_stream(&identity, &buffer.stream_id)
                .await;
        }
        Exit::Detached => {}
    }
}
