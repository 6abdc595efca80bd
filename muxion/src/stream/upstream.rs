use anyhow::bail;
use bytes::Bytes;
use chrono::Utc;
use futures_util::StreamExt;
use http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use tracing::{debug, warn};

use crate::metrics;
use crate::stream::manager::{Manager, StreamHandle, TeardownReason};

/// Headers an on-demand fetch may carry over from the client
const ON_DEMAND_HEADERS: [HeaderName; 3] = [
    header::USER_AGENT,
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
];

/// Never forwarded to a live upstream
const DROPPED_HEADERS: [HeaderName; 10] = [
    header::HOST,
    header::CONNECTION,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    header::TE,
    header::TRAILER,
    header::PROXY_AUTHORIZATION,
    header::RANGE,
    header::ACCEPT_ENCODING,
];

/// Reads the upstream body into the ring until it ends, fails, or the
/// stream is stopped, then tears the stream down.
pub(crate) async fn pump(manager: Manager, handle: StreamHandle, client_headers: HeaderMap) {
    let reason = match read_upstream(&manager, &handle, client_headers).await {
        Ok(()) => TeardownReason::UpstreamEnded,
        Err(e) => {
            warn!(
                "stream : {}, upstream {} error: {:?}",
                handle.session.stream_id, handle.session.url, e
            );
            TeardownReason::UpstreamError
        }
    };
    manager.teardown(&handle, reason).await;
}

async fn read_upstream(
    manager: &Manager,
    handle: &StreamHandle,
    client_headers: HeaderMap,
) -> anyhow::Result<()> {
    let headers = upstream_headers(
        handle.session.kind.is_on_demand(),
        &client_headers,
        &manager.config.user_agent,
    );
    let request = manager
        .client
        .get(&handle.session.url)
        .headers(headers)
        .send();

    let response = tokio::select! {
        response = request => response?,
        _ = handle.buffer.stopped() => return Ok(()),
    };
    if response.status() != StatusCode::OK {
        bail!("upstream status {}", response.status());
    }
    debug!(
        "stream : {}, upstream connected, content-type : {:?}",
        handle.session.stream_id,
        response.headers().get(header::CONTENT_TYPE)
    );

    let mut body = response.bytes_stream();
    loop {
        let item = tokio::select! {
            item = body.next() => item,
            _ = handle.buffer.stopped() => return Ok(()),
        };
        match item {
            Some(Ok(bytes)) => {
                metrics::UPSTREAM_BYTES.inc_by(bytes.len() as u64);
                for chunk in split_chunks(bytes, manager.config.chunk_size) {
                    if !handle.buffer.push(chunk) {
                        return Ok(());
                    }
                }
                handle.session.touch(Utc::now().timestamp_millis());
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Ok(()),
        }
    }
}

/// On-demand content only carries a short whitelist; live content takes the
/// client's headers minus hop-by-hop and transfer-related ones. Both get
/// a default user agent and `Accept: */*` when the client sent none.
pub(crate) fn upstream_headers(
    on_demand: bool,
    client: &HeaderMap,
    user_agent: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if on_demand {
        for name in ON_DEMAND_HEADERS.iter() {
            if let Some(value) = client.get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    } else {
        for (name, value) in client.iter() {
            if !DROPPED_HEADERS.contains(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }
    if !headers.contains_key(header::USER_AGENT) {
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(header::USER_AGENT, value);
        }
    }
    headers
        .entry(header::ACCEPT)
        .or_insert(HeaderValue::from_static("*/*"));
    headers
}

fn split_chunks(mut bytes: Bytes, size: usize) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(bytes.len() / size + 1);
    while bytes.len() > size {
        chunks.push(bytes.split_to(size));
    }
    if !bytes.is_empty() {
        chunks.push(bytes);
    }
    chunks
}
