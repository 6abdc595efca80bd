//! HTTP delivery of a cache file that may still be downloading.
//!
//! While a fetch runs the bytes live in `<name>.part`; the fetcher renames
//! it to its final name once complete. An open handle keeps working across
//! the rename, so readers that hit EOF only need to check whether the
//! final name exists to know if more data can still arrive.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use futures_util::Stream;
use http::{header, HeaderMap, Method, StatusCode};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::time::Instant;

use crate::result::Result;
use crate::vod::range::ByteRange;
use crate::AppError;

const READ_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub poll_interval: Duration,
    /// How long a range may wait for its first byte, and how long a body
    /// may stall before it is abandoned
    pub range_wait_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Complete(u64),
    Growing(u64),
    Missing,
}

impl FileState {
    async fn inspect(path: &Path) -> Self {
        if let Ok(meta) = fs::metadata(path).await {
            return FileState::Complete(meta.len());
        }
        match fs::metadata(part_path(path)).await {
            Ok(meta) => FileState::Growing(meta.len()),
            Err(_) => FileState::Missing,
        }
    }

    fn total(&self, hint: Option<u64>) -> Option<u64> {
        match *self {
            FileState::Complete(size) => Some(size),
            _ => hint,
        }
    }

    fn on_disk(&self) -> u64 {
        match *self {
            FileState::Complete(len) | FileState::Growing(len) => len,
            FileState::Missing => 0,
        }
    }
}

/// Where a file lives until it is complete
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Serves `path`, complete or still growing, honoring a single byte range.
///
/// `total_hint` is the expected final size when known, used for
/// `Content-Range` before the file is complete.
pub async fn serve_growing_file(
    path: &Path,
    content_type: Option<&str>,
    total_hint: Option<u64>,
    method: &Method,
    headers: &HeaderMap,
    opts: &ServeOptions,
) -> Result<Response> {
    let state = FileState::inspect(path).await;
    if state == FileState::Missing {
        return Err(AppError::CacheNotFound(path.display().to_string()));
    }

    let content_type = content_type.map(str::to_string).unwrap_or_else(|| {
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string()
    });
    let range = match headers.get(header::RANGE) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(ByteRange::parse)
                .ok_or_else(|| AppError::bad_request("invalid range"))?,
        ),
        None => None,
    };
    let head_only = method == Method::HEAD;

    let Some(range) = range else {
        let mut builder = http::Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::ACCEPT_RANGES, "bytes");
        if let FileState::Complete(size) = state {
            builder = builder.header(header::CONTENT_LENGTH, size);
        }
        let body = if head_only {
            Body::empty()
        } else {
            Body::from_stream(tail(path.to_path_buf(), 0, None, opts.clone()))
        };
        return Ok(builder.body(body)?);
    };

    let state = wait_for_range(path, range, total_hint, opts).await?;
    let total = state.total(total_hint);
    let start = range.start(total);
    let end = range.end(total, state.on_disk());
    let length = end - start + 1;
    let content_range = match total {
        Some(total) => format!("bytes {}-{}/{}", start, end, total),
        None => format!("bytes {}-{}/*", start, end),
    };

    let body = if head_only {
        Body::empty()
    } else {
        Body::from_stream(tail(path.to_path_buf(), start, Some(length), opts.clone()))
    };
    Ok(http::Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_RANGE, content_range)
        .header(header::CONTENT_LENGTH, length)
        .body(body)?)
}

/// Polls until the first requested byte is on disk or the file is complete
async fn wait_for_range(
    path: &Path,
    range: ByteRange,
    total_hint: Option<u64>,
    opts: &ServeOptions,
) -> Result<FileState> {
    let deadline = Instant::now() + opts.range_wait_timeout;
    loop {
        let state = FileState::inspect(path).await;
        let start = range.start(state.total(total_hint));
        match state {
            FileState::Missing => {
                return Err(AppError::CacheNotFound(path.display().to_string()))
            }
            FileState::Complete(size) if start >= size => {
                return Err(AppError::RangeNotSatisfiable(size))
            }
            FileState::Complete(_) => return Ok(state),
            FileState::Growing(_) if total_hint.is_some_and(|hint| start >= hint) => {
                return Err(AppError::RangeNotSatisfiable(total_hint.unwrap_or_default()))
            }
            // the last n bytes are unknown until the total is
            FileState::Growing(_)
                if total_hint.is_none() && matches!(range, ByteRange::Suffix(_)) => {}
            FileState::Growing(len) if len > start => return Ok(state),
            FileState::Growing(_) => {}
        }
        if Instant::now() >= deadline {
            return Err(AppError::Timeout(format!(
                "byte {} of {} not available",
                start,
                path.display()
            )));
        }
        tokio::time::sleep(opts.poll_interval).await;
    }
}

/// Reads from `start` until `length` bytes were sent, or for an unbounded
/// read until the file is complete. Short reads on a growing file wait for
/// more data instead of ending the body.
fn tail(
    path: PathBuf,
    start: u64,
    length: Option<u64>,
    opts: ServeOptions,
) -> impl Stream<Item = std::io::Result<Bytes>> {
    async_stream::try_stream! {
        let part = part_path(&path);
        // the part file may be renamed between the two opens
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(_) => match File::open(&part).await {
                Ok(file) => file,
                Err(_) => File::open(&path).await?,
            },
        };
        file.seek(SeekFrom::Start(start)).await?;

        let mut remaining = length;
        let mut buf = vec![0u8; READ_BUFFER];
        let mut stalled = Duration::ZERO;
        let mut complete = false;
        loop {
            let want = match remaining {
                Some(0) => break,
                Some(n) => n.min(READ_BUFFER as u64) as usize,
                None => READ_BUFFER,
            };
            let n = file.read(&mut buf[..want]).await?;
            if n > 0 {
                stalled = Duration::ZERO;
                if let Some(remaining) = remaining.as_mut() {
                    *remaining -= n as u64;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
                continue;
            }

            // EOF after the rename was seen is the real end of the file
            if complete {
                if remaining.is_some() {
                    Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof))?;
                }
                break;
            }
            // the last bytes may land between our read and the rename
            if fs::metadata(&path).await.is_ok() {
                complete = true;
                continue;
            }
            // download failed and its partial file was removed
            if fs::metadata(&part).await.is_err() {
                break;
            }
            if stalled >= opts.range_wait_timeout {
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "cache file stopped growing",
                ))?;
            }
            tokio::time::sleep(opts.poll_interval).await;
            stalled += opts.poll_interval;
        }
    }
}
