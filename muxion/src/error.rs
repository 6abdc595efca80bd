use axum::response::{IntoResponse, Response};
use http::{header, StatusCode};

#[derive(Debug)]
pub enum AppError {
    StreamNotFound(String),
    SessionNotFound(String),
    CacheNotFound(String),
    LinkNotFound(String),
    BadRequest(String),
    /// Carries the best-known size for `Content-Range: bytes */size`
    RangeNotSatisfiable(u64),
    UpstreamError(String),
    Timeout(String),
    InternalServerError(anyhow::Error),
}

impl AppError {
    pub fn stream_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::StreamNotFound(t.to_string())
    }

    pub fn session_not_found<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::SessionNotFound(t.to_string())
    }

    pub fn bad_request<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::BadRequest(t.to_string())
    }

    pub fn upstream<T>(t: T) -> Self
    where
        T: ToString,
    {
        AppError::UpstreamError(t.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::StreamNotFound(s) => write!(f, "stream not found: {}", s),
            AppError::SessionNotFound(s) => write!(f, "session not found: {}", s),
            AppError::CacheNotFound(s) => write!(f, "cache entry not found: {}", s),
            AppError::LinkNotFound(s) => write!(f, "link not found: {}", s),
            AppError::BadRequest(s) => write!(f, "bad request: {}", s),
            AppError::RangeNotSatisfiable(size) => {
                write!(f, "range not satisfiable, size {}", size)
            }
            AppError::UpstreamError(s) => write!(f, "upstream error: {}", s),
            AppError::Timeout(s) => write!(f, "timeout: {}", s),
            AppError::InternalServerError(err) => write!(f, "{}", err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::StreamNotFound(_)
            | AppError::SessionNotFound(_)
            | AppError::CacheNotFound(_)
            | AppError::LinkNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            AppError::RangeNotSatisfiable(size) => (
                StatusCode::RANGE_NOT_SATISFIABLE,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
                "range not satisfiable",
            )
                .into_response(),
            AppError::UpstreamError(_) => (StatusCode::BAD_GATEWAY, self.to_string()).into_response(),
            AppError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()).into_response(),
            AppError::InternalServerError(err) => {
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        AppError::InternalServerError(err.into())
    }
}
