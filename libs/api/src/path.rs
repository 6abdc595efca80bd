pub const METRICS: &str = "/metrics";
pub const STREAMS: &str = "/api/streams";
pub const SESSIONS: &str = "/api/sessions";
pub const VOD: &str = "/api/vod";
pub const LINKS: &str = "/api/links";

pub fn stream(kind: &str, stream: &str) -> String {
    format!("/stream/{}/{}", kind, stream)
}

pub fn stream_viewer(stream: &str, user: &str) -> String {
    format!("/api/streams/{}/viewers/{}", stream, user)
}

pub fn session(user: &str) -> String {
    format!("/api/sessions/{}", user)
}

pub fn vod_status(id: &str) -> String {
    format!("/api/vod/{}", id)
}

pub fn vod_file(id: &str) -> String {
    format!("/vod/{}", id)
}

pub fn link(token: &str) -> String {
    format!("/link/{}", token)
}
