use crate::gateway::{TemporaryLink, VodCacheEntry};
use crate::session::UserSession;
use crate::stream::StreamHandle;

impl From<StreamHandle> for api::response::Stream {
    fn from(value: StreamHandle) -> Self {
        api::response::Stream {
            id: value.session.stream_id.clone(),
            kind: value.session.kind,
            title: value.session.title.clone(),
            active: value.session.is_active(),
            started_at: value.session.started_at,
            last_requested_at: value.session.last_requested(),
            head: value.buffer.head(),
            viewers: value
                .session
                .viewers()
                .into_iter()
                .map(|(identity, last_seen_at)| api::response::Viewer {
                    identity,
                    last_seen_at,
                })
                .collect(),
        }
    }
}

impl From<UserSession> for api::response::UserSession {
    fn from(value: UserSession) -> Self {
        let (alias_id, alias_name) = match value.alias {
            Some(alias) => (Some(alias.alias_id), Some(alias.alias_name)),
            None => (None, None),
        };
        api::response::UserSession {
            identity: value.identity,
            stream_id: value.stream_id,
            stream_kind: value.stream_kind,
            started_at: value.started_at,
            last_active_at: value.last_active,
            remote_addr: value.net.remote_addr,
            user_agent: value.net.user_agent,
            alias_id,
            alias_name,
        }
    }
}

impl From<VodCacheEntry> for api::response::VodCache {
    fn from(value: VodCacheEntry) -> Self {
        api::response::VodCache {
            id: value.id,
            media_type: value.media_type,
            title: value.title,
            series_title: value.series_title,
            season: value.season,
            episode: value.episode,
            status: value.status,
            downloaded_bytes: value.downloaded_bytes,
            total_bytes: value.total_bytes,
            final_size: value.final_size,
            requested_by: value.requested_by,
            created_at: value.created_at.timestamp_millis(),
            expires_at: value.expires_at.timestamp_millis(),
            last_access_at: value.last_access_at.timestamp_millis(),
        }
    }
}

impl From<TemporaryLink> for api::response::TemporaryLink {
    fn from(value: TemporaryLink) -> Self {
        api::response::TemporaryLink {
            path: api::path::link(&value.token),
            token: value.token,
            expires_at: value.expires_at.timestamp_millis(),
        }
    }
}
