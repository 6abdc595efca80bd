use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use api::media::StreamKind;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::gateway::{Gateway, LinkedIdentity, NetInfo};

/// One active viewer identity
#[derive(Debug, Clone)]
pub struct UserSession {
    pub identity: String,
    pub stream_id: Option<String>,
    pub stream_kind: Option<StreamKind>,
    pub started_at: i64,
    pub last_active: i64,
    pub net: NetInfo,
    pub alias: Option<LinkedIdentity>,
}

impl UserSession {
    fn new(identity: String, net: NetInfo, now: i64) -> Self {
        Self {
            identity,
            stream_id: None,
            stream_kind: None,
            started_at: now,
            last_active: now,
            net,
            alias: None,
        }
    }
}

/// User table, guarded by its own lock
#[derive(Clone)]
pub struct SessionRegistry {
    users: Arc<RwLock<HashMap<String, UserSession>>>,
    gateway: Arc<dyn Gateway>,
}

impl SessionRegistry {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            users: Default::default(),
            gateway,
        }
    }

    /// Upsert: refreshes liveness and network metadata, or creates the
    /// session and enriches it with a linked alias when the gateway knows one.
    pub async fn register_user(&self, identity: &str, net: NetInfo) -> UserSession {
        let now = Utc::now().timestamp_millis();
        let mut users = self.users.write().await;
        if let Some(session) = users.get_mut(identity) {
            session.last_active = now;
            if net != NetInfo::default() {
                session.net = net;
            }
            return session.clone();
        }
        users.insert(
            identity.to_string(),
            UserSession::new(identity.to_string(), net, now),
        );
        drop(users);
        info!("user session created: {}", identity);

        let alias = match self.gateway.resolve_linked_identity(identity).await {
            Ok(alias) => alias,
            Err(e) => {
                warn!("resolve linked identity for {} error: {:?}", identity, e);
                None
            }
        };

        let mut users = self.users.write().await;
        match users.get_mut(identity) {
            Some(session) => {
                if alias.is_some() {
                    session.alias = alias;
                }
                session.clone()
            }
            // swept between the two lock scopes
            None => UserSession::new(identity.to_string(), NetInfo::default(), now),
        }
    }

    /// Read access counts as activity
    pub async fn get_user_session(&self, identity: &str) -> Option<UserSession> {
        let mut users = self.users.write().await;
        users.get_mut(identity).map(|session| {
            session.last_active = Utc::now().timestamp_millis();
            session.clone()
        })
    }

    /// Refreshes liveness without creating a session
    pub async fn touch(&self, identity: &str, now: i64) {
        if let Some(session) = self.users.write().await.get_mut(identity) {
            session.last_active = session.last_active.max(now);
        }
    }

    /// Assigns `stream_id` to the user, creating the session if needed.
    /// Returns the previous assignment when it was a different stream.
    pub async fn assign_stream(
        &self,
        identity: &str,
        stream_id: &str,
        kind: StreamKind,
    ) -> Option<String> {
        let now = Utc::now().timestamp_millis();
        let mut users = self.users.write().await;
        let session = users
            .entry(identity.to_string())
            .or_insert_with(|| UserSession::new(identity.to_string(), NetInfo::default(), now));
        session.last_active = now;
        session.stream_kind = Some(kind);
        let previous = session.stream_id.replace(stream_id.to_string());
        previous.filter(|prev| prev != stream_id)
    }

    /// Clears the assignment after the viewer left `stream_id`.
    ///
    /// Only clears when the user is still on `stream_id`, so a viewer who
    /// already switched elsewhere keeps the new assignment.
    pub async fn release_stream(&self, identity: &str, stream_id: &str) {
        let mut users = self.users.write().await;
        if let Some(session) = users.get_mut(identity) {
            if session.stream_id.as_deref() == Some(stream_id) {
                session.stream_id = None;
                session.stream_kind = None;
            }
        }
    }

    /// Clears the user's stream assignment, returning the stream they were on.
    /// Deregistering from the stream buffer is up to the caller.
    pub async fn disconnect_user(&self, identity: &str) -> Option<String> {
        let mut users = self.users.write().await;
        let session = users.get_mut(identity)?;
        session.stream_kind = None;
        let previous = session.stream_id.take();
        debug!("user {} disconnected from {:?}", identity, previous);
        previous
    }

    pub async fn list(&self) -> Vec<UserSession> {
        self.users.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    /// Removes every session idle for longer than `timeout` at `now` (ms)
    pub async fn expire_idle(&self, now: i64, timeout: Duration) -> Vec<UserSession> {
        let timeout = timeout.as_millis() as i64;
        let mut users = self.users.write().await;
        let expired: Vec<String> = users
            .values()
            .filter(|session| now - session.last_active > timeout)
            .map(|session| session.identity.clone())
            .collect();
        expired
            .iter()
            .filter_map(|identity| users.remove(identity))
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn set_last_active(&self, identity: &str, at: i64) {
        if let Some(session) = self.users.write().await.get_mut(identity) {
            session.last_active = at;
        }
    }
}
