use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use api::media::StreamKind;
use chrono::Utc;

/// Bookkeeping of one upstream stream, shared by its tasks and the manager
pub struct StreamSession {
    pub stream_id: String,
    pub kind: StreamKind,
    pub title: String,
    pub url: String,
    pub started_at: i64,
    last_requested: AtomicI64,
    viewers: Mutex<HashMap<String, i64>>,
    active: AtomicBool,
}

impl StreamSession {
    pub fn new(stream_id: String, kind: StreamKind, title: String, url: String) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            stream_id,
            kind,
            title,
            url,
            started_at: now,
            last_requested: AtomicI64::new(now),
            viewers: Default::default(),
            active: AtomicBool::new(true),
        }
    }

    /// Marks the stream as requested at `now` (ms)
    pub fn touch(&self, now: i64) {
        self.last_requested.fetch_max(now, Ordering::Relaxed);
    }

    pub fn last_requested(&self) -> i64 {
        self.last_requested.load(Ordering::Relaxed)
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Returns `true` for the call that flipped the flag
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn see_viewer(&self, identity: &str, now: i64) {
        self.viewers
            .lock()
            .unwrap()
            .insert(identity.to_string(), now);
    }

    pub(crate) fn remove_viewer(&self, identity: &str) {
        self.viewers.lock().unwrap().remove(identity);
    }

    /// Viewer identities with their last-seen timestamps (ms)
    pub fn viewers(&self) -> Vec<(String, i64)> {
        let mut viewers: Vec<(String, i64)> = self
            .viewers
            .lock()
            .unwrap()
            .iter()
            .map(|(identity, seen)| (identity.clone(), *seen))
            .collect();
        viewers.sort();
        viewers
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_never_moves_backwards() {
        let session = StreamSession::new("ch1".into(), StreamKind::Live, "".into(), "".into());
        let now = session.last_requested();
        session.touch(now + 10);
        session.touch(now);
        assert_eq!(session.last_requested(), now + 10);
    }

    #[test]
    fn test_deactivate_once() {
        let session = StreamSession::new("ch1".into(), StreamKind::Live, "".into(), "".into());
        assert!(session.deactivate());
        assert!(!session.deactivate());
        assert!(!session.is_active());
    }
}
