//! Fixed-capacity broadcast ring shared by one upstream reader and any
//! number of dispatchers.
//!
//! ```text
//!            head (next write)
//!               │
//!   ┌───┬───┬───┼───┬───┬───┐
//!   │ 6 │ 7 │ 8 │ 3 │ 4 │ 5 │   slot = seq % capacity
//!   └───┴───┴───┴───┴───┴───┘
//!         ▲           ▲
//!      viewer b    viewer a     cursor ∈ [head - capacity, head]
//! ```
//!
//! The ring state lives behind a plain mutex that is never held across an
//! await point. Waiters park on a [`Notify`]; the writer wakes all of them
//! after each chunk and on stop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::Notify;

/// What a dispatcher gets back from [`StreamBuffer::next`]
#[derive(Debug)]
pub(crate) enum Next {
    Chunk { chunk: Bytes, skipped: u64 },
    Stopped,
    /// The viewer was removed or replaced by a newer registration
    Detached,
}

struct Cursor {
    token: u64,
    next: u64,
}

struct Ring {
    slots: Vec<Bytes>,
    head: u64,
    active: bool,
    viewers: HashMap<String, Cursor>,
}

pub struct StreamBuffer {
    pub stream_id: String,
    pub url: String,
    capacity: usize,
    ring: Mutex<Ring>,
    notify: Notify,
    tokens: AtomicU64,
}

impl StreamBuffer {
    pub fn new(stream_id: String, url: String, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            stream_id,
            url,
            capacity,
            ring: Mutex::new(Ring {
                slots: vec![Bytes::new(); capacity],
                head: 0,
                active: true,
                viewers: HashMap::new(),
            }),
            notify: Notify::new(),
            tokens: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn head(&self) -> u64 {
        self.ring.lock().unwrap().head
    }

    pub fn is_active(&self) -> bool {
        self.ring.lock().unwrap().active
    }

    pub fn viewer_count(&self) -> usize {
        self.ring.lock().unwrap().viewers.len()
    }

    pub fn viewers(&self) -> Vec<String> {
        self.ring.lock().unwrap().viewers.keys().cloned().collect()
    }

    /// Registers a viewer reading from the current head. A second
    /// registration for the same identity replaces the first.
    /// Returns `None` once the buffer is stopped.
    pub(crate) fn register(&self, identity: &str) -> Option<u64> {
        let token = self.tokens.fetch_add(1, Ordering::Relaxed);
        let mut ring = self.ring.lock().unwrap();
        if !ring.active {
            return None;
        }
        let next = ring.head;
        let replaced = ring
            .viewers
            .insert(identity.to_string(), Cursor { token, next })
            .is_some();
        drop(ring);
        if replaced {
            self.notify.notify_waiters();
        }
        Some(token)
    }

    /// Removes a viewer regardless of registration. Returns the number of
    /// viewers left, or `None` if the identity was not registered.
    pub(crate) fn unregister(&self, identity: &str) -> Option<usize> {
        self.unregister_if(identity, |_| true)
    }

    /// Removes a viewer only if it is still the registration behind `token`
    pub(crate) fn unregister_token(&self, identity: &str, token: u64) -> Option<usize> {
        self.unregister_if(identity, |cursor| cursor.token == token)
    }

    fn unregister_if(&self, identity: &str, f: impl Fn(&Cursor) -> bool) -> Option<usize> {
        let mut ring = self.ring.lock().unwrap();
        if !ring.viewers.get(identity).is_some_and(f) {
            return None;
        }
        ring.viewers.remove(identity);
        let remaining = ring.viewers.len();
        drop(ring);
        self.notify.notify_waiters();
        Some(remaining)
    }

    /// Writes one chunk at `head` and wakes every waiting dispatcher.
    /// Returns `false` once the buffer is stopped.
    pub fn push(&self, chunk: Bytes) -> bool {
        let mut ring = self.ring.lock().unwrap();
        if !ring.active {
            return false;
        }
        let slot = (ring.head % self.capacity as u64) as usize;
        ring.slots[slot] = chunk;
        ring.head += 1;
        drop(ring);
        self.notify.notify_waiters();
        true
    }

    /// Returns `true` only for the call that actually stopped the buffer
    pub(crate) fn stop(&self) -> bool {
        let mut ring = self.ring.lock().unwrap();
        if !ring.active {
            return false;
        }
        ring.active = false;
        ring.viewers.clear();
        ring.slots.iter_mut().for_each(|slot| *slot = Bytes::new());
        drop(ring);
        self.notify.notify_waiters();
        true
    }

    /// Waits for the next chunk of a viewer.
    ///
    /// A viewer more than `capacity` chunks behind is fast-forwarded to the
    /// oldest chunk still held; `skipped` reports how many it lost.
    pub(crate) async fn next(&self, identity: &str, token: u64) -> Next {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut ring = self.ring.lock().unwrap();
                let Ring {
                    slots,
                    head,
                    active,
                    viewers,
                } = &mut *ring;
                if !*active {
                    return Next::Stopped;
                }
                let cursor = match viewers.get_mut(identity) {
                    Some(cursor) if cursor.token == token => cursor,
                    _ => return Next::Detached,
                };
                if cursor.next < *head {
                    let capacity = self.capacity as u64;
                    let oldest = head.saturating_sub(capacity);
                    let skipped = oldest.saturating_sub(cursor.next);
                    cursor.next = cursor.next.max(oldest);
                    let chunk = slots[(cursor.next % capacity) as usize].clone();
                    cursor.next += 1;
                    return Next::Chunk { chunk, skipped };
                }
            }

            notified.await;
        }
    }

    /// Resolves once the viewer behind `token` is gone or the buffer stopped
    pub(crate) async fn detached(&self, identity: &str, token: u64) {
        self.wait_until(|ring| {
            !ring.active
                || !ring
                    .viewers
                    .get(identity)
                    .is_some_and(|cursor| cursor.token == token)
        })
        .await
    }

    /// Resolves once the buffer is stopped
    pub async fn stopped(&self) {
        self.wait_until(|ring| !ring.active).await
    }

    async fn wait_until(&self, f: impl Fn(&Ring) -> bool) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if f(&self.ring.lock().unwrap()) {
                return;
            }
            notified.await;
        }
    }
}
