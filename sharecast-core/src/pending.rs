//! Table of outstanding peer requests
//!
//! Tracks shares and squares we asked peers for, so concurrent callers
//! asking for the same thing share one request, and delivers responses to
//! every waiter via oneshot channels.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::share::{DataHash, ExtendedDataSquare, Share};

/// Completions slower than this are logged
const SLOW_RESPONSE: Duration = Duration::from_millis(500);

/// What a request asks a peer for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RequestKey {
    Square(DataHash),
    Share {
        root: DataHash,
        row: usize,
        col: usize,
    },
}

impl RequestKey {
    pub fn root(&self) -> DataHash {
        match self {
            RequestKey::Square(root) => *root,
            RequestKey::Share { root, .. } => *root,
        }
    }
}

/// A peer's answer to a request
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Share(Share),
    Square(ExtendedDataSquare),
}

struct PendingRequest {
    waiters: Vec<oneshot::Sender<Payload>>,
    start_time: Instant,
}

/// Shared table of pending requests.
///
/// Clones share the same table.
#[derive(Clone, Default)]
pub struct PendingRequests {
    state: Arc<Mutex<HashMap<RequestKey, PendingRequest>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    // The table is never left half-updated, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<RequestKey, PendingRequest>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_pending(&self, key: &RequestKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Register interest in `key`.
    ///
    /// Returns the receiver for the response and whether this call created
    /// the entry. Only the creator should send the request to peers; later
    /// callers piggyback on it.
    pub fn add_pending(&self, key: RequestKey) -> (oneshot::Receiver<Payload>, bool) {
        let (sender, receiver) = oneshot::channel();
        let mut pending = self.lock();

        if let Some(existing) = pending.get_mut(&key) {
            existing.waiters.push(sender);
            trace!(?key, waiters = existing.waiters.len(), "Joined pending request");
            return (receiver, false);
        }

        pending.insert(
            key,
            PendingRequest {
                waiters: vec![sender],
                start_time: Instant::now(),
            },
        );
        trace!(?key, "Added pending request");

        (receiver, true)
    }

    /// Deliver a response to every waiter of `key`.
    ///
    /// Returns false if nothing was waiting for it.
    pub fn complete(&self, key: &RequestKey, payload: Payload) -> bool {
        let Some(request) = self.lock().remove(key) else {
            trace!(?key, "No pending request found");
            return false;
        };

        let duration = request.start_time.elapsed();
        if duration > SLOW_RESPONSE {
            warn!(
                ?key,
                duration_ms = duration.as_millis(),
                "High response time for pending request"
            );
        }

        for waiter in request.waiters {
            // Waiters that gave up have dropped their receiver
            let _ = waiter.send(payload.clone());
        }

        trace!(?key, duration_ms = duration.as_millis(), "Completed pending request");
        true
    }

    /// Drop waiters that stopped listening, removing the entry once none remain
    pub fn abandon(&self, key: &RequestKey) {
        let mut pending = self.lock();
        if let Some(request) = pending.get_mut(key) {
            request.waiters.retain(|w| !w.is_closed());
            if request.waiters.is_empty() {
                pending.remove(key);
                trace!(?key, "Abandoned pending request");
            }
        }
    }

    pub fn waiters(&self, key: &RequestKey) -> usize {
        self.lock().get(key).map(|r| r.waiters.len()).unwrap_or(0)
    }

    pub fn pending_keys(&self) -> Vec<RequestKey> {
        self.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove a request without completing it. Its waiters see a closed channel.
    pub fn cancel(&self, key: &RequestKey) -> bool {
        if self.lock().remove(key).is_some() {
            trace!(?key, "Cancelled pending request");
            true
        } else {
            false
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
        trace!("Cleared all pending requests");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: &[u8]) -> RequestKey {
        RequestKey::Square(DataHash::digest(seed))
    }

    fn share_payload(byte: u8) -> Payload {
        Payload::Share(Share::new(vec![byte; 4]))
    }

    #[test]
    fn test_new_table() {
        let pending = PendingRequests::new();
        assert_eq!(pending.len(), 0);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_add_pending() {
        let pending = PendingRequests::new();
        let k = key(b"a");

        let (mut receiver, created) = pending.add_pending(k);
        assert!(created);
        assert!(pending.is_pending(&k));
        assert_eq!(pending.len(), 1);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_complete_delivers_to_all_waiters() {
        let pending = PendingRequests::new();
        let k = key(b"a");

        let (first, created_first) = pending.add_pending(k);
        let (second, created_second) = pending.add_pending(k);
        assert!(created_first);
        assert!(!created_second);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending.waiters(&k), 2);

        assert!(pending.complete(&k, share_payload(7)));
        assert!(!pending.is_pending(&k));

        assert_eq!(first.await.unwrap(), share_payload(7));
        assert_eq!(second.await.unwrap(), share_payload(7));
    }

    #[test]
    fn test_complete_non_pending() {
        let pending = PendingRequests::new();
        assert!(!pending.complete(&key(b"a"), share_payload(1)));
    }

    #[test]
    fn test_complete_after_receiver_dropped() {
        let pending = PendingRequests::new();
        let k = key(b"a");

        let (receiver, _) = pending.add_pending(k);
        drop(receiver);

        assert!(pending.complete(&k, share_payload(1)));
    }

    #[test]
    fn test_abandon_keeps_live_waiters() {
        let pending = PendingRequests::new();
        let k = key(b"a");

        let (gone, _) = pending.add_pending(k);
        let (_live, _) = pending.add_pending(k);
        drop(gone);

        pending.abandon(&k);
        assert!(pending.is_pending(&k));
        assert_eq!(pending.waiters(&k), 1);
    }

    #[test]
    fn test_abandon_removes_empty_entry() {
        let pending = PendingRequests::new();
        let k = key(b"a");

        let (receiver, _) = pending.add_pending(k);
        drop(receiver);
        pending.abandon(&k);

        assert!(!pending.is_pending(&k));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_share_and_square_keys_differ() {
        let pending = PendingRequests::new();
        let root = DataHash::digest(b"root");

        pending.add_pending(RequestKey::Square(root));
        pending.add_pending(RequestKey::Share { root, row: 0, col: 1 });
        assert_eq!(pending.len(), 2);

        for k in pending.pending_keys() {
            assert_eq!(k.root(), root);
        }
    }

    #[tokio::test]
    async fn test_cancel_closes_waiters() {
        let pending = PendingRequests::new();
        let k = key(b"a");

        let (receiver, _) = pending.add_pending(k);
        assert!(pending.cancel(&k));
        assert!(!pending.cancel(&k));
        assert!(receiver.await.is_err());
    }

    #[test]
    fn test_clear() {
        let pending = PendingRequests::new();
        pending.add_pending(key(b"a"));
        pending.add_pending(key(b"b"));
        assert_eq!(pending.len(), 2);

        pending.clear();
        assert!(pending.is_empty());
    }
}
