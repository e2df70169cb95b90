//! Buffer for requests issued while offline
//!
//! Each entry carries a one-shot responder. Whoever removes an entry from the
//! buffer (a per-request poller, the reconnect drain, or a timeout) owns it
//! and is the only party that can resolve it, so every buffered request is
//! dispatched or rejected exactly once.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// A request waiting for connectivity
pub struct PendingRequest<R, T> {
    pub id: String,
    pub request: R,
    pub enqueued_at: Instant,
    responder: oneshot::Sender<T>,
}

impl<R, T> PendingRequest<R, T> {
    /// Deliver the outcome to the original caller
    ///
    /// Returns `false` if the caller stopped waiting.
    pub fn resolve(self, outcome: T) -> bool {
        self.responder.send(outcome).is_ok()
    }

    /// Whether the original caller has stopped waiting
    pub fn is_abandoned(&self) -> bool {
        self.responder.is_closed()
    }

    pub fn waited(&self) -> Duration {
        self.enqueued_at.elapsed()
    }
}

impl<R: fmt::Debug, T> fmt::Debug for PendingRequest<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("request", &self.request)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}

/// Insertion-ordered buffer of [`PendingRequest`]s
pub struct OfflineBuffer<R, T> {
    entries: Mutex<VecDeque<PendingRequest<R, T>>>,
}

impl<R, T> fmt::Debug for OfflineBuffer<R, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OfflineBuffer").field("len", &self.len()).finish()
    }
}

impl<R, T> Default for OfflineBuffer<R, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, T> OfflineBuffer<R, T> {
    pub fn new() -> Self {
        Self { entries: Mutex::new(VecDeque::new()) }
    }

    /// Buffer a request; the receiver yields its eventual outcome
    ///
    /// The receiver errors if the entry is dropped unresolved (for example
    /// by [`OfflineBuffer::clear`]).
    pub fn enqueue(&self, id: impl Into<String>, request: R) -> oneshot::Receiver<T> {
        let (responder, receiver) = oneshot::channel();
        let id = id.into();
        trace!(request_id = %id, "Buffering request until connectivity returns");

        self.entries.lock().push_back(PendingRequest {
            id,
            request,
            enqueued_at: Instant::now(),
            responder,
        });
        receiver
    }

    /// Remove one entry by id
    ///
    /// `None` means another party already took it.
    pub fn take(&self, id: &str) -> Option<PendingRequest<R, T>> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|entry| entry.id == id)?;
        entries.remove(position)
    }

    /// Remove every entry, oldest first
    pub fn drain(&self) -> Vec<PendingRequest<R, T>> {
        let drained: Vec<_> = self.entries.lock().drain(..).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Drained offline buffer");
        }
        drained
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().iter().any(|entry| entry.id == id)
    }

    /// Buffered ids, oldest first
    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().iter().map(|entry| entry.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop every entry unresolved; waiting callers observe cancellation
    ///
    /// Returns the number of entries dropped.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_take_resolve() {
        let buffer: OfflineBuffer<&str, u16> = OfflineBuffer::new();
        let receiver = buffer.enqueue("req-1", "POST /bookings");
        assert_eq!(buffer.len(), 1);
        assert!(buffer.contains("req-1"));

        let pending = buffer.take("req-1").unwrap();
        assert_eq!(pending.request, "POST /bookings");
        assert!(buffer.take("req-1").is_none());
        assert!(buffer.is_empty());

        assert!(pending.resolve(201));
        assert_eq!(receiver.await.unwrap(), 201);
    }

    #[test]
    fn test_drain_preserves_insertion_order() {
        let buffer: OfflineBuffer<u32, ()> = OfflineBuffer::new();
        let _receivers: Vec<_> =
            ["a", "b", "c"].iter().enumerate().map(|(i, id)| buffer.enqueue(*id, i as u32)).collect();

        assert_eq!(buffer.ids(), vec!["a", "b", "c"]);
        buffer.take("b").unwrap();

        let drained: Vec<u32> = buffer.drain().into_iter().map(|p| p.request).collect();
        assert_eq!(drained, vec![0, 2]);
        assert!(buffer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cancels_waiters() {
        let buffer: OfflineBuffer<(), ()> = OfflineBuffer::new();
        let receiver = buffer.enqueue("x", ());

        assert_eq!(buffer.clear(), 1);
        assert!(receiver.await.is_err());
    }

    #[test]
    fn test_abandoned_caller_detected() {
        let buffer: OfflineBuffer<(), u8> = OfflineBuffer::new();
        drop(buffer.enqueue("gone", ()));

        let pending = buffer.take("gone").unwrap();
        assert!(pending.is_abandoned());
        assert!(!pending.resolve(1));
    }
}
