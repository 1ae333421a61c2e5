//! Deployment session: an append-only event log with explicit subscribers

use crate::event::DeployEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

const DEFAULT_CAPACITY: usize = 1024;

/// Shared handle to one deployment's output.
///
/// Events are appended in emission order and never rewritten. Live
/// consumers call [`DeploySession::subscribe`]; late consumers read
/// [`DeploySession::events`].
#[derive(Clone)]
pub struct DeploySession {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    log: Mutex<Vec<DeployEvent>>,
    open: AtomicBool,
    tx: broadcast::Sender<DeployEvent>,
}

impl Default for DeploySession {
    fn default() -> Self {
        Self::new()
    }
}

impl DeploySession {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// `capacity` bounds how far a subscriber may lag before it misses events
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                id: uuid::Uuid::new_v4().to_string(),
                log: Mutex::new(Vec::new()),
                open: AtomicBool::new(false),
                tx,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    fn log(&self) -> MutexGuard<'_, Vec<DeployEvent>> {
        self.inner.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, event: DeployEvent) {
        self.log().push(event.clone());
        // No subscribers is fine
        let _ = self.inner.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeployEvent> {
        self.inner.tx.subscribe()
    }

    /// In-order reader over the whole log, starting with what is already
    /// there. Unlike a bare subscription it never skips events.
    pub fn follow(&self) -> SessionCursor {
        SessionCursor {
            rx: self.subscribe(),
            session: self.clone(),
            next: 0,
        }
    }

    pub fn events(&self) -> Vec<DeployEvent> {
        self.log().clone()
    }

    /// Events from index `from` on, for consumers catching up after a lag
    pub fn events_since(&self, from: usize) -> Vec<DeployEvent> {
        self.log().iter().skip(from).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log().is_empty()
    }

    /// Whether the session is in focus (its output is being shown)
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    pub fn open(&self) {
        self.inner.open.store(true, Ordering::Release);
    }

    pub fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
    }

    /// Drop the log for a fresh run. Subscribers stay registered.
    pub fn clear(&self) {
        self.log().clear();
    }
}

/// Reads a session's log in order. The broadcast channel only signals that
/// something new arrived; the events themselves come from the log, so a
/// reader that falls behind catches up instead of losing lines.
pub struct SessionCursor {
    session: DeploySession,
    rx: broadcast::Receiver<DeployEvent>,
    next: usize,
}

impl SessionCursor {
    /// Wait until events past the cursor exist and return them. Cancel safe.
    pub async fn next_batch(&mut self) -> Vec<DeployEvent> {
        loop {
            let pending = self.take_pending();
            if !pending.is_empty() {
                return pending;
            }
            match self.rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                // The cursor holds the session, so the sender outlives it
                Err(RecvError::Closed) => return Vec::new(),
            }
        }
    }

    /// Everything logged since the last read, without waiting
    pub fn take_pending(&mut self) -> Vec<DeployEvent> {
        let events = self.session.events_since(self.next);
        self.next += events.len();
        events
    }

    /// Events handed out so far
    pub fn position(&self) -> usize {
        self.next
    }
}

impl std::fmt::Debug for DeploySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploySession")
            .field("id", &self.inner.id)
            .field("events", &self.len())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_in_order() {
        let session = DeploySession::new();
        session.push(DeployEvent::info("a"));
        session.push(DeployEvent::info("b"));

        let messages: Vec<_> = session.events().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["a", "b"]);
        assert_eq!(session.events_since(1)[0].message, "b");
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_open_flag() {
        let session = DeploySession::new();
        assert!(!session.is_open());
        session.open();
        assert!(session.clone().is_open());
        session.close();
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_subscribers_see_later_events() {
        let session = DeploySession::new();
        session.push(DeployEvent::info("before"));

        let mut rx1 = session.subscribe();
        let mut rx2 = session.subscribe();
        session.push(DeployEvent::info("after"));

        assert_eq!(rx1.recv().await.unwrap().message, "after");
        assert_eq!(rx2.recv().await.unwrap().message, "after");
    }

    #[tokio::test]
    async fn test_cursor_catches_up_after_lag() {
        let session = DeploySession::with_capacity(4);
        let mut cursor = session.follow();
        for i in 0..5_000 {
            session.push(DeployEvent::info(i.to_string()));
        }

        let mut seen = Vec::new();
        while seen.len() < 5_000 {
            seen.extend(cursor.next_batch().await);
        }

        assert_eq!(seen.len(), 5_000);
        assert_eq!(seen[0].message, "0");
        assert_eq!(seen[4_999].message, "4999");
        assert!(cursor.take_pending().is_empty());
        assert_eq!(cursor.position(), 5_000);
    }

    #[tokio::test]
    async fn test_cursor_replays_earlier_events() {
        let session = DeploySession::new();
        session.push(DeployEvent::info("early"));

        let mut cursor = session.follow();
        session.push(DeployEvent::info("late"));

        let messages: Vec<_> = cursor.next_batch().await.into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["early", "late"]);
    }

    #[test]
    fn test_push_without_subscribers() {
        let session = DeploySession::with_capacity(1);
        for i in 0..10 {
            session.push(DeployEvent::info(i.to_string()));
        }
        assert_eq!(session.len(), 10);
        session.clear();
        assert!(session.is_empty());
    }
}
