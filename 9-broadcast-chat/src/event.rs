use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

/// Identity of one accepted connection.
///
/// Ids come from a monotonically increasing counter owned by the server, so
/// an id is never reused after its connection is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Joined,
    Chat,
    Left,
}

/// One line of text headed for every registered client except `origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub kind: EventKind,
    pub body: String,
    pub origin: Option<ConnectionId>,
}

impl BroadcastEvent {
    /// The joiner is already registered when this is fanned out, so it is
    /// excluded to keep its own announcement from echoing back.
    pub fn joined(id: ConnectionId, name: &str) -> Self {
        Self {
            kind: EventKind::Joined,
            body: format!("🟢 {name} has joined the chat"),
            origin: Some(id),
        }
    }

    pub fn chat(origin: ConnectionId, name: &str, text: &str) -> Self {
        Self {
            kind: EventKind::Chat,
            body: format!("{name}: {text}"),
            origin: Some(origin),
        }
    }

    pub fn left(name: &str) -> Self {
        Self {
            kind: EventKind::Left,
            body: format!("🔴 {name} has left the chat"),
            origin: None,
        }
    }
}

#[derive(Debug, Error)]
#[error("broadcast queue is closed")]
pub struct SubmitError(pub BroadcastEvent);

/// Producer half of the broadcast queue. Every session holds a clone.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<BroadcastEvent>,
}

impl EventSender {
    /// Waits for queue capacity, so a saturated broadcaster slows producers
    /// down instead of dropping their events.
    pub async fn submit(&self, event: BroadcastEvent) -> Result<(), SubmitError> {
        self.tx.send(event).await.map_err(|err| SubmitError(err.0))
    }
}

pub type EventReceiver = mpsc::Receiver<BroadcastEvent>;

pub fn event_queue(capacity: usize) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_match_wire_format() {
        let id = ConnectionId::new(7);
        assert_eq!(
            BroadcastEvent::joined(id, "alice").body,
            "🟢 alice has joined the chat"
        );
        assert_eq!(BroadcastEvent::chat(id, "bob", "hi").body, "bob: hi");
        assert_eq!(
            BroadcastEvent::left("bob").body,
            "🔴 bob has left the chat"
        );
    }

    #[test]
    fn only_leave_events_reach_everyone() {
        let id = ConnectionId::new(1);
        assert_eq!(BroadcastEvent::joined(id, "alice").origin, Some(id));
        assert_eq!(BroadcastEvent::chat(id, "alice", "yo").origin, Some(id));
        assert_eq!(BroadcastEvent::left("alice").origin, None);
    }

    #[tokio::test]
    async fn queue_preserves_submission_order() {
        let (tx, mut rx) = event_queue(4);
        let id = ConnectionId::new(3);
        tx.submit(BroadcastEvent::joined(id, "carol")).await.unwrap();
        tx.submit(BroadcastEvent::chat(id, "carol", "one")).await.unwrap();
        tx.submit(BroadcastEvent::left("carol")).await.unwrap();

        let kinds: Vec<_> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|event| event.expect("event").kind)
            .collect();
        assert_eq!(kinds, vec![EventKind::Joined, EventKind::Chat, EventKind::Left]);
    }

    #[tokio::test]
    async fn submit_fails_once_consumer_is_gone() {
        let (tx, rx) = event_queue(1);
        drop(rx);
        let err = tx
            .submit(BroadcastEvent::left("dave"))
            .await
            .expect_err("closed queue");
        assert_eq!(err.0.body, "🔴 dave has left the chat");
    }
}
