use std::collections::HashMap;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use crate::event::ConnectionId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("client outbox is closed")]
    Closed,
    #[error("client was hung up")]
    HungUp,
}

/// A named client plus the outbox its session drains onto the socket.
#[derive(Debug)]
pub struct ClientEntry {
    name: String,
    outbox: Option<mpsc::UnboundedSender<String>>,
}

impl ClientEntry {
    pub fn new(name: impl Into<String>, outbox: mpsc::UnboundedSender<String>) -> Self {
        Self {
            name: name.into(),
            outbox: Some(outbox),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.outbox.is_some()
    }

    /// Queues one line without waiting. The outbox is unbounded, so a slow
    /// reader falls behind but never loses a line while it stays registered.
    pub fn deliver(&self, line: &str) -> Result<(), DeliveryError> {
        let outbox = self.outbox.as_ref().ok_or(DeliveryError::HungUp)?;
        outbox
            .send(line.to_owned())
            .map_err(|_| DeliveryError::Closed)
    }

    /// Drops the outbox sender. The owning session sees its outbox close and
    /// runs its normal teardown.
    pub fn hang_up(&mut self) {
        self.outbox = None;
    }
}

/// Who is connected right now, and under what name.
///
/// A single lock covers inserts, removals and whole fan-outs, so a fan-out
/// never sees a half-registered client.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ConnectionId, ClientEntry>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: ConnectionId, entry: ClientEntry) {
        let mut clients = self.clients.lock().await;
        debug!(%id, name = entry.name(), "registering client");
        clients.insert(id, entry);
    }

    pub async fn remove(&self, id: ConnectionId) -> Option<ClientEntry> {
        let mut clients = self.clients.lock().await;
        let removed = clients.remove(&id);
        if removed.is_some() {
            debug!(%id, remaining = clients.len(), "deregistered client");
        }
        removed
    }

    /// Visits every entry except `excluding` under one lock acquisition and
    /// returns how many entries were visited.
    pub async fn for_each<F>(&self, excluding: Option<ConnectionId>, mut visit: F) -> usize
    where
        F: FnMut(ConnectionId, &mut ClientEntry),
    {
        let mut clients = self.clients.lock().await;
        let mut visited = 0;
        for (id, entry) in clients.iter_mut() {
            if excluding == Some(*id) {
                continue;
            }
            visit(*id, entry);
            visited += 1;
        }
        visited
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.clients.lock().await.contains_key(&id)
    }

    /// Sorted display names, mostly for logs and tests.
    pub async fn names(&self) -> Vec<String> {
        let clients = self.clients.lock().await;
        let mut names: Vec<_> = clients.values().map(|entry| entry.name.clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> (ClientEntry, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientEntry::new(name, tx), rx)
    }

    #[tokio::test]
    async fn insert_and_remove_track_membership() {
        let registry = ClientRegistry::new();
        let alice = ConnectionId::new(1);
        let (record, _rx) = entry("alice");

        registry.insert(alice, record).await;
        assert!(registry.contains(alice).await);
        assert_eq!(registry.names().await, vec!["alice".to_string()]);

        let removed = registry.remove(alice).await.expect("alice was registered");
        assert_eq!(removed.name(), "alice");
        assert!(registry.is_empty().await);
        assert!(registry.remove(alice).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_names_are_allowed() {
        let registry = ClientRegistry::new();
        let (first, _rx1) = entry("sam");
        let (second, _rx2) = entry("sam");
        registry.insert(ConnectionId::new(1), first).await;
        registry.insert(ConnectionId::new(2), second).await;
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn for_each_skips_excluded_identity() {
        let registry = ClientRegistry::new();
        for (raw, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            let (record, _rx) = entry(name);
            registry.insert(ConnectionId::new(raw), record).await;
        }

        let mut seen = Vec::new();
        let visited = registry
            .for_each(Some(ConnectionId::new(2)), |_, entry| {
                seen.push(entry.name().to_string())
            })
            .await;
        seen.sort();

        assert_eq!(visited, 2);
        assert_eq!(seen, vec!["alice".to_string(), "carol".to_string()]);
    }

    #[tokio::test]
    async fn unread_lines_pile_up_instead_of_being_dropped() {
        let (record, mut rx) = entry("slow");

        for n in 0..10_000 {
            record.deliver(&format!("line {n}")).expect("live client accepts");
        }
        for n in 0..10_000 {
            assert_eq!(rx.recv().await, Some(format!("line {n}")));
        }
    }

    #[tokio::test]
    async fn deliver_reports_each_failure_mode() {
        let (mut record, rx) = entry("alice");

        drop(rx);
        assert_eq!(record.deliver("one"), Err(DeliveryError::Closed));

        record.hang_up();
        assert!(!record.is_connected());
        assert_eq!(record.deliver("two"), Err(DeliveryError::HungUp));
    }
}
