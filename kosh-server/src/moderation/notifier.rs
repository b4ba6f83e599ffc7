//! Fan-out of entity state changes to interested observers.
//!
//! The notifier is fire-and-forget: publishing never blocks moderation and
//! a slow or absent observer never fails a vote. Observers that fall behind
//! the channel capacity miss intermediate changes and should re-read via
//! `load_status`; display reads are allowed to be stale.

use kosh_core::EntityKind;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// A committed state change on a moderation entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityChange {
    pub kind: EntityKind,
    pub id: String,
    pub status: String,
    pub votes_for: u32,
    pub votes_against: u32,
}

/// Broadcasts entity changes to any number of subscribers.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<EntityChange>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish a change. A send error only means nobody is subscribed.
    pub fn publish(&self, change: EntityChange) {
        debug!(
            kind = %change.kind,
            id = %change.id,
            status = %change.status,
            "publishing entity change"
        );
        let _ = self.tx.send(change);
    }

    /// Subscribe to all entity changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<EntityChange> {
        self.tx.subscribe()
    }

    /// Subscribe to changes for a single entity.
    pub fn subscribe_entity(&self, kind: EntityKind, id: impl Into<String>) -> EntityChanges {
        EntityChanges {
            rx: self.tx.subscribe(),
            kind,
            id: id.into(),
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// A subscription filtered to one entity. Dropping it unsubscribes.
pub struct EntityChanges {
    rx: broadcast::Receiver<EntityChange>,
    kind: EntityKind,
    id: String,
}

impl EntityChanges {
    /// Wait for the next change to the subscribed entity.
    ///
    /// Returns `None` when the notifier has been dropped. Changes missed
    /// due to channel lag are skipped; callers needing the authoritative
    /// current state should re-read it.
    pub async fn next(&mut self) -> Option<EntityChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) if change.kind == self.kind && change.id == self.id => {
                    return Some(change)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(kind: EntityKind, id: &str, status: &str) -> EntityChange {
        EntityChange {
            kind,
            id: id.to_string(),
            status: status.to_string(),
            votes_for: 0,
            votes_against: 0,
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let notifier = ChangeNotifier::default();
        notifier.publish(change(EntityKind::Word, "w1", "community_review"));
    }

    #[tokio::test]
    async fn test_subscriber_receives_change() {
        let notifier = ChangeNotifier::default();
        let mut rx = notifier.subscribe();

        let published = change(EntityKind::Word, "w1", "pending_review");
        notifier.publish(published.clone());

        assert_eq!(rx.recv().await.unwrap(), published);
    }

    #[tokio::test]
    async fn test_entity_subscription_filters() {
        let notifier = ChangeNotifier::default();
        let mut sub = notifier.subscribe_entity(EntityKind::Word, "w2");

        notifier.publish(change(EntityKind::Word, "w1", "approved"));
        notifier.publish(change(EntityKind::Correction, "w2", "approved"));
        notifier.publish(change(EntityKind::Word, "w2", "approved"));

        let received = sub.next().await.unwrap();
        assert_eq!(received.id, "w2");
        assert_eq!(received.kind, EntityKind::Word);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_notifier_dropped() {
        let notifier = ChangeNotifier::default();
        let mut sub = notifier.subscribe_entity(EntityKind::Word, "w1");
        drop(notifier);
        assert!(sub.next().await.is_none());
    }
}
