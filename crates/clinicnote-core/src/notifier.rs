//! In-process change notification channel
//!
//! Broadcasts local document mutations to interested listeners (UI,
//! diagnostics). Listeners subscribe explicitly and unsubscribe by
//! dropping the receiver; the store never holds callback lists.

use tokio::sync::broadcast;

use crate::models::ChangeEvent;

const CHANNEL_CAPACITY: usize = 64;

/// Publish/subscribe channel for local document mutations.
#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Subscribe to change events. Dropping the receiver unsubscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send with no live subscribers is a no-op.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentKey, EntityType};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let notifier = ChangeNotifier::new();
        let mut rx = notifier.subscribe();

        let key = DocumentKey::new(EntityType::Memo, "m1");
        notifier.publish(ChangeEvent::Saved(key.clone()));

        let event = rx.recv().await.unwrap();
        assert_eq!(event, ChangeEvent::Saved(key));
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let notifier = ChangeNotifier::new();
        notifier.publish(ChangeEvent::Deleted(DocumentKey::new(
            EntityType::Clinic,
            "c1",
        )));
    }
}
