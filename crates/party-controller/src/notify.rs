//! Notification sink for UI and other collaborators.
//!
//! The party actor publishes [`PartyEvent`]s on a [`NotificationBus`].
//! Subscribers hold a [`Subscription`]; dropping it (or calling
//! [`Subscription::unsubscribe`]) removes the subscriber immediately.

use crate::session::{Member, Session};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Event delivered to notification subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum PartyEvent {
    /// The current party snapshot changed.
    SessionUpdated(Session),

    /// A transient message for the player.
    Notification {
        text: String,
        duration: Duration,
        /// Party attached to an invite notification.
        invite: Option<Session>,
    },

    /// A plain group chat message.
    ChatMessageReceived { sender: Member, text: String },

    /// A control command with no built-in handler.
    UnknownCommand {
        name: String,
        args: Vec<String>,
        from_owner: bool,
    },
}

impl PartyEvent {
    /// Build a notification shown for `seconds`.
    #[must_use]
    pub fn notification(text: impl Into<String>, seconds: f32) -> Self {
        PartyEvent::Notification {
            text: text.into(),
            duration: Duration::from_secs_f32(seconds),
            invite: None,
        }
    }

    /// Build an invite notification carrying the target party.
    #[must_use]
    pub fn invite(text: impl Into<String>, seconds: f32, session: Session) -> Self {
        PartyEvent::Notification {
            text: text.into(),
            duration: Duration::from_secs_f32(seconds),
            invite: Some(session),
        }
    }

    /// Notification text, if this is a notification.
    #[must_use]
    pub fn notification_text(&self) -> Option<&str> {
        match self {
            PartyEvent::Notification { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct BusState {
    next_id: u64,
    subscribers: BTreeMap<u64, mpsc::UnboundedSender<PartyEvent>>,
}

/// Fan-out publisher for [`PartyEvent`]s.
#[derive(Debug, Clone, Default)]
pub struct NotificationBus {
    state: Arc<Mutex<BusState>>,
}

impl NotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a subscriber. Events published afterwards are delivered in order.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.insert(id, tx);
        Subscription {
            id,
            receiver: rx,
            bus: Arc::downgrade(&self.state),
        }
    }

    /// Deliver an event to every live subscriber, pruning closed ones.
    pub fn publish(&self, event: &PartyEvent) {
        let mut state = self.lock();
        state.subscribers.retain(|id, tx| {
            let delivered = tx.send(event.clone()).is_ok();
            if !delivered {
                trace!(target: "party.notify", subscriber = id, "Pruning closed subscriber");
            }
            delivered
        });
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// Handle for one subscriber. Unsubscribes on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<PartyEvent>,
    bus: Weak<Mutex<BusState>>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<PartyEvent> {
        self.receiver.recv().await
    }

    /// Take the next event without waiting.
    pub fn try_recv(&mut self) -> Option<PartyEvent> {
        self.receiver.try_recv().ok()
    }

    /// Remove this subscriber from the bus.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.bus.upgrade() {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .subscribers
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber_in_order() {
        let bus = NotificationBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.publish(&PartyEvent::notification("one", 2.0));
        bus.publish(&PartyEvent::notification("two", 2.0));

        for sub in [&mut first, &mut second] {
            assert_eq!(sub.try_recv().unwrap().notification_text(), Some("one"));
            assert_eq!(sub.try_recv().unwrap().notification_text(), Some("two"));
            assert!(sub.try_recv().is_none());
        }
    }

    #[test]
    fn test_drop_and_unsubscribe_remove_subscriber() {
        let bus = NotificationBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        drop(first);
        assert_eq!(bus.subscriber_count(), 1);

        second.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);

        bus.publish(&PartyEvent::notification("nobody", 1.0));
    }

    #[test]
    fn test_notification_duration() {
        let event = PartyEvent::notification("hi", 2.5);
        assert!(matches!(
            event,
            PartyEvent::Notification { duration, invite: None, .. }
                if duration == Duration::from_millis(2500)
        ));
    }
}
