//! Notification probe with bounded waits.

use crate::fixtures::TEST_EVENT_TIMEOUT;
use party_controller::notify::{PartyEvent, Subscription};
use party_controller::session::Session;
use std::time::Duration;

/// Records everything a peer's notification bus publishes.
pub struct EventProbe {
    subscription: Subscription,
    seen: Vec<PartyEvent>,
}

impl EventProbe {
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            seen: Vec::new(),
        }
    }

    /// Next event, or `None` once `timeout` elapses.
    pub async fn next_within(&mut self, timeout: Duration) -> Option<PartyEvent> {
        let event = tokio::time::timeout(timeout, self.subscription.recv())
            .await
            .ok()
            .flatten()?;
        self.seen.push(event.clone());
        Some(event)
    }

    /// Wait for the first event matching `predicate`, skipping others.
    ///
    /// # Panics
    ///
    /// Panics if no matching event arrives in [`TEST_EVENT_TIMEOUT`].
    pub async fn wait_for<F>(&mut self, description: &str, mut predicate: F) -> PartyEvent
    where
        F: FnMut(&PartyEvent) -> bool,
    {
        let deadline = tokio::time::Instant::now() + TEST_EVENT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match self.next_within(remaining).await {
                Some(event) if predicate(&event) => return event,
                Some(_) => {}
                None => panic!(
                    "timed out waiting for {description}; saw {:#?}",
                    self.seen
                ),
            }
        }
    }

    /// Wait for a notification with exactly this text.
    pub async fn wait_for_notification(&mut self, text: &str) -> PartyEvent {
        self.wait_for(&format!("notification {text:?}"), |event| {
            event.notification_text() == Some(text)
        })
        .await
    }

    /// Wait for a `SessionUpdated` whose snapshot satisfies `predicate`.
    pub async fn wait_for_session<F>(&mut self, description: &str, mut predicate: F) -> Session
    where
        F: FnMut(&Session) -> bool,
    {
        let event = self
            .wait_for(description, |event| {
                matches!(event, PartyEvent::SessionUpdated(session) if predicate(session))
            })
            .await;
        match event {
            PartyEvent::SessionUpdated(session) => session,
            other => panic!("expected SessionUpdated, got {other:?}"),
        }
    }

    /// Collect events until the bus stays quiet for `quiet`.
    pub async fn drain(&mut self, quiet: Duration) -> Vec<PartyEvent> {
        let mut drained = Vec::new();
        while let Some(event) = self.next_within(quiet).await {
            drained.push(event);
        }
        drained
    }

    /// Assert no notification with this text arrives within `window`.
    pub async fn assert_no_notification(&mut self, text: &str, window: Duration) {
        let events = self.drain(window).await;
        assert!(
            events.iter().all(|e| e.notification_text() != Some(text)),
            "unexpected notification {text:?} in {events:#?}"
        );
    }

    /// Notification texts seen so far, in order.
    #[must_use]
    pub fn notification_texts(&self) -> Vec<&str> {
        self.seen
            .iter()
            .filter_map(PartyEvent::notification_text)
            .collect()
    }
}
