//! Transport rendezvous barrier.
//!
//! After the owner starts hosting, [`TransportRendezvous::wait`] polls the
//! transport until every party member is connected. The wait is bounded by a
//! deadline and a [`CancellationToken`], and aborts if the transport stops.

use crate::errors::PartyError;
use crate::notify::{NotificationBus, PartyEvent};
use crate::observability::metrics;
use crate::provider::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Successful rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendezvousReport {
    pub connected: usize,
    pub expected: usize,
    pub elapsed: Duration,
}

/// Barrier waiting for `connected_client_count() >= member count`.
pub struct TransportRendezvous {
    transport: Arc<dyn Transport>,
    members: watch::Receiver<usize>,
    timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
    bus: Option<NotificationBus>,
}

impl std::fmt::Debug for TransportRendezvous {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRendezvous")
            .field("expected", &*self.members.borrow())
            .field("timeout", &self.timeout)
            .field("poll_interval", &self.poll_interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TransportRendezvous {
    /// `members` tracks the live party size; the target moves with it.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        members: watch::Receiver<usize>,
        timeout: Duration,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            members,
            timeout,
            poll_interval,
            cancel,
            bus: None,
        }
    }

    /// Publish a notification when the wait fails.
    #[must_use]
    pub fn with_notifications(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Token that aborts the wait with `RendezvousCancelled`.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until all members are connected, the deadline passes or the
    /// wait is cancelled.
    pub async fn wait(self) -> Result<RendezvousReport, PartyError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            target: "party.rendezvous",
            expected = *self.members.borrow(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Waiting for all members to connect"
        );

        let result = loop {
            if !self.transport.is_running() {
                break Err(PartyError::RendezvousCancelled);
            }

            let expected = *self.members.borrow();
            let connected = self.transport.connected_client_count();
            if connected >= expected {
                break Ok(RendezvousReport {
                    connected,
                    expected,
                    elapsed: started.elapsed(),
                });
            }

            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    break Err(PartyError::RendezvousCancelled);
                }

                () = tokio::time::sleep_until(deadline) => {
                    break Err(PartyError::RendezvousTimeout {
                        connected: self.transport.connected_client_count(),
                        expected: *self.members.borrow(),
                    });
                }

                _ = ticker.tick() => {}
            }
        };

        self.finish(&result, started.elapsed());
        result
    }

    fn finish(&self, result: &Result<RendezvousReport, PartyError>, elapsed: Duration) {
        match result {
            Ok(report) => {
                info!(
                    target: "party.rendezvous",
                    connected = report.connected,
                    expected = report.expected,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "All members connected"
                );
                metrics::record_rendezvous("complete", elapsed);
            }
            Err(err) => {
                let outcome = match err {
                    PartyError::RendezvousTimeout { .. } => "timeout",
                    _ => "cancelled",
                };
                warn!(target: "party.rendezvous", error = %err, "Rendezvous failed");
                metrics::record_rendezvous(outcome, elapsed);
                if let Some(bus) = &self.bus {
                    bus.publish(&PartyEvent::notification(
                        err.user_message(),
                        err.notification_seconds(),
                    ));
                }
            }
        }
    }
}
