//! `PartyActor` - owns the local view of the current party.
//!
//! All provider callbacks, command dispatch and user operations run
//! sequentially on this actor, so the [`SessionModel`] needs no locking.
//! Slow provider calls run on spawned tasks and come back as
//! [`Completion`]s; their handlers re-check which party is current.
//!
//! Every failed operation is published as a notification in addition to
//! being returned to the caller.

use super::messages::{Completion, PartyMessage, Reply};
use crate::command::ControlCommandChannel;
use crate::config::Config;
use crate::errors::PartyError;
use crate::lifecycle::{JoinTarget, SessionLifecycleController};
use crate::notify::{NotificationBus, PartyEvent, Subscription};
use crate::observability::metrics;
use crate::provider::{PartyServices, ProviderEvent};
use crate::rendezvous::RendezvousReport;
use crate::router::{MembershipEventRouter, RouterAction};
use crate::session::{MemberId, PartyInfo, Privacy, SessionId, SessionModel};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the party mailbox.
const PARTY_CHANNEL_BUFFER: usize = 64;

/// Handle to a `PartyActor`.
#[derive(Clone, Debug)]
pub struct PartyHandle {
    sender: mpsc::Sender<PartyMessage>,
    cancel_token: CancellationToken,
    bus: NotificationBus,
    local_id: MemberId,
}

impl PartyHandle {
    #[must_use]
    pub fn local_id(&self) -> MemberId {
        self.local_id
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> PartyMessage,
    ) -> Result<T, PartyError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|e| PartyError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PartyError::Internal(format!("response receive failed: {e}")))?
    }

    /// Create a new party. The current one, if any, is left afterwards.
    pub async fn host(&self) -> Result<SessionId, PartyError> {
        self.request(|respond_to| PartyMessage::Host { respond_to })
            .await
    }

    /// Join a listed party by id.
    pub async fn join(&self, id: SessionId) -> Result<SessionId, PartyError> {
        self.request(|respond_to| PartyMessage::Join { id, respond_to })
            .await
    }

    /// Join a random listed party other than the current one.
    pub async fn join_random(&self) -> Result<SessionId, PartyError> {
        self.request(|respond_to| PartyMessage::JoinRandom { respond_to })
            .await
    }

    /// Leave the current party and re-host.
    pub async fn leave(&self, allow_solo: bool) -> Result<(), PartyError> {
        self.request(|respond_to| PartyMessage::Leave {
            allow_solo,
            respond_to,
        })
        .await
    }

    pub async fn kick(&self, member: MemberId) -> Result<(), PartyError> {
        self.request(|respond_to| PartyMessage::Kick { member, respond_to })
            .await
    }

    pub async fn promote(&self, member: MemberId) -> Result<(), PartyError> {
        self.request(|respond_to| PartyMessage::Promote { member, respond_to })
            .await
    }

    pub async fn toggle_privacy(&self, privacy: Option<Privacy>) -> Result<Privacy, PartyError> {
        self.request(|respond_to| PartyMessage::TogglePrivacy {
            privacy,
            respond_to,
        })
        .await
    }

    pub async fn toggle_joinable(&self, joinable: Option<bool>) -> Result<bool, PartyError> {
        self.request(|respond_to| PartyMessage::ToggleJoinable {
            joinable,
            respond_to,
        })
        .await
    }

    /// Start the transport and wait until every member has connected.
    pub async fn start_transport(&self) -> Result<RendezvousReport, PartyError> {
        let rendezvous = self
            .request(|respond_to| PartyMessage::StartTransport { respond_to })
            .await?;
        rendezvous.wait().await
    }

    pub async fn shutdown_transport(&self) -> Result<(), PartyError> {
        self.request(|respond_to| PartyMessage::ShutdownTransport { respond_to })
            .await
    }

    pub async fn send_chat(&self, text: impl Into<String>) -> Result<(), PartyError> {
        let text = text.into();
        self.request(|respond_to| PartyMessage::SendChat { text, respond_to })
            .await
    }

    pub async fn send_command(
        &self,
        name: impl Into<String>,
        args: Vec<String>,
    ) -> Result<(), PartyError> {
        let name = name.into();
        self.request(|respond_to| PartyMessage::SendCommand {
            name,
            args,
            respond_to,
        })
        .await
    }

    pub async fn set_start_override(&self, enabled: bool) -> Result<(), PartyError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PartyMessage::SetStartOverride {
                enabled,
                respond_to: tx,
            })
            .await
            .map_err(|e| PartyError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| PartyError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn info(&self) -> Result<PartyInfo, PartyError> {
        self.request(|respond_to| PartyMessage::GetInfo { respond_to })
            .await
    }

    /// Re-publish the current party as `SessionUpdated`.
    pub async fn refresh(&self) -> Result<(), PartyError> {
        self.request(|respond_to| PartyMessage::Refresh { respond_to })
            .await
    }

    /// Subscribe to notifications.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Stop the actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The party actor.
pub struct PartyActor {
    model: SessionModel,
    router: MembershipEventRouter,
    lifecycle: SessionLifecycleController,
    bus: NotificationBus,
    receiver: mpsc::Receiver<PartyMessage>,
    events: mpsc::UnboundedReceiver<ProviderEvent>,
    completions: mpsc::UnboundedReceiver<Completion>,
    cancel_token: CancellationToken,
}

impl PartyActor {
    /// Spawn the actor and host an initial party.
    pub fn spawn(
        config: Config,
        local_id: MemberId,
        services: PartyServices,
        events: mpsc::UnboundedReceiver<ProviderEvent>,
        cancel_token: CancellationToken,
    ) -> (PartyHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(PARTY_CHANNEL_BUFFER);
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let bus = NotificationBus::new();

        let actor = Self {
            model: SessionModel::new(local_id, config.local_name.clone()),
            router: MembershipEventRouter::new(ControlCommandChannel::new(
                local_id,
                config.kick_intent_ttl,
            )),
            lifecycle: SessionLifecycleController::new(
                config,
                services,
                bus.clone(),
                completions_tx,
                cancel_token.clone(),
            ),
            bus: bus.clone(),
            receiver,
            events,
            completions,
            cancel_token: cancel_token.clone(),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PartyHandle {
            sender,
            cancel_token,
            bus,
            local_id,
        };

        (handle, task_handle)
    }

    async fn run(mut self) {
        info!(
            target: "party.actor",
            member = %self.model.local_id(),
            "PartyActor started"
        );

        self.lifecycle.host(&self.model, None);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(target: "party.actor", "PartyActor received cancellation signal");
                    self.graceful_shutdown().await;
                    break;
                }

                Some(completion) = self.completions.recv() => {
                    self.handle_completion(completion).await;
                }

                Some(event) = self.events.recv() => {
                    self.route(event).await;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!(target: "party.actor", "PartyActor channel closed, exiting");
                            self.graceful_shutdown().await;
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "party.actor",
            member = %self.model.local_id(),
            "PartyActor stopped"
        );
    }

    #[instrument(skip_all, fields(operation = message.operation()))]
    async fn handle_message(&mut self, message: PartyMessage) {
        let operation = message.operation();
        match message {
            PartyMessage::Host { respond_to } => {
                self.lifecycle.host(&self.model, Some(respond_to));
            }
            PartyMessage::Join { id, respond_to } => {
                self.start_join(JoinTarget::Listed(id), Some(respond_to));
            }
            PartyMessage::JoinRandom { respond_to } => {
                let exclude = self.model.current_id();
                self.start_join(JoinTarget::Random { exclude }, Some(respond_to));
            }
            PartyMessage::Leave {
                allow_solo,
                respond_to,
            } => {
                let result = self.lifecycle.leave(&mut self.model, false, allow_solo).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::Kick { member, respond_to } => {
                let result = self.lifecycle.kick(&self.model, member).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::Promote { member, respond_to } => {
                let result = self.lifecycle.promote(&self.model, member).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::TogglePrivacy {
                privacy,
                respond_to,
            } => {
                let result = self.lifecycle.toggle_privacy(&self.model, privacy).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::ToggleJoinable {
                joinable,
                respond_to,
            } => {
                let result = self.lifecycle.toggle_joinable(&self.model, joinable).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::StartTransport { respond_to } => {
                let result = self.lifecycle.start_transport(&self.model).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::ShutdownTransport { respond_to } => {
                let result = self.lifecycle.shutdown_transport(&self.model).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::SendChat { text, respond_to } => {
                let result = self.lifecycle.send_chat(&self.model, &text).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::SendCommand {
                name,
                args,
                respond_to,
            } => {
                let result = self.lifecycle.send_custom(&self.model, &name, args).await;
                self.finish(operation, result, respond_to);
            }
            PartyMessage::SetStartOverride {
                enabled,
                respond_to,
            } => {
                self.lifecycle.set_start_override(enabled);
                let _ = respond_to.send(());
            }
            PartyMessage::GetInfo { respond_to } => {
                let result = self.model.info().ok_or_else(|| {
                    PartyError::InvalidState("You're not in a party yet.".to_string())
                });
                self.finish(operation, result, respond_to);
            }
            PartyMessage::Refresh { respond_to } => {
                let result = self.model.require_current().map(|session| {
                    self.bus
                        .publish(&PartyEvent::SessionUpdated(session.clone()));
                });
                self.finish(operation, result, respond_to);
            }
        }
        self.lifecycle.sync_members(&self.model);
    }

    #[instrument(skip_all)]
    async fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Created {
                previous,
                result,
                respond_to,
            } => {
                let created = result.as_ref().map(|s| s.id).map_err(|e| {
                    PartyError::ProviderFailure(e.to_string())
                });
                self.route(ProviderEvent::Created(result)).await;
                if let Ok(id) = created {
                    if self.model.is_current(id) {
                        self.lifecycle
                            .complete_host(&self.model, previous, id)
                            .await;
                    }
                }
                self.report("host", &created);
                if let Some(tx) = respond_to {
                    let _ = tx.send(created);
                }
            }
            Completion::Joined {
                previous,
                result,
                respond_to,
            } => {
                let joined = match result {
                    Ok(session) => {
                        self.lifecycle
                            .complete_join(&mut self.model, previous, session)
                            .await
                    }
                    Err(err) => Err(err),
                };
                self.report("join", &joined);
                if let Some(tx) = respond_to {
                    let _ = tx.send(joined);
                }
            }
        }
        self.lifecycle.sync_members(&self.model);
    }

    /// Route one provider event and execute the resulting actions.
    async fn route(&mut self, event: ProviderEvent) {
        debug!(target: "party.actor", event = event.name(), "Provider event");
        let before = self.model.current_id();
        let actions = self.router.route(&mut self.model, event);
        if let (Some(displaced), Some(current)) = (before, self.model.current_id()) {
            if displaced != current {
                self.lifecycle.leave_displaced(displaced, current).await;
            }
        }
        for action in actions {
            self.execute(action).await;
        }
        self.lifecycle.sync_members(&self.model);
    }

    async fn execute(&mut self, action: RouterAction) {
        match action {
            RouterAction::Publish(event) => self.bus.publish(&event),
            RouterAction::InitializeMetadata(id) => {
                let result = self.lifecycle.initialize_metadata(id).await;
                self.report("initialize_metadata", &result);
            }
            RouterAction::LeaveKicked => {
                let result = self.lifecycle.leave(&mut self.model, true, false).await;
                self.report("leave", &result);
            }
            RouterAction::JoinTransport => {
                let result = self.lifecycle.join_transport(&self.model);
                self.report("join_transport", &result);
            }
            RouterAction::Join(id) => self.start_join(JoinTarget::Direct(id), None),
        }
    }

    fn start_join(&mut self, target: JoinTarget, respond_to: Option<Reply<SessionId>>) {
        match self.lifecycle.check_join(&self.model, target) {
            Ok(()) => self.lifecycle.spawn_join(&self.model, target, respond_to),
            Err(err) => {
                let result: Result<SessionId, PartyError> = Err(err);
                self.report("join", &result);
                if let Some(tx) = respond_to {
                    let _ = tx.send(result);
                }
            }
        }
    }

    fn finish<T>(&self, operation: &'static str, result: Result<T, PartyError>, respond_to: Reply<T>) {
        self.report(operation, &result);
        let _ = respond_to.send(result);
    }

    /// Record the outcome and publish failures as notifications.
    fn report<T>(&self, operation: &'static str, result: &Result<T, PartyError>) {
        match result {
            Ok(_) => metrics::record_operation(operation, "success"),
            Err(err) => {
                warn!(
                    target: "party.actor",
                    operation,
                    kind = err.kind(),
                    error = %err,
                    "Operation failed"
                );
                metrics::record_operation(operation, "error");
                metrics::record_error(operation, err.kind());
                self.bus.publish(&PartyEvent::notification(
                    err.user_message(),
                    err.notification_seconds(),
                ));
            }
        }
    }

    async fn graceful_shutdown(&mut self) {
        self.lifecycle.stop_transport();
        if let Some(id) = self.model.current_id() {
            if let Err(err) = self.lifecycle.leave_on_shutdown(id).await {
                debug!(target: "party.actor", error = %err, "Leave on shutdown failed");
            }
        }
    }
}
