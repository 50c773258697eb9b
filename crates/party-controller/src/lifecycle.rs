//! User-facing party operations.
//!
//! Every privileged operation checks local ownership first. That check only
//! spares a round trip and gives the player a readable message; remote peers
//! enforce authority from the channel-supplied owner attribute.
//!
//! `create`, `query` and `join` run on spawned tasks and post a
//! [`Completion`] back to the actor, so provider events keep flowing while
//! they are outstanding.

use crate::actors::messages::{Completion, Reply};
use crate::command::ControlCommand;
use crate::config::Config;
use crate::errors::PartyError;
use crate::notify::{NotificationBus, PartyEvent};
use crate::observability::metrics;
use crate::provider::{PartyServices, SessionFilter, SessionProvider};
use crate::rendezvous::TransportRendezvous;
use crate::session::{
    MemberId, Privacy, Session, SessionDiff, SessionId, SessionModel, KEY_GAME, KEY_JOINABLE,
    KEY_PRIVACY,
};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ALREADY_IN_PARTY: &str = "You're already in this party.";
const NO_PARTY_WITH_ID: &str = "No joinable party with that ID was found!";
const NO_PUBLIC_PARTIES: &str = "There are currently no joinable public parties. Try again later.";

/// How a join picks its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinTarget {
    /// A party listed by the discovery query.
    Listed(SessionId),
    /// A random listed party, excluding the one we are in.
    Random { exclude: Option<SessionId> },
    /// Join without a query (platform join request).
    Direct(SessionId),
}

/// Orchestrates provider calls and outbound control commands.
pub struct SessionLifecycleController {
    config: Config,
    services: PartyServices,
    bus: NotificationBus,
    completions: mpsc::UnboundedSender<Completion>,
    members: watch::Sender<usize>,
    cancel_token: CancellationToken,
    rendezvous: Option<CancellationToken>,
}

impl SessionLifecycleController {
    #[must_use]
    pub fn new(
        config: Config,
        services: PartyServices,
        bus: NotificationBus,
        completions: mpsc::UnboundedSender<Completion>,
        cancel_token: CancellationToken,
    ) -> Self {
        let (members, _) = watch::channel(0);
        Self {
            config,
            services,
            bus,
            completions,
            members,
            cancel_token,
            rendezvous: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn set_start_override(&mut self, enabled: bool) {
        info!(target: "party.lifecycle", enabled, "Start condition override changed");
        self.config.override_start_conditions = enabled;
    }

    /// Publish the live member count to rendezvous waiters and metrics.
    pub fn sync_members(&self, model: &SessionModel) {
        let count = model.member_count();
        self.members.send_if_modified(|current| {
            let changed = *current != count;
            *current = count;
            changed
        });
        metrics::set_party_members(count);
    }

    // ------------------------------------------------------------------
    // Host and join
    // ------------------------------------------------------------------

    /// Start creating a party sized to the configured maximum.
    pub fn host(&self, model: &SessionModel, respond_to: Option<Reply<SessionId>>) {
        let provider = Arc::clone(&self.services.provider);
        let completions = self.completions.clone();
        let previous = model.current_id();
        let max_members = self.config.max_members;

        debug!(target: "party.lifecycle", max_members, "Creating party");
        tokio::spawn(async move {
            let result = provider.create(max_members).await;
            let completion = Completion::Created {
                previous,
                result,
                respond_to,
            };
            if completions.send(completion).is_err() {
                debug!(target: "party.lifecycle", "Actor gone before party creation finished");
            }
        });
    }

    /// Fast-fail checks before a join is spawned.
    pub fn check_join(&self, model: &SessionModel, target: JoinTarget) -> Result<(), PartyError> {
        match target {
            JoinTarget::Listed(id) | JoinTarget::Direct(id) if model.is_current(id) => {
                Err(PartyError::InvalidState(ALREADY_IN_PARTY.to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Query (unless direct), pick the target and join it on a spawned task.
    pub fn spawn_join(
        &self,
        model: &SessionModel,
        target: JoinTarget,
        respond_to: Option<Reply<SessionId>>,
    ) {
        let provider = Arc::clone(&self.services.provider);
        let completions = self.completions.clone();
        let previous = model.current_id();
        let filter = SessionFilter::default()
            .with_open_slots(1)
            .with_key_value(KEY_GAME, self.config.game_tag.clone());

        debug!(target: "party.lifecycle", ?target, "Joining party");
        tokio::spawn(async move {
            let result = find_and_join(provider.as_ref(), &filter, target).await;
            let completion = Completion::Joined {
                previous,
                result,
                respond_to,
            };
            if completions.send(completion).is_err() {
                debug!(target: "party.lifecycle", "Actor gone before join finished");
            }
        });
    }

    /// Leave whatever the new party supersedes.
    pub async fn complete_host(
        &mut self,
        model: &SessionModel,
        previous: Option<SessionId>,
        created: SessionId,
    ) {
        self.leave_superseded([previous, model.current_id()], created)
            .await;
    }

    /// Leave a party the router just replaced with another one.
    pub async fn leave_displaced(&mut self, displaced: SessionId, current: SessionId) {
        self.leave_superseded([Some(displaced)], current).await;
    }

    /// Adopt a joined party and leave the one it supersedes.
    pub async fn complete_join(
        &mut self,
        model: &mut SessionModel,
        previous: Option<SessionId>,
        session: Session,
    ) -> Result<SessionId, PartyError> {
        let joined = session.id;
        self.leave_superseded([previous, model.current_id()], joined)
            .await;
        model.apply(SessionDiff::Replace(session))?;
        info!(target: "party.lifecycle", session_id = %joined, "Joined party");
        Ok(joined)
    }

    async fn leave_superseded<const N: usize>(
        &mut self,
        candidates: [Option<SessionId>; N],
        keep: SessionId,
    ) {
        let mut superseded: Vec<SessionId> = candidates
            .into_iter()
            .flatten()
            .filter(|id| *id != keep)
            .collect();
        superseded.sort_unstable();
        superseded.dedup();
        if superseded.is_empty() {
            return;
        }

        self.stop_transport();
        for id in superseded {
            match self.services.provider.leave(id).await {
                Ok(()) => info!(target: "party.lifecycle", session_id = %id, "Left superseded party"),
                Err(err) => debug!(
                    target: "party.lifecycle",
                    session_id = %id,
                    error = %err,
                    "Superseded party already gone"
                ),
            }
        }
    }

    /// Write default privacy, joinable flag and game tag on a new party.
    pub async fn initialize_metadata(&self, id: SessionId) -> Result<(), PartyError> {
        let provider = &self.services.provider;
        provider.set_privacy(id, Privacy::Public).await?;
        provider
            .set_metadata(id, KEY_PRIVACY, &Privacy::Public.as_u8().to_string())
            .await?;
        provider.set_joinable(id, true).await?;
        provider.set_metadata(id, KEY_JOINABLE, "true").await?;
        provider
            .set_metadata(id, KEY_GAME, &self.config.game_tag)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Leave
    // ------------------------------------------------------------------

    /// Leave the current party and immediately re-host.
    ///
    /// A no-op without a current party. A solo member cannot leave unless
    /// `allow_solo` is set.
    pub async fn leave(
        &mut self,
        model: &mut SessionModel,
        kicked: bool,
        allow_solo: bool,
    ) -> Result<(), PartyError> {
        let Some(session) = model.current() else {
            return Ok(());
        };
        let id = session.id;
        if session.member_count() == 1 && !allow_solo {
            return Err(PartyError::InvalidState(
                "Can't leave a party when you're the only member left.".to_string(),
            ));
        }

        self.stop_transport();
        if let Err(err) = self.services.provider.leave(id).await {
            warn!(target: "party.lifecycle", session_id = %id, error = %err, "Provider leave failed");
        }
        model.apply(SessionDiff::Clear)?;

        let event = if kicked {
            info!(target: "party.lifecycle", session_id = %id, "Kicked from party");
            PartyEvent::notification("You were kicked from the party by the party owner.", 3.0)
        } else {
            info!(target: "party.lifecycle", session_id = %id, "Left party");
            PartyEvent::notification("You left the party", 2.0)
        };
        self.bus.publish(&event);

        self.host(model, None);
        Ok(())
    }

    /// Leave without re-hosting; used when the actor stops.
    pub async fn leave_on_shutdown(&mut self, id: SessionId) -> Result<(), PartyError> {
        self.stop_transport();
        self.services.provider.leave(id).await?;
        info!(target: "party.lifecycle", session_id = %id, "Left party on shutdown");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Owner operations
    // ------------------------------------------------------------------

    pub async fn kick(&self, model: &SessionModel, member: MemberId) -> Result<(), PartyError> {
        let session = require_owner(model, "Only party owners can kick players.")?;
        if member == model.local_id() {
            return Err(PartyError::InvalidArgument(
                "You can't kick yourself from the party.".to_string(),
            ));
        }
        require_member(session, member)?;
        let id = session.id;
        self.send_command(id, &ControlCommand::Kick { target: member })
            .await
    }

    pub async fn promote(&self, model: &SessionModel, member: MemberId) -> Result<(), PartyError> {
        let session = require_owner(model, "Only party owners can promote players.")?;
        if member == model.local_id() {
            return Err(PartyError::InvalidState(
                "You are already party owner.".to_string(),
            ));
        }
        require_member(session, member)?;
        let id = session.id;

        self.services.provider.transfer_ownership(id, member).await?;
        info!(target: "party.lifecycle", session_id = %id, member = %member, "Ownership transferred");
        self.send_command(id, &ControlCommand::OwnerChanged).await
    }

    /// Write the requested privacy, or the next one in the cycle.
    pub async fn toggle_privacy(
        &self,
        model: &SessionModel,
        privacy: Option<Privacy>,
    ) -> Result<Privacy, PartyError> {
        let id = require_owner(model, "Only the party owner can toggle party privacy settings.")?.id;
        let next = privacy.unwrap_or_else(|| model.cached_privacy().unwrap_or_default().next());

        self.services.provider.set_privacy(id, next).await?;
        self.services
            .provider
            .set_metadata(id, KEY_PRIVACY, &next.as_u8().to_string())
            .await?;
        Ok(next)
    }

    /// Write the requested joinable flag, or flip it.
    pub async fn toggle_joinable(
        &self,
        model: &SessionModel,
        joinable: Option<bool>,
    ) -> Result<bool, PartyError> {
        let id =
            require_owner(model, "Only the party owner can toggle party joinability settings.")?.id;
        let current = model.cached_joinable().unwrap_or(true);
        if joinable == Some(current) {
            let text = if current {
                "Party is already joinable."
            } else {
                "Party is already not joinable."
            };
            return Err(PartyError::InvalidState(text.to_string()));
        }

        self.write_joinable(id, !current).await?;
        Ok(!current)
    }

    async fn ensure_joinable(
        &self,
        model: &SessionModel,
        id: SessionId,
        joinable: bool,
    ) -> Result<(), PartyError> {
        if model.cached_joinable() == Some(joinable) {
            return Ok(());
        }
        self.write_joinable(id, joinable).await
    }

    async fn write_joinable(&self, id: SessionId, joinable: bool) -> Result<(), PartyError> {
        self.services.provider.set_joinable(id, joinable).await?;
        self.services
            .provider
            .set_metadata(id, KEY_JOINABLE, if joinable { "true" } else { "false" })
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Close the party, host the transport and tell members to connect.
    ///
    /// Returns the barrier the caller awaits; the actor keeps running.
    pub async fn start_transport(
        &mut self,
        model: &SessionModel,
    ) -> Result<TransportRendezvous, PartyError> {
        let session = require_owner(model, "Only party owners can start the match.")?.clone();
        let transport = Arc::clone(&self.services.transport);

        if transport.is_running() {
            return Err(PartyError::InvalidState(
                "Transport is already running.".to_string(),
            ));
        }
        let minimum = self.config.min_start_members as usize;
        if !self.config.override_start_conditions && session.member_count() < minimum {
            return Err(PartyError::InvalidState(format!(
                "Need at least {minimum} players to start."
            )));
        }

        let was_joinable = model.cached_joinable().unwrap_or(true);
        self.ensure_joinable(model, session.id, false).await?;
        if let Err(err) = transport.start_host(&session) {
            self.reopen(session.id, was_joinable).await;
            return Err(err.into());
        }
        if let Err(err) = self
            .send_command(session.id, &ControlCommand::StartTransport)
            .await
        {
            transport.shutdown();
            self.reopen(session.id, was_joinable).await;
            return Err(err);
        }
        info!(
            target: "party.lifecycle",
            session_id = %session.id,
            members = session.member_count(),
            "Transport started"
        );

        let token = self.cancel_token.child_token();
        if let Some(stale) = self.rendezvous.replace(token.clone()) {
            stale.cancel();
        }
        Ok(TransportRendezvous::new(
            transport,
            self.members.subscribe(),
            self.config.rendezvous_timeout,
            self.config.rendezvous_poll_interval,
            token,
        )
        .with_notifications(self.bus.clone()))
    }

    /// Restore joinability after a failed start.
    async fn reopen(&self, id: SessionId, was_joinable: bool) {
        if !was_joinable {
            return;
        }
        if let Err(err) = self.write_joinable(id, true).await {
            warn!(
                target: "party.lifecycle",
                session_id = %id,
                error = %err,
                "Failed to reopen party after transport start failed"
            );
        }
    }

    pub async fn shutdown_transport(&mut self, model: &SessionModel) -> Result<(), PartyError> {
        let id = require_owner(model, "Only party owners can stop the match.")?.id;
        if !self.services.transport.is_running() {
            return Err(PartyError::InvalidState(
                "Transport isn't running.".to_string(),
            ));
        }

        self.stop_transport();
        self.ensure_joinable(model, id, true).await?;
        info!(target: "party.lifecycle", session_id = %id, "Transport stopped");
        Ok(())
    }

    /// Connect to the owner's transport after a `startTransport` command.
    pub fn join_transport(&self, model: &SessionModel) -> Result<(), PartyError> {
        let session = model.require_current()?;
        if self.services.transport.is_running() {
            return Ok(());
        }
        self.services.transport.start_client(session)?;
        info!(target: "party.lifecycle", session_id = %session.id, "Joined transport");
        Ok(())
    }

    /// Cancel any rendezvous and stop a running transport.
    pub fn stop_transport(&mut self) {
        if let Some(token) = self.rendezvous.take() {
            token.cancel();
        }
        if self.services.transport.is_running() {
            self.services.transport.shutdown();
        }
    }

    // ------------------------------------------------------------------
    // Messaging
    // ------------------------------------------------------------------

    /// Send a trimmed chat message. Empty messages are ignored.
    pub async fn send_chat(&self, model: &SessionModel, text: &str) -> Result<(), PartyError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        let id = model.require_current()?.id;
        self.services.channel.send(id, text).await?;
        Ok(())
    }

    /// Send a control command by name, for caller-defined commands.
    pub async fn send_custom(
        &self,
        model: &SessionModel,
        name: &str,
        args: Vec<String>,
    ) -> Result<(), PartyError> {
        let command = ControlCommand::from_parts(name, args)
            .map_err(|e| PartyError::InvalidArgument(e.to_string()))?;
        let id = model.require_current()?.id;
        self.send_command(id, &command).await
    }

    async fn send_command(&self, id: SessionId, command: &ControlCommand) -> Result<(), PartyError> {
        self.services.channel.send(id, &command.encode()).await?;
        metrics::record_control_command_sent(command.label());
        debug!(target: "party.lifecycle", command = command.label(), "Control command sent");
        Ok(())
    }
}

fn require_owner<'a>(model: &'a SessionModel, denied: &str) -> Result<&'a Session, PartyError> {
    let session = model.require_current()?;
    if session.is_owned_by(model.local_id()) {
        Ok(session)
    } else {
        Err(PartyError::AuthorizationDenied(denied.to_string()))
    }
}

fn require_member(session: &Session, member: MemberId) -> Result<(), PartyError> {
    if session.contains(member) {
        Ok(())
    } else {
        Err(PartyError::NotFound(
            "That player isn't in your party.".to_string(),
        ))
    }
}

async fn find_and_join(
    provider: &dyn SessionProvider,
    filter: &SessionFilter,
    target: JoinTarget,
) -> Result<Session, PartyError> {
    let chosen = match target {
        JoinTarget::Direct(id) => id,
        JoinTarget::Listed(id) => {
            let candidates = provider.query(filter).await?;
            candidates
                .iter()
                .find(|s| s.id == id)
                .map(|s| s.id)
                .ok_or_else(|| PartyError::NotFound(NO_PARTY_WITH_ID.to_string()))?
        }
        JoinTarget::Random { exclude } => {
            let candidates: Vec<SessionId> = provider
                .query(filter)
                .await?
                .into_iter()
                .map(|s| s.id)
                .filter(|id| Some(*id) != exclude)
                .collect();
            let picked = candidates.choose(&mut rand::thread_rng()).copied();
            debug!(
                target: "party.lifecycle",
                candidates = candidates.len(),
                "Picking random public party"
            );
            picked.ok_or_else(|| PartyError::NotFound(NO_PUBLIC_PARTIES.to_string()))?
        }
    };

    provider
        .join(chosen)
        .await
        .map_err(|e| PartyError::JoinFailed(e.to_string()))
}
