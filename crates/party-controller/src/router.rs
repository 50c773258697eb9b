//! Membership event router.
//!
//! Turns raw provider callbacks into [`SessionModel`] mutations and
//! deduplicated [`PartyEvent`]s. Group messages carrying the control marker
//! are handed to the [`ControlCommandChannel`]; anything that needs a
//! provider call comes back as a [`RouterAction`] for the actor to execute.

use crate::command::{ControlCommand, ControlCommandChannel, Dispatch};
use crate::notify::PartyEvent;
use crate::observability::metrics;
use crate::provider::ProviderEvent;
use crate::session::{Privacy, Session, SessionDiff, SessionId, SessionModel};
use tracing::{debug, error, info, warn};

/// Work the router cannot do on its own.
#[derive(Debug, Clone, PartialEq)]
pub enum RouterAction {
    Publish(PartyEvent),
    /// Write default privacy, joinable and game tag on a new party.
    InitializeMetadata(SessionId),
    /// Leave because the owner kicked us, then re-host.
    LeaveKicked,
    /// Connect to the transport hosted by the owner.
    JoinTransport,
    /// Join a party the player picked through the platform.
    Join(SessionId),
}

/// Routes provider events for one local actor.
#[derive(Debug)]
pub struct MembershipEventRouter {
    commands: ControlCommandChannel,
}

impl MembershipEventRouter {
    #[must_use]
    pub fn new(commands: ControlCommandChannel) -> Self {
        Self { commands }
    }

    #[must_use]
    pub fn commands(&self) -> &ControlCommandChannel {
        &self.commands
    }

    /// Process one event. Events for a superseded party are dropped.
    pub fn route(&mut self, model: &mut SessionModel, event: ProviderEvent) -> Vec<RouterAction> {
        if let Some(id) = stale_session(model, &event) {
            debug!(
                target: "party.router",
                event = event.name(),
                session_id = %id,
                "Ignoring event for superseded party"
            );
            metrics::record_stale_event(event.name());
            return Vec::new();
        }

        let mut actions = Vec::new();
        match event {
            ProviderEvent::Created(Ok(session)) => {
                info!(target: "party.router", session_id = %session.id, "Party created");
                if !replace(model, session.clone()) {
                    return actions;
                }
                // Defaults are written next; caching them first keeps the
                // resulting metadata echo silent.
                model.reconcile_privacy(Privacy::Public);
                model.reconcile_joinable(true);
                actions.push(RouterAction::InitializeMetadata(session.id));
                actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
            }
            ProviderEvent::Created(Err(err)) => {
                warn!(target: "party.router", error = %err, "Party creation failed");
            }
            ProviderEvent::Entered(session) => {
                info!(target: "party.router", session_id = %session.id, "Entered party");
                if !replace(model, session.clone()) {
                    return actions;
                }
                if !model.is_local_owner() {
                    actions.push(notify(format!("Entered {}'s party", session.owner_name()), 2.0));
                }
                reconcile_metadata(model, &session, &mut actions);
                actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
            }
            ProviderEvent::MemberJoined { session, member } => {
                info!(target: "party.router", member = %member.id, "Member joined");
                if replace(model, session.clone()) {
                    actions.push(notify(format!("{} joined the party", member.name), 2.0));
                    actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
                }
            }
            ProviderEvent::MemberLeft { session, member } => {
                let kicked = self.commands.take_kick(member.id);
                info!(target: "party.router", member = %member.id, kicked, "Member left");
                if replace(model, session.clone()) {
                    let text = if kicked {
                        format!("{} was kicked from the party", member.name)
                    } else {
                        format!("{} left the party", member.name)
                    };
                    actions.push(notify(text, 2.0));
                    actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
                }
            }
            ProviderEvent::MemberDisconnected { session, member } => {
                info!(target: "party.router", member = %member.id, "Member disconnected");
                if replace(model, session.clone()) {
                    actions.push(notify(
                        format!("{} disconnected from the party", member.name),
                        2.0,
                    ));
                    actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
                }
            }
            ProviderEvent::MemberDataChanged { session, member } => {
                debug!(target: "party.router", member = %member.id, "Member data changed");
                if replace(model, session.clone()) {
                    actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
                }
            }
            ProviderEvent::Invited { from, session } => {
                info!(
                    target: "party.router",
                    from = %from.id,
                    session_id = %session.id,
                    "Invite received"
                );
                actions.push(RouterAction::Publish(PartyEvent::invite(
                    format!("{} invited you to their party.", from.name),
                    6.0,
                    session,
                )));
            }
            ProviderEvent::JoinRequested { session } => {
                if model.is_current(session) {
                    actions.push(notify("You're already in this party.", 3.0));
                } else {
                    actions.push(RouterAction::Join(session));
                }
            }
            ProviderEvent::MetadataChanged(session) => {
                if replace(model, session.clone()) {
                    reconcile_metadata(model, &session, &mut actions);
                    actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(session)));
                }
            }
            ProviderEvent::ChatMessage {
                session,
                sender,
                text,
                sender_is_owner,
            } => {
                if !ControlCommand::is_command(&text) {
                    actions.push(RouterAction::Publish(PartyEvent::ChatMessageReceived {
                        sender,
                        text,
                    }));
                    return actions;
                }

                debug!(
                    target: "party.router",
                    sender = %sender.id,
                    sender_is_owner,
                    "Control command received"
                );
                if !replace(model, session) {
                    return actions;
                }
                let local_is_owner = model.is_local_owner();
                match self.commands.receive(&text, sender_is_owner, local_is_owner) {
                    Dispatch::LeaveKicked => actions.push(RouterAction::LeaveKicked),
                    Dispatch::JoinTransport => actions.push(RouterAction::JoinTransport),
                    Dispatch::OwnerChanged => {
                        if let Some(current) = model.current() {
                            actions.push(notify(
                                format!("{} has been promoted to party leader!", current.owner_name()),
                                3.0,
                            ));
                            actions.push(RouterAction::Publish(PartyEvent::SessionUpdated(
                                current.clone(),
                            )));
                        }
                    }
                    Dispatch::Extension {
                        name,
                        args,
                        from_owner,
                    } => actions.push(RouterAction::Publish(PartyEvent::UnknownCommand {
                        name,
                        args,
                        from_owner,
                    })),
                    Dispatch::KickPending(_) | Dispatch::Ignored | Dispatch::Unauthorized => {}
                }
            }
        }
        actions
    }
}

/// Session id of an event that no longer concerns the current party.
fn stale_session(model: &SessionModel, event: &ProviderEvent) -> Option<SessionId> {
    let id = match event {
        ProviderEvent::Created(_)
        | ProviderEvent::Entered(_)
        | ProviderEvent::Invited { .. }
        | ProviderEvent::JoinRequested { .. } => return None,
        ProviderEvent::MemberJoined { session, .. }
        | ProviderEvent::MemberDataChanged { session, .. }
        | ProviderEvent::MemberDisconnected { session, .. }
        | ProviderEvent::MemberLeft { session, .. }
        | ProviderEvent::MetadataChanged(session)
        | ProviderEvent::ChatMessage { session, .. } => session.id,
    };
    (!model.is_current(id)).then_some(id)
}

fn replace(model: &mut SessionModel, session: Session) -> bool {
    let id = session.id;
    match model.apply(SessionDiff::Replace(session)) {
        Ok(()) => true,
        Err(err) => {
            error!(target: "party.router", session_id = %id, error = %err, "Rejected party snapshot");
            false
        }
    }
}

fn notify(text: impl Into<String>, seconds: f32) -> RouterAction {
    RouterAction::Publish(PartyEvent::notification(text, seconds))
}

/// Compare metadata against the cached values; notify only on difference.
fn reconcile_metadata(model: &mut SessionModel, session: &Session, actions: &mut Vec<RouterAction>) {
    if let Some(privacy) = session.privacy() {
        if model.reconcile_privacy(privacy) {
            info!(target: "party.router", privacy = privacy.as_u8(), "Party privacy changed");
            let text = match privacy {
                Privacy::Private => {
                    "Party is now private. Only way for other players to join is through an invite."
                }
                Privacy::FriendsOnly => {
                    "Party is now friends only. Only friends can join your party without an invite."
                }
                Privacy::Public => "Party is now public. Anyone can join your party.",
            };
            actions.push(notify(text, 4.0));
        }
    }

    if let Some(joinable) = session.joinable() {
        if model.reconcile_joinable(joinable) {
            info!(target: "party.router", joinable, "Party joinability changed");
            let text = if joinable {
                "Party is now joinable."
            } else {
                "Party is no longer joinable."
            };
            actions.push(notify(text, 3.0));
        }
    }
}
