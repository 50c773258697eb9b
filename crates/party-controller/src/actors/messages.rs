//! Message types for the party actor.
//!
//! Requests from [`PartyHandle`](super::PartyHandle) use `tokio::sync::mpsc`;
//! replies use `tokio::sync::oneshot`.

use crate::errors::PartyError;
use crate::provider::ProviderError;
use crate::rendezvous::TransportRendezvous;
use crate::session::{MemberId, PartyInfo, Privacy, Session, SessionId};
use tokio::sync::oneshot;

/// Reply channel for a request.
pub type Reply<T> = oneshot::Sender<Result<T, PartyError>>;

/// Requests sent to `PartyActor`.
#[derive(Debug)]
pub enum PartyMessage {
    /// Create a new party owned by the local member.
    Host { respond_to: Reply<SessionId> },

    /// Join a listed party by id.
    Join {
        id: SessionId,
        respond_to: Reply<SessionId>,
    },

    /// Join a random listed party other than the current one.
    JoinRandom { respond_to: Reply<SessionId> },

    /// Leave the current party and re-host.
    Leave {
        allow_solo: bool,
        respond_to: Reply<()>,
    },

    Kick {
        member: MemberId,
        respond_to: Reply<()>,
    },

    Promote {
        member: MemberId,
        respond_to: Reply<()>,
    },

    /// Set privacy, or advance it one step when `privacy` is `None`.
    TogglePrivacy {
        privacy: Option<Privacy>,
        respond_to: Reply<Privacy>,
    },

    /// Set joinability, or flip it when `joinable` is `None`.
    ToggleJoinable {
        joinable: Option<bool>,
        respond_to: Reply<bool>,
    },

    /// Start hosting the transport. The reply carries the barrier to await.
    StartTransport {
        respond_to: Reply<TransportRendezvous>,
    },

    ShutdownTransport { respond_to: Reply<()> },

    /// Send a plain group message.
    SendChat {
        text: String,
        respond_to: Reply<()>,
    },

    /// Send a control command by name.
    SendCommand {
        name: String,
        args: Vec<String>,
        respond_to: Reply<()>,
    },

    /// Skip the minimum member check when starting the transport.
    SetStartOverride {
        enabled: bool,
        respond_to: oneshot::Sender<()>,
    },

    GetInfo { respond_to: Reply<PartyInfo> },

    /// Re-publish the current party snapshot.
    Refresh { respond_to: Reply<()> },
}

impl PartyMessage {
    /// Bounded operation label for logs and metrics.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            PartyMessage::Host { .. } => "host",
            PartyMessage::Join { .. } => "join",
            PartyMessage::JoinRandom { .. } => "join_random",
            PartyMessage::Leave { .. } => "leave",
            PartyMessage::Kick { .. } => "kick",
            PartyMessage::Promote { .. } => "promote",
            PartyMessage::TogglePrivacy { .. } => "toggle_privacy",
            PartyMessage::ToggleJoinable { .. } => "toggle_joinable",
            PartyMessage::StartTransport { .. } => "start_transport",
            PartyMessage::ShutdownTransport { .. } => "shutdown_transport",
            PartyMessage::SendChat { .. } => "send_chat",
            PartyMessage::SendCommand { .. } => "send_command",
            PartyMessage::SetStartOverride { .. } => "set_start_override",
            PartyMessage::GetInfo { .. } => "info",
            PartyMessage::Refresh { .. } => "refresh",
        }
    }
}

/// Results of spawned provider calls, posted back to the actor.
#[derive(Debug)]
pub enum Completion {
    Created {
        /// Party that was current when hosting started.
        previous: Option<SessionId>,
        result: Result<Session, ProviderError>,
        respond_to: Option<Reply<SessionId>>,
    },
    Joined {
        /// Party that was current when the join started.
        previous: Option<SessionId>,
        result: Result<Session, PartyError>,
        respond_to: Option<Reply<SessionId>>,
    },
}
