//! Seams to the external collaborators: the group-session provider, the
//! message channel riding on it, and the game transport.
//!
//! The controller only ever talks to these traits. [`loopback`] provides an
//! in-process implementation of all three for the console and for tests.

pub mod loopback;

use crate::session::{Member, MemberId, Privacy, Session, SessionId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors reported by provider, channel or transport calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider could not be reached.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (full, not joinable, not owner).
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The referenced party no longer exists.
    #[error("party not found: {0}")]
    NotFound(SessionId),
}

/// Search filter for party discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    /// Minimum number of free member slots.
    pub min_open_slots: u32,
    /// Metadata key/value pairs that must match exactly.
    pub metadata: Vec<(String, String)>,
}

impl SessionFilter {
    #[must_use]
    pub fn with_open_slots(mut self, slots: u32) -> Self {
        self.min_open_slots = slots;
        self
    }

    #[must_use]
    pub fn with_key_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Whether a snapshot satisfies the filter.
    #[must_use]
    pub fn matches(&self, session: &Session) -> bool {
        let open = (session.max_members as usize).saturating_sub(session.member_count());
        open >= self.min_open_slots as usize
            && self
                .metadata
                .iter()
                .all(|(k, v)| session.metadata.get(k) == Some(v))
    }
}

/// Group-session provider (membership, metadata, discovery).
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Create a party owned by the local member.
    async fn create(&self, max_members: u32) -> Result<Session, ProviderError>;

    /// Join an existing party.
    async fn join(&self, id: SessionId) -> Result<Session, ProviderError>;

    /// List parties matching the filter.
    async fn query(&self, filter: &SessionFilter) -> Result<Vec<Session>, ProviderError>;

    /// Leave a party.
    async fn leave(&self, id: SessionId) -> Result<(), ProviderError>;

    async fn get_metadata(&self, id: SessionId, key: &str) -> Result<Option<String>, ProviderError>;

    /// Write a metadata value; every member observes a `MetadataChanged` event.
    async fn set_metadata(&self, id: SessionId, key: &str, value: &str)
        -> Result<(), ProviderError>;

    /// Set provider-level visibility.
    async fn set_privacy(&self, id: SessionId, privacy: Privacy) -> Result<(), ProviderError>;

    /// Set provider-level joinability.
    async fn set_joinable(&self, id: SessionId, joinable: bool) -> Result<(), ProviderError>;

    async fn transfer_ownership(&self, id: SessionId, member: MemberId)
        -> Result<(), ProviderError>;

    async fn is_owned_by(&self, id: SessionId, member: MemberId) -> Result<bool, ProviderError>;
}

/// Group text channel of a party. Delivery is best-effort.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send(&self, id: SessionId, text: &str) -> Result<(), ProviderError>;
}

/// Game transport started once the party is ready.
pub trait Transport: Send + Sync {
    /// Start hosting the transport for a party.
    fn start_host(&self, session: &Session) -> Result<(), ProviderError>;

    /// Connect to the transport hosted by the party owner.
    fn start_client(&self, session: &Session) -> Result<(), ProviderError>;

    fn shutdown(&self);

    fn is_running(&self) -> bool;

    /// Number of connected transport clients, host included.
    fn connected_client_count(&self) -> usize;
}

/// The three collaborators a party actor is wired to.
#[derive(Clone)]
pub struct PartyServices {
    pub provider: Arc<dyn SessionProvider>,
    pub channel: Arc<dyn MessageChannel>,
    pub transport: Arc<dyn Transport>,
}

impl PartyServices {
    #[must_use]
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        channel: Arc<dyn MessageChannel>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            provider,
            channel,
            transport,
        }
    }
}

impl std::fmt::Debug for PartyServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartyServices").finish_non_exhaustive()
    }
}

/// Raw callbacks from the provider and its message channel.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// Result of a `create` call.
    Created(Result<Session, ProviderError>),
    /// The local member entered a party (hosted or joined).
    Entered(Session),
    MemberJoined { session: Session, member: Member },
    MemberDataChanged { session: Session, member: Member },
    MemberDisconnected { session: Session, member: Member },
    MemberLeft { session: Session, member: Member },
    /// Another member invited the local member to their party.
    Invited { from: Member, session: Session },
    /// The local member asked the platform to join a friend's party.
    JoinRequested { session: SessionId },
    MetadataChanged(Session),
    /// A group message. `sender_is_owner` is computed by the channel.
    ChatMessage {
        session: Session,
        sender: Member,
        text: String,
        sender_is_owner: bool,
    },
}

impl ProviderEvent {
    /// Bounded event name for logs and metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ProviderEvent::Created(_) => "created",
            ProviderEvent::Entered(_) => "entered",
            ProviderEvent::MemberJoined { .. } => "member_joined",
            ProviderEvent::MemberDataChanged { .. } => "member_data_changed",
            ProviderEvent::MemberDisconnected { .. } => "member_disconnected",
            ProviderEvent::MemberLeft { .. } => "member_left",
            ProviderEvent::Invited { .. } => "invited",
            ProviderEvent::JoinRequested { .. } => "join_requested",
            ProviderEvent::MetadataChanged(_) => "metadata_changed",
            ProviderEvent::ChatMessage { .. } => "chat_message",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn session(members: u64, max: u32, game: &str) -> Session {
        Session {
            id: SessionId(1),
            owner: MemberId(1),
            members: (1..=members)
                .map(|i| Member::new(MemberId(i), format!("m{i}"), false))
                .collect(),
            max_members: max,
            metadata: BTreeMap::from([("game".to_string(), game.to_string())]),
        }
    }

    #[test]
    fn test_filter_matches_slots_and_tag() {
        let filter = SessionFilter::default()
            .with_open_slots(1)
            .with_key_value("game", "arena");

        assert!(filter.matches(&session(2, 4, "arena")));
        assert!(!filter.matches(&session(4, 4, "arena")));
        assert!(!filter.matches(&session(1, 4, "other")));
    }

    #[test]
    fn test_empty_filter_matches_full_party() {
        assert!(SessionFilter::default().matches(&session(4, 4, "arena")));
    }
}
