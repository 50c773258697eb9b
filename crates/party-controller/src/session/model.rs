//! Local view of the current party.
//!
//! Pure data plus invariant checks. No provider or network access: the router
//! and the lifecycle controller are the only writers, both running on the
//! party actor's single event queue.

use super::{Member, MemberId, Privacy, Session, SessionId};
use crate::errors::PartyError;
use serde::Serialize;
use std::fmt;

/// Mutation applied to the model.
#[derive(Debug, Clone)]
pub enum SessionDiff {
    /// Replace the current snapshot (entered, refreshed or updated party).
    Replace(Session),
    /// Drop the current snapshot (left the party, re-host pending).
    Clear,
}

/// The single current party of the local actor plus cached settings.
#[derive(Debug)]
pub struct SessionModel {
    local_id: MemberId,
    local_name: String,
    current: Option<Session>,
    privacy: Option<Privacy>,
    joinable: Option<bool>,
}

impl SessionModel {
    #[must_use]
    pub fn new(local_id: MemberId, local_name: impl Into<String>) -> Self {
        Self {
            local_id,
            local_name: local_name.into(),
            current: None,
            privacy: None,
            joinable: None,
        }
    }

    #[must_use]
    pub fn local_id(&self) -> MemberId {
        self.local_id
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    #[must_use]
    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn current_id(&self) -> Option<SessionId> {
        self.current.as_ref().map(|s| s.id)
    }

    /// The current party, or `InvalidState` while a re-host is pending.
    pub fn require_current(&self) -> Result<&Session, PartyError> {
        self.current
            .as_ref()
            .ok_or_else(|| PartyError::InvalidState("You're not in a party yet.".to_string()))
    }

    #[must_use]
    pub fn is_current(&self, id: SessionId) -> bool {
        self.current_id() == Some(id)
    }

    /// Whether the local actor owns the current party.
    ///
    /// Advisory only: remote peers enforce ownership from the channel-supplied
    /// sender attribute, never from this value.
    #[must_use]
    pub fn is_local_owner(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|s| s.is_owned_by(self.local_id))
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.current.as_ref().map_or(0, Session::member_count)
    }

    #[must_use]
    pub fn cached_privacy(&self) -> Option<Privacy> {
        self.privacy
    }

    #[must_use]
    pub fn cached_joinable(&self) -> Option<bool> {
        self.joinable
    }

    /// Apply a diff. Rejected snapshots leave the model untouched.
    pub fn apply(&mut self, diff: SessionDiff) -> Result<(), PartyError> {
        match diff {
            SessionDiff::Replace(session) => {
                session.validate()?;
                if !session.contains(self.local_id) {
                    return Err(PartyError::InvariantViolation(format!(
                        "local member {} missing from party {}",
                        self.local_id, session.id
                    )));
                }
                self.current = Some(session);
            }
            SessionDiff::Clear => {
                self.current = None;
            }
        }
        Ok(())
    }

    /// Compare against the cached privacy, then cache. Returns `true` on change.
    pub fn reconcile_privacy(&mut self, privacy: Privacy) -> bool {
        let changed = self.privacy != Some(privacy);
        self.privacy = Some(privacy);
        changed
    }

    /// Compare against the cached joinable flag, then cache. Returns `true` on change.
    pub fn reconcile_joinable(&mut self, joinable: bool) -> bool {
        let changed = self.joinable != Some(joinable);
        self.joinable = Some(joinable);
        changed
    }

    #[must_use]
    pub fn info(&self) -> Option<PartyInfo> {
        self.current.as_ref().map(|s| PartyInfo {
            id: s.id,
            owner: s.owner_member().cloned(),
            privacy: self.privacy,
            joinable: self.joinable,
            members: s.members.clone(),
            max_members: s.max_members,
        })
    }
}

/// Point-in-time summary of the current party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartyInfo {
    pub id: SessionId,
    pub owner: Option<Member>,
    pub privacy: Option<Privacy>,
    pub joinable: Option<bool>,
    pub members: Vec<Member>,
    pub max_members: u32,
}

impl fmt::Display for PartyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Party ID: {}", self.id)?;
        match &self.owner {
            Some(owner) => writeln!(f, "Party Owner: {owner}")?,
            None => writeln!(f, "Party Owner: unknown")?,
        }
        match self.privacy {
            Some(p) => writeln!(f, "Party Privacy: {} ({})", p.label(), p.as_u8())?,
            None => writeln!(f, "Party Privacy: unknown")?,
        }
        match self.joinable {
            Some(j) => writeln!(f, "Party Joinable: {j}")?,
            None => writeln!(f, "Party Joinable: unknown")?,
        }
        writeln!(f, "Members ({}/{}):", self.members.len(), self.max_members)?;
        for member in &self.members {
            writeln!(f, "{member}")?;
        }
        Ok(())
    }
}
