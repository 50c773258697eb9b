//! Party session data types.
//!
//! A [`Session`] is a snapshot of the shared group state supplied by the
//! session provider. The local view of it lives in [`SessionModel`].

mod model;

pub use model::{PartyInfo, SessionDiff, SessionModel};

use crate::errors::PartyError;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Metadata key holding the privacy level (`0`, `1` or `2`).
pub const KEY_PRIVACY: &str = "privacy";

/// Metadata key holding the joinable flag (`true` or `false`).
pub const KEY_JOINABLE: &str = "joinable";

/// Metadata key holding the session tag used for discovery.
pub const KEY_GAME: &str = "game";

/// Provider-assigned party identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Channel-supplied member identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MemberId(pub u64);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MemberId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Party visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Privacy {
    /// Joinable through an invite only.
    #[default]
    Private = 0,
    /// Friends may join without an invite.
    FriendsOnly = 1,
    /// Listed in party searches.
    Public = 2,
}

impl Privacy {
    /// Next level in the 0 → 1 → 2 → 0 cycle.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Privacy::Private => Privacy::FriendsOnly,
            Privacy::FriendsOnly => Privacy::Public,
            Privacy::Public => Privacy::Private,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Privacy::Private),
            1 => Some(Privacy::FriendsOnly),
            2 => Some(Privacy::Public),
            _ => None,
        }
    }

    /// Parse the metadata representation. Unknown values yield `None`.
    #[must_use]
    pub fn parse_metadata(raw: &str) -> Option<Self> {
        raw.trim().parse::<u8>().ok().and_then(Self::from_u8)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Privacy::Private => "Private",
            Privacy::FriendsOnly => "Friends Only",
            Privacy::Public => "Public",
        }
    }
}

/// Parse the joinable metadata flag, case-insensitively.
#[must_use]
pub fn parse_joinable(raw: &str) -> Option<bool> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// A participant identity within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
    /// Whether this member is the local actor.
    pub is_local: bool,
}

impl Member {
    #[must_use]
    pub fn new(id: MemberId, name: impl Into<String>, is_local: bool) -> Self {
        Self {
            id,
            name: name.into(),
            is_local,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Snapshot of a party as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub owner: MemberId,
    /// Members in join order, unique by identity.
    pub members: Vec<Member>,
    pub max_members: u32,
    pub metadata: BTreeMap<String, String>,
}

impl Session {
    #[must_use]
    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: MemberId) -> bool {
        self.member(id).is_some()
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_owned_by(&self, id: MemberId) -> bool {
        self.owner == id
    }

    /// The owning member, if present in the snapshot.
    #[must_use]
    pub fn owner_member(&self) -> Option<&Member> {
        self.member(self.owner)
    }

    /// Display name of the owner, falling back to the raw identity.
    #[must_use]
    pub fn owner_name(&self) -> String {
        self.owner_member()
            .map_or_else(|| self.owner.to_string(), |m| m.name.clone())
    }

    #[must_use]
    pub fn local_member(&self) -> Option<&Member> {
        self.members.iter().find(|m| m.is_local)
    }

    #[must_use]
    pub fn first_member_not_local(&self) -> Option<&Member> {
        self.members.iter().find(|m| !m.is_local)
    }

    #[must_use]
    pub fn privacy(&self) -> Option<Privacy> {
        self.metadata
            .get(KEY_PRIVACY)
            .and_then(|raw| Privacy::parse_metadata(raw))
    }

    #[must_use]
    pub fn joinable(&self) -> Option<bool> {
        self.metadata
            .get(KEY_JOINABLE)
            .and_then(|raw| parse_joinable(raw))
    }

    #[must_use]
    pub fn game_tag(&self) -> Option<&str> {
        self.metadata.get(KEY_GAME).map(String::as_str)
    }

    /// Check owner-is-member, unique membership and the member-count bound.
    pub fn validate(&self) -> Result<(), PartyError> {
        if !self.contains(self.owner) {
            return Err(PartyError::InvariantViolation(format!(
                "owner {} of party {} is not a member",
                self.owner, self.id
            )));
        }

        let mut seen = HashSet::with_capacity(self.members.len());
        if let Some(dup) = self.members.iter().find(|m| !seen.insert(m.id)) {
            return Err(PartyError::InvariantViolation(format!(
                "member {} listed twice in party {}",
                dup.id, self.id
            )));
        }

        if self.members.len() > self.max_members as usize {
            return Err(PartyError::InvariantViolation(format!(
                "party {} has {} members, max {}",
                self.id,
                self.members.len(),
                self.max_members
            )));
        }

        Ok(())
    }
}
