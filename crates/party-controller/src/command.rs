//! Control commands carried over the party's group text channel.
//!
//! Wire format: `[SERVERCOMMAND] <name> <arg> <arg> ...`, tokens separated by
//! whitespace. Authorization uses only the channel-supplied
//! `sender_is_owner` attribute of the inbound message, never anything in
//! the payload.

use crate::observability::metrics;
use crate::session::MemberId;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Reserved prefix marking a group message as a control command.
pub const COMMAND_MARKER: &str = "[SERVERCOMMAND]";

const KICK: &str = "kick";
const OWNER_CHANGED: &str = "ownerChanged";
const START_TRANSPORT: &str = "startTransport";

/// Errors decoding or building a control command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("message is not a control command")]
    NotCommand,

    #[error("control command has no name")]
    MissingName,

    #[error("malformed argument for {command}: {detail}")]
    MalformedArgument { command: String, detail: String },

    #[error("invalid command token: {0:?}")]
    InvalidToken(String),
}

/// A privileged or caller-defined instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Remove `target` from the party.
    Kick { target: MemberId },
    /// Party ownership moved; refresh ownership displays.
    OwnerChanged,
    /// The owner started hosting the transport; members should connect.
    StartTransport,
    /// Anything else, forwarded to the extension point.
    Custom { name: String, args: Vec<String> },
}

impl ControlCommand {
    /// Build a command from its name and positional arguments.
    pub fn from_parts(name: &str, args: Vec<String>) -> Result<Self, CommandError> {
        if name.is_empty() {
            return Err(CommandError::MissingName);
        }
        if let Some(bad) = std::iter::once(name)
            .chain(args.iter().map(String::as_str))
            .find(|t| t.is_empty() || t.contains(char::is_whitespace))
        {
            return Err(CommandError::InvalidToken(bad.to_string()));
        }

        match name {
            KICK => {
                let raw = args.first().ok_or_else(|| CommandError::MalformedArgument {
                    command: KICK.to_string(),
                    detail: "missing target".to_string(),
                })?;
                let target = raw.parse().map_err(|_| CommandError::MalformedArgument {
                    command: KICK.to_string(),
                    detail: format!("invalid member id {raw:?}"),
                })?;
                Ok(ControlCommand::Kick { target })
            }
            OWNER_CHANGED => Ok(ControlCommand::OwnerChanged),
            START_TRANSPORT => Ok(ControlCommand::StartTransport),
            _ => Ok(ControlCommand::Custom {
                name: name.to_string(),
                args,
            }),
        }
    }

    /// Whether a group message carries the control marker.
    #[must_use]
    pub fn is_command(text: &str) -> bool {
        text.starts_with(COMMAND_MARKER)
    }

    /// Decode a group message.
    pub fn decode(text: &str) -> Result<Self, CommandError> {
        let rest = text
            .strip_prefix(COMMAND_MARKER)
            .ok_or(CommandError::NotCommand)?;
        if !rest.starts_with(char::is_whitespace) {
            return Err(CommandError::MissingName);
        }

        let mut tokens = rest.split_whitespace();
        let name = tokens.next().ok_or(CommandError::MissingName)?;
        Self::from_parts(name, tokens.map(str::to_string).collect())
    }

    /// Wire text for the group channel.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut text = format!("{COMMAND_MARKER} {}", self.name());
        match self {
            ControlCommand::Kick { target } => {
                text.push(' ');
                text.push_str(&target.to_string());
            }
            ControlCommand::Custom { args, .. } => {
                for arg in args {
                    text.push(' ');
                    text.push_str(arg);
                }
            }
            ControlCommand::OwnerChanged | ControlCommand::StartTransport => {}
        }
        text
    }

    /// Wire name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ControlCommand::Kick { .. } => KICK,
            ControlCommand::OwnerChanged => OWNER_CHANGED,
            ControlCommand::StartTransport => START_TRANSPORT,
            ControlCommand::Custom { name, .. } => name,
        }
    }

    /// Bounded metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            ControlCommand::Kick { .. } => "kick",
            ControlCommand::OwnerChanged => "owner_changed",
            ControlCommand::StartTransport => "start_transport",
            ControlCommand::Custom { .. } => "custom",
        }
    }

    /// Whether the command is only honored from the party owner.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(
            self,
            ControlCommand::Kick { .. } | ControlCommand::StartTransport
        )
    }
}

/// Outstanding kick intents keyed by target, each with a time-to-live.
#[derive(Debug)]
pub struct PendingKicks {
    ttl: Duration,
    intents: HashMap<MemberId, Instant>,
}

impl PendingKicks {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            intents: HashMap::new(),
        }
    }

    /// Record (or refresh) an intent for `target`.
    pub fn insert(&mut self, target: MemberId, now: Instant) {
        self.purge(now);
        self.intents.insert(target, now + self.ttl);
    }

    /// Consume the intent for `target`. Returns `false` if absent or expired.
    pub fn take(&mut self, target: MemberId, now: Instant) -> bool {
        self.purge(now);
        self.intents.remove(&target).is_some()
    }

    #[must_use]
    pub fn contains(&self, target: MemberId, now: Instant) -> bool {
        self.intents.get(&target).is_some_and(|expiry| *expiry > now)
    }

    fn purge(&mut self, now: Instant) {
        self.intents.retain(|_, expiry| *expiry > now);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// What the party actor must do with a received command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The local member was kicked: leave and re-host.
    LeaveKicked,
    /// Another member is being kicked; intent recorded.
    KickPending(MemberId),
    /// Announce the new owner and republish the party.
    OwnerChanged,
    /// Connect to the transport the owner is hosting.
    JoinTransport,
    /// Forward to the extension point.
    Extension {
        name: String,
        args: Vec<String>,
        from_owner: bool,
    },
    /// Nothing to do (not a command, malformed, or not addressed to us).
    Ignored,
    /// A privileged command from a non-owner was dropped.
    Unauthorized,
}

/// Decodes inbound commands and tracks pending kick intents.
#[derive(Debug)]
pub struct ControlCommandChannel {
    local_id: MemberId,
    pending: PendingKicks,
}

impl ControlCommandChannel {
    #[must_use]
    pub fn new(local_id: MemberId, kick_intent_ttl: Duration) -> Self {
        Self {
            local_id,
            pending: PendingKicks::new(kick_intent_ttl),
        }
    }

    /// Decode and dispatch a group message carrying the command marker.
    ///
    /// `from_owner` must come from the message channel. `local_is_owner`
    /// only suppresses `startTransport` on the member that already hosts.
    pub fn receive(&mut self, text: &str, from_owner: bool, local_is_owner: bool) -> Dispatch {
        match ControlCommand::decode(text) {
            Ok(command) => self.dispatch(command, from_owner, local_is_owner),
            Err(err) => {
                debug!(target: "party.command", error = %err, "Dropping malformed control command");
                metrics::record_control_command("malformed", "malformed");
                Dispatch::Ignored
            }
        }
    }

    /// Dispatch an already decoded command.
    pub fn dispatch(
        &mut self,
        command: ControlCommand,
        from_owner: bool,
        local_is_owner: bool,
    ) -> Dispatch {
        let label = command.label();

        if command.is_privileged() && !from_owner {
            warn!(
                target: "party.command",
                command = label,
                "Dropping privileged command from non-owner"
            );
            metrics::record_control_command(label, "unauthorized");
            return Dispatch::Unauthorized;
        }

        let dispatch = match command {
            ControlCommand::Kick { target } if target == self.local_id => Dispatch::LeaveKicked,
            ControlCommand::Kick { target } => {
                self.pending.insert(target, Instant::now());
                Dispatch::KickPending(target)
            }
            ControlCommand::OwnerChanged => Dispatch::OwnerChanged,
            ControlCommand::StartTransport if local_is_owner => Dispatch::Ignored,
            ControlCommand::StartTransport => Dispatch::JoinTransport,
            ControlCommand::Custom { name, args } => Dispatch::Extension {
                name,
                args,
                from_owner,
            },
        };

        let outcome = if dispatch == Dispatch::Ignored {
            "ignored"
        } else {
            "dispatched"
        };
        debug!(target: "party.command", command = label, outcome, "Control command received");
        metrics::record_control_command(label, outcome);
        dispatch
    }

    /// Consume the kick intent for a departing member.
    pub fn take_kick(&mut self, member: MemberId) -> bool {
        self.pending.take(member, Instant::now())
    }

    #[must_use]
    pub fn pending_kicks(&self) -> &PendingKicks {
        &self.pending
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const LOCAL: MemberId = MemberId(7);

    fn channel() -> ControlCommandChannel {
        ControlCommandChannel::new(LOCAL, Duration::from_secs(10))
    }

    #[test]
    fn test_encode_wire_format() {
        assert_eq!(
            ControlCommand::Kick { target: MemberId(42) }.encode(),
            "[SERVERCOMMAND] kick 42"
        );
        assert_eq!(
            ControlCommand::OwnerChanged.encode(),
            "[SERVERCOMMAND] ownerChanged"
        );
        assert_eq!(
            ControlCommand::Custom {
                name: "ready".to_string(),
                args: vec!["a".to_string(), "b".to_string()],
            }
            .encode(),
            "[SERVERCOMMAND] ready a b"
        );
    }

    #[test]
    fn test_decode_splits_on_any_whitespace() {
        let command = ControlCommand::decode("[SERVERCOMMAND]  ready\ta   b").unwrap();
        assert_eq!(
            command,
            ControlCommand::Custom {
                name: "ready".to_string(),
                args: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert_eq!(
            ControlCommand::decode("[SERVERCOMMAND] startTransport").unwrap(),
            ControlCommand::StartTransport
        );
    }

    #[test]
    fn test_decode_rejects_non_commands() {
        assert_eq!(
            ControlCommand::decode("hello there"),
            Err(CommandError::NotCommand)
        );
        assert_eq!(
            ControlCommand::decode("[SERVERCOMMAND]"),
            Err(CommandError::MissingName)
        );
        assert_eq!(
            ControlCommand::decode("[SERVERCOMMAND]kick 1"),
            Err(CommandError::MissingName)
        );
    }

    #[test]
    fn test_decode_kick_requires_valid_target() {
        assert!(matches!(
            ControlCommand::decode("[SERVERCOMMAND] kick"),
            Err(CommandError::MalformedArgument { .. })
        ));
        assert!(matches!(
            ControlCommand::decode("[SERVERCOMMAND] kick bob"),
            Err(CommandError::MalformedArgument { .. })
        ));
    }

    #[test]
    fn test_from_parts_rejects_whitespace_tokens() {
        assert!(matches!(
            ControlCommand::from_parts("two words", vec![]),
            Err(CommandError::InvalidToken(_))
        ));
        assert!(matches!(
            ControlCommand::from_parts("ok", vec![String::new()]),
            Err(CommandError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_kick_targeting_local_member_leaves() {
        let mut channel = channel();
        let dispatch = channel.receive("[SERVERCOMMAND] kick 7", true, false);
        assert_eq!(dispatch, Dispatch::LeaveKicked);
        assert!(channel.pending_kicks().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_targeting_other_member_records_intent() {
        let mut channel = channel();
        let dispatch = channel.receive("[SERVERCOMMAND] kick 9", true, true);
        assert_eq!(dispatch, Dispatch::KickPending(MemberId(9)));

        assert!(!channel.take_kick(MemberId(8)));
        assert!(channel.take_kick(MemberId(9)));
        assert!(!channel.take_kick(MemberId(9)));
    }

    #[test]
    fn test_privileged_commands_require_owner_attribute() {
        let mut channel = channel();
        assert_eq!(
            channel.receive("[SERVERCOMMAND] kick 7", false, false),
            Dispatch::Unauthorized
        );
        assert_eq!(
            channel.receive("[SERVERCOMMAND] startTransport", false, false),
            Dispatch::Unauthorized
        );
        assert!(channel.pending_kicks().is_empty());
    }

    #[test]
    fn test_owner_changed_is_not_owner_gated() {
        let mut channel = channel();
        assert_eq!(
            channel.receive("[SERVERCOMMAND] ownerChanged", false, false),
            Dispatch::OwnerChanged
        );
    }

    #[test]
    fn test_start_transport_ignored_by_owner() {
        let mut channel = channel();
        assert_eq!(
            channel.receive("[SERVERCOMMAND] startTransport", true, true),
            Dispatch::Ignored
        );
        assert_eq!(
            channel.receive("[SERVERCOMMAND] startTransport", true, false),
            Dispatch::JoinTransport
        );
    }

    #[test]
    fn test_unknown_command_forwarded_with_owner_flag() {
        let mut channel = channel();
        assert_eq!(
            channel.receive("[SERVERCOMMAND] emote wave", false, false),
            Dispatch::Extension {
                name: "emote".to_string(),
                args: vec!["wave".to_string()],
                from_owner: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_kicks_expire() {
        let mut kicks = PendingKicks::new(Duration::from_secs(10));
        kicks.insert(MemberId(1), Instant::now());
        kicks.insert(MemberId(2), Instant::now());
        assert_eq!(kicks.len(), 2);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(!kicks.contains(MemberId(1), Instant::now()));
        assert!(!kicks.take(MemberId(1), Instant::now()));
        assert!(kicks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_kicks_keyed_by_target() {
        let mut kicks = PendingKicks::new(Duration::from_secs(10));
        kicks.insert(MemberId(1), Instant::now());
        kicks.insert(MemberId(2), Instant::now());

        assert!(kicks.take(MemberId(2), Instant::now()));
        assert!(kicks.contains(MemberId(1), Instant::now()));
    }
}
