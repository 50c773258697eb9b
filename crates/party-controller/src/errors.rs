//! Party controller error types.
//!
//! Every failure is non-fatal: the operation is dropped, the party returns to
//! its prior stable state and the error is surfaced to the UI as a
//! notification via [`PartyError::user_message`].

use thiserror::Error;

/// Party controller error type.
///
/// Maps to bounded metric labels via [`PartyError::kind`]:
/// - `AuthorizationDenied`: `authorization_denied`
/// - `NotFound`: `not_found`
/// - `InvalidState`, `InvalidArgument`: `invalid_state`, `invalid_argument`
/// - `ProviderFailure`, `JoinFailed`: `provider_failure`, `join_failed`
/// - Rendezvous errors: `rendezvous_timeout`, `rendezvous_cancelled`
/// - `InvariantViolation`, `Internal`: `internal`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyError {
    /// A privileged action was attempted by someone who is not the party owner.
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The requested party or member does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation does not apply to the current state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An argument was outside its accepted range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The session provider failed to create a party.
    #[error("Provider failure: {0}")]
    ProviderFailure(String),

    /// The session provider rejected a join that matched a listed candidate.
    #[error("Join failed: {0}")]
    JoinFailed(String),

    /// Not every party member connected to the transport before the deadline.
    #[error("Transport rendezvous timed out ({connected}/{expected} connected)")]
    RendezvousTimeout { connected: usize, expected: usize },

    /// The transport rendezvous was cancelled (shutdown, leave or transport stop).
    #[error("Transport rendezvous cancelled")]
    RendezvousCancelled,

    /// A session snapshot broke a model invariant.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Internal error (actor mailbox closed, task failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PartyError {
    /// Returns a bounded label for metrics and structured logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            PartyError::AuthorizationDenied(_) => "authorization_denied",
            PartyError::NotFound(_) => "not_found",
            PartyError::InvalidState(_) => "invalid_state",
            PartyError::InvalidArgument(_) => "invalid_argument",
            PartyError::ProviderFailure(_) => "provider_failure",
            PartyError::JoinFailed(_) => "join_failed",
            PartyError::RendezvousTimeout { .. } => "rendezvous_timeout",
            PartyError::RendezvousCancelled => "rendezvous_cancelled",
            PartyError::InvariantViolation(_) | PartyError::Internal(_) => "internal",
        }
    }

    /// Returns the text shown to the local user (no internal details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            PartyError::AuthorizationDenied(msg)
            | PartyError::NotFound(msg)
            | PartyError::InvalidState(msg)
            | PartyError::InvalidArgument(msg) => msg.clone(),
            PartyError::ProviderFailure(_) => {
                "The party service didn't respond. Please try again.".to_string()
            }
            PartyError::JoinFailed(_) => "Couldn't join that party.".to_string(),
            PartyError::RendezvousTimeout { connected, expected } => {
                format!("Only {connected} of {expected} players connected in time.")
            }
            PartyError::RendezvousCancelled => "Match start was cancelled.".to_string(),
            PartyError::InvariantViolation(_) | PartyError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }

    /// How long the notification for this error stays on screen, in seconds.
    #[must_use]
    pub const fn notification_seconds(&self) -> f32 {
        3.0
    }
}

impl From<crate::provider::ProviderError> for PartyError {
    fn from(err: crate::provider::ProviderError) -> Self {
        PartyError::ProviderFailure(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::provider::ProviderError;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PartyError::AuthorizationDenied("x".to_string()).kind(),
            "authorization_denied"
        );
        assert_eq!(PartyError::NotFound("x".to_string()).kind(), "not_found");
        assert_eq!(
            PartyError::InvalidState("x".to_string()).kind(),
            "invalid_state"
        );
        assert_eq!(
            PartyError::ProviderFailure("x".to_string()).kind(),
            "provider_failure"
        );
        assert_eq!(PartyError::JoinFailed("x".to_string()).kind(), "join_failed");
        assert_eq!(
            PartyError::RendezvousTimeout {
                connected: 1,
                expected: 2
            }
            .kind(),
            "rendezvous_timeout"
        );
        assert_eq!(PartyError::Internal("x".to_string()).kind(), "internal");
        assert_eq!(
            PartyError::InvariantViolation("x".to_string()).kind(),
            "internal"
        );
    }

    #[test]
    fn test_user_messages_hide_internal_details() {
        let err = PartyError::ProviderFailure("upstream 10.0.0.7 refused".to_string());
        assert!(!err.user_message().contains("10.0.0.7"));

        let err = PartyError::Internal("mailbox closed".to_string());
        assert_eq!(err.user_message(), "An internal error occurred");

        let err = PartyError::InvalidState("You're already in this party.".to_string());
        assert_eq!(err.user_message(), "You're already in this party.");
    }

    #[test]
    fn test_provider_error_conversion() {
        let err: PartyError = ProviderError::Unavailable("offline".to_string()).into();
        assert!(matches!(err, PartyError::ProviderFailure(_)));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!(
                "{}",
                PartyError::RendezvousTimeout {
                    connected: 2,
                    expected: 4
                }
            ),
            "Transport rendezvous timed out (2/4 connected)"
        );
        assert_eq!(
            format!("{}", PartyError::NotFound("party 7".to_string())),
            "Not found: party 7"
        );
    }
}
