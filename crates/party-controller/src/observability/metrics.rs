//! Metrics definitions for the party controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `party_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `command`: kick, owner_changed, start_transport, custom
//! - `outcome`: bounded per metric (see each function)
//! - `operation`: bounded by `PartyMessage` variants (~15 values)
//! - `kind`: bounded by `PartyError::kind` (~9 values)

use metrics::{counter, gauge, histogram};
use std::time::Duration;

// ============================================================================
// Control Commands (Counters)
// ============================================================================

/// Record a decoded control command and what happened to it.
///
/// Metric: `party_control_commands_total`
/// Labels: `command`, `outcome` (dispatched, unauthorized, ignored, malformed)
pub fn record_control_command(command: &'static str, outcome: &'static str) {
    counter!(
        "party_control_commands_total",
        "command" => command,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record an outbound control command.
///
/// Metric: `party_control_commands_sent_total`
/// Labels: `command`
pub fn record_control_command_sent(command: &'static str) {
    counter!("party_control_commands_sent_total", "command" => command).increment(1);
}

// ============================================================================
// Transport Rendezvous
// ============================================================================

/// Record a finished transport rendezvous.
///
/// Metrics: `party_rendezvous_total`, `party_rendezvous_duration_seconds`
/// Labels: `outcome` (complete, timeout, cancelled)
pub fn record_rendezvous(outcome: &'static str, duration: Duration) {
    counter!("party_rendezvous_total", "outcome" => outcome).increment(1);
    histogram!("party_rendezvous_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Operations and Errors
// ============================================================================

/// Record a completed controller operation.
///
/// Metric: `party_operations_total`
/// Labels: `operation`, `status` (success, error)
pub fn record_operation(operation: &'static str, status: &'static str) {
    counter!(
        "party_operations_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// Record an operation error by kind.
///
/// Metric: `party_errors_total`
/// Labels: `operation`, `kind`
pub fn record_error(operation: &'static str, kind: &'static str) {
    counter!(
        "party_errors_total",
        "operation" => operation,
        "kind" => kind
    )
    .increment(1);
}

/// Record a provider event that was dropped because it referenced a
/// superseded party.
///
/// Metric: `party_stale_events_total`
/// Labels: `event`
pub fn record_stale_event(event: &'static str) {
    counter!("party_stale_events_total", "event" => event).increment(1);
}

// ============================================================================
// Party State (Gauges)
// ============================================================================

/// Set the member count of the current party.
///
/// Metric: `party_members`
/// Labels: none
pub fn set_party_members(count: usize) {
    // usize to f64 conversion is safe for party sizes
    #[allow(clippy::cast_precision_loss)]
    gauge!("party_members").set(count as f64);
}
