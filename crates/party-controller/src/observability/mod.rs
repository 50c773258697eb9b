//! Observability for the party controller.
//!
//! # Privacy by Default
//!
//! Actor handlers use `#[instrument(skip_all)]` and log only identifiers
//! (party and member ids), never chat text. Metric labels are bounded.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `party_control_commands_total` | Counter | `command`, `outcome` | Inbound control commands |
//! | `party_control_commands_sent_total` | Counter | `command` | Outbound control commands |
//! | `party_rendezvous_total` | Counter | `outcome` | Transport rendezvous results |
//! | `party_rendezvous_duration_seconds` | Histogram | `outcome` | Time until all members connected |
//! | `party_operations_total` | Counter | `operation`, `status` | Controller operations |
//! | `party_errors_total` | Counter | `operation`, `kind` | Operation errors |
//! | `party_stale_events_total` | Counter | `event` | Events for superseded parties |
//! | `party_members` | Gauge | none | Current party size |

pub mod metrics;

pub use metrics::{
    record_control_command, record_control_command_sent, record_error, record_operation,
    record_rendezvous, record_stale_event, set_party_members,
};
