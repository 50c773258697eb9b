//! Party Controller Library
//!
//! Control plane for peer-hosted multiplayer parties: a small group of
//! players gathers in a provider-managed party, exactly one of them owns
//! it, and the owner eventually starts a game transport that every other
//! member connects to.
//!
//! # Architecture
//!
//! - [`actors`] - `PartyActor` serializes provider callbacks and user operations
//! - [`router`] - provider events to model updates and notifications
//! - [`command`] - `[SERVERCOMMAND]` control commands over the group channel
//! - [`lifecycle`] - host, join, leave and the owner-only operations
//! - [`rendezvous`] - waits for every member to reach the transport
//! - [`provider`] - seams to the party service, message channel and transport
//! - [`notify`] - notification fan-out to UI subscribers
//!
//! # Authority
//!
//! Ownership is decided by the provider. Receivers trust the
//! channel-supplied owner attribute on each message, never the payload.

pub mod actors;
pub mod command;
pub mod config;
pub mod console;
pub mod errors;
pub mod lifecycle;
pub mod notify;
pub mod observability;
pub mod provider;
pub mod rendezvous;
pub mod router;
pub mod session;

pub use actors::{PartyActor, PartyHandle};
pub use config::Config;
pub use errors::PartyError;
