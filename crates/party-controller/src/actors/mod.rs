//! Actor model for the party controller.
//!
//! ```text
//! PartyHandle ──mpsc──▶ PartyActor
//!                        ├── SessionModel (current party, cached metadata)
//!                        ├── MembershipEventRouter ◀── provider events
//!                        │   └── ControlCommandChannel (pending kicks)
//!                        └── SessionLifecycleController ──▶ provider, channel, transport
//!                                └── spawned create/join ──▶ Completion
//! ```
//!
//! One actor per local player. The actor is the only writer of the model,
//! so provider callbacks and user operations never interleave.

pub mod messages;
mod party;

pub use messages::{Completion, PartyMessage, Reply};
pub use party::{PartyActor, PartyHandle};
