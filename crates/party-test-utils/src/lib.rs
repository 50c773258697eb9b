//! # Party Test Utilities
//!
//! Shared harness for party controller tests. Every peer runs a real
//! `PartyActor` against one in-process loopback hub, so multi-player flows
//! (kick, promote, transport start) run end to end without a provider.
//!
//! ## Modules
//!
//! - `test_ids` - fixed member identities and names
//! - `fixtures` - test configuration and session snapshots
//! - `probe` - `EventProbe`, waits on a peer's notifications with timeouts
//! - `harness` - `TestPeer`, one spawned actor per simulated player
//!
//! ## Usage
//!
//! ```rust,ignore
//! use party_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let hub = LoopbackHub::new();
//!     let mut alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
//!     let mut bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
//!
//!     bob.handle.join(alice.session_id().await?).await?;
//!     alice.probe.wait_for_notification("Bob joined the party").await;
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod probe;
pub mod test_ids;

pub use fixtures::*;
pub use harness::*;
pub use probe::*;
pub use test_ids::*;

pub use party_controller::provider::loopback::LoopbackHub;
