//! Fixed member identities for deterministic tests.

use party_controller::session::MemberId;

pub const TEST_ALICE: MemberId = MemberId(100);
pub const TEST_BOB: MemberId = MemberId(101);
pub const TEST_CAROL: MemberId = MemberId(102);
pub const TEST_DAVE: MemberId = MemberId(103);

/// Display name used for a test identity.
#[must_use]
pub fn test_name(id: MemberId) -> String {
    match id {
        TEST_ALICE => "Alice".to_string(),
        TEST_BOB => "Bob".to_string(),
        TEST_CAROL => "Carol".to_string(),
        TEST_DAVE => "Dave".to_string(),
        other => format!("player-{other}"),
    }
}
