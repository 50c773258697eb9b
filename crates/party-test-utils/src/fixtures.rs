//! Test configuration and session snapshots.

use party_controller::config::Config;
use party_controller::session::{Member, MemberId, Session, SessionId};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Timeout applied by [`EventProbe`](crate::EventProbe) waits.
pub const TEST_EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration built through `Config::from_vars`, with a short rendezvous.
#[must_use]
pub fn test_config() -> Config {
    let vars = HashMap::from([
        ("PARTY_GAME_TAG".to_string(), "testGame".to_string()),
        ("PARTY_MAX_MEMBERS".to_string(), "4".to_string()),
        ("PARTY_RENDEZVOUS_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ("PARTY_RENDEZVOUS_POLL_INTERVAL_MS".to_string(), "10".to_string()),
    ]);
    Config::from_vars(&vars).expect("test configuration is valid")
}

/// Test configuration requiring `min` members before the transport starts.
#[must_use]
pub fn test_config_with_min_start(min: u32) -> Config {
    Config {
        min_start_members: min,
        ..test_config()
    }
}

/// Session snapshot owned by the first member; `local` marks the viewer.
#[must_use]
pub fn session_snapshot(id: u64, members: &[MemberId], local: MemberId) -> Session {
    let owner = members.first().copied().unwrap_or(local);
    Session {
        id: SessionId(id),
        owner,
        members: members
            .iter()
            .map(|m| Member::new(*m, crate::test_name(*m), *m == local))
            .collect(),
        max_members: 4,
        metadata: BTreeMap::new(),
    }
}
