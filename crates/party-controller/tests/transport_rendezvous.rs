//! Transport start and the member rendezvous.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use party_controller::errors::PartyError;
use party_controller::provider::Transport;
use party_test_utils::*;
use std::time::Duration;

async fn alice_and_bob(hub: &LoopbackHub) -> anyhow::Result<(TestPeer, TestPeer)> {
    let mut alice = TestPeer::spawn_hosted(hub, TEST_ALICE, test_config()).await?;
    let bob = TestPeer::spawn_hosted(hub, TEST_BOB, test_config()).await?;
    bob.handle.join(alice.session_id().await?).await?;
    alice.probe.wait_for_notification("Bob joined the party").await;
    Ok((alice, bob))
}

async fn wait_running(peer: &TestPeer) {
    tokio::time::timeout(TEST_EVENT_TIMEOUT, async {
        while !peer.peer.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("transport never started");
}

#[tokio::test]
async fn test_rendezvous_completes_when_all_members_connect() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, bob) = alice_and_bob(&hub).await?;
    let party = alice.session_id().await?;

    let report = alice.handle.start_transport().await?;
    assert_eq!(report.connected, 2);
    assert_eq!(report.expected, 2);
    assert!(bob.peer.is_running());
    assert_eq!(hub.is_joinable(party), Some(false));

    alice.handle.shutdown_transport().await?;
    assert!(!alice.peer.is_running());
    assert!(!bob.peer.is_running());
    assert_eq!(hub.is_joinable(party), Some(true));
    Ok(())
}

#[tokio::test]
async fn test_start_requires_minimum_members_unless_overridden() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let mut alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config_with_min_start(2)).await?;

    let err = alice.handle.start_transport().await.unwrap_err();
    assert_eq!(
        err,
        PartyError::InvalidState("Need at least 2 players to start.".to_string())
    );
    alice
        .probe
        .wait_for_notification("Need at least 2 players to start.")
        .await;
    assert!(!alice.peer.is_running());

    alice.handle.set_start_override(true).await?;
    let report = alice.handle.start_transport().await?;
    assert_eq!((report.connected, report.expected), (1, 1));

    let err = alice.handle.start_transport().await.unwrap_err();
    assert_eq!(
        err,
        PartyError::InvalidState("Transport is already running.".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_shutdown_without_transport_is_rejected() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;

    assert_eq!(
        alice.handle.shutdown_transport().await.unwrap_err(),
        PartyError::InvalidState("Transport isn't running.".to_string())
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_rendezvous_times_out_when_start_command_is_lost() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, bob) = alice_and_bob(&hub).await?;

    hub.drop_next_messages(1);
    let err = alice.handle.start_transport().await.unwrap_err();
    assert_eq!(
        err,
        PartyError::RendezvousTimeout {
            connected: 1,
            expected: 2
        }
    );
    alice
        .probe
        .wait_for_notification("Only 1 of 2 players connected in time.")
        .await;
    assert!(!bob.peer.is_running());
    Ok(())
}

#[tokio::test]
async fn test_shutdown_cancels_pending_rendezvous() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, _bob) = alice_and_bob(&hub).await?;

    hub.drop_next_messages(1);
    let starter = alice.handle.clone();
    let pending = tokio::spawn(async move { starter.start_transport().await });
    wait_running(&alice).await;

    alice.handle.shutdown_transport().await?;
    let result = tokio::time::timeout(TEST_EVENT_TIMEOUT, pending).await??;
    assert_eq!(result.unwrap_err(), PartyError::RendezvousCancelled);
    Ok(())
}

#[tokio::test]
async fn test_member_leaving_lowers_expected_count() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, bob) = alice_and_bob(&hub).await?;

    hub.drop_next_messages(1);
    let starter = alice.handle.clone();
    let pending = tokio::spawn(async move { starter.start_transport().await });
    wait_running(&alice).await;

    bob.handle.leave(false).await?;
    let report = tokio::time::timeout(TEST_EVENT_TIMEOUT, pending).await???;
    assert_eq!((report.connected, report.expected), (1, 1));
    Ok(())
}
