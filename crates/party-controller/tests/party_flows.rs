//! Multi-player membership flows over the loopback hub.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use party_controller::errors::PartyError;
use party_controller::notify::PartyEvent;
use party_test_utils::*;
use std::time::Duration;

const QUIET: Duration = Duration::from_millis(200);

/// Alice hosts, Bob joins her party.
async fn alice_and_bob(hub: &LoopbackHub) -> anyhow::Result<(TestPeer, TestPeer)> {
    let mut alice = TestPeer::spawn_hosted(hub, TEST_ALICE, test_config()).await?;
    let bob = TestPeer::spawn_hosted(hub, TEST_BOB, test_config()).await?;

    let party = alice.session_id().await?;
    assert_eq!(bob.handle.join(party).await?, party);
    alice.probe.wait_for_notification("Bob joined the party").await;
    Ok((alice, bob))
}

#[tokio::test]
async fn test_join_leaves_superseded_party() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let mut bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let bobs_own = bob.session_id().await?;
    let party = alice.session_id().await?;

    bob.handle.join(party).await?;
    bob.probe.wait_for_notification("Entered Alice's party").await;

    let info = bob.wait_in_party(party).await?;
    assert_eq!(info.members.len(), 2);
    assert_eq!(info.owner.map(|o| o.id), Some(TEST_ALICE));
    assert!(hub.session(bobs_own).is_none());
    assert_eq!(hub.session_count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_kicked_member_rehosts_and_owner_sees_attribution() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, mut bob) = alice_and_bob(&hub).await?;
    let party = alice.session_id().await?;

    alice.handle.kick(TEST_BOB).await?;

    bob.probe
        .wait_for_notification("You were kicked from the party by the party owner.")
        .await;
    alice
        .probe
        .wait_for_notification("Bob was kicked from the party")
        .await;

    let rehosted = bob
        .wait_until("a new party", |info| info.id != party)
        .await?;
    assert_eq!(rehosted.owner.map(|o| o.id), Some(TEST_BOB));
    assert_eq!(rehosted.members.len(), 1);

    let remaining = alice.handle.info().await?;
    assert_eq!(remaining.members.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_owner_kick_command_naming_self_leaves_as_kicked() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, mut bob) = alice_and_bob(&hub).await?;
    let party = alice.session_id().await?;

    alice
        .handle
        .send_command("kick", vec![TEST_ALICE.to_string()])
        .await?;

    alice
        .probe
        .wait_for_notification("You were kicked from the party by the party owner.")
        .await;
    bob.probe
        .wait_for_notification("Alice was kicked from the party")
        .await;

    let rehosted = alice
        .wait_until("a new party", |info| info.id != party)
        .await?;
    assert_eq!(rehosted.owner.map(|o| o.id), Some(TEST_ALICE));
    assert_eq!(rehosted.members.len(), 1);

    let remaining = bob.wait_in_party(party).await?;
    assert_eq!(remaining.members.len(), 1);
    assert_eq!(hub.sessions_of(TEST_ALICE), vec![rehosted.id]);
    Ok(())
}

#[tokio::test]
async fn test_voluntary_leave_is_not_attributed_to_kick() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, mut bob) = alice_and_bob(&hub).await?;

    bob.handle.leave(false).await?;
    bob.probe.wait_for_notification("You left the party").await;
    alice.probe.wait_for_notification("Bob left the party").await;
    Ok(())
}

#[tokio::test]
async fn test_owner_leaving_hands_party_to_remaining_member() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, mut bob) = alice_and_bob(&hub).await?;
    let party = alice.session_id().await?;

    alice.handle.leave(false).await?;
    bob.probe.wait_for_notification("Alice left the party").await;

    let info = bob
        .wait_until("ownership", |info| {
            info.owner.as_ref().map(|o| o.id) == Some(TEST_BOB)
        })
        .await?;
    assert_eq!(info.id, party);
    // The new owner can use owner operations right away.
    bob.handle.toggle_privacy(None).await?;
    Ok(())
}

#[tokio::test]
async fn test_promote_transfers_ownership() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, mut bob) = alice_and_bob(&hub).await?;

    alice.handle.promote(TEST_BOB).await?;
    bob.probe
        .wait_for_notification("Bob has been promoted to party leader!")
        .await;
    alice
        .probe
        .wait_for_notification("Bob has been promoted to party leader!")
        .await;

    let err = alice.handle.kick(TEST_BOB).await.unwrap_err();
    assert_eq!(
        err,
        PartyError::AuthorizationDenied("Only party owners can kick players.".to_string())
    );
    alice
        .probe
        .wait_for_notification("Only party owners can kick players.")
        .await;
    Ok(())
}

#[tokio::test]
async fn test_non_owner_operations_are_rejected_locally() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, bob) = alice_and_bob(&hub).await?;
    let party = alice.session_id().await?;
    let privacy_before = hub.privacy_of(party);

    assert!(matches!(
        bob.handle.kick(TEST_ALICE).await,
        Err(PartyError::AuthorizationDenied(_))
    ));
    assert!(matches!(
        bob.handle.promote(TEST_ALICE).await,
        Err(PartyError::AuthorizationDenied(_))
    ));
    assert!(matches!(
        bob.handle.toggle_privacy(None).await,
        Err(PartyError::AuthorizationDenied(_))
    ));
    assert!(matches!(
        bob.handle.toggle_joinable(None).await,
        Err(PartyError::AuthorizationDenied(_))
    ));
    assert!(matches!(
        bob.handle.start_transport().await,
        Err(PartyError::AuthorizationDenied(_))
    ));

    assert_eq!(hub.privacy_of(party), privacy_before);
    assert_eq!(alice.handle.info().await?.members.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_forged_kick_from_non_owner_is_ignored() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, bob) = alice_and_bob(&hub).await?;
    let party = alice.session_id().await?;

    // Payload names the owner; the channel marks the sender as non-owner.
    bob.handle
        .send_command("kick", vec![TEST_ALICE.to_string()])
        .await?;

    alice
        .probe
        .assert_no_notification("You were kicked from the party by the party owner.", QUIET)
        .await;
    assert_eq!(alice.handle.info().await?.id, party);
    assert_eq!(alice.handle.info().await?.members.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_solo_leave_requires_override() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let mut alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let party = alice.session_id().await?;

    let err = alice.handle.leave(false).await.unwrap_err();
    assert_eq!(err.user_message(), "Can't leave a party when you're the only member left.");
    assert_eq!(alice.handle.info().await?.id, party);

    alice.handle.leave(true).await?;
    alice.probe.wait_for_notification("You left the party").await;
    let info = alice.wait_until("re-hosted party", |info| info.id != party).await?;
    assert_eq!(info.members.len(), 1);
    assert!(hub.session(party).is_none());
    Ok(())
}

#[tokio::test]
async fn test_join_random_excludes_current_party() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let carol = TestPeer::spawn_hosted(&hub, TEST_CAROL, test_config()).await?;
    let bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let own = bob.session_id().await?;
    let candidates = [alice.session_id().await?, carol.session_id().await?];

    let joined = bob.handle.join_random().await?;
    assert_ne!(joined, own);
    assert!(candidates.contains(&joined));
    Ok(())
}

#[tokio::test]
async fn test_join_random_without_other_parties() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let mut alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;

    let err = alice.handle.join_random().await.unwrap_err();
    assert!(matches!(err, PartyError::NotFound(_)));
    alice
        .probe
        .wait_for_notification("There are currently no joinable public parties. Try again later.")
        .await;
    Ok(())
}

#[tokio::test]
async fn test_join_unlisted_party_is_not_found() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let party = alice.session_id().await?;

    alice
        .handle
        .toggle_privacy(Some(party_controller::session::Privacy::Private))
        .await?;
    let err = bob.handle.join(party).await.unwrap_err();
    assert_eq!(
        err,
        PartyError::NotFound("No joinable party with that ID was found!".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_join_own_party_is_rejected() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let party = alice.session_id().await?;

    let err = alice.handle.join(party).await.unwrap_err();
    assert_eq!(
        err,
        PartyError::InvalidState("You're already in this party.".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_join_surfaces_join_failed() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let own = bob.session_id().await?;

    hub.fail_next_join();
    let err = bob.handle.join(alice.session_id().await?).await.unwrap_err();
    assert!(matches!(err, PartyError::JoinFailed(_)));
    assert_eq!(bob.handle.info().await?.id, own);
    Ok(())
}

#[tokio::test]
async fn test_failed_create_is_reported_and_not_retried() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    hub.fail_next_create();
    let mut alice = TestPeer::spawn(&hub, TEST_ALICE, test_config());

    alice
        .probe
        .wait_for_notification("The party service didn't respond. Please try again.")
        .await;
    assert_eq!(hub.session_count(), 0);
    assert!(alice.handle.info().await.is_err());

    let party = alice.handle.host().await?;
    assert!(hub.session(party).is_some());
    Ok(())
}

#[tokio::test]
async fn test_explicit_host_supersedes_current_party() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let old = alice.session_id().await?;

    let new = alice.handle.host().await?;
    assert_ne!(new, old);
    alice.wait_in_party(new).await?;
    assert!(hub.session(old).is_none());
    Ok(())
}

#[tokio::test]
async fn test_invite_and_join_request() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let mut bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let party = alice.session_id().await?;

    hub.invite(TEST_ALICE, TEST_BOB, party)?;
    let event = bob
        .probe
        .wait_for_notification("Alice invited you to their party.")
        .await;
    match event {
        PartyEvent::Notification { invite, duration, .. } => {
            assert_eq!(invite.map(|s| s.id), Some(party));
            assert_eq!(duration, Duration::from_secs(6));
        }
        other => panic!("unexpected event {other:?}"),
    }

    hub.request_join(TEST_BOB, party);
    bob.wait_in_party(party).await?;

    hub.request_join(TEST_BOB, party);
    bob.probe
        .wait_for_notification("You're already in this party.")
        .await;
    Ok(())
}

#[tokio::test]
async fn test_chat_and_custom_commands() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, mut bob) = alice_and_bob(&hub).await?;

    alice.handle.send_chat("  good luck  ").await?;
    let event = bob
        .probe
        .wait_for("chat message", |e| {
            matches!(e, PartyEvent::ChatMessageReceived { .. })
        })
        .await;
    match event {
        PartyEvent::ChatMessageReceived { sender, text } => {
            assert_eq!(sender.id, TEST_ALICE);
            assert!(!sender.is_local);
            assert_eq!(text, "good luck");
        }
        other => panic!("unexpected event {other:?}"),
    }

    alice
        .handle
        .send_command("setMap", vec!["arena".to_string()])
        .await?;
    let event = bob
        .probe
        .wait_for("custom command", |e| {
            matches!(e, PartyEvent::UnknownCommand { .. })
        })
        .await;
    assert_eq!(
        event,
        PartyEvent::UnknownCommand {
            name: "setMap".to_string(),
            args: vec!["arena".to_string()],
            from_owner: true,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_disconnect_notifies_remaining_members() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (mut alice, _bob) = alice_and_bob(&hub).await?;

    hub.disconnect(TEST_BOB);
    alice
        .probe
        .wait_for_notification("Bob disconnected from the party")
        .await;
    alice
        .wait_until("member removal", |info| info.members.len() == 1)
        .await?;
    Ok(())
}

/// Command delivery is best effort. A lost `ownerChanged` loses its
/// notification, while the ownership itself still converges through
/// the provider's metadata event.
#[tokio::test]
async fn test_lost_command_loses_only_message_effects() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let (alice, mut bob) = alice_and_bob(&hub).await?;

    hub.drop_next_messages(1);
    alice.handle.promote(TEST_BOB).await?;

    bob.probe
        .assert_no_notification("Bob has been promoted to party leader!", QUIET)
        .await;
    let info = bob
        .wait_until("ownership", |info| {
            info.owner.as_ref().map(|o| o.id) == Some(TEST_BOB)
        })
        .await?;
    assert_eq!(info.members.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_console_commands_drive_the_actor() -> anyhow::Result<()> {
    use party_controller::console::ConsoleCommand;

    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let party = alice.session_id().await?;

    let json = ConsoleCommand::parse("info json")?
        .expect("command")
        .execute(&alice.handle)
        .await?;
    let value: serde_json::Value = serde_json::from_str(&json)?;
    assert_eq!(value.get("id"), Some(&serde_json::json!(party.0)));
    assert_eq!(
        value
            .get("members")
            .and_then(serde_json::Value::as_array)
            .map(Vec::len),
        Some(1)
    );

    let output = ConsoleCommand::parse("privacy 1")?
        .expect("command")
        .execute(&alice.handle)
        .await?;
    assert!(output.starts_with("privacy set to"));
    Ok(())
}
