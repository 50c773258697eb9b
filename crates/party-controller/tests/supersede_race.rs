//! Host and join completions that land out of order.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use party_controller::provider::loopback::LoopbackPeer;
use party_controller::provider::{
    PartyServices, ProviderError, SessionFilter, SessionProvider,
};
use party_controller::session::{MemberId, Privacy, Session, SessionId};
use party_controller::PartyActor;
use party_test_utils::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SLOW_CREATE: Duration = Duration::from_millis(300);

/// Loopback provider whose creates after the first are slow.
struct SlowCreate {
    inner: LoopbackPeer,
    creates: AtomicUsize,
}

#[async_trait]
impl SessionProvider for SlowCreate {
    async fn create(&self, max_members: u32) -> Result<Session, ProviderError> {
        if self.creates.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(SLOW_CREATE).await;
        }
        self.inner.create(max_members).await
    }

    async fn join(&self, id: SessionId) -> Result<Session, ProviderError> {
        self.inner.join(id).await
    }

    async fn query(&self, filter: &SessionFilter) -> Result<Vec<Session>, ProviderError> {
        self.inner.query(filter).await
    }

    async fn leave(&self, id: SessionId) -> Result<(), ProviderError> {
        self.inner.leave(id).await
    }

    async fn get_metadata(&self, id: SessionId, key: &str) -> Result<Option<String>, ProviderError> {
        self.inner.get_metadata(id, key).await
    }

    async fn set_metadata(
        &self,
        id: SessionId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        self.inner.set_metadata(id, key, value).await
    }

    async fn set_privacy(&self, id: SessionId, privacy: Privacy) -> Result<(), ProviderError> {
        self.inner.set_privacy(id, privacy).await
    }

    async fn set_joinable(&self, id: SessionId, joinable: bool) -> Result<(), ProviderError> {
        self.inner.set_joinable(id, joinable).await
    }

    async fn transfer_ownership(
        &self,
        id: SessionId,
        member: MemberId,
    ) -> Result<(), ProviderError> {
        self.inner.transfer_ownership(id, member).await
    }

    async fn is_owned_by(&self, id: SessionId, member: MemberId) -> Result<bool, ProviderError> {
        self.inner.is_owned_by(id, member).await
    }
}

#[tokio::test]
async fn test_late_host_completion_leaves_joined_party() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let bobs_party = bob.session_id().await?;

    let (peer, events) = hub.connect(TEST_ALICE, test_name(TEST_ALICE));
    let services = PartyServices::new(
        Arc::new(SlowCreate {
            inner: peer.clone(),
            creates: AtomicUsize::new(0),
        }),
        Arc::new(peer.clone()),
        Arc::new(peer),
    );
    let config = party_controller::Config {
        local_name: test_name(TEST_ALICE),
        ..test_config()
    };
    let cancel = CancellationToken::new();
    let (alice, task) = PartyActor::spawn(config, TEST_ALICE, services, events, cancel.clone());

    let deadline = tokio::time::Instant::now() + TEST_EVENT_TIMEOUT;
    let first = loop {
        if let Ok(info) = alice.info().await {
            break info.id;
        }
        assert!(tokio::time::Instant::now() < deadline, "alice never hosted");
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    // The create is still in flight when the join lands.
    let host = tokio::spawn({
        let alice = alice.clone();
        async move { alice.host().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(alice.join(bobs_party).await?, bobs_party);
    let hosted = host.await??;

    assert_ne!(hosted, first);
    assert_eq!(alice.info().await?.id, hosted);
    assert_eq!(hub.sessions_of(TEST_ALICE), vec![hosted]);
    bob.wait_until("alice gone", |info| info.members.len() == 1)
        .await?;

    cancel.cancel();
    task.await?;
    Ok(())
}

#[tokio::test]
async fn test_sessions_of_lists_each_party_once() -> anyhow::Result<()> {
    let hub = LoopbackHub::new();
    let alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
    let bob = TestPeer::spawn_hosted(&hub, TEST_BOB, test_config()).await?;
    let party = alice.session_id().await?;

    bob.handle.join(party).await?;
    bob.wait_in_party(party).await?;

    assert_eq!(hub.sessions_of(TEST_ALICE), vec![party]);
    assert_eq!(hub.sessions_of(TEST_BOB), vec![party]);
    assert!(hub.sessions_of(TEST_CAROL).is_empty());
    Ok(())
}
