//! One spawned party actor per simulated player.

use crate::fixtures::TEST_EVENT_TIMEOUT;
use crate::probe::EventProbe;
use crate::test_ids::test_name;
use party_controller::config::Config;
use party_controller::provider::loopback::{LoopbackHub, LoopbackPeer};
use party_controller::session::{MemberId, PartyInfo, SessionId};
use party_controller::{PartyActor, PartyHandle};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// A simulated player: loopback peer, running actor and event probe.
///
/// # Example
/// ```rust,ignore
/// let hub = LoopbackHub::new();
/// let mut alice = TestPeer::spawn_hosted(&hub, TEST_ALICE, test_config()).await?;
/// let id = alice.session_id().await?;
/// ```
pub struct TestPeer {
    pub id: MemberId,
    pub name: String,
    pub handle: PartyHandle,
    pub probe: EventProbe,
    pub peer: LoopbackPeer,
    task: Option<JoinHandle<()>>,
}

impl TestPeer {
    /// Connect to the hub and spawn the actor. The probe subscribes before
    /// the actor has processed anything.
    #[must_use]
    pub fn spawn(hub: &LoopbackHub, id: MemberId, config: Config) -> Self {
        let name = test_name(id);
        let (peer, events) = hub.connect(id, name.clone());
        let config = Config {
            local_name: name.clone(),
            ..config
        };
        let (handle, task) =
            PartyActor::spawn(config, id, peer.services(), events, CancellationToken::new());
        let probe = EventProbe::new(handle.subscribe());

        Self {
            id,
            name,
            handle,
            probe,
            peer,
            task: Some(task),
        }
    }

    /// Spawn and wait until the initial party exists with its defaults written.
    pub async fn spawn_hosted(
        hub: &LoopbackHub,
        id: MemberId,
        config: Config,
    ) -> Result<Self, anyhow::Error> {
        let peer = Self::spawn(hub, id, config);
        let session = peer
            .wait_until("initial party", |info| {
                info.owner.as_ref().map(|o| o.id) == Some(id)
            })
            .await?
            .id;
        // Defaults are visible to discovery once the game tag is written.
        let deadline = tokio::time::Instant::now() + TEST_EVENT_TIMEOUT;
        while hub
            .session(session)
            .and_then(|s| s.game_tag().map(str::to_string))
            .is_none()
        {
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("party {session} never received its metadata");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(peer)
    }

    /// Poll `info()` until `predicate` holds.
    pub async fn wait_until<F>(&self, description: &str, mut predicate: F) -> Result<PartyInfo, anyhow::Error>
    where
        F: FnMut(&PartyInfo) -> bool,
    {
        let deadline = tokio::time::Instant::now() + TEST_EVENT_TIMEOUT;
        loop {
            if let Ok(info) = self.handle.info().await {
                if predicate(&info) {
                    return Ok(info);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("{} timed out waiting for {description}", self.name);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Current party id.
    pub async fn session_id(&self) -> Result<SessionId, anyhow::Error> {
        Ok(self.handle.info().await?.id)
    }

    /// Wait until this peer is in party `id`.
    pub async fn wait_in_party(&self, id: SessionId) -> Result<PartyInfo, anyhow::Error> {
        self.wait_until(&format!("party {id}"), |info| info.id == id)
            .await
    }

    /// Cancel the actor and wait for it to stop.
    pub async fn shutdown(mut self) -> Result<(), anyhow::Error> {
        self.handle.cancel();
        if let Some(task) = self.task.take() {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for TestPeer {
    fn drop(&mut self) {
        self.handle.cancel();
    }
}
