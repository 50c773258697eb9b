//! Loopback provider for in-process parties.
//!
//! A [`LoopbackHub`] plays the role of the platform matchmaking service: it
//! keeps the party directory, delivers callbacks to every connected peer and
//! hosts transports so a rendezvous can be observed without a network stack.
//! Each [`LoopbackPeer`] implements [`SessionProvider`], [`MessageChannel`]
//! and [`Transport`] for one member.
//!
//! Behavior mirrors the platform: only the owner writes metadata, group
//! messages are echoed to every member including the sender, and ownership
//! passes to the oldest remaining member when the owner leaves.

use super::{
    MessageChannel, PartyServices, ProviderError, ProviderEvent, SessionFilter, SessionProvider,
    Transport,
};
use crate::session::{Member, MemberId, Privacy, Session, SessionId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// First identifier handed out for loopback parties.
const FIRST_SESSION_ID: u64 = 109_775_240_000_000_001;

#[derive(Debug)]
struct HubSession {
    id: SessionId,
    owner: MemberId,
    members: Vec<MemberId>,
    max_members: u32,
    metadata: BTreeMap<String, String>,
    privacy: Privacy,
    joinable: bool,
}

#[derive(Debug)]
struct HubPeer {
    name: String,
    events: mpsc::UnboundedSender<ProviderEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportRole {
    Host(SessionId),
    Client(SessionId),
}

#[derive(Debug)]
struct HubState {
    sessions: BTreeMap<SessionId, HubSession>,
    peers: HashMap<MemberId, HubPeer>,
    /// Connected transport members per hosted party, host included.
    transports: HashMap<SessionId, BTreeSet<MemberId>>,
    roles: HashMap<MemberId, TransportRole>,
    next_session_id: u64,
    drop_messages: usize,
    fail_next_create: bool,
    fail_next_join: bool,
}

impl Default for HubState {
    fn default() -> Self {
        Self {
            sessions: BTreeMap::new(),
            peers: HashMap::new(),
            transports: HashMap::new(),
            roles: HashMap::new(),
            next_session_id: FIRST_SESSION_ID,
            drop_messages: 0,
            fail_next_create: false,
            fail_next_join: false,
        }
    }
}

impl HubState {
    fn member_of(&self, id: MemberId, viewer: Option<MemberId>) -> Member {
        let name = self
            .peers
            .get(&id)
            .map_or_else(|| id.to_string(), |p| p.name.clone());
        Member::new(id, name, viewer == Some(id))
    }

    fn snapshot(&self, session: &HubSession, viewer: Option<MemberId>) -> Session {
        Session {
            id: session.id,
            owner: session.owner,
            members: session
                .members
                .iter()
                .map(|id| self.member_of(*id, viewer))
                .collect(),
            max_members: session.max_members,
            metadata: session.metadata.clone(),
        }
    }

    fn emit(&self, to: MemberId, event: ProviderEvent) {
        if let Some(peer) = self.peers.get(&to) {
            if peer.events.send(event).is_err() {
                debug!(target: "party.loopback", member = %to, "Peer event stream closed");
            }
        }
    }

    /// Emit an event built from each member's own view of the party.
    fn emit_to_members<F>(&self, id: SessionId, except: Option<MemberId>, build: F)
    where
        F: Fn(Session) -> ProviderEvent,
    {
        if let Some(session) = self.sessions.get(&id) {
            for member in &session.members {
                if Some(*member) != except {
                    self.emit(*member, build(self.snapshot(session, Some(*member))));
                }
            }
        }
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut HubSession, ProviderError> {
        self.sessions.get_mut(&id).ok_or(ProviderError::NotFound(id))
    }

    fn require_owner(&self, id: SessionId, member: MemberId) -> Result<(), ProviderError> {
        let session = self.sessions.get(&id).ok_or(ProviderError::NotFound(id))?;
        if session.owner == member {
            Ok(())
        } else {
            Err(ProviderError::Rejected(format!(
                "member {member} does not own party {id}"
            )))
        }
    }

    /// Remove a member, hand ownership over and notify the rest.
    fn remove_member(&mut self, id: SessionId, member: MemberId, disconnected: bool) {
        let departing = self.member_of(member, None);
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        session.members.retain(|m| *m != member);
        if session.owner == member {
            if let Some(next) = session.members.first() {
                session.owner = *next;
            }
        }
        if session.members.is_empty() {
            self.sessions.remove(&id);
            debug!(target: "party.loopback", session_id = %id, "Party closed");
            return;
        }

        if disconnected {
            self.emit_to_members(id, None, |session| ProviderEvent::MemberDisconnected {
                session,
                member: departing.clone(),
            });
        }
        self.emit_to_members(id, None, |session| ProviderEvent::MemberLeft {
            session,
            member: departing.clone(),
        });
    }
}

/// In-process matchmaking service shared by every loopback peer.
#[derive(Debug, Clone, Default)]
pub struct LoopbackHub {
    state: Arc<Mutex<HubState>>,
}

impl LoopbackHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a member and return its provider plus its callback stream.
    pub fn connect(
        &self,
        id: MemberId,
        name: impl Into<String>,
    ) -> (LoopbackPeer, mpsc::UnboundedReceiver<ProviderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().peers.insert(
            id,
            HubPeer {
                name: name.into(),
                events: tx,
            },
        );
        (
            LoopbackPeer {
                id,
                hub: self.clone(),
            },
            rx,
        )
    }

    /// Deliver an invite from `from` to `to` for a party.
    pub fn invite(&self, from: MemberId, to: MemberId, id: SessionId) -> Result<(), ProviderError> {
        let state = self.lock();
        let session = state.sessions.get(&id).ok_or(ProviderError::NotFound(id))?;
        let event = ProviderEvent::Invited {
            from: state.member_of(from, Some(to)),
            session: state.snapshot(session, Some(to)),
        };
        state.emit(to, event);
        Ok(())
    }

    /// Simulate the platform "join friend" request for `member`.
    pub fn request_join(&self, member: MemberId, id: SessionId) {
        self.lock()
            .emit(member, ProviderEvent::JoinRequested { session: id });
    }

    /// Drop a member from its party as a connection loss.
    pub fn disconnect(&self, member: MemberId) {
        let mut state = self.lock();
        let ids: Vec<SessionId> = state
            .sessions
            .values()
            .filter(|s| s.members.contains(&member))
            .map(|s| s.id)
            .collect();
        for id in ids {
            state.remove_member(id, member, true);
        }
    }

    /// Silently lose the next `count` group messages.
    pub fn drop_next_messages(&self, count: usize) {
        self.lock().drop_messages = count;
    }

    /// Make the next `create` call fail.
    pub fn fail_next_create(&self) {
        self.lock().fail_next_create = true;
    }

    /// Make the next `join` call fail.
    pub fn fail_next_join(&self) {
        self.lock().fail_next_join = true;
    }

    /// Observer view of a party (no member is local).
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<Session> {
        let state = self.lock();
        state.sessions.get(&id).map(|s| state.snapshot(s, None))
    }

    /// Party a member currently belongs to.
    #[must_use]
    pub fn session_of(&self, member: MemberId) -> Option<SessionId> {
        self.lock()
            .sessions
            .values()
            .find(|s| s.members.contains(&member))
            .map(|s| s.id)
    }

    /// Every party listing a member, in id order.
    #[must_use]
    pub fn sessions_of(&self, member: MemberId) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .lock()
            .sessions
            .values()
            .filter(|s| s.members.contains(&member))
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Provider-level visibility of a party.
    #[must_use]
    pub fn privacy_of(&self, id: SessionId) -> Option<Privacy> {
        self.lock().sessions.get(&id).map(|s| s.privacy)
    }

    /// Provider-level joinability of a party.
    #[must_use]
    pub fn is_joinable(&self, id: SessionId) -> Option<bool> {
        self.lock().sessions.get(&id).map(|s| s.joinable)
    }
}

/// One member's view of the loopback hub.
#[derive(Debug, Clone)]
pub struct LoopbackPeer {
    id: MemberId,
    hub: LoopbackHub,
}

impl LoopbackPeer {
    #[must_use]
    pub fn id(&self) -> MemberId {
        self.id
    }

    #[must_use]
    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }

    /// Wire this peer as provider, channel and transport of a party actor.
    #[must_use]
    pub fn services(&self) -> PartyServices {
        PartyServices::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }
}

#[async_trait]
impl SessionProvider for LoopbackPeer {
    async fn create(&self, max_members: u32) -> Result<Session, ProviderError> {
        let mut state = self.hub.lock();
        if std::mem::take(&mut state.fail_next_create) {
            return Err(ProviderError::Unavailable("party creation failed".to_string()));
        }

        let id = SessionId(state.next_session_id);
        state.next_session_id += 1;
        state.sessions.insert(
            id,
            HubSession {
                id,
                owner: self.id,
                members: vec![self.id],
                max_members,
                metadata: BTreeMap::new(),
                privacy: Privacy::FriendsOnly,
                joinable: true,
            },
        );

        let snapshot = state
            .sessions
            .get(&id)
            .map(|s| state.snapshot(s, Some(self.id)))
            .ok_or(ProviderError::NotFound(id))?;
        state.emit(self.id, ProviderEvent::Entered(snapshot.clone()));
        debug!(target: "party.loopback", session_id = %id, owner = %self.id, "Party created");
        Ok(snapshot)
    }

    async fn join(&self, id: SessionId) -> Result<Session, ProviderError> {
        let mut state = self.hub.lock();
        if std::mem::take(&mut state.fail_next_join) {
            return Err(ProviderError::Unavailable("party join failed".to_string()));
        }

        let member = self.id;
        let session = state.session_mut(id)?;
        if session.members.contains(&member) {
            return Err(ProviderError::Rejected("already a member".to_string()));
        }
        if !session.joinable {
            return Err(ProviderError::Rejected("party is not joinable".to_string()));
        }
        if session.members.len() >= session.max_members as usize {
            return Err(ProviderError::Rejected("party is full".to_string()));
        }
        session.members.push(member);

        let joined = state.member_of(member, None);
        state.emit_to_members(id, Some(member), |session| ProviderEvent::MemberJoined {
            session,
            member: joined.clone(),
        });
        let snapshot = state
            .sessions
            .get(&id)
            .map(|s| state.snapshot(s, Some(member)))
            .ok_or(ProviderError::NotFound(id))?;
        state.emit(member, ProviderEvent::Entered(snapshot.clone()));
        Ok(snapshot)
    }

    async fn query(&self, filter: &SessionFilter) -> Result<Vec<Session>, ProviderError> {
        let state = self.hub.lock();
        Ok(state
            .sessions
            .values()
            .filter(|s| s.privacy == Privacy::Public && s.joinable)
            .map(|s| state.snapshot(s, Some(self.id)))
            .filter(|s| filter.matches(s))
            .collect())
    }

    async fn leave(&self, id: SessionId) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        let session = state.sessions.get(&id).ok_or(ProviderError::NotFound(id))?;
        if !session.members.contains(&self.id) {
            return Err(ProviderError::Rejected("not a member".to_string()));
        }
        state.remove_member(id, self.id, false);
        Ok(())
    }

    async fn get_metadata(&self, id: SessionId, key: &str) -> Result<Option<String>, ProviderError> {
        let state = self.hub.lock();
        let session = state.sessions.get(&id).ok_or(ProviderError::NotFound(id))?;
        Ok(session.metadata.get(key).cloned())
    }

    async fn set_metadata(
        &self,
        id: SessionId,
        key: &str,
        value: &str,
    ) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        state.require_owner(id, self.id)?;
        state
            .session_mut(id)?
            .metadata
            .insert(key.to_string(), value.to_string());
        state.emit_to_members(id, None, ProviderEvent::MetadataChanged);
        Ok(())
    }

    async fn set_privacy(&self, id: SessionId, privacy: Privacy) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        state.require_owner(id, self.id)?;
        state.session_mut(id)?.privacy = privacy;
        Ok(())
    }

    async fn set_joinable(&self, id: SessionId, joinable: bool) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        state.require_owner(id, self.id)?;
        state.session_mut(id)?.joinable = joinable;
        Ok(())
    }

    async fn transfer_ownership(
        &self,
        id: SessionId,
        member: MemberId,
    ) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        state.require_owner(id, self.id)?;
        let session = state.session_mut(id)?;
        if !session.members.contains(&member) {
            return Err(ProviderError::Rejected(format!(
                "member {member} is not in party {id}"
            )));
        }
        session.owner = member;
        state.emit_to_members(id, None, ProviderEvent::MetadataChanged);
        Ok(())
    }

    async fn is_owned_by(&self, id: SessionId, member: MemberId) -> Result<bool, ProviderError> {
        let state = self.hub.lock();
        let session = state.sessions.get(&id).ok_or(ProviderError::NotFound(id))?;
        Ok(session.owner == member)
    }
}

#[async_trait]
impl MessageChannel for LoopbackPeer {
    async fn send(&self, id: SessionId, text: &str) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        let session = state.sessions.get(&id).ok_or(ProviderError::NotFound(id))?;
        if !session.members.contains(&self.id) {
            return Err(ProviderError::Rejected("not a member".to_string()));
        }
        let sender_is_owner = session.owner == self.id;

        if state.drop_messages > 0 {
            state.drop_messages -= 1;
            warn!(target: "party.loopback", session_id = %id, "Dropping group message");
            return Ok(());
        }

        let sender = state.member_of(self.id, None);
        state.emit_to_members(id, None, |session| {
            let mut sender = sender.clone();
            sender.is_local = session.local_member().map(|m| m.id) == Some(sender.id);
            ProviderEvent::ChatMessage {
                session,
                sender,
                text: text.to_string(),
                sender_is_owner,
            }
        });
        Ok(())
    }
}

impl Transport for LoopbackPeer {
    fn start_host(&self, session: &Session) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        if state.roles.contains_key(&self.id) {
            return Err(ProviderError::Rejected("transport already running".to_string()));
        }
        state
            .transports
            .insert(session.id, BTreeSet::from([self.id]));
        state.roles.insert(self.id, TransportRole::Host(session.id));
        Ok(())
    }

    fn start_client(&self, session: &Session) -> Result<(), ProviderError> {
        let mut state = self.hub.lock();
        if state.roles.contains_key(&self.id) {
            return Err(ProviderError::Rejected("transport already running".to_string()));
        }
        let clients = state
            .transports
            .get_mut(&session.id)
            .ok_or_else(|| ProviderError::Rejected("no transport host for party".to_string()))?;
        clients.insert(self.id);
        state.roles.insert(self.id, TransportRole::Client(session.id));
        Ok(())
    }

    fn shutdown(&self) {
        let mut state = self.hub.lock();
        match state.roles.remove(&self.id) {
            Some(TransportRole::Host(id)) => {
                if let Some(clients) = state.transports.remove(&id) {
                    for client in clients {
                        state.roles.remove(&client);
                    }
                }
            }
            Some(TransportRole::Client(id)) => {
                if let Some(clients) = state.transports.get_mut(&id) {
                    clients.remove(&self.id);
                }
            }
            None => {}
        }
    }

    fn is_running(&self) -> bool {
        self.hub.lock().roles.contains_key(&self.id)
    }

    fn connected_client_count(&self) -> usize {
        let state = self.hub.lock();
        match state.roles.get(&self.id) {
            Some(TransportRole::Host(id) | TransportRole::Client(id)) => {
                state.transports.get(id).map_or(0, BTreeSet::len)
            }
            None => 0,
        }
    }
}
