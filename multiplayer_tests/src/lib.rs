// In-memory Steam stand-in for multi-peer integration tests.
//
// `SteamHub` simulates the two Steam services the adapter depends on:
// lobbies (owner, roster, join results, roster-change broadcasts) and the
// connectionless messaging layer (per-pair sessions that must be accepted
// before messages flow, per-channel inboxes). Each party gets a
// `FakeSteam` handle implementing `MembershipService` and
// `MessageTransport`, so a real `SteamPeer` runs unchanged on top of it.
//
// Steam delivers lobby and session callbacks asynchronously. The hub mirrors
// that by queueing `HubEvent`s per party; `TestPeer::pump` dispatches them
// to the adapter's handlers the way the GDExtension's signal handlers would,
// and records the resulting peer lifecycle events.
//
// Everything is single-threaded and deterministic: `Rc<RefCell<_>>` shared
// state, ordered maps, no timers.
//
// See also: `tests/lobby_sessions.rs` and `tests/packet_flow.rs`.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::rc::Rc;

use steam_peer::{
    Channel, EnterResponse, GlobalIdentity, InboundMessage, LobbyId, MemberChange,
    MembershipService, MessageTransport, PeerConfig, PeerError, PeerEvent, PeerId, SendFlags,
    SendTarget, SteamPeer, TransferMode,
};

/// Upper bound on `settle` rounds before a test is considered livelocked.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Build an individual-account Steam ID from its 32-bit account number.
pub const fn steam_id(account: u32) -> GlobalIdentity {
    GlobalIdentity(0x0110_0001_0000_0000 | account as u64)
}

/// A callback queued for one party, in delivery order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HubEvent {
    LobbyEntered(LobbyId, EnterResponse),
    MemberChanged(LobbyId, GlobalIdentity, MemberChange),
    SessionRequest(GlobalIdentity),
    SessionFailed(GlobalIdentity, String),
}

#[derive(Debug)]
struct Lobby {
    owner: GlobalIdentity,
    members: Vec<GlobalIdentity>,
    banned: BTreeSet<GlobalIdentity>,
    capacity: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Session {
    /// The remote asked; messages from it are held until accepted.
    Requested,
    Accepted,
}

#[derive(Debug, Default)]
struct Party {
    offline: bool,
    events: VecDeque<HubEvent>,
    sessions: BTreeMap<GlobalIdentity, Session>,
    held: Vec<InboundMessage>,
    inbox: BTreeMap<u32, VecDeque<InboundMessage>>,
    sent: usize,
}

#[derive(Debug, Default)]
struct Hub {
    next_lobby: u64,
    lobbies: BTreeMap<LobbyId, Lobby>,
    parties: BTreeMap<GlobalIdentity, Party>,
}

impl Hub {
    fn party(&mut self, identity: GlobalIdentity) -> &mut Party {
        self.parties.entry(identity).or_default()
    }

    fn online(&self, identity: GlobalIdentity) -> Result<(), PeerError> {
        match self.parties.get(&identity) {
            Some(party) if !party.offline => Ok(()),
            _ => Err(PeerError::Unavailable("fake Steam")),
        }
    }

    fn notify_members(&mut self, lobby: LobbyId, subject: GlobalIdentity, change: MemberChange) {
        let Some(members) = self.lobbies.get(&lobby).map(|l| l.members.clone()) else {
            return;
        };
        for member in members.into_iter().filter(|&m| m != subject) {
            self.party(member)
                .events
                .push_back(HubEvent::MemberChanged(lobby, subject, change));
        }
    }

    /// Remove `identity` from `lobby`, handing ownership to the next member
    /// and dropping the lobby once empty. Returns false if it was not in.
    fn remove_member(&mut self, lobby: LobbyId, identity: GlobalIdentity) -> bool {
        let Some(state) = self.lobbies.get_mut(&lobby) else {
            return false;
        };
        let before = state.members.len();
        state.members.retain(|&m| m != identity);
        if state.members.len() == before {
            return false;
        }
        if state.owner == identity {
            state.owner = state.members.first().copied().unwrap_or(identity);
        }
        if state.members.is_empty() {
            self.lobbies.remove(&lobby);
        }
        true
    }

    fn deliver(&mut self, to: GlobalIdentity, message: InboundMessage) {
        let party = self.party(to);
        match party.sessions.get(&message.sender) {
            Some(Session::Accepted) => party
                .inbox
                .entry(message.channel.0)
                .or_default()
                .push_back(message),
            Some(Session::Requested) => party.held.push(message),
            None => {
                party.sessions.insert(message.sender, Session::Requested);
                party
                    .events
                    .push_back(HubEvent::SessionRequest(message.sender));
                party.held.push(message);
            }
        }
    }
}

/// Shared simulated Steam backend.
#[derive(Clone, Debug, Default)]
pub struct SteamHub {
    inner: Rc<RefCell<Hub>>,
}

impl SteamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a logged-in party and return its service handle.
    pub fn add_party(&self, identity: GlobalIdentity) -> FakeSteam {
        self.inner.borrow_mut().party(identity);
        FakeSteam {
            hub: Rc::clone(&self.inner),
            me: identity,
        }
    }

    /// Create a lobby owned by (and containing) `owner`. No callbacks are
    /// queued; the owner still calls `join_lobby` to attach its adapter.
    pub fn create_lobby(&self, owner: GlobalIdentity) -> LobbyId {
        let mut hub = self.inner.borrow_mut();
        hub.next_lobby += 1;
        let lobby = LobbyId(0x0186_0000_0000_0000 | hub.next_lobby);
        hub.lobbies.insert(
            lobby,
            Lobby {
                owner,
                members: vec![owner],
                banned: BTreeSet::new(),
                capacity: 250,
            },
        );
        lobby
    }

    pub fn set_capacity(&self, lobby: LobbyId, capacity: usize) {
        if let Some(state) = self.inner.borrow_mut().lobbies.get_mut(&lobby) {
            state.capacity = capacity;
        }
    }

    pub fn owner_of(&self, lobby: LobbyId) -> Option<GlobalIdentity> {
        self.inner.borrow().lobbies.get(&lobby).map(|l| l.owner)
    }

    pub fn members_of(&self, lobby: LobbyId) -> Vec<GlobalIdentity> {
        self.inner
            .borrow()
            .lobbies
            .get(&lobby)
            .map(|l| l.members.clone())
            .unwrap_or_default()
    }

    /// Remove `target` from `lobby` with `change` as the reason. Everyone,
    /// the target included, is told about it.
    pub fn remove(&self, lobby: LobbyId, target: GlobalIdentity, change: MemberChange) {
        let mut hub = self.inner.borrow_mut();
        hub.notify_members(lobby, target, change);
        if hub.remove_member(lobby, target) {
            hub.party(target)
                .events
                .push_back(HubEvent::MemberChanged(lobby, target, change));
        }
        if let Some(state) = hub
            .lobbies
            .get_mut(&lobby)
            .filter(|_| change == MemberChange::Banned)
        {
            state.banned.insert(target);
        }
    }

    /// Make `identity`'s Steam client unreachable (or reachable again).
    pub fn set_offline(&self, identity: GlobalIdentity, offline: bool) {
        self.inner.borrow_mut().party(identity).offline = offline;
    }

    /// Place a message straight into `to`'s inbox, bypassing sessions.
    pub fn inject_message(
        &self,
        to: GlobalIdentity,
        from: GlobalIdentity,
        channel: Channel,
        data: &[u8],
    ) {
        let message = InboundMessage {
            sender: from,
            channel,
            flags: SendFlags::RELIABLE,
            data: data.to_vec(),
        };
        self.inner
            .borrow_mut()
            .party(to)
            .inbox
            .entry(channel.0)
            .or_default()
            .push_back(message);
    }

    /// Queue a session failure callback at `at` about `remote`.
    pub fn fail_session(&self, at: GlobalIdentity, remote: GlobalIdentity, reason: &str) {
        self.inner
            .borrow_mut()
            .party(at)
            .events
            .push_back(HubEvent::SessionFailed(remote, reason.to_owned()));
    }

    /// Number of messages `identity` has handed to the transport.
    pub fn sent_count(&self, identity: GlobalIdentity) -> usize {
        self.inner
            .borrow()
            .parties
            .get(&identity)
            .map_or(0, |p| p.sent)
    }

    /// Messages from `from` still waiting for `at` to accept the session.
    pub fn held_count(&self, at: GlobalIdentity, from: GlobalIdentity) -> usize {
        self.inner
            .borrow()
            .parties
            .get(&at)
            .map_or(0, |p| p.held.iter().filter(|m| m.sender == from).count())
    }
}

/// One party's view of the hub.
#[derive(Clone, Debug)]
pub struct FakeSteam {
    hub: Rc<RefCell<Hub>>,
    me: GlobalIdentity,
}

impl FakeSteam {
    pub fn identity(&self) -> GlobalIdentity {
        self.me
    }

    /// Drain this party's queued callbacks.
    pub fn take_events(&self) -> Vec<HubEvent> {
        self.hub.borrow_mut().party(self.me).events.drain(..).collect()
    }
}

impl MembershipService for FakeSteam {
    fn local_identity(&self) -> Result<GlobalIdentity, PeerError> {
        self.hub.borrow().online(self.me)?;
        Ok(self.me)
    }

    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        let mut hub = self.hub.borrow_mut();
        hub.online(self.me)?;
        let me = self.me;
        let response = match hub.lobbies.get(&lobby) {
            None => EnterResponse::DoesntExist,
            Some(state) if state.members.contains(&me) => EnterResponse::Success,
            Some(state) if state.banned.contains(&me) => EnterResponse::Banned,
            Some(state) if state.members.len() >= state.capacity => EnterResponse::Full,
            Some(_) => {
                hub.notify_members(lobby, me, MemberChange::Entered);
                if let Some(state) = hub.lobbies.get_mut(&lobby) {
                    state.members.push(me);
                }
                EnterResponse::Success
            }
        };
        hub.party(me)
            .events
            .push_back(HubEvent::LobbyEntered(lobby, response));
        Ok(())
    }

    fn lobby_members(&self, lobby: LobbyId) -> Result<Vec<GlobalIdentity>, PeerError> {
        let hub = self.hub.borrow();
        hub.online(self.me)?;
        Ok(hub
            .lobbies
            .get(&lobby)
            .map(|l| l.members.clone())
            .unwrap_or_default())
    }

    fn lobby_owner(&self, lobby: LobbyId) -> Result<Option<GlobalIdentity>, PeerError> {
        let hub = self.hub.borrow();
        hub.online(self.me)?;
        Ok(hub.lobbies.get(&lobby).map(|l| l.owner))
    }

    fn leave_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        let mut hub = self.hub.borrow_mut();
        hub.online(self.me)?;
        hub.notify_members(lobby, self.me, MemberChange::Left);
        hub.remove_member(lobby, self.me);
        Ok(())
    }
}

impl MessageTransport for FakeSteam {
    fn accept_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        let mut hub = self.hub.borrow_mut();
        hub.online(self.me)?;
        let party = hub.party(self.me);
        party.sessions.insert(remote, Session::Accepted);
        let (released, held): (Vec<_>, Vec<_>) = party
            .held
            .drain(..)
            .partition(|m| m.sender == remote);
        party.held = held;
        for message in released {
            party
                .inbox
                .entry(message.channel.0)
                .or_default()
                .push_back(message);
        }
        Ok(())
    }

    fn close_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        let mut hub = self.hub.borrow_mut();
        hub.online(self.me)?;
        let party = hub.party(self.me);
        party.sessions.remove(&remote);
        party.held.retain(|m| m.sender != remote);
        Ok(())
    }

    fn send_message(
        &mut self,
        remote: GlobalIdentity,
        data: &[u8],
        flags: SendFlags,
        channel: Channel,
    ) -> Result<bool, PeerError> {
        let mut hub = self.hub.borrow_mut();
        hub.online(self.me)?;
        if !hub.parties.contains_key(&remote) {
            return Ok(false);
        }
        // Sending opens our side of the session, so replies need no request.
        let party = hub.party(self.me);
        party.sessions.insert(remote, Session::Accepted);
        party.sent += 1;
        hub.deliver(
            remote,
            InboundMessage {
                sender: self.me,
                channel,
                flags,
                data: data.to_vec(),
            },
        );
        Ok(true)
    }

    fn receive_messages(
        &mut self,
        channel: Channel,
        max: usize,
    ) -> Result<Vec<InboundMessage>, PeerError> {
        let mut hub = self.hub.borrow_mut();
        hub.online(self.me)?;
        let Some(queue) = hub.party(self.me).inbox.get_mut(&channel.0) else {
            return Ok(Vec::new());
        };
        let take = max.min(queue.len());
        Ok(queue.drain(..take).collect())
    }
}

/// A `SteamPeer` on the hub plus the glue a game engine would provide:
/// callback dispatch and a record of emitted lifecycle events.
pub struct TestPeer {
    pub peer: SteamPeer<FakeSteam>,
    events: Vec<PeerEvent>,
}

impl TestPeer {
    pub fn new(hub: &SteamHub, identity: GlobalIdentity) -> Self {
        Self::with_config(hub, identity, PeerConfig::default())
    }

    pub fn with_config(hub: &SteamHub, identity: GlobalIdentity, config: PeerConfig) -> Self {
        Self {
            peer: SteamPeer::with_config(hub.add_party(identity), config),
            events: Vec::new(),
        }
    }

    pub fn identity(&self) -> GlobalIdentity {
        self.peer.services().identity()
    }

    pub fn join(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        self.peer.join_lobby(lobby)
    }

    /// Dispatch queued callbacks. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let pending = self.peer.services().take_events();
        let handled = pending.len();
        for event in pending {
            let emitted = match event {
                HubEvent::LobbyEntered(lobby, response) => self
                    .peer
                    .on_lobby_entered(lobby, response)
                    .expect("on_lobby_entered failed"),
                HubEvent::MemberChanged(lobby, identity, change) => self
                    .peer
                    .on_member_changed(lobby, identity, change)
                    .expect("on_member_changed failed"),
                HubEvent::SessionRequest(remote) => {
                    self.peer
                        .on_session_request(remote)
                        .expect("on_session_request failed");
                    Vec::new()
                }
                HubEvent::SessionFailed(remote, reason) => {
                    self.peer.on_session_failed(remote, &reason);
                    Vec::new()
                }
            };
            self.events.extend(emitted);
        }
        handled
    }

    /// Take the lifecycle events recorded so far.
    pub fn take_events(&mut self) -> Vec<PeerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn peer_id_of(&self, identity: GlobalIdentity) -> Option<PeerId> {
        self.peer.registry().peer_id_of(identity)
    }

    /// Reliable send on channel 0 to a raw engine-style target.
    pub fn send(&mut self, target: i32, data: &[u8]) -> Result<(), PeerError> {
        self.peer.put_packet(
            data,
            SendTarget::from_raw(target),
            Channel(0),
            TransferMode::Reliable,
        )
    }

    /// Poll the transport and read every queued packet as (sender, data).
    pub fn receive_all(&mut self) -> Vec<(PeerId, Vec<u8>)> {
        self.peer.poll().expect("poll failed");
        let mut received = Vec::new();
        while let Ok(packet) = self.peer.get_packet() {
            received.push((packet.sender, packet.data.clone()));
        }
        received
    }
}

/// Pump every peer until no callbacks remain anywhere.
pub fn settle(peers: &mut [&mut TestPeer]) {
    for _ in 0..MAX_SETTLE_ROUNDS {
        let handled: usize = peers.iter_mut().map(|p| p.pump()).sum();
        if handled == 0 {
            return;
        }
    }
    panic!("callbacks still pending after {MAX_SETTLE_ROUNDS} rounds");
}
