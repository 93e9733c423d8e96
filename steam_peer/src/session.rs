// Session event translator.
//
// Turns lobby and messaging notifications into registry updates, connection
// status transitions and outward `PeerEvent`s. The lobby service does not
// order its callbacks relative to our own synchronous calls, so every
// handler is idempotent and order-tolerant:
// - The local identity is registered when the join is requested, then seen
//   again in the roster and possibly in an `Entered` change. Registration is
//   a no-op after the first time, and only a new registration notifies.
// - Roster enumeration on join success may overlap with `Entered` changes
//   that already arrived while the join was pending.
// - Departures of identities we never mapped (or already forgot through a
//   forced disconnect) are ignored.
// - Events for a lobby other than the current one, or arriving while
//   disconnected, are stale and dropped.
//
// The local identity never produces a notification. Its own departure
// (kick, ban, dropped connection) is an involuntary removal: all peer state
// is forgotten and the status returns to `Disconnected`.
//
// Messaging sessions are not membership: accepting one does not map a peer
// id, and a failed one is only logged. The lobby roster is the sole
// authority for id assignment.

use tracing::{debug, info, warn};

use crate::error::PeerError;
use crate::peer::SteamPeer;
use crate::service::{EnterResponse, MemberChange, MembershipService, MessageTransport};
use crate::status::{ConnectionStatus, StatusEvent};
use crate::types::{GlobalIdentity, LobbyId, PeerEvent};

impl<S> SteamPeer<S>
where
    S: MembershipService + MessageTransport,
{
    /// Request to join `lobby`. Legal only while disconnected.
    ///
    /// The local identity is mapped right away so `unique_id` works before
    /// the join is confirmed.
    pub fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        if self.status.next(StatusEvent::JoinRequested).is_none() {
            return Err(PeerError::InvalidState(self.status));
        }
        let local = self.services.local_identity()?;
        let owner = self.services.lobby_owner(lobby)?;
        self.services.join_lobby(lobby)?;

        self.transition(StatusEvent::JoinRequested)?;
        self.lobby = Some(lobby);
        self.local = Some(local);
        info!(%lobby, %local, "joining lobby");
        self.add_member(local, owner);
        Ok(())
    }

    /// Join result from the lobby service.
    ///
    /// Only a result for the lobby being joined counts; a late result for an
    /// earlier, abandoned join is dropped. On success every roster member
    /// not yet mapped is registered. On failure the status returns to
    /// `Disconnected` and the local pre-registration is removed.
    pub fn on_lobby_entered(
        &mut self,
        lobby: LobbyId,
        response: EnterResponse,
    ) -> Result<Vec<PeerEvent>, PeerError> {
        if self.status != ConnectionStatus::Connecting {
            debug!(%lobby, ?response, "ignoring join result with no join pending");
            return Ok(Vec::new());
        }
        if let Some(pending) = self.lobby.filter(|&pending| pending != lobby) {
            debug!(%lobby, %pending, ?response, "ignoring join result for another lobby");
            return Ok(Vec::new());
        }

        if !response.is_success() {
            warn!(%lobby, reason = %response, "failed to join lobby");
            self.transition(StatusEvent::JoinFailed)?;
            self.lobby = None;
            return Ok(self.forget_all());
        }

        let owner = self.services.lobby_owner(lobby)?;
        let members = self.services.lobby_members(lobby)?;

        self.transition(StatusEvent::JoinSucceeded)?;
        self.lobby = Some(lobby);
        info!(%lobby, members = members.len(), "joined lobby");

        // The local entry was registered before ownership was confirmed.
        if let Some(local) = self.local {
            let local_is_owner = owner == Some(local);
            let mapped_as_owner = self.registry.peer_id_of(local).map(|p| p.is_authority());
            if mapped_as_owner.is_some_and(|a| a != local_is_owner) {
                self.registry.unregister(local);
            }
            self.add_member(local, owner);
        }

        Ok(members
            .into_iter()
            .filter_map(|member| self.add_member(member, owner))
            .collect())
    }

    /// Lobby roster change. All departure kinds are treated alike.
    pub fn on_member_changed(
        &mut self,
        lobby: LobbyId,
        identity: GlobalIdentity,
        change: MemberChange,
    ) -> Result<Vec<PeerEvent>, PeerError> {
        if self.status == ConnectionStatus::Disconnected || self.lobby != Some(lobby) {
            debug!(%lobby, %identity, ?change, "ignoring change for a lobby we are not in");
            return Ok(Vec::new());
        }

        if !change.is_departure() {
            let owner = self.services.lobby_owner(lobby)?;
            return Ok(self.add_member(identity, owner).into_iter().collect());
        }

        if Some(identity) == self.local {
            warn!(%lobby, ?change, "removed from lobby");
            self.transition(StatusEvent::Removed)?;
            self.lobby = None;
            return Ok(self.forget_all());
        }

        match self.registry.unregister(identity) {
            Some(peer_id) => {
                self.packets.discard_from(peer_id);
                debug!(%identity, %peer_id, ?change, "lobby member departed");
                Ok(vec![PeerEvent::Disconnected(peer_id)])
            }
            None => {
                debug!(%identity, ?change, "departure of an unmapped identity");
                Ok(Vec::new())
            }
        }
    }

    /// A remote party wants to open a messaging session with us.
    pub fn on_session_request(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        if self.refuse_new_connections {
            debug!(%remote, "refusing messaging session");
            return Ok(());
        }
        debug!(%remote, "accepting messaging session");
        self.services.accept_session(remote)
    }

    /// A messaging session broke. The matching departure, if any, comes
    /// through `on_member_changed`.
    pub fn on_session_failed(&mut self, remote: GlobalIdentity, reason: &str) {
        warn!(%remote, reason, "messaging session failed");
    }

    /// Register a lobby member, authority iff it owns the lobby. Returns a
    /// connect notification for a newly mapped remote member.
    fn add_member(
        &mut self,
        identity: GlobalIdentity,
        owner: Option<GlobalIdentity>,
    ) -> Option<PeerEvent> {
        match self.registry.register(identity, owner == Some(identity)) {
            Ok(reg) if reg.newly_added && Some(identity) != self.local => {
                Some(PeerEvent::Connected(reg.peer_id))
            }
            Ok(_) => None,
            Err(err) => {
                warn!(%identity, %err, "could not map lobby member");
                None
            }
        }
    }
}
