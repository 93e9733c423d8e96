// The peer adapter: state owned by one lobby membership, plus the outward
// packet/send interface the generic multiplayer layer drives.
//
// `SteamPeer` is split across three files by concern, all `impl` blocks on
// the same struct:
// - `peer.rs`:    construction, accessors, get/put packet, disconnect,
//                 close, authority and unique-id queries.
// - `session.rs`: the event translator (join request/result, membership
//                 changes, messaging session requests/failures).
// - `poll.rs`:    the per-channel receive loop feeding the packet queue.
//
// Single-threaded by contract: every mutation happens inside a caller
// invoked method or an event handler the host calls on the same thread. No
// internal locking.
//
// Operations that can raise peer lifecycle notifications return them as a
// `Vec<PeerEvent>`; the caller (the GDExtension class) emits the matching
// engine signals.

use tracing::{debug, info};

use crate::config::PeerConfig;
use crate::error::PeerError;
use crate::packet::{Packet, PacketQueue};
use crate::registry::IdentityRegistry;
use crate::service::{MembershipService, MessageTransport};
use crate::status::{ConnectionStatus, StatusEvent};
use crate::types::{Channel, GlobalIdentity, LobbyId, PeerEvent, PeerId, SendTarget, TransferMode};

/// Multiplayer peer over a lobby service and a messaging transport.
pub struct SteamPeer<S> {
    pub(crate) services: S,
    pub(crate) config: PeerConfig,
    pub(crate) registry: IdentityRegistry,
    pub(crate) packets: PacketQueue,
    pub(crate) status: ConnectionStatus,
    pub(crate) lobby: Option<LobbyId>,
    /// Local identity, captured when a join is requested.
    pub(crate) local: Option<GlobalIdentity>,
    pub(crate) refuse_new_connections: bool,
}

impl<S> SteamPeer<S>
where
    S: MembershipService + MessageTransport,
{
    pub fn new(services: S) -> Self {
        Self::with_config(services, PeerConfig::default())
    }

    pub fn with_config(services: S, config: PeerConfig) -> Self {
        Self {
            services,
            config,
            registry: IdentityRegistry::new(),
            packets: PacketQueue::new(),
            status: ConnectionStatus::Disconnected,
            lobby: None,
            local: None,
            refuse_new_connections: false,
        }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Replace the config. An invalid one is rejected and the current
    /// config kept.
    pub fn set_config(&mut self, config: PeerConfig) -> Result<(), PeerError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_channel_count(&mut self, channel_count: u32) -> Result<(), PeerError> {
        self.set_config(PeerConfig {
            channel_count,
            ..self.config.clone()
        })
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut S {
        &mut self.services
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// The joined (or joining) lobby. `None` while disconnected.
    pub fn lobby(&self) -> Option<LobbyId> {
        self.lobby
    }

    pub fn set_refuse_new_connections(&mut self, refuse: bool) {
        self.refuse_new_connections = refuse;
    }

    pub fn is_refusing_new_connections(&self) -> bool {
        self.refuse_new_connections
    }

    pub fn available_packet_count(&self) -> usize {
        self.packets.len()
    }

    /// The packet `get_packet` will return next, for sender/channel/mode
    /// inspection before reading it.
    pub fn next_packet(&self) -> Option<&Packet> {
        self.packets.peek()
    }

    /// Pop the oldest packet. The returned packet stays valid until the next
    /// `get_packet` call.
    pub fn get_packet(&mut self) -> Result<&Packet, PeerError> {
        self.packets.take_next().ok_or(PeerError::NoPacketAvailable)
    }

    /// Send `data` on `channel` to the peers selected by `target`.
    ///
    /// A single-peer target must have a registered identity; broadcasts skip
    /// the local identity and succeed trivially on an empty roster. Nothing
    /// is sent unless every precondition holds.
    pub fn put_packet(
        &mut self,
        data: &[u8],
        target: SendTarget,
        channel: Channel,
        mode: TransferMode,
    ) -> Result<(), PeerError> {
        if !self.status.is_connected() {
            return Err(PeerError::NotConnected);
        }
        if data.len() > self.config.max_packet_size {
            return Err(PeerError::PacketTooLarge {
                size: data.len(),
                max: self.config.max_packet_size,
            });
        }

        let recipients: Vec<GlobalIdentity> = match target {
            SendTarget::Peer(peer_id) => vec![
                self.registry
                    .identity_of(peer_id)
                    .ok_or(PeerError::UnresolvedTarget(peer_id))?,
            ],
            SendTarget::Broadcast | SendTarget::AllExcept(_) => {
                let local = self.local;
                let excluded = match target {
                    SendTarget::AllExcept(peer_id) => Some(peer_id),
                    _ => None,
                };
                self.registry
                    .iter()
                    .filter(|&(peer_id, identity)| {
                        Some(identity) != local && Some(peer_id) != excluded
                    })
                    .map(|(_, identity)| identity)
                    .collect()
            }
        };

        let flags = mode.send_flags();
        for remote in recipients {
            if !self.services.send_message(remote, data, flags, channel)? {
                return Err(PeerError::SendFailed(remote));
            }
        }
        Ok(())
    }

    /// Close the messaging session with `peer_id`. With `force`, also forget
    /// the mapping now instead of waiting for the lobby to report the
    /// departure, and report the peer as disconnected.
    pub fn disconnect_peer(
        &mut self,
        peer_id: PeerId,
        force: bool,
    ) -> Result<Vec<PeerEvent>, PeerError> {
        let identity = self
            .registry
            .identity_of(peer_id)
            .ok_or(PeerError::UnknownPeer(peer_id))?;
        self.services.close_session(identity)?;
        debug!(%peer_id, %identity, force, "closed messaging session");

        if !force {
            return Ok(Vec::new());
        }
        self.registry.unregister(identity);
        self.packets.discard_from(peer_id);
        if Some(identity) == self.local {
            Ok(Vec::new())
        } else {
            Ok(vec![PeerEvent::Disconnected(peer_id)])
        }
    }

    /// Leave the lobby and drop all peer state. Returns a disconnect
    /// notification for every remote peer that was mapped.
    pub fn close(&mut self) -> Result<Vec<PeerEvent>, PeerError> {
        if let Some(lobby) = self.lobby {
            self.services.leave_lobby(lobby)?;
            info!(%lobby, "left lobby");
        }
        self.lobby = None;
        self.transition(StatusEvent::Closed)?;
        Ok(self.forget_all())
    }

    /// True iff the local identity owns the current lobby. Asks the lobby
    /// service every time; ownership can move while connected.
    pub fn is_authority(&self) -> Result<bool, PeerError> {
        let Some(lobby) = self.lobby else {
            return Ok(false);
        };
        let local = self.services.local_identity()?;
        Ok(self.services.lobby_owner(lobby)? == Some(local))
    }

    /// The local party's own peer id.
    pub fn unique_id(&self) -> Result<PeerId, PeerError> {
        let local = self.services.local_identity()?;
        self.registry
            .peer_id_of(local)
            .ok_or(PeerError::NotRegistered)
    }

    pub(crate) fn transition(&mut self, event: StatusEvent) -> Result<(), PeerError> {
        let next = self
            .status
            .next(event)
            .ok_or(PeerError::InvalidState(self.status))?;
        if next != self.status {
            debug!(from = ?self.status, to = ?next, ?event, "connection status changed");
        }
        self.status = next;
        Ok(())
    }

    /// Clear the registry and the packet queue. Every removed entry other
    /// than the local one yields a disconnect notification.
    pub(crate) fn forget_all(&mut self) -> Vec<PeerEvent> {
        self.packets.clear();
        let local = self.local;
        self.registry
            .clear()
            .into_iter()
            .filter(|&(_, identity)| Some(identity) != local)
            .map(|(peer_id, _)| PeerEvent::Disconnected(peer_id))
            .collect()
    }
}
