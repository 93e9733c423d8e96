// SteamMultiplayerPeer: Godot multiplayer peer over Steam lobbies.
//
// Implements `MultiplayerPeerExtension` so it can be assigned to
// `multiplayer.multiplayer_peer`. The engine drives it through the virtual
// interface (`poll`, `get_packet`, `put_packet`, ...); every call is
// forwarded to a `steam_peer::SteamPeer<GodotSteam>` and the result
// translated back into Godot types and error codes.
//
// Steam lobby and session events reach the adapter through the GodotSteam
// singleton's signals. They are connected to the `on_*` methods below the
// first time `join_lobby` runs. Peer lifecycle events returned by the core
// are re-emitted as the engine's `peer_connected` / `peer_disconnected`
// signals, after the core call has returned and through `base_mut()` so the
// engine may call back into this object while handling them.
//
// Typical GDScript usage:
//
//     var peer := SteamMultiplayerPeer.new()
//     peer.join_lobby(lobby_id)
//     multiplayer.multiplayer_peer = peer

use godot::classes::multiplayer_peer::{
    ConnectionStatus as GdConnectionStatus, TransferMode as GdTransferMode,
};
use godot::classes::{IMultiplayerPeerExtension, MultiplayerPeerExtension};
use godot::global::Error;
use godot::prelude::*;
use steam_peer::{
    Channel, ConnectionStatus, EnterResponse, LobbyId, MemberChange, PeerConfig, PeerError,
    PeerEvent, SendTarget, SteamPeer, TransferMode,
};

use crate::godot_steam::{GodotSteam, identity_from_godot};
use crate::logging;

/// GodotSteam signal -> handler method on this class.
const STEAM_SIGNALS: [(&str, &str); 4] = [
    ("lobby_joined", "on_lobby_joined"),
    ("lobby_chat_update", "on_lobby_chat_update"),
    ("network_messages_session_request", "on_session_request"),
    ("network_messages_session_failed", "on_session_failed"),
];

#[derive(GodotClass)]
#[class(tool, base=MultiplayerPeerExtension)]
pub struct SteamMultiplayerPeer {
    base: Base<MultiplayerPeerExtension>,
    peer: SteamPeer<GodotSteam>,
    /// Raw target as set by the engine: 0 broadcast, negative "all except".
    target_peer: i32,
    transfer_mode: TransferMode,
    transfer_channel: i32,
    steam_signals_connected: bool,
}

#[godot_api]
impl IMultiplayerPeerExtension for SteamMultiplayerPeer {
    fn init(base: Base<MultiplayerPeerExtension>) -> Self {
        logging::init();
        Self {
            base,
            peer: SteamPeer::new(GodotSteam),
            target_peer: 0,
            transfer_mode: TransferMode::default(),
            transfer_channel: 0,
            steam_signals_connected: false,
        }
    }

    fn get_available_packet_count(&self) -> i32 {
        i32::try_from(self.peer.available_packet_count()).unwrap_or(i32::MAX)
    }

    fn get_max_packet_size(&self) -> i32 {
        i32::try_from(self.peer.config().max_packet_size).unwrap_or(i32::MAX)
    }

    fn get_packet_script(&mut self) -> PackedByteArray {
        match self.peer.get_packet() {
            Ok(packet) => PackedByteArray::from(packet.data.as_slice()),
            Err(e) => {
                godot_error!("SteamMultiplayerPeer: get_packet failed: {e}");
                PackedByteArray::new()
            }
        }
    }

    fn put_packet_script(&mut self, buffer: PackedByteArray) -> Error {
        let Ok(channel) = u32::try_from(self.transfer_channel) else {
            godot_error!(
                "SteamMultiplayerPeer: invalid transfer channel {}",
                self.transfer_channel
            );
            return Error::ERR_INVALID_PARAMETER;
        };
        let target = SendTarget::from_raw(self.target_peer);
        match self.peer.put_packet(
            buffer.as_slice(),
            target,
            Channel(channel),
            self.transfer_mode,
        ) {
            Ok(()) => Error::OK,
            Err(e) => {
                godot_error!("SteamMultiplayerPeer: put_packet to {target:?} failed: {e}");
                godot_error_code(&e)
            }
        }
    }

    fn get_packet_channel(&self) -> i32 {
        self.peer
            .next_packet()
            .map_or(0, |p| i32::try_from(p.channel.0).unwrap_or(i32::MAX))
    }

    fn get_packet_mode(&self) -> GdTransferMode {
        self.peer
            .next_packet()
            .map_or(GdTransferMode::RELIABLE, |p| {
                transfer_mode_to_godot(p.transfer_mode())
            })
    }

    fn get_packet_peer(&self) -> i32 {
        self.peer.next_packet().map_or(0, |p| p.sender.0)
    }

    fn set_transfer_channel(&mut self, channel: i32) {
        self.transfer_channel = channel;
    }

    fn get_transfer_channel(&self) -> i32 {
        self.transfer_channel
    }

    fn set_transfer_mode(&mut self, mode: GdTransferMode) {
        self.transfer_mode = transfer_mode_from_godot(mode);
    }

    fn get_transfer_mode(&self) -> GdTransferMode {
        transfer_mode_to_godot(self.transfer_mode)
    }

    fn set_target_peer(&mut self, peer: i32) {
        self.target_peer = peer;
    }

    fn is_server(&self) -> bool {
        self.peer.is_authority().unwrap_or_else(|e| {
            godot_warn!("SteamMultiplayerPeer: cannot determine lobby ownership: {e}");
            false
        })
    }

    fn is_server_relay_supported(&self) -> bool {
        false
    }

    fn poll(&mut self) {
        if let Err(e) = self.peer.poll() {
            godot_error!("SteamMultiplayerPeer: poll failed: {e}");
        }
    }

    fn close(&mut self) {
        match self.peer.close() {
            Ok(events) => self.emit_peer_events(events),
            Err(e) => godot_error!("SteamMultiplayerPeer: close failed: {e}"),
        }
    }

    fn disconnect_peer(&mut self, peer: i32, force: bool) {
        match self.peer.disconnect_peer(steam_peer::PeerId(peer), force) {
            Ok(events) => self.emit_peer_events(events),
            Err(e) => godot_error!("SteamMultiplayerPeer: disconnect_peer({peer}) failed: {e}"),
        }
    }

    fn get_unique_id(&self) -> i32 {
        self.peer.unique_id().map_or_else(
            |e| {
                godot_error!("SteamMultiplayerPeer: no unique id: {e}");
                0
            },
            |id| id.0,
        )
    }

    fn set_refuse_new_connections(&mut self, enable: bool) {
        self.peer.set_refuse_new_connections(enable);
    }

    fn is_refusing_new_connections(&self) -> bool {
        self.peer.is_refusing_new_connections()
    }

    fn get_connection_status(&self) -> GdConnectionStatus {
        match self.peer.status() {
            ConnectionStatus::Disconnected => GdConnectionStatus::DISCONNECTED,
            ConnectionStatus::Connecting => GdConnectionStatus::CONNECTING,
            ConnectionStatus::Connected => GdConnectionStatus::CONNECTED,
        }
    }
}

#[godot_api]
impl SteamMultiplayerPeer {
    /// Join the Steam lobby `lobby_id`. Connection completes when Steam
    /// reports the join result; watch `get_connection_status()` or the
    /// `peer_connected` signal.
    #[func]
    fn join_lobby(&mut self, lobby_id: i64) -> Error {
        if let Err(e) = self.connect_steam_signals() {
            godot_error!("SteamMultiplayerPeer: cannot listen to Steam: {e}");
            return godot_error_code(&e);
        }
        match self.peer.join_lobby(LobbyId(lobby_id as u64)) {
            Ok(()) => Error::OK,
            Err(e) => {
                godot_error!("SteamMultiplayerPeer: join_lobby({lobby_id}) failed: {e}");
                godot_error_code(&e)
            }
        }
    }

    /// The lobby joined or being joined, 0 when none.
    #[func]
    fn get_lobby_id(&self) -> i64 {
        self.peer.lobby().map_or(0, |lobby| lobby.0 as i64)
    }

    /// Number of messaging channels drained by each `poll`. Values below 1
    /// are ignored.
    #[func]
    fn set_channel_count(&mut self, count: i32) {
        let result = u32::try_from(count)
            .map_err(|_| PeerError::ConfigOutOfRange("channel_count"))
            .and_then(|count| self.peer.set_channel_count(count));
        if let Err(e) = result {
            godot_warn!("SteamMultiplayerPeer: ignoring channel count {count}: {e}");
        }
    }

    /// Replace the adapter configuration with a JSON object matching the
    /// `PeerConfig` serde schema. Missing fields take their defaults.
    /// Returns false and keeps the current configuration when the JSON does
    /// not parse or a poll bound is zero.
    #[func]
    fn set_config_json(&mut self, json: GString) -> bool {
        match PeerConfig::from_json(&json.to_string()).and_then(|c| self.peer.set_config(c)) {
            Ok(()) => true,
            Err(e) => {
                godot_warn!("SteamMultiplayerPeer: invalid config JSON: {e}");
                false
            }
        }
    }

    /// `Steam.lobby_joined(lobby, permissions, locked, response)`.
    #[func]
    fn on_lobby_joined(&mut self, lobby_id: i64, _permissions: i64, _locked: bool, response: i64) {
        let response = EnterResponse::from_steam(u32::try_from(response).unwrap_or(u32::MAX));
        match self.peer.on_lobby_entered(LobbyId(lobby_id as u64), response) {
            Ok(events) => self.emit_peer_events(events),
            Err(e) => godot_error!("SteamMultiplayerPeer: handling lobby join failed: {e}"),
        }
    }

    /// `Steam.lobby_chat_update(lobby, changed_id, making_change_id, chat_state)`.
    #[func]
    fn on_lobby_chat_update(
        &mut self,
        lobby_id: i64,
        changed_id: i64,
        _making_change_id: i64,
        chat_state: i64,
    ) {
        let Some(change) = u32::try_from(chat_state)
            .ok()
            .and_then(MemberChange::from_steam)
        else {
            godot_warn!("SteamMultiplayerPeer: unknown lobby chat state {chat_state}");
            return;
        };
        match self.peer.on_member_changed(
            LobbyId(lobby_id as u64),
            identity_from_godot(changed_id),
            change,
        ) {
            Ok(events) => self.emit_peer_events(events),
            Err(e) => godot_error!("SteamMultiplayerPeer: handling lobby update failed: {e}"),
        }
    }

    /// `Steam.network_messages_session_request(remote_steam_id)`.
    #[func]
    fn on_session_request(&mut self, remote_steam_id: i64) {
        if let Err(e) = self.peer.on_session_request(identity_from_godot(remote_steam_id)) {
            godot_error!("SteamMultiplayerPeer: accepting session failed: {e}");
        }
    }

    /// `Steam.network_messages_session_failed(reason, remote_steam_id, state, debug_message)`.
    #[func]
    fn on_session_failed(
        &mut self,
        reason: i64,
        remote_steam_id: i64,
        _connection_state: i64,
        debug_message: GString,
    ) {
        let reason = format!("{debug_message} (end reason {reason})");
        self.peer
            .on_session_failed(identity_from_godot(remote_steam_id), &reason);
    }
}

impl SteamMultiplayerPeer {
    fn connect_steam_signals(&mut self) -> Result<(), PeerError> {
        if self.steam_signals_connected {
            return Ok(());
        }
        let mut steam = GodotSteam::singleton()?;
        let this = self.to_gd();
        for (signal, method) in STEAM_SIGNALS {
            let callable = Callable::from_object_method(&this, method);
            if steam.connect(signal, &callable) != Error::OK {
                godot_warn!("SteamMultiplayerPeer: could not connect Steam.{signal}");
            }
        }
        self.steam_signals_connected = true;
        Ok(())
    }

    fn emit_peer_events(&mut self, events: Vec<PeerEvent>) {
        for event in events {
            let (signal, peer_id) = match event {
                PeerEvent::Connected(peer_id) => ("peer_connected", peer_id),
                PeerEvent::Disconnected(peer_id) => ("peer_disconnected", peer_id),
            };
            self.base_mut()
                .emit_signal(signal, &[i64::from(peer_id.0).to_variant()]);
        }
    }
}

fn transfer_mode_to_godot(mode: TransferMode) -> GdTransferMode {
    match mode {
        TransferMode::Unreliable => GdTransferMode::UNRELIABLE,
        TransferMode::UnreliableOrdered => GdTransferMode::UNRELIABLE_ORDERED,
        TransferMode::Reliable => GdTransferMode::RELIABLE,
    }
}

fn transfer_mode_from_godot(mode: GdTransferMode) -> TransferMode {
    if mode == GdTransferMode::UNRELIABLE {
        TransferMode::Unreliable
    } else if mode == GdTransferMode::UNRELIABLE_ORDERED {
        TransferMode::UnreliableOrdered
    } else {
        TransferMode::Reliable
    }
}

/// Engine error code reported for a failed adapter call.
fn godot_error_code(err: &PeerError) -> Error {
    match err {
        PeerError::Unavailable(_) | PeerError::NoPacketAvailable => Error::ERR_UNAVAILABLE,
        PeerError::UnresolvedTarget(_) | PeerError::UnknownPeer(_) | PeerError::NotRegistered => {
            Error::ERR_DOES_NOT_EXIST
        }
        PeerError::IdCollision { .. } => Error::ERR_ALREADY_EXISTS,
        PeerError::InvalidState(_) => Error::ERR_ALREADY_IN_USE,
        PeerError::NotConnected => Error::ERR_UNCONFIGURED,
        PeerError::PacketTooLarge { .. } | PeerError::ConfigOutOfRange(_) => {
            Error::ERR_INVALID_PARAMETER
        }
        PeerError::SendFailed(_) => Error::FAILED,
        PeerError::Config(_) => Error::ERR_PARSE_ERROR,
    }
}
