// Lobby and messaging services backed by the GodotSteam singleton.
//
// GodotSteam registers an engine singleton named `Steam` whose methods wrap
// the Steamworks matchmaking and networking-messages interfaces. This module
// calls those methods dynamically, so the extension links against nothing
// but Godot itself and works with either the GodotSteam module build or its
// GDExtension build.
//
// Steam IDs travel through Godot as 64-bit ints; they are reinterpreted as
// `u64` on the way in and out. A missing singleton or method surfaces as
// `PeerError::Unavailable`.
//
// Received messages arrive as an Array of Dictionaries with `payload`,
// `identity` (older releases: `remote_steam_id`), `channel` and `flags`
// keys. Converting them to owned `InboundMessage`s also releases the
// underlying Steam message, which GodotSteam does before returning.

use godot::classes::{Engine, Object};
use godot::prelude::*;
use steam_peer::{
    Channel, GlobalIdentity, InboundMessage, LobbyId, MembershipService, MessageTransport,
    PeerError, SendFlags,
};
use tracing::{debug, warn};

/// Name under which GodotSteam registers its engine singleton.
pub const STEAM_SINGLETON: &str = "Steam";

/// Steam `k_EResultOK`.
const RESULT_OK: i64 = 1;

#[derive(Clone, Copy, Debug, Default)]
pub struct GodotSteam;

impl GodotSteam {
    pub fn singleton() -> Result<Gd<Object>, PeerError> {
        Engine::singleton()
            .get_singleton(STEAM_SINGLETON)
            .ok_or(PeerError::Unavailable("Steam singleton"))
    }

    fn call(method: &'static str, args: &[Variant]) -> Result<Variant, PeerError> {
        let mut steam = Self::singleton()?;
        if !steam.has_method(method) {
            return Err(PeerError::Unavailable(method));
        }
        Ok(steam.call(method, args))
    }

    fn call_int(method: &'static str, args: &[Variant]) -> Result<i64, PeerError> {
        Self::call(method, args)?
            .try_to::<i64>()
            .map_err(|_| PeerError::Unavailable(method))
    }

    fn call_bool(method: &'static str, args: &[Variant]) -> Result<bool, PeerError> {
        Self::call(method, args)?
            .try_to::<bool>()
            .map_err(|_| PeerError::Unavailable(method))
    }
}

pub fn identity_from_godot(steam_id: i64) -> GlobalIdentity {
    GlobalIdentity(steam_id as u64)
}

fn identity_to_variant(identity: GlobalIdentity) -> Variant {
    (identity.0 as i64).to_variant()
}

fn lobby_to_variant(lobby: LobbyId) -> Variant {
    (lobby.0 as i64).to_variant()
}

/// Decode one entry of `receiveMessagesOnChannel`. Entries without a usable
/// sender are skipped.
fn decode_message(entry: &Variant, channel: Channel) -> Option<InboundMessage> {
    let dict = entry.try_to::<VarDictionary>().ok()?;
    let sender = dict
        .get("identity")
        .or_else(|| dict.get("remote_steam_id"))
        .and_then(|v| v.try_to::<i64>().ok())
        .filter(|&id| id != 0)?;
    let data = dict
        .get("payload")
        .and_then(|v| v.try_to::<PackedByteArray>().ok())
        .map(|payload| payload.to_vec())
        .unwrap_or_default();
    let channel = dict
        .get("channel")
        .and_then(|v| v.try_to::<i64>().ok())
        .and_then(|c| u32::try_from(c).ok())
        .map_or(channel, Channel);
    let flags = dict
        .get("flags")
        .and_then(|v| v.try_to::<i64>().ok())
        .and_then(|f| u32::try_from(f).ok())
        .map_or(SendFlags::empty(), SendFlags::from_bits_truncate);
    Some(InboundMessage {
        sender: identity_from_godot(sender),
        channel,
        flags,
        data,
    })
}

impl MembershipService for GodotSteam {
    fn local_identity(&self) -> Result<GlobalIdentity, PeerError> {
        match Self::call_int("getSteamID", &[])? {
            0 => Err(PeerError::Unavailable("Steam user")),
            id => Ok(identity_from_godot(id)),
        }
    }

    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        Self::call("joinLobby", &[lobby_to_variant(lobby)])?;
        Ok(())
    }

    fn lobby_members(&self, lobby: LobbyId) -> Result<Vec<GlobalIdentity>, PeerError> {
        let count = Self::call_int("getNumLobbyMembers", &[lobby_to_variant(lobby)])?;
        let mut members = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for index in 0..count {
            let id = Self::call_int(
                "getLobbyMemberByIndex",
                &[lobby_to_variant(lobby), index.to_variant()],
            )?;
            if id != 0 {
                members.push(identity_from_godot(id));
            }
        }
        Ok(members)
    }

    fn lobby_owner(&self, lobby: LobbyId) -> Result<Option<GlobalIdentity>, PeerError> {
        match Self::call_int("getLobbyOwner", &[lobby_to_variant(lobby)])? {
            0 => Ok(None),
            id => Ok(Some(identity_from_godot(id))),
        }
    }

    fn leave_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        Self::call("leaveLobby", &[lobby_to_variant(lobby)])?;
        Ok(())
    }
}

impl MessageTransport for GodotSteam {
    fn accept_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        if !Self::call_bool("acceptSessionWithUser", &[identity_to_variant(remote)])? {
            warn!(%remote, "Steam did not accept the messaging session");
        }
        Ok(())
    }

    fn close_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        if !Self::call_bool("closeSessionWithUser", &[identity_to_variant(remote)])? {
            debug!(%remote, "no messaging session to close");
        }
        Ok(())
    }

    fn send_message(
        &mut self,
        remote: GlobalIdentity,
        data: &[u8],
        flags: SendFlags,
        channel: Channel,
    ) -> Result<bool, PeerError> {
        let result = Self::call_int(
            "sendMessageToUser",
            &[
                identity_to_variant(remote),
                PackedByteArray::from(data).to_variant(),
                i64::from(flags.bits()).to_variant(),
                i64::from(channel.0).to_variant(),
            ],
        )?;
        if result != RESULT_OK {
            debug!(%remote, result, "sendMessageToUser failed");
        }
        Ok(result == RESULT_OK)
    }

    fn receive_messages(
        &mut self,
        channel: Channel,
        max: usize,
    ) -> Result<Vec<InboundMessage>, PeerError> {
        let max = i64::try_from(max).unwrap_or(i64::MAX);
        let batch = Self::call(
            "receiveMessagesOnChannel",
            &[i64::from(channel.0).to_variant(), max.to_variant()],
        )?;
        let batch = batch
            .try_to::<Array<Variant>>()
            .map_err(|_| PeerError::Unavailable("receiveMessagesOnChannel"))?;
        Ok(batch
            .iter_shared()
            .filter_map(|entry| {
                let message = decode_message(&entry, channel);
                if message.is_none() {
                    warn!(%channel, "skipping malformed message entry");
                }
                message
            })
            .collect())
    }
}
