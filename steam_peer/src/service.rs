// Collaborator contracts: the lobby (membership) service and the
// connectionless messaging transport.
//
// The adapter never talks to Steam directly. `steam_peer_gdext` implements
// both traits over the GodotSteam singleton; `multiplayer_tests` implements
// them over an in-memory lobby hub. Calls return `PeerError::Unavailable`
// when the backing service cannot be reached.
//
// Inbound messages are owned values: dropping an `InboundMessage` is the
// release step, so a message discarded by the poll loop needs no explicit
// cleanup.
//
// Event payload enums (`MemberChange`, `EnterResponse`) use the Steam
// numeric values so the glue layer can decode signal arguments directly.

use std::fmt;

use crate::error::PeerError;
use crate::types::{Channel, GlobalIdentity, LobbyId, SendFlags};

pub trait MembershipService {
    /// Identity of the local party.
    fn local_identity(&self) -> Result<GlobalIdentity, PeerError>;

    /// Ask to join `lobby`. The outcome arrives later as a join result
    /// event; this only reports whether the request could be issued.
    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError>;

    /// Current roster of `lobby`, local party included.
    fn lobby_members(&self, lobby: LobbyId) -> Result<Vec<GlobalIdentity>, PeerError>;

    /// Owner of `lobby`, if the service knows it.
    fn lobby_owner(&self, lobby: LobbyId) -> Result<Option<GlobalIdentity>, PeerError>;

    fn leave_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError>;
}

pub trait MessageTransport {
    /// Accept a pending session so `remote` may start delivering messages.
    fn accept_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError>;

    fn close_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError>;

    /// Queue `data` for `remote`. `Ok(false)` means the transport was
    /// reachable but refused the message.
    fn send_message(
        &mut self,
        remote: GlobalIdentity,
        data: &[u8],
        flags: SendFlags,
        channel: Channel,
    ) -> Result<bool, PeerError>;

    /// Take up to `max` pending messages received on `channel`.
    fn receive_messages(
        &mut self,
        channel: Channel,
        max: usize,
    ) -> Result<Vec<InboundMessage>, PeerError>;
}

/// A message drained from the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: GlobalIdentity,
    pub channel: Channel,
    pub flags: SendFlags,
    pub data: Vec<u8>,
}

/// Lobby roster change reported by the membership service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberChange {
    Entered,
    Left,
    Disconnected,
    Kicked,
    Banned,
}

impl MemberChange {
    /// Decode a Steam `EChatMemberStateChange` bit field. When several bits
    /// are set, any departure bit wins over `Entered`.
    pub fn from_steam(bits: u32) -> Option<MemberChange> {
        if bits & 0x10 != 0 {
            Some(MemberChange::Banned)
        } else if bits & 0x08 != 0 {
            Some(MemberChange::Kicked)
        } else if bits & 0x04 != 0 {
            Some(MemberChange::Disconnected)
        } else if bits & 0x02 != 0 {
            Some(MemberChange::Left)
        } else if bits & 0x01 != 0 {
            Some(MemberChange::Entered)
        } else {
            None
        }
    }

    pub fn is_departure(self) -> bool {
        self != MemberChange::Entered
    }
}

/// Lobby join result code (Steam `EChatRoomEnterResponse`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnterResponse {
    Success,
    DoesntExist,
    NotAllowed,
    Full,
    Error,
    Banned,
    Limited,
    ClanDisabled,
    CommunityBan,
    MemberBlockedYou,
    YouBlockedMember,
    RatelimitExceeded,
    Unknown(u32),
}

impl EnterResponse {
    pub fn from_steam(code: u32) -> EnterResponse {
        match code {
            1 => EnterResponse::Success,
            2 => EnterResponse::DoesntExist,
            3 => EnterResponse::NotAllowed,
            4 => EnterResponse::Full,
            5 => EnterResponse::Error,
            6 => EnterResponse::Banned,
            7 => EnterResponse::Limited,
            8 => EnterResponse::ClanDisabled,
            9 => EnterResponse::CommunityBan,
            10 => EnterResponse::MemberBlockedYou,
            11 => EnterResponse::YouBlockedMember,
            15 => EnterResponse::RatelimitExceeded,
            other => EnterResponse::Unknown(other),
        }
    }

    pub fn is_success(self) -> bool {
        self == EnterResponse::Success
    }
}

impl fmt::Display for EnterResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnterResponse::Success => write!(f, "success"),
            EnterResponse::DoesntExist => write!(f, "lobby does not exist (probably closed)"),
            EnterResponse::NotAllowed => write!(f, "not permitted to join this lobby"),
            EnterResponse::Full => write!(f, "lobby is full"),
            EnterResponse::Error => write!(f, "unexpected error"),
            EnterResponse::Banned => write!(f, "banned from this lobby"),
            EnterResponse::Limited => write!(f, "limited accounts may not join"),
            EnterResponse::ClanDisabled => write!(f, "clan is locked or disabled"),
            EnterResponse::CommunityBan => write!(f, "account has a community lock"),
            EnterResponse::MemberBlockedYou => write!(f, "a lobby member has blocked you"),
            EnterResponse::YouBlockedMember => write!(f, "you have blocked a lobby member"),
            EnterResponse::RatelimitExceeded => write!(f, "too many join attempts"),
            EnterResponse::Unknown(code) => write!(f, "unknown response {code}"),
        }
    }
}
