// Core ID and delivery types for the peer adapter.
//
// These are lightweight newtypes shared by the registry (`registry.rs`), the
// packet queue (`packet.rs`) and the collaborator traits (`service.rs`).
// `GlobalIdentity` and `LobbyId` are opaque handles handed out by the lobby
// and messaging services; `PeerId` is the compact signed id the generic
// multiplayer layer addresses parties by.
//
// Peer id space: the generic layer reserves `0` (broadcast) and `1` (the
// session authority). Member ids are derived from the low 31 bits of the
// identity's account id, so they fit the non-negative half of an `i32`.
// Distinct identities can collide after truncation; `registry.rs` refuses a
// colliding registration rather than overwriting the holder.

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Opaque, service-assigned identity of a party (a 64-bit Steam ID).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalIdentity(pub u64);

impl GlobalIdentity {
    /// The account part of the identity: its low 32 bits.
    pub fn account_id(self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for GlobalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a joined lobby (the membership session).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LobbyId(pub u64);

impl fmt::Display for LobbyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Peer id as seen by the generic multiplayer layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub i32);

impl PeerId {
    /// Broadcast target. Never assigned to a party.
    pub const BROADCAST: PeerId = PeerId(0);

    /// The lobby owner's id.
    pub const AUTHORITY: PeerId = PeerId(1);

    /// Derive a member id from the low 31 bits of the identity's account id.
    ///
    /// The result is never `BROADCAST` or `AUTHORITY`: an account id that
    /// truncates onto a reserved value gets bit 30 set instead. This is a
    /// hash into a fixed space, not an injective mapping; two identities may
    /// land on the same member id.
    pub fn for_member(identity: GlobalIdentity) -> PeerId {
        let low = identity.account_id() & 0x7FFF_FFFF;
        let low = if low <= 1 { low | 0x4000_0000 } else { low };
        PeerId(low as i32)
    }

    pub fn is_authority(self) -> bool {
        self == PeerId::AUTHORITY
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical sub-stream used to demultiplex packets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Channel(pub u32);

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delivery guarantee requested by the generic layer for outgoing packets.
///
/// The messaging transport has no ordered-unreliable mode, so
/// `UnreliableOrdered` goes out as plain unreliable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    Unreliable,
    UnreliableOrdered,
    #[default]
    Reliable,
}

impl TransferMode {
    /// Transport flags for a send in this mode. Every send asks the
    /// transport to re-establish a broken session on its own.
    pub fn send_flags(self) -> SendFlags {
        let delivery = match self {
            TransferMode::Reliable => SendFlags::RELIABLE,
            TransferMode::Unreliable | TransferMode::UnreliableOrdered => SendFlags::UNRELIABLE,
        };
        SendFlags::AUTO_RESTART_BROKEN_SESSION | delivery
    }
}

bitflags! {
    /// Per-message send flags understood by the messaging transport. Values
    /// match the Steam networking `k_nSteamNetworkingSend_*` constants.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SendFlags: u32 {
        const UNRELIABLE = 0;
        const NO_NAGLE = 1;
        const NO_DELAY = 4;
        const RELIABLE = 8;
        const AUTO_RESTART_BROKEN_SESSION = 32;
    }
}

impl SendFlags {
    pub fn is_reliable(self) -> bool {
        self.contains(SendFlags::RELIABLE)
    }
}

/// Recipient selection for `put_packet`, decoded from the generic layer's
/// signed target: `0` broadcasts, a negative value broadcasts to everyone
/// except the negated id, a positive value addresses one peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendTarget {
    Peer(PeerId),
    Broadcast,
    AllExcept(PeerId),
}

impl SendTarget {
    pub fn from_raw(target: i32) -> SendTarget {
        match target {
            0 => SendTarget::Broadcast,
            t if t < 0 => SendTarget::AllExcept(PeerId(t.saturating_neg())),
            t => SendTarget::Peer(PeerId(t)),
        }
    }
}

/// Outward peer lifecycle notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Connected(PeerId),
    Disconnected(PeerId),
}
