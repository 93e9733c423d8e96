// Error type for adapter operations.
//
// Every fallible operation returns `Result<_, PeerError>`. A failure aborts
// that one operation and leaves the registry, packet queue and connection
// status as they were. Stale events and messages from unknown senders are
// not errors: the translator and poll loop log and drop them.

use thiserror::Error;

use crate::status::ConnectionStatus;
use crate::types::{GlobalIdentity, PeerId};

#[derive(Error, Debug)]
pub enum PeerError {
    /// A collaborator service (lobby or messaging) is not reachable.
    #[error("{0} unavailable")]
    Unavailable(&'static str),

    #[error("no packet available")]
    NoPacketAvailable,

    /// `put_packet` addressed a peer id with no registered identity.
    #[error("no identity mapped for target peer {0}")]
    UnresolvedTarget(PeerId),

    #[error("peer {0} not found")]
    UnknownPeer(PeerId),

    /// The local identity has no peer id yet.
    #[error("local identity is not registered")]
    NotRegistered,

    #[error("peer id {peer_id} already held by identity {holder}")]
    IdCollision {
        peer_id: PeerId,
        holder: GlobalIdentity,
    },

    #[error("operation not allowed while {0:?}")]
    InvalidState(ConnectionStatus),

    #[error("not connected to a lobby")]
    NotConnected,

    #[error("packet of {size} bytes exceeds the {max} byte limit")]
    PacketTooLarge { size: usize, max: usize },

    #[error("transport refused message to {0}")]
    SendFailed(GlobalIdentity),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// A config value that would stop polling altogether (zero channels or a
    /// zero batch size).
    #[error("config field {0} must be at least 1")]
    ConfigOutOfRange(&'static str),
}
