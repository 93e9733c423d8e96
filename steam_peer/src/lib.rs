// steam_peer: multiplayer peer adapter over a lobby service and a
// connectionless messaging transport.
//
// Presents a generic multiplayer layer with a dense signed peer-id space, a
// connection status, and a FIFO of inbound packets multiplexed across
// channels, while translating lobby membership and messaging session events
// into peer connect/disconnect notifications. Parties are addressed by
// opaque 64-bit identities underneath; this crate owns the mapping.
//
// No engine or Steam dependency: the collaborators are traits
// (`service.rs`). `steam_peer_gdext` plugs in GodotSteam and registers the
// Godot class; `multiplayer_tests` plugs in an in-memory lobby hub.
//
// Module overview:
// - `types.rs`:    ID newtypes (`GlobalIdentity`, `LobbyId`, `PeerId`,
//                  `Channel`), transfer modes, send flags and targets,
//                  outward `PeerEvent`.
// - `registry.rs`: bidirectional peer id <-> identity mapping.
// - `packet.rs`:   inbound packet FIFO with a "current packet" slot.
// - `status.rs`:   Disconnected / Connecting / Connected state machine.
// - `service.rs`:  `MembershipService` and `MessageTransport` traits and
//                  their event payload types.
// - `peer.rs`:     `SteamPeer`, the adapter, and its packet/send interface.
// - `session.rs`:  event translator (`SteamPeer` handlers).
// - `poll.rs`:     per-channel receive loop (`SteamPeer::poll`).
// - `config.rs`:   `PeerConfig`, JSON loadable.
// - `error.rs`:    `PeerError`.
//
// Diagnostics go through `tracing`; the embedding decides where they land.

pub mod config;
pub mod error;
pub mod packet;
pub mod peer;
pub mod poll;
pub mod registry;
pub mod service;
pub mod session;
pub mod status;
pub mod types;

#[cfg(test)]
mod mock;

pub use config::PeerConfig;
pub use error::PeerError;
pub use packet::Packet;
pub use peer::SteamPeer;
pub use registry::{IdentityRegistry, Registration};
pub use service::{EnterResponse, InboundMessage, MemberChange, MembershipService, MessageTransport};
pub use status::ConnectionStatus;
pub use types::{
    Channel, GlobalIdentity, LobbyId, PeerEvent, PeerId, SendFlags, SendTarget, TransferMode,
};
