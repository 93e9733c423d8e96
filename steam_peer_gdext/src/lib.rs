// steam_peer_gdext: GDExtension exposing the peer adapter to Godot.
//
// This crate is a thin wrapper that registers `SteamMultiplayerPeer`, a
// `MultiplayerPeerExtension` that Godot's high-level multiplayer API can use
// as its `multiplayer_peer`. It contains no peer logic, only translation
// between Godot types/signals and `steam_peer` types.
//
// Module overview:
// - `multiplayer_peer.rs`: the `SteamMultiplayerPeer` class. Implements the
//                          engine's virtual peer interface on top of
//                          `steam_peer::SteamPeer` and re-emits peer
//                          lifecycle events as `peer_connected` /
//                          `peer_disconnected` signals.
// - `godot_steam.rs`:      `GodotSteam`, the collaborator implementation:
//                          lobby and messaging calls made dynamically on the
//                          GodotSteam `Steam` engine singleton.
// - `logging.rs`:          routes `tracing` output from the core crate into
//                          the Godot output panel.
//
// GodotSteam must be loaded (module or GDExtension) and Steam initialized
// before `join_lobby` is called; until then every call reports the Steam
// singleton as unavailable. Steam callbacks are dispatched by
// `Steam.run_callbacks()`, which the game calls each frame.
//
// See also: `steam_peer` for the registry, state machine and poll loop.

mod godot_steam;
mod logging;
mod multiplayer_peer;

use godot::prelude::*;

struct SteamPeerExtension;

#[gdextension]
unsafe impl ExtensionLibrary for SteamPeerExtension {}
