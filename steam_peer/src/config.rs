// Adapter configuration.
//
// Loaded from JSON (the GDExtension exposes `set_config_json`), with every
// field optional thanks to `#[serde(default)]`. See `poll.rs` for how
// `channel_count` and `max_messages_per_poll` bound one poll call, and
// `peer.rs` for the `max_packet_size` check on sends.
//
// Both poll bounds must be at least 1, whichever way the config arrives
// (`from_json`, `SteamPeer::set_config`, `SteamPeer::set_channel_count`).

use serde::{Deserialize, Serialize};

use crate::error::PeerError;

/// Largest payload `put_packet` accepts (16 MiB).
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1 << 24;

/// Messages drained per channel per poll.
pub const DEFAULT_MAX_MESSAGES_PER_POLL: usize = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Channels polled: `0..channel_count`.
    pub channel_count: u32,
    pub max_messages_per_poll: usize,
    pub max_packet_size: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            channel_count: 1,
            max_messages_per_poll: DEFAULT_MAX_MESSAGES_PER_POLL,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

impl PeerConfig {
    pub fn from_json(json: &str) -> Result<Self, PeerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PeerError> {
        if self.channel_count == 0 {
            return Err(PeerError::ConfigOutOfRange("channel_count"));
        }
        if self.max_messages_per_poll == 0 {
            return Err(PeerError::ConfigOutOfRange("max_messages_per_poll"));
        }
        Ok(())
    }
}
