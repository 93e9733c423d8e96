// Connection status of the local endpoint relative to its lobby.
//
// One value per adapter, not per peer. The legal transitions are:
//
//   Disconnected --JoinRequested--> Connecting
//   Connecting   --JoinSucceeded--> Connected
//   Connecting   --JoinFailed-----> Disconnected
//   Connecting   --Removed--------> Disconnected
//   Connected    --Removed--------> Disconnected
//   any          --Closed---------> Disconnected
//
// `next` returns `None` for anything else. Callers decide whether an illegal
// transition is a caller error (`join_lobby` while connected) or a stale
// event to drop (a join result arriving after `close`).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusEvent {
    /// The local endpoint issued a lobby join request.
    JoinRequested,
    /// The lobby service confirmed the join.
    JoinSucceeded,
    /// The lobby service declined the join.
    JoinFailed,
    /// Kicked, banned or dropped from the lobby.
    Removed,
    /// The local endpoint left.
    Closed,
}

impl ConnectionStatus {
    pub fn next(self, event: StatusEvent) -> Option<ConnectionStatus> {
        use ConnectionStatus::*;
        match (self, event) {
            (Disconnected, StatusEvent::JoinRequested) => Some(Connecting),
            (Connecting, StatusEvent::JoinSucceeded) => Some(Connected),
            (Connecting, StatusEvent::JoinFailed) => Some(Disconnected),
            (Connecting | Connected, StatusEvent::Removed) => Some(Disconnected),
            (_, StatusEvent::Closed) => Some(Disconnected),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectionStatus::Connected
    }
}
