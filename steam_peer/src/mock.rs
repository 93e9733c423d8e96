// Scripted collaborator for unit tests: a fixed roster and owner, recorded
// calls, and per-channel inboxes filled by the test.

use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};

use crate::error::PeerError;
use crate::service::{InboundMessage, MembershipService, MessageTransport};
use crate::types::{Channel, GlobalIdentity, LobbyId, SendFlags};

#[derive(Default)]
pub(crate) struct MockServices {
    /// `None` makes every lobby call fail as unavailable.
    pub local: Option<GlobalIdentity>,
    pub owner: Option<GlobalIdentity>,
    pub members: Vec<GlobalIdentity>,
    pub transport_down: bool,
    pub refuse_sends: bool,
    /// `receive_messages` on this channel fails as if the transport dropped.
    pub failing_channel: Option<u32>,

    pub joined: Vec<LobbyId>,
    pub left: Vec<LobbyId>,
    pub accepted: Vec<GlobalIdentity>,
    pub closed: Vec<GlobalIdentity>,
    pub sent: Vec<(GlobalIdentity, Vec<u8>, SendFlags, Channel)>,
    pub roster_queries: Cell<usize>,
    pub inbox: BTreeMap<u32, VecDeque<InboundMessage>>,
}

impl MockServices {
    pub fn new(local: GlobalIdentity) -> Self {
        Self {
            local: Some(local),
            ..Self::default()
        }
    }

    pub fn deliver(&mut self, sender: GlobalIdentity, channel: u32, reliable: bool, data: &[u8]) {
        let flags = if reliable {
            SendFlags::RELIABLE
        } else {
            SendFlags::UNRELIABLE
        };
        self.inbox.entry(channel).or_default().push_back(InboundMessage {
            sender,
            channel: Channel(channel),
            flags,
            data: data.to_vec(),
        });
    }

    fn lobby_service(&self) -> Result<GlobalIdentity, PeerError> {
        self.local.ok_or(PeerError::Unavailable("lobby service"))
    }

    fn transport(&self) -> Result<(), PeerError> {
        if self.transport_down {
            Err(PeerError::Unavailable("messaging transport"))
        } else {
            Ok(())
        }
    }
}

impl MembershipService for MockServices {
    fn local_identity(&self) -> Result<GlobalIdentity, PeerError> {
        self.lobby_service()
    }

    fn join_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        self.lobby_service()?;
        self.joined.push(lobby);
        Ok(())
    }

    fn lobby_members(&self, _lobby: LobbyId) -> Result<Vec<GlobalIdentity>, PeerError> {
        self.lobby_service()?;
        self.roster_queries.set(self.roster_queries.get() + 1);
        Ok(self.members.clone())
    }

    fn lobby_owner(&self, _lobby: LobbyId) -> Result<Option<GlobalIdentity>, PeerError> {
        self.lobby_service()?;
        Ok(self.owner)
    }

    fn leave_lobby(&mut self, lobby: LobbyId) -> Result<(), PeerError> {
        self.lobby_service()?;
        self.left.push(lobby);
        Ok(())
    }
}

impl MessageTransport for MockServices {
    fn accept_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        self.transport()?;
        self.accepted.push(remote);
        Ok(())
    }

    fn close_session(&mut self, remote: GlobalIdentity) -> Result<(), PeerError> {
        self.transport()?;
        self.closed.push(remote);
        Ok(())
    }

    fn send_message(
        &mut self,
        remote: GlobalIdentity,
        data: &[u8],
        flags: SendFlags,
        channel: Channel,
    ) -> Result<bool, PeerError> {
        self.transport()?;
        if self.refuse_sends {
            return Ok(false);
        }
        self.sent.push((remote, data.to_vec(), flags, channel));
        Ok(true)
    }

    fn receive_messages(
        &mut self,
        channel: Channel,
        max: usize,
    ) -> Result<Vec<InboundMessage>, PeerError> {
        self.transport()?;
        if self.failing_channel == Some(channel.0) {
            return Err(PeerError::Unavailable("messaging transport"));
        }
        let Some(queue) = self.inbox.get_mut(&channel.0) else {
            return Ok(Vec::new());
        };
        let n = max.min(queue.len());
        Ok(queue.drain(..n).collect())
    }
}
