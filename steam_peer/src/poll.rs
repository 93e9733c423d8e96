// Transport poll loop.
//
// One explicit, non-blocking call drains up to `max_messages_per_poll`
// messages from each channel in `0..channel_count`, in channel order, and
// appends the attributable ones to the packet queue. No timer or thread: the
// caller polls on its own schedule, and a busy channel needs repeated polls
// to drain.
//
// A message whose sender has no peer id is dropped. An unmapped sender means
// the lobby roster and the messaging layer disagree, and attributing the
// payload to anyone would be wrong.
//
// A receive error on one channel stops the loop and is returned. Packets
// already drained from lower channels stay queued: the transport has handed
// them over and cannot give them back.

use tracing::warn;

use crate::error::PeerError;
use crate::packet::Packet;
use crate::peer::SteamPeer;
use crate::service::{MembershipService, MessageTransport};
use crate::types::Channel;

impl<S> SteamPeer<S>
where
    S: MembershipService + MessageTransport,
{
    /// Drain pending messages into the packet queue. Returns how many
    /// packets were queued. On error, earlier channels' packets remain
    /// readable through `get_packet`.
    pub fn poll(&mut self) -> Result<usize, PeerError> {
        let mut queued = 0;
        for channel in (0..self.config.channel_count).map(Channel) {
            let batch = self
                .services
                .receive_messages(channel, self.config.max_messages_per_poll)?;
            for message in batch {
                let Some(sender) = self.registry.peer_id_of(message.sender) else {
                    warn!(
                        sender = %message.sender,
                        %channel,
                        "dropping message from unknown identity"
                    );
                    continue;
                };
                self.packets.push(Packet {
                    reliable: message.flags.is_reliable(),
                    channel: message.channel,
                    sender,
                    data: message.data,
                });
                queued += 1;
            }
        }
        Ok(queued)
    }
}
