//! Per-client session over the wire codec.
//!
//! Request batches arrive as MessagePack bytes, are handled in order, and the
//! resulting server packets are queued as encoded batches for the client.

use std::collections::VecDeque;

use cma_protocol::{
    wire::{deserialize_requests, serialize_server_packets, WireError},
    PlayerId, ServerPacket,
};
use tracing::{debug, info};

use crate::state::CityServer;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    /// Link lost: incoming data is discarded, nothing more is delivered.
    Dropped,
}

/// One connected client.
#[derive(Debug)]
pub struct Session {
    player: PlayerId,
    state: SessionState,
    outgoing: VecDeque<Vec<u8>>,
}

impl Session {
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            state: SessionState::Connected,
            outgoing: VecDeque::new(),
        }
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn drop_link(&mut self) {
        info!(player = self.player.0, "session dropped");
        self.state = SessionState::Dropped;
        self.outgoing.clear();
    }

    /// Queue packets for delivery to this client.
    pub fn send(&mut self, packets: &[ServerPacket]) -> Result<(), WireError> {
        if self.state == SessionState::Dropped || packets.is_empty() {
            return Ok(());
        }
        self.outgoing.push_back(serialize_server_packets(packets)?);
        Ok(())
    }

    /// Next encoded batch for the client, oldest first.
    pub fn poll(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.outgoing.is_empty()
    }
}

impl CityServer {
    /// Decode and handle a request batch received from `session`.
    ///
    /// Returns how many requests were handled.
    pub fn receive(&mut self, session: &mut Session, bytes: &[u8]) -> Result<usize, WireError> {
        if session.state() == SessionState::Dropped {
            return Ok(0);
        }

        let requests = deserialize_requests(bytes)?;
        debug!(player = session.player().0, count = requests.len(), "request batch");

        for request in &requests {
            let packets = self.handle_request(session.player(), request);
            session.send(&packets)?;
        }
        Ok(requests.len())
    }
}
