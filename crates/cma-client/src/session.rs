//! Client session: the governor's host.
//!
//! Talks to an in-process [`CityServer`] through the wire codec. Requests are
//! encoded in batches, answers are decoded as they are pumped, and city
//! lifecycle events are queued for the agent registry.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use cma_core::{
    AgentEvent, AttributeStore, CityAttribute, EventSource, GameView, NoticeKind, Reports,
    ServerLink, WaitError,
};
use cma_protocol::{
    wire::{deserialize_server_packets, serialize_requests, WireError},
    City, CityId, CityMapPos, ClientPacket, OutputArray, PlayerId, Request, RequestId,
    RequestRange, ServerPacket, SpecialistType, CITY_MAP_TILES,
};
use cma_server::{CityServer, ServerConfig, ServerError, Session, SessionState};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("server refused: {0}")]
    Server(#[from] ServerError),
}

/// A player-visible message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub city: CityId,
    pub kind: NoticeKind,
    pub text: String,
}

/// How long to sleep between polls while waiting for acknowledgements.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

pub struct ClientSession {
    server: CityServer,
    link: Session,
    player: PlayerId,
    cities: BTreeMap<CityId, City>,
    attributes: BTreeMap<(CityAttribute, CityId), Vec<u8>>,
    last_request: RequestId,
    last_processed: RequestId,
    outgoing: Vec<Request>,
    buffer_depth: u32,
    frozen_till: Option<RequestId>,
    report_refreshes: u32,
    dialog_refreshes: Vec<CityId>,
    messages: Vec<Message>,
    events: Vec<AgentEvent>,
    turn: u32,
}

impl ClientSession {
    pub fn new(config: ServerConfig, player: PlayerId) -> Self {
        let server = CityServer::new(config);
        let turn = server.turn();
        Self {
            server,
            link: Session::new(player),
            player,
            cities: BTreeMap::new(),
            attributes: BTreeMap::new(),
            last_request: RequestId::NONE,
            last_processed: RequestId::NONE,
            outgoing: Vec::new(),
            buffer_depth: 0,
            frozen_till: None,
            report_refreshes: 0,
            dialog_refreshes: Vec::new(),
            messages: Vec::new(),
            events: Vec::new(),
            turn,
        }
    }

    pub fn server(&self) -> &CityServer {
        &self.server
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn cities(&self) -> impl Iterator<Item = &City> {
        self.cities.values()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last_request(&self) -> RequestId {
        self.last_request
    }

    pub fn reports_frozen(&self) -> bool {
        self.frozen_till.is_some()
    }

    /// Times the reports were redrawn after a freeze.
    pub fn report_refreshes(&self) -> u32 {
        self.report_refreshes
    }

    pub fn dialog_refreshes(&self) -> &[CityId] {
        &self.dialog_refreshes
    }

    pub fn is_connected(&self) -> bool {
        self.link.state() == SessionState::Connected
    }

    pub fn disconnect(&mut self) {
        self.link.drop_link();
    }

    /// Found a city for the local player.
    pub fn found_city(
        &mut self,
        name: &str,
        tile_output: [OutputArray<i32>; CITY_MAP_TILES],
        unavailable: &[CityMapPos],
    ) -> Result<CityId, ClientError> {
        let (id, packets) = self
            .server
            .found_city(self.player, name, tile_output, unavailable);
        self.link.send(&packets)?;
        self.pump();
        Ok(id)
    }

    /// Run a server-side world change and deliver what it broadcasts.
    pub fn world<F>(&mut self, change: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut CityServer) -> Result<Vec<ServerPacket>, ServerError>,
    {
        let packets = change(&mut self.server)?;
        self.link.send(&packets)?;
        self.pump();
        Ok(())
    }

    pub fn grow_city(&mut self, id: CityId) -> Result<(), ClientError> {
        self.world(|server| server.grow_city(id))
    }

    pub fn block_tile(&mut self, id: CityId, pos: CityMapPos) -> Result<(), ClientError> {
        self.world(|server| server.block_tile(id, pos))
    }

    pub fn transfer_city(&mut self, id: CityId, owner: PlayerId) -> Result<(), ClientError> {
        self.world(|server| server.transfer_city(id, owner))
    }

    pub fn destroy_city(&mut self, id: CityId) -> Result<(), ClientError> {
        self.world(|server| server.destroy_city(id))
    }

    pub fn begin_turn(&mut self) -> Result<(), ClientError> {
        self.world(|server| Ok(server.begin_turn()))
    }

    pub fn set_request_policy(&mut self, policy: cma_server::RequestPolicy) {
        self.server.set_request_policy(policy);
    }

    fn issue(&mut self, packet: ClientPacket) -> RequestId {
        self.last_request = self.last_request.next();
        trace!(request = %self.last_request, ?packet, "queue request");
        self.outgoing.push(Request {
            id: self.last_request,
            packet,
        });
        if self.buffer_depth == 0 {
            self.flush();
        }
        self.last_request
    }

    fn flush(&mut self) {
        if self.outgoing.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut self.outgoing);
        let result = serialize_requests(&batch)
            .and_then(|bytes| self.server.receive(&mut self.link, &bytes));
        match result {
            Ok(count) => debug!(count, "sent request batch"),
            Err(err) => {
                error!("failed to send requests: {err}");
                self.link.drop_link();
            }
        }
    }

    /// Decode and handle everything the server has sent so far.
    pub fn pump(&mut self) {
        while let Some(bytes) = self.link.poll() {
            match deserialize_server_packets(&bytes) {
                Ok(packets) => packets.into_iter().for_each(|p| self.handle_packet(p)),
                Err(err) => {
                    error!("undecodable server batch: {err}");
                    self.link.drop_link();
                }
            }
        }
    }

    fn handle_packet(&mut self, packet: ServerPacket) {
        match packet {
            ServerPacket::ProcessingStarted { request } => {
                trace!(%request, "processing started");
            }
            ServerPacket::ProcessingFinished { request } => {
                self.last_processed = self.last_processed.max(request);
                if self.frozen_till.is_some_and(|till| request >= till) {
                    self.thaw_reports();
                }
            }
            ServerPacket::CityInfo { city } => {
                let event = if self.cities.contains_key(&city.id) {
                    AgentEvent::CityChanged(city.id)
                } else {
                    AgentEvent::CityCreated(city.id)
                };
                self.cities.insert(city.id, city);
                self.events.push(event);
            }
            ServerPacket::CityRemove { city } => {
                if self.cities.remove(&city).is_some() {
                    self.events.push(AgentEvent::CityRemoved(city));
                }
            }
            ServerPacket::TurnStarted { turn } => {
                info!(turn, "turn started");
                self.turn = turn;
                self.events.push(AgentEvent::TurnStarted);
            }
        }
    }

    fn thaw_reports(&mut self) {
        self.frozen_till = None;
        self.report_refreshes += 1;
    }
}

impl GameView for ClientSession {
    fn local_player(&self) -> PlayerId {
        self.player
    }

    fn city(&self, id: CityId) -> Option<&City> {
        self.cities.get(&id)
    }
}

impl ServerLink for ClientSession {
    fn toggle_worker(&mut self, city: CityId, pos: CityMapPos) -> RequestId {
        self.issue(ClientPacket::CityToggleWorker { city, pos })
    }

    fn change_specialist(
        &mut self,
        city: CityId,
        from: SpecialistType,
        to: SpecialistType,
    ) -> RequestId {
        self.issue(ClientPacket::CityChangeSpecialist { city, from, to })
    }

    fn request_refresh(&mut self, city: CityId) -> RequestId {
        self.issue(ClientPacket::CityRefresh { city })
    }

    fn buffer(&mut self) {
        self.buffer_depth += 1;
    }

    fn unbuffer(&mut self) {
        self.buffer_depth = self.buffer_depth.saturating_sub(1);
        if self.buffer_depth == 0 {
            self.flush();
        }
    }

    fn wait_for_requests(
        &mut self,
        range: RequestRange,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        let started = Instant::now();
        self.flush();
        loop {
            self.pump();
            if self.last_processed >= range.last {
                return Ok(());
            }
            if !self.is_connected() {
                return Err(WaitError::ConnectionLost);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                warn!(first = %range.first, last = %range.last, "requests not acknowledged");
                return Err(WaitError::Timeout { range, waited });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl AttributeStore for ClientSession {
    fn get_attribute(&self, attr: CityAttribute, city: CityId) -> Option<&[u8]> {
        self.attributes.get(&(attr, city)).map(Vec::as_slice)
    }

    fn set_attribute(&mut self, attr: CityAttribute, city: CityId, data: &[u8]) {
        self.attributes.insert((attr, city), data.to_vec());
    }

    fn remove_attribute(&mut self, attr: CityAttribute, city: CityId) {
        self.attributes.remove(&(attr, city));
    }
}

impl Reports for ClientSession {
    fn freeze_reports_till(&mut self, request: RequestId) {
        if request.is_none() {
            return;
        }
        self.frozen_till = Some(request);
    }

    fn force_thaw_reports(&mut self) {
        if self.frozen_till.is_some() {
            self.thaw_reports();
        }
    }

    fn notify(&mut self, city: CityId, kind: NoticeKind, text: String) {
        info!(%city, ?kind, "{text}");
        self.messages.push(Message { city, kind, text });
    }

    fn refresh_city_dialog(&mut self, city: CityId) {
        self.dialog_refreshes.push(city);
    }
}

impl EventSource for ClientSession {
    fn take_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.events)
    }
}
