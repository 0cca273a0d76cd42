//! In-memory host and oracle for unit tests.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use cma_protocol::{
    City, CityId, CityMapPos, ClientPacket, PlayerId, Request, RequestId, RequestRange,
    ServerPacket, SpecialistArray, SpecialistType, CITY_MAP_TILES,
};
use cma_server::{CityServer, RequestPolicy, ServerConfig};

use crate::host::{
    AttributeStore, CityAttribute, GameView, NoticeKind, Oracle, Reports, ServerLink, WaitError,
};
use crate::{CmResult, Parameter};

/// Something that happens to a city while its requests are in flight.
#[derive(Clone, Copy, Debug)]
pub(crate) enum LossOnWait {
    Transfer(PlayerId),
    Destroy,
}

/// Talks to a [`CityServer`] directly; requests are handled when waited for.
pub(crate) struct FakeHost {
    server: CityServer,
    player: PlayerId,
    cities: BTreeMap<CityId, City>,
    attributes: BTreeMap<(CityAttribute, CityId), Vec<u8>>,
    last_request: RequestId,
    pending: Vec<Request>,
    pub fail_wait: Option<WaitError>,
    pub lose_on_wait: Option<(CityId, LossOnWait)>,
    pub toggles: Vec<(CityId, CityMapPos)>,
    pub specialist_changes: Vec<(CityId, SpecialistType, SpecialistType)>,
    pub refreshes: Vec<CityId>,
    pub waits: Vec<RequestRange>,
    pub frozen_till: Option<RequestId>,
    pub thawed: bool,
    pub notices: Vec<(CityId, NoticeKind, String)>,
    pub removed_attributes: Vec<CityId>,
    pub dialog_refreshes: Vec<CityId>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            server: CityServer::new(ServerConfig::default()),
            player: PlayerId(0),
            cities: BTreeMap::new(),
            attributes: BTreeMap::new(),
            last_request: RequestId::NONE,
            pending: Vec::new(),
            fail_wait: None,
            lose_on_wait: None,
            toggles: Vec::new(),
            specialist_changes: Vec::new(),
            refreshes: Vec::new(),
            waits: Vec::new(),
            frozen_till: None,
            thawed: false,
            notices: Vec::new(),
            removed_attributes: Vec::new(),
            dialog_refreshes: Vec::new(),
        }
    }

    /// A city of `size` default specialists with varied tile yields.
    pub fn found_city(&mut self, name: &str, size: u8) -> CityId {
        let yields = std::array::from_fn::<_, CITY_MAP_TILES, _>(|i| {
            let i = i as i32;
            [2 + i % 3, 1 + i % 2, i % 4, 0, 0, 0]
        });
        let (id, packets) = self.server.found_city(self.player, name, yields, &[]);
        self.receive(packets);
        for _ in 1..size {
            let packets = self.server.grow_city(id).unwrap();
            self.receive(packets);
        }
        id
    }

    pub fn transfer_city(&mut self, id: CityId, owner: PlayerId) {
        let packets = self.server.transfer_city(id, owner).unwrap();
        self.receive(packets);
    }

    pub fn set_request_policy(&mut self, policy: RequestPolicy) {
        self.server.set_request_policy(policy);
    }

    /// A valid target with the statistics the server will compute for it.
    pub fn evaluated_target(
        &self,
        id: CityId,
        worked: &[u8],
        specialists: SpecialistArray<u8>,
    ) -> CmResult {
        let city = &self.cities[&id];
        let mut target = CmResult::invalid();
        for &i in worked {
            target.worker_positions_used[i as usize] = true;
        }
        target.specialists = specialists;

        let stats =
            self.server
                .config()
                .rules
                .evaluate(&city.tiles, &target.worker_positions_used, &specialists);
        target.found_a_valid = true;
        target.surplus = stats.surplus;
        target.disorder = stats.disorder;
        target.happy = stats.happy;
        target
    }

    pub fn requests_sent(&self) -> usize {
        self.toggles.len() + self.specialist_changes.len() + self.refreshes.len()
    }

    pub fn releases(&self, id: CityId) -> usize {
        self.removed_attributes.iter().filter(|&&c| c == id).count()
    }

    fn send(&mut self, packet: ClientPacket) -> RequestId {
        self.last_request = self.last_request.next();
        self.pending.push(Request {
            id: self.last_request,
            packet,
        });
        self.last_request
    }

    fn receive(&mut self, packets: Vec<ServerPacket>) -> Vec<RequestId> {
        let mut finished = Vec::new();
        for packet in packets {
            match packet {
                ServerPacket::CityInfo { city } => {
                    self.cities.insert(city.id, city);
                }
                ServerPacket::CityRemove { city } => {
                    self.cities.remove(&city);
                }
                ServerPacket::ProcessingFinished { request } => finished.push(request),
                ServerPacket::ProcessingStarted { .. } | ServerPacket::TurnStarted { .. } => {}
            }
        }
        finished
    }
}

impl GameView for FakeHost {
    fn local_player(&self) -> PlayerId {
        self.player
    }

    fn city(&self, id: CityId) -> Option<&City> {
        self.cities.get(&id)
    }
}

impl ServerLink for FakeHost {
    fn toggle_worker(&mut self, city: CityId, pos: CityMapPos) -> RequestId {
        self.toggles.push((city, pos));
        self.send(ClientPacket::CityToggleWorker { city, pos })
    }

    fn change_specialist(
        &mut self,
        city: CityId,
        from: SpecialistType,
        to: SpecialistType,
    ) -> RequestId {
        self.specialist_changes.push((city, from, to));
        self.send(ClientPacket::CityChangeSpecialist { city, from, to })
    }

    fn request_refresh(&mut self, city: CityId) -> RequestId {
        self.refreshes.push(city);
        self.send(ClientPacket::CityRefresh { city })
    }

    fn buffer(&mut self) {}

    fn unbuffer(&mut self) {}

    fn wait_for_requests(
        &mut self,
        range: RequestRange,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        self.waits.push(range);
        if let Some(err) = self.fail_wait.clone() {
            return Err(err);
        }

        let mut finished = Vec::new();
        for request in std::mem::take(&mut self.pending) {
            let packets = self.server.handle_request(self.player, &request);
            finished.extend(self.receive(packets));
        }

        if let Some((id, loss)) = self.lose_on_wait.take() {
            let packets = match loss {
                LossOnWait::Transfer(owner) => self.server.transfer_city(id, owner),
                LossOnWait::Destroy => self.server.destroy_city(id),
            };
            self.receive(packets.unwrap());
        }

        let acknowledged = (range.first.0..=range.last.0).all(|id| finished.contains(&RequestId(id)));
        if acknowledged {
            Ok(())
        } else {
            Err(WaitError::Timeout {
                range,
                waited: timeout,
            })
        }
    }
}

impl AttributeStore for FakeHost {
    fn get_attribute(&self, attr: CityAttribute, city: CityId) -> Option<&[u8]> {
        self.attributes.get(&(attr, city)).map(Vec::as_slice)
    }

    fn set_attribute(&mut self, attr: CityAttribute, city: CityId, data: &[u8]) {
        self.attributes.insert((attr, city), data.to_vec());
    }

    fn remove_attribute(&mut self, attr: CityAttribute, city: CityId) {
        self.removed_attributes.push(city);
        self.attributes.remove(&(attr, city));
    }
}

impl Reports for FakeHost {
    fn freeze_reports_till(&mut self, request: RequestId) {
        self.frozen_till = Some(request);
    }

    fn force_thaw_reports(&mut self) {
        self.thawed = true;
    }

    fn notify(&mut self, city: CityId, kind: NoticeKind, message: String) {
        self.notices.push((city, kind, message));
    }

    fn refresh_city_dialog(&mut self, city: CityId) {
        self.dialog_refreshes.push(city);
    }
}

/// Answers queries from a script, then repeats a fixed result, then falls
/// back to the city's current assignment.
#[derive(Default)]
pub(crate) struct ScriptedOracle {
    script: VecDeque<CmResult>,
    fallback: Option<CmResult>,
    pub queries: u32,
    pub cleared: Vec<CityId>,
}

impl ScriptedOracle {
    pub fn push(&mut self, result: CmResult) {
        self.script.push_back(result);
    }

    pub fn repeat(&mut self, result: CmResult) {
        self.fallback = Some(result);
    }
}

impl Oracle for ScriptedOracle {
    fn query_result(&mut self, city: &City, _parameter: &Parameter) -> CmResult {
        self.queries += 1;
        self.script
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| CmResult::from_city(city))
    }

    fn clear_cache(&mut self, city: CityId) {
        self.cleared.push(city);
    }
}
