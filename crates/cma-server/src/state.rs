//! Server-authoritative city state.
//!
//! Every labor request is validated against the true city, applied
//! atomically, and answered with:
//! - `ProcessingStarted` / `ProcessingFinished` around the request
//! - a fresh `CityInfo` for the affected city (also after a rejection, so the
//!   client resyncs)

use std::collections::BTreeMap;

use cma_protocol::{
    City, CityId, CityMapPos, ClientPacket, OutputArray, PlayerId, Request, ServerPacket,
    SpecialistType, TileState, CITY_MAP_TILES,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{RequestPolicy, ServerConfig};

/// Reasons a labor request is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("city {0} does not exist")]
    UnknownCity(CityId),
    #[error("city {city} is not owned by player {player:?}")]
    NotOwner { city: CityId, player: PlayerId },
    #[error("tile {0} is outside the city radius")]
    OffMap(CityMapPos),
    #[error("tile {0} is always worked")]
    FreeTile(CityMapPos),
    #[error("tile {0} cannot be worked")]
    TileUnavailable(CityMapPos),
    #[error("no citizen available to work tile {0}")]
    NoFreeCitizen(CityMapPos),
    #[error("city has no {} to convert", .0.name())]
    NoSpecialist(SpecialistType),
    #[error("specialist change from a role to itself")]
    SameSpecialist,
}

/// Authoritative city server.
#[derive(Debug)]
pub struct CityServer {
    config: ServerConfig,
    cities: BTreeMap<CityId, City>,
    next_city_id: u32,
    turn: u32,
}

impl CityServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            cities: BTreeMap::new(),
            next_city_id: 1,
            turn: 1,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn set_request_policy(&mut self, policy: RequestPolicy) {
        self.config.request_policy = policy;
    }

    pub fn city(&self, id: CityId) -> Option<&City> {
        self.cities.get(&id)
    }

    pub fn cities(&self) -> impl Iterator<Item = &City> {
        self.cities.values()
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Handle one client request.
    ///
    /// Returns the packets to send back, in order. Under
    /// [`RequestPolicy::Drop`] nothing is returned.
    pub fn handle_request(&mut self, player: PlayerId, request: &Request) -> Vec<ServerPacket> {
        let policy = self.config.request_policy;
        if policy == RequestPolicy::Drop {
            debug!(request = %request.id, "dropping request");
            return Vec::new();
        }

        let mut out = vec![ServerPacket::ProcessingStarted { request: request.id }];

        let city_id = request.packet.city();
        if policy == RequestPolicy::Apply {
            if let Err(err) = self.apply_packet(player, &request.packet) {
                warn!(request = %request.id, city = %city_id, "rejected: {err}");
            }
        }

        if let Some(city) = self.cities.get(&city_id) {
            if city.owner == player {
                out.push(ServerPacket::CityInfo { city: city.clone() });
            }
        }

        out.push(ServerPacket::ProcessingFinished { request: request.id });
        out
    }

    fn apply_packet(&mut self, player: PlayerId, packet: &ClientPacket) -> Result<(), ServerError> {
        let city_id = packet.city();
        let city = self
            .cities
            .get_mut(&city_id)
            .ok_or(ServerError::UnknownCity(city_id))?;

        if city.owner != player {
            return Err(ServerError::NotOwner {
                city: city_id,
                player,
            });
        }

        match *packet {
            ClientPacket::CityToggleWorker { pos, .. } => toggle_worker(city, pos)?,
            ClientPacket::CityChangeSpecialist { from, to, .. } => {
                change_specialist(city, from, to)?
            }
            ClientPacket::CityRefresh { .. } => {}
        }

        refresh_city(&self.config, city);
        Ok(())
    }

    /// Found a size-1 city whose citizen starts as a default specialist.
    pub fn found_city(
        &mut self,
        owner: PlayerId,
        name: impl Into<String>,
        tile_output: [OutputArray<i32>; CITY_MAP_TILES],
        unavailable: &[CityMapPos],
    ) -> (CityId, Vec<ServerPacket>) {
        let id = CityId(self.next_city_id);
        self.next_city_id += 1;

        let mut city = City::new(id, name, owner);
        for (tile, output) in city.tiles.iter_mut().zip(tile_output) {
            tile.output = output;
        }
        for pos in unavailable {
            if !pos.is_free_worked() && pos.index() < CITY_MAP_TILES {
                city.tiles[pos.index()].state = TileState::Unavailable;
            }
        }
        refresh_city(&self.config, &mut city);

        let packet = ServerPacket::CityInfo { city: city.clone() };
        self.cities.insert(id, city);
        (id, vec![packet])
    }

    /// Add one citizen to the city as a default specialist.
    pub fn grow_city(&mut self, id: CityId) -> Result<Vec<ServerPacket>, ServerError> {
        let config = &self.config;
        let city = self.cities.get_mut(&id).ok_or(ServerError::UnknownCity(id))?;
        city.size += 1;
        city.specialists[SpecialistType::DEFAULT.index()] += 1;
        refresh_city(config, city);
        Ok(vec![ServerPacket::CityInfo { city: city.clone() }])
    }

    /// Make a tile unworkable, e.g. because an enemy unit stands on it. A
    /// citizen working it becomes a default specialist.
    pub fn block_tile(
        &mut self,
        id: CityId,
        pos: CityMapPos,
    ) -> Result<Vec<ServerPacket>, ServerError> {
        check_tile(pos)?;
        let config = &self.config;
        let city = self.cities.get_mut(&id).ok_or(ServerError::UnknownCity(id))?;
        if city.tiles[pos.index()].state == TileState::Worker {
            city.specialists[SpecialistType::DEFAULT.index()] += 1;
        }
        city.tiles[pos.index()].state = TileState::Unavailable;
        refresh_city(config, city);
        Ok(vec![ServerPacket::CityInfo { city: city.clone() }])
    }

    /// Hand a city to another player.
    pub fn transfer_city(
        &mut self,
        id: CityId,
        new_owner: PlayerId,
    ) -> Result<Vec<ServerPacket>, ServerError> {
        let city = self.cities.get_mut(&id).ok_or(ServerError::UnknownCity(id))?;
        city.owner = new_owner;
        Ok(vec![ServerPacket::CityInfo { city: city.clone() }])
    }

    pub fn destroy_city(&mut self, id: CityId) -> Result<Vec<ServerPacket>, ServerError> {
        self.cities
            .remove(&id)
            .ok_or(ServerError::UnknownCity(id))?;
        Ok(vec![ServerPacket::CityRemove { city: id }])
    }

    pub fn begin_turn(&mut self) -> Vec<ServerPacket> {
        self.turn += 1;
        vec![ServerPacket::TurnStarted { turn: self.turn }]
    }
}

/// A position a citizen may be moved to or from.
fn check_tile(pos: CityMapPos) -> Result<(), ServerError> {
    if CityMapPos::new(pos.index()).is_none() {
        return Err(ServerError::OffMap(pos));
    }
    if pos.is_free_worked() {
        return Err(ServerError::FreeTile(pos));
    }
    Ok(())
}

fn toggle_worker(city: &mut City, pos: CityMapPos) -> Result<(), ServerError> {
    check_tile(pos)?;

    match city.tiles[pos.index()].state {
        TileState::Worker => {
            city.tiles[pos.index()].state = TileState::Empty;
            city.specialists[SpecialistType::DEFAULT.index()] += 1;
        }
        TileState::Empty => {
            // Prefer the default role, then any other specialist.
            let donor = std::iter::once(SpecialistType::DEFAULT)
                .chain(SpecialistType::non_default())
                .find(|sp| city.specialists[sp.index()] > 0)
                .ok_or(ServerError::NoFreeCitizen(pos))?;
            city.specialists[donor.index()] -= 1;
            city.tiles[pos.index()].state = TileState::Worker;
        }
        TileState::Unavailable => return Err(ServerError::TileUnavailable(pos)),
    }
    Ok(())
}

fn change_specialist(
    city: &mut City,
    from: SpecialistType,
    to: SpecialistType,
) -> Result<(), ServerError> {
    if from == to {
        return Err(ServerError::SameSpecialist);
    }
    if city.specialists[from.index()] == 0 {
        return Err(ServerError::NoSpecialist(from));
    }
    city.specialists[from.index()] -= 1;
    city.specialists[to.index()] += 1;
    Ok(())
}

fn refresh_city(config: &ServerConfig, city: &mut City) {
    let stats = config.rules.evaluate_city(city);
    city.surplus = stats.surplus;
    city.disorder = stats.disorder;
    city.happy = stats.happy;
    debug_assert!(city.is_consistent(), "city {} lost track of a citizen", city.id);
}
