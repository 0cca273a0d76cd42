use serde::{Deserialize, Serialize};

use crate::{
    CityId, CityMapPos, OutputArray, PlayerId, SpecialistArray, SpecialistType, TileState,
    CITY_MAP_TILES, OUTPUT_COUNT, SPECIALIST_COUNT,
};

/// One position of the city map as seen by the owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSnapshot {
    pub state: TileState,
    /// Raw yield of the tile when worked.
    pub output: OutputArray<i32>,
}

/// Server-confirmed city state sent with every city info packet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct City {
    pub id: CityId,
    pub name: String,
    pub owner: PlayerId,
    pub size: u8,
    /// Indexed by [`CityMapPos::index`]; the center is always a worker.
    pub tiles: [TileSnapshot; CITY_MAP_TILES],
    pub specialists: SpecialistArray<u8>,
    pub surplus: OutputArray<i32>,
    pub disorder: bool,
    pub happy: bool,
}

impl City {
    /// A size-1 city whose only citizen is a default specialist.
    pub fn new(id: CityId, name: impl Into<String>, owner: PlayerId) -> Self {
        let mut tiles = [TileSnapshot::default(); CITY_MAP_TILES];
        tiles[CityMapPos::CENTER.index()].state = TileState::Worker;

        let mut specialists = [0; SPECIALIST_COUNT];
        specialists[SpecialistType::DEFAULT.index()] = 1;

        Self {
            id,
            name: name.into(),
            owner,
            size: 1,
            tiles,
            specialists,
            surplus: [0; OUTPUT_COUNT],
            disorder: false,
            happy: false,
        }
    }

    #[inline]
    pub fn tile(&self, pos: CityMapPos) -> &TileSnapshot {
        &self.tiles[pos.index()]
    }

    #[inline]
    pub fn tile_state(&self, pos: CityMapPos) -> TileState {
        self.tiles[pos.index()].state
    }

    pub fn is_worked(&self, pos: CityMapPos) -> bool {
        self.tile_state(pos) == TileState::Worker
    }

    #[inline]
    pub fn specialist_count(&self, specialist: SpecialistType) -> u8 {
        self.specialists[specialist.index()]
    }

    /// Citizens assigned to tiles (the free center excluded).
    pub fn count_workers(&self) -> u32 {
        CityMapPos::workable()
            .filter(|&pos| self.is_worked(pos))
            .count() as u32
    }

    pub fn count_specialists(&self) -> u32 {
        self.specialists.iter().map(|&n| n as u32).sum()
    }

    /// Whether every citizen is accounted for exactly once.
    pub fn is_consistent(&self) -> bool {
        self.count_workers() + self.count_specialists() == self.size as u32
    }
}
