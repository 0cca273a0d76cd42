//! Reference oracle used by the client and the self-play binary.
//!
//! For every worker count it takes the best available tiles under a few
//! orderings, tries every specialist split for the remaining citizens and
//! keeps the feasible assignment with the highest weighted score. Good
//! enough for small cities; not a full combinatorial search.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use cma_protocol::{
    City, CityId, CityMapPos, CityRules, CityStats, OutputType, SpecialistArray, SpecialistType,
    TileSnapshot, TileState, CITY_MAP_TILES, SPECIALIST_COUNT,
};
use tracing::trace;

use crate::host::Oracle;
use crate::parameter::Parameter;
use crate::result::CmResult;

struct CacheEntry {
    tiles: [TileSnapshot; CITY_MAP_TILES],
    size: u8,
    parameter: Parameter,
    result: CmResult,
}

pub struct GreedyOracle {
    rules: CityRules,
    cache: BTreeMap<CityId, CacheEntry>,
    hits: u64,
    misses: u64,
}

impl GreedyOracle {
    pub fn new(rules: CityRules) -> Self {
        Self {
            rules,
            cache: BTreeMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn rules(&self) -> &CityRules {
        &self.rules
    }

    /// (hits, misses) of the per-city cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    fn solve(&self, city: &City, parameter: &Parameter) -> CmResult {
        let available: Vec<CityMapPos> = CityMapPos::workable()
            .filter(|&pos| city.tile_state(pos) != TileState::Unavailable)
            .collect();

        let weighted = |pos: &CityMapPos| self.tile_score(city.tile(*pos), parameter);
        let food = |pos: &CityMapPos| city.tile(*pos).output[OutputType::Food.index()];
        let shield = |pos: &CityMapPos| city.tile(*pos).output[OutputType::Shield.index()];

        let mut orderings: Vec<Vec<CityMapPos>> = Vec::with_capacity(3);
        for key in [
            &weighted as &dyn Fn(&CityMapPos) -> i32,
            &food as &dyn Fn(&CityMapPos) -> i32,
            &shield as &dyn Fn(&CityMapPos) -> i32,
        ] {
            let mut order = available.clone();
            order.sort_by_key(|pos| (Reverse(key(pos)), Reverse(weighted(pos)), pos.index()));
            if !orderings.contains(&order) {
                orderings.push(order);
            }
        }

        // The current assignment goes first so ties keep the city as it is.
        let mut best: Option<(i64, CmResult)> = None;
        let current = CmResult::from_city(city);
        self.consider(city, parameter, current.worker_positions_used, current.specialists, &mut best);

        let size = city.size as usize;
        for order in &orderings {
            for workers in 0..=size.min(order.len()) {
                let mut worked = [false; CITY_MAP_TILES];
                for pos in &order[..workers] {
                    worked[pos.index()] = true;
                }

                for specialists in splits((size - workers) as u8) {
                    self.consider(city, parameter, worked, specialists, &mut best);
                }
            }
        }

        match best {
            Some((score, result)) => {
                trace!(city = %city.id, score, "best assignment");
                result
            }
            None => CmResult::invalid(),
        }
    }

    fn consider(
        &self,
        city: &City,
        parameter: &Parameter,
        worked: [bool; CITY_MAP_TILES],
        specialists: SpecialistArray<u8>,
        best: &mut Option<(i64, CmResult)>,
    ) {
        if !parameter.allow_specialists && specialists.iter().any(|&n| n > 0) {
            return;
        }
        let stats = self.rules.evaluate(&city.tiles, &worked, &specialists);
        if !is_feasible(&stats, parameter) {
            return;
        }

        let score = objective(&stats, parameter);
        if best.as_ref().is_some_and(|(top, _)| *top >= score) {
            return;
        }

        let mut worker_positions_used = worked;
        worker_positions_used[CityMapPos::CENTER.index()] = false;
        *best = Some((
            score,
            CmResult {
                found_a_valid: true,
                disorder: stats.disorder,
                happy: stats.happy,
                surplus: stats.surplus,
                worker_positions_used,
                specialists,
            },
        ));
    }

    /// Weighted value of one worked tile, with trade split by tax rates.
    fn tile_score(&self, tile: &TileSnapshot, parameter: &Parameter) -> i32 {
        let factor = |output: OutputType| parameter.factor(output) as i32;
        let trade = tile.output[OutputType::Trade.index()];
        let rates = self.rules.tax_rates;
        let science_rate = 100 - rates.gold as i32 - rates.luxury as i32;
        let trade_value = trade
            * (rates.gold as i32 * factor(OutputType::Gold)
                + rates.luxury as i32 * factor(OutputType::Luxury)
                + science_rate * factor(OutputType::Science))
            / 100;

        OutputType::ALL
            .iter()
            .map(|&output| factor(output) * tile.output[output.index()])
            .sum::<i32>()
            + trade_value
    }
}

impl Oracle for GreedyOracle {
    fn query_result(&mut self, city: &City, parameter: &Parameter) -> CmResult {
        if let Some(entry) = self.cache.get(&city.id) {
            if entry.size == city.size && entry.tiles == city.tiles && entry.parameter == *parameter
            {
                self.hits += 1;
                return entry.result.clone();
            }
        }

        self.misses += 1;
        let result = self.solve(city, parameter);
        self.cache.insert(
            city.id,
            CacheEntry {
                tiles: city.tiles,
                size: city.size,
                parameter: parameter.clone(),
                result: result.clone(),
            },
        );
        result
    }

    fn clear_cache(&mut self, city: CityId) {
        self.cache.remove(&city);
    }
}

fn is_feasible(stats: &CityStats, parameter: &Parameter) -> bool {
    let surplus_ok = OutputType::ALL
        .iter()
        .all(|&o| stats.surplus[o.index()] >= parameter.minimal_surplus(o) as i32);
    surplus_ok
        && (parameter.allow_disorder || !stats.disorder)
        && (!parameter.require_happy || stats.happy)
}

fn objective(stats: &CityStats, parameter: &Parameter) -> i64 {
    let surplus: i64 = OutputType::ALL
        .iter()
        .map(|&o| parameter.factor(o) as i64 * stats.surplus[o.index()] as i64)
        .sum();
    surplus + if stats.happy { parameter.happy_factor as i64 } else { 0 }
}

/// Every way to split `count` citizens over the specialist roles.
fn splits(count: u8) -> impl Iterator<Item = SpecialistArray<u8>> {
    debug_assert_eq!(SPECIALIST_COUNT, 3);
    (0..=count).flat_map(move |a| {
        (0..=count - a).map(move |b| {
            let mut split = [0u8; SPECIALIST_COUNT];
            split[SpecialistType::Entertainer.index()] = a;
            split[SpecialistType::Taxman.index()] = b;
            split[SpecialistType::Scientist.index()] = count - a - b;
            split
        })
    })
}
