//! Headless self-play harness for the governor.
//!
//! Founds seeded random cities, puts them under the agent and plays turns of
//! growth, blocked tiles and the occasional lost city, collecting metrics.

use std::path::Path;

use anyhow::{Context, Result};
use cma_core::{
    AgentRegistry, CycleTally, GameView, Governor, GovernorConfig, GreedyOracle, Parameter,
    StatsReport,
};
use cma_protocol::{
    CityId, CityMapPos, OutputArray, OutputType, PlayerId, CITY_MAP_TILES, OUTPUT_COUNT,
};
use cma_server::ServerConfig;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::session::ClientSession;

/// Configuration for a self-play run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SelfPlayConfig {
    /// Random seed for determinism.
    pub seed: u64,
    pub turns: u32,
    pub cities: u32,
    /// Cities stop growing at this size.
    pub max_size: u8,
    /// Per city and turn.
    pub growth_chance: f64,
    /// Per city and turn.
    pub block_chance: f64,
    /// Per city and turn.
    pub transfer_chance: f64,
    /// Goal every city is governed with.
    pub goal: Parameter,
    pub governor: GovernorConfig,
    pub server: ServerConfig,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            turns: 30,
            cities: 4,
            max_size: 8,
            growth_chance: 0.3,
            block_chance: 0.05,
            transfer_chance: 0.01,
            goal: Parameter::default(),
            governor: GovernorConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl SelfPlayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        config
            .governor
            .validate()
            .with_context(|| format!("Invalid config in {}", path.display()))?;
        Ok(config)
    }
}

/// Metrics collected during a run.
#[derive(Clone, Debug, Serialize)]
pub struct SelfPlaySummary {
    pub seed: u64,
    pub turns_played: u32,
    pub cities_founded: u32,
    /// Cities still owned and governed at the end.
    pub cities_governed: u32,
    pub requests_sent: u32,
    pub messages: usize,
    pub cycles: CycleTally,
    pub apply: StatsReport,
}

const LOCAL_PLAYER: PlayerId = PlayerId(0);
const RIVAL: PlayerId = PlayerId(1);

type SelfPlayGovernor = Governor<GreedyOracle>;

/// Run a self-play game.
pub fn run_selfplay(config: &SelfPlayConfig) -> Result<SelfPlaySummary> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut session = ClientSession::new(config.server.clone(), LOCAL_PLAYER);
    let mut registry: AgentRegistry<ClientSession> = AgentRegistry::new();

    let oracle = GreedyOracle::new(config.server.rules.clone());
    let mut governor = Governor::new(oracle, config.governor.clone());
    governor.init();
    registry.register(Box::new(governor));

    let mut cities = Vec::new();
    for n in 0..config.cities {
        let id = session.found_city(&format!("City {}", n + 1), random_yields(&mut rng), &[])?;
        cities.push(id);
    }
    registry.process(&mut session);

    for &id in &cities {
        let governor = registry
            .get_mut::<SelfPlayGovernor>()
            .context("governor is not registered")?;
        let report = governor.put_city_under_agent(&mut session, id, &config.goal);
        debug!(city = %id, state = ?report.state, "placed under agent");
    }
    registry.process(&mut session);

    for _ in 0..config.turns {
        for &id in &cities {
            play_city_turn(config, &mut rng, &mut session, id)?;
            registry.process(&mut session);
        }
        session.begin_turn()?;
        registry.process(&mut session);
    }

    let governor = registry
        .get_mut::<SelfPlayGovernor>()
        .context("governor is not registered")?;
    let cities_governed = cities
        .iter()
        .filter(|&&id| {
            session.city(id).is_some_and(|c| c.owner == LOCAL_PLAYER)
                && governor.is_city_under_agent(&session, id).is_some()
        })
        .count() as u32;

    let summary = SelfPlaySummary {
        seed: config.seed,
        turns_played: config.turns,
        cities_founded: cities.len() as u32,
        cities_governed,
        requests_sent: session.last_request().0,
        messages: session.messages().len(),
        cycles: governor.tally().clone(),
        apply: governor.stats().report(),
    };
    info!(
        converged = summary.cycles.converged,
        governed = summary.cities_governed,
        "self-play finished"
    );
    Ok(summary)
}

fn play_city_turn(
    config: &SelfPlayConfig,
    rng: &mut StdRng,
    session: &mut ClientSession,
    id: CityId,
) -> Result<()> {
    let Some(city) = session.city(id) else {
        return Ok(());
    };
    if city.owner != LOCAL_PLAYER {
        return Ok(());
    }
    let size = city.size;

    if size < config.max_size && rng.gen_bool(config.growth_chance) {
        session.grow_city(id)?;
    }
    if rng.gen_bool(config.block_chance) {
        let pos = CityMapPos(rng.gen_range(1..CITY_MAP_TILES as u8));
        session.block_tile(id, pos)?;
    }
    if rng.gen_bool(config.transfer_chance) {
        info!(city = %id, "city lost to a rival");
        session.transfer_city(id, RIVAL)?;
    }
    Ok(())
}

fn random_yields(rng: &mut StdRng) -> [OutputArray<i32>; CITY_MAP_TILES] {
    std::array::from_fn(|i| {
        let center = i == CityMapPos::CENTER.index();
        let mut output = [0; OUTPUT_COUNT];
        output[OutputType::Food.index()] = rng.gen_range(0..=3) + if center { 2 } else { 0 };
        output[OutputType::Shield.index()] = rng.gen_range(0..=2) + if center { 1 } else { 0 };
        output[OutputType::Trade.index()] = rng.gen_range(0..=2);
        output
    })
}
