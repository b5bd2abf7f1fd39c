//! Simulation configuration.
//!
//! Every random-valued field holds a DSL spec (see `distribution.rs`),
//! not a sampled number, so each use draws a fresh value.

use serde::{Deserialize, Serialize};

use crate::types::{Sol, SimulationId};

/// When a run stops.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "count", rename_all = "snake_case")]
pub enum Limit {
    Sols(u64),
    Population(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,

    // ── Genealogy ─────────────────────────────────────────────
    /// Generations of ancestors compared when checking a pairing.
    pub ancestor_depth: u8,
    /// Entries kept by the eligibility cache before LRU eviction.
    pub eligibility_cache_capacity: usize,

    // ── Economy ───────────────────────────────────────────────
    pub allow_negative_capacity: bool,
    /// Resource specs for each initial supply ship.
    pub resources_per_initial_ship: Vec<String>,
    /// Resource specs for each later supply ship.
    pub resources_per_ship: Vec<String>,
    /// Consumer specs applied per living settler.
    pub settler_consumption: Vec<String>,
    pub supply_mission_period: String,

    // ── Missions ──────────────────────────────────────────────
    pub first_mission_lands: Sol,
    pub mission_period: String,
    pub ships_per_initial_mission: String,
    pub ships_per_mission: String,
    pub settlers_per_initial_ship: String,
    pub settlers_per_ship: String,

    // ── Population ────────────────────────────────────────────
    /// Earth years.
    pub settler_age: String,
    /// Earth years, or `cdc:`.
    pub life_expectancy: String,
    pub pairing_fraction_per_sol: f64,
    pub pregnancy_probability: f64,
    /// Sols.
    pub first_child_delay: String,
    /// Sols.
    pub sols_between_children: String,
    /// Sols until a childless couple splits.
    pub partner_breakup: String,

    // ── Driver ────────────────────────────────────────────────
    /// Snapshot/flush period in sols.
    pub flush_interval: Sol,
    /// Durable copy of an in-memory store, written on each flush.
    pub backup_path: Option<String>,
    pub limit: Limit,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            ancestor_depth: 4,
            eligibility_cache_capacity: 1 << 20,
            allow_negative_capacity: false,
            resources_per_initial_ship: vec![
                "supply=electricity supplies=randint:180,220 availability=binomial:0.999 description=solar".into(),
                "reservoir=electricity max=5000 initial=2500 description=battery".into(),
                "supply=water supplies=randint:90,110 availability=binomial:0.995 description=extractor".into(),
                "reservoir=water max=20000 initial=10000 description=tank".into(),
                "supply=o2 supplies=randint:45,55 availability=binomial:0.995 description=moxie".into(),
                "reservoir=o2 max=5000 initial=2500 description=tank".into(),
            ],
            resources_per_ship: vec![
                "supply=electricity supplies=randint:180,220 availability=binomial:0.999 description=solar".into(),
            ],
            settler_consumption: vec![
                "consume=electricity consumes=normal:3.0,0.5 description=settlers".into(),
                "consume=water consumes=normal:2.5,0.3 description=settlers".into(),
                "consume=o2 consumes=normal:0.84,0.05 description=settlers".into(),
            ],
            supply_mission_period: "759".into(),
            first_mission_lands: 1,
            mission_period: "759".into(),
            ships_per_initial_mission: "1".into(),
            ships_per_mission: "randint:1,2".into(),
            settlers_per_initial_ship: "randint:20,40".into(),
            settlers_per_ship: "randint:40,80".into(),
            settler_age: "randint:32,45".into(),
            life_expectancy: "cdc:".into(),
            pairing_fraction_per_sol: 0.0015,
            pregnancy_probability: 0.4,
            first_child_delay: "randint:300,700".into(),
            sols_between_children: "randint:380,1000".into(),
            partner_breakup: "randint:1,2000".into(),
            flush_interval: 28,
            backup_path: None,
            limit: Limit::Sols(668 * 10),
        }
    }
}

impl SimulationConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Config with small fixed values for use in tests.
    pub fn default_test() -> Self {
        Self {
            seed: 0x00C0_FFEE,
            eligibility_cache_capacity: 1024,
            resources_per_initial_ship: vec![
                "supply=electricity supplies=randint:10,10 description=solar".into(),
                "consume=electricity consumes=randint:4,4 description=heater".into(),
                "reservoir=electricity max=100 initial=50 description=battery".into(),
            ],
            resources_per_ship: Vec::new(),
            settler_consumption: Vec::new(),
            ships_per_mission: "1".into(),
            settlers_per_initial_ship: "10".into(),
            settlers_per_ship: "10".into(),
            limit: Limit::Sols(100),
            ..Self::default()
        }
    }
}

/// Immutable run-wide settings, handed by reference to every component.
#[derive(Debug, Clone)]
pub struct SimulationContext {
    pub simulation_id: SimulationId,
    pub config: SimulationConfig,
}

impl SimulationContext {
    pub fn new(simulation_id: impl Into<SimulationId>, config: SimulationConfig) -> Self {
        Self { simulation_id: simulation_id.into(), config }
    }
}
