//! The simulation engine: owns one run's clock, RNG, store and caches.
//!
//! EXECUTION ORDER (fixed by event priority, every sol):
//!   20  landings, online/offline flips, starvation records
//!   25  maintenance
//!   30  reservoir carry-forward
//!   35  pairing
//!   40  consumption
//!   50  supply
//!  100  reservoir reconciliation
//!
//! RULES:
//!   - Nothing runs outside a scheduled event once the engine is built.
//!   - Each sol is one store transaction; each event one savepoint in it.
//!   - All randomness flows through the engine's single SimRng.
//!   - RNG and eligibility cache belong to this run only.

use crate::{
    clock::SimClock,
    commodity::{CommodityIds, CommodityKind, ResourceSpec},
    config::{Limit, SimulationConfig, SimulationContext},
    distribution::parse_random_value,
    economy,
    error::{SimError, SimResult},
    event::EventKind,
    genealogy::{CacheStats, Genealogy},
    population,
    rng::SimRng,
    scheduler::{
        EventHandler, InvokeReport, Scheduler, PRIORITY_CARRY_FORWARD, PRIORITY_CONSUMPTION,
        PRIORITY_LANDING, PRIORITY_MAINTENANCE, PRIORITY_PAIRING, PRIORITY_RECONCILIATION,
        PRIORITY_SUPPLY,
    },
    snapshot::SimSnapshot,
    store::SimStore,
    types::{sol_label, SimulationId, Sol},
};

/// Sols between population / cache summary lines in the log.
const SUMMARY_INTERVAL: Sol = 28;

/// Everything an event handler may touch while one sol is processed.
pub struct SolContext<'a> {
    pub ctx:           &'a SimulationContext,
    pub store:         &'a SimStore,
    pub scheduler:     &'a Scheduler,
    pub rng:           &'a mut SimRng,
    pub genealogy:     &'a mut Genealogy,
    pub commodity_ids: &'a CommodityIds,
    pub sol:           Sol,
}

impl EventHandler for SolContext<'_> {
    fn handle(&mut self, sol: Sol, idx: i64, kind: &EventKind) -> SimResult<()> {
        self.sol = sol;
        log::trace!("{} firing {kind:?} idx={idx}", sol_label(sol));
        match kind {
            EventKind::MissionLands { settlers, resources } => {
                population::mission_lands(self, settlers, resources)
            }
            EventKind::SupplyMissionLands { resources } => economy::land_resources(self, resources),
            EventKind::CommodityGoesOnline { entity } => economy::set_online(self, entity, true),
            EventKind::CommodityGoesOffline { entity } => economy::set_online(self, entity, false),
            EventKind::CommodityMaintenance => economy::maintenance(self),
            EventKind::ReservoirCarryForward => economy::carry_forward(self),
            EventKind::CommodityConsumption => economy::consumption(self),
            EventKind::CommoditySupply => economy::supply(self),
            EventKind::ReservoirReconciliation => economy::reconcile(self),
            EventKind::CommodityStarvation { commodity } => economy::starvation(self, *commodity),
            EventKind::MakeFamilies => population::make_families(self),
            EventKind::SettlerBorn { mother, father } => population::settler_born(self, mother, father),
            EventKind::SettlerDies { settler } => population::settler_dies(self, settler),
            EventKind::EndRelationship { relationship } => population::end_relationship(self, relationship),
        }
    }
}

pub struct SimEngine {
    ctx:           SimulationContext,
    pub clock:     SimClock,
    pub rng:       SimRng,
    pub store:     SimStore,
    scheduler:     Scheduler,
    genealogy:     Genealogy,
    commodity_ids: CommodityIds,
}

impl SimEngine {
    fn new(ctx: SimulationContext, store: SimStore) -> Self {
        Self {
            clock:         SimClock::new(ctx.simulation_id.clone()),
            rng:           SimRng::new(ctx.config.seed),
            scheduler:     Scheduler::new(&ctx),
            genealogy:     Genealogy::new(&ctx),
            commodity_ids: CommodityIds::new(),
            store,
            ctx,
        }
    }

    /// Build a fresh simulation: commodity rows, per-settler consumers,
    /// missions and the daily pipeline, all persisted in one transaction.
    pub fn build(ctx: SimulationContext, store: SimStore) -> SimResult<Self> {
        let mut engine = Self::new(ctx, store);
        engine.store.begin_sol()?;
        if let Err(e) = engine.initialise() {
            engine.store.rollback_sol()?;
            return Err(e);
        }
        engine.store.commit_sol()?;
        log::info!(
            "Simulation {} built (seed={})",
            engine.ctx.simulation_id,
            engine.ctx.config.seed
        );
        Ok(engine)
    }

    /// Build against a fresh in-memory store.
    pub fn build_test(simulation_id: SimulationId, config: SimulationConfig) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        Self::build(SimulationContext::new(simulation_id, config), store)
    }

    /// Pick up a flushed simulation where its latest snapshot left off.
    pub fn resume(simulation_id: &str, store: SimStore) -> SimResult<Self> {
        let config_json = store
            .simulation_config(simulation_id)?
            .ok_or_else(|| SimError::lookup("simulation", simulation_id))?;
        let config: SimulationConfig = serde_json::from_str(&config_json)?;
        let (sol, state_json) = store
            .latest_snapshot(simulation_id)?
            .ok_or_else(|| SimError::NoSnapshot { id: simulation_id.to_string() })?;
        let snapshot = SimSnapshot::from_json(&state_json)?;

        let mut engine = Self::new(SimulationContext::new(simulation_id, config), store);
        engine.clock = snapshot.clock;
        engine.clock.pause();
        engine.rng.set_state(snapshot.rng_state);
        engine.commodity_ids = engine.store.commodity_ids(simulation_id)?;
        log::info!("{} simulation {simulation_id} resumed", sol_label(sol));
        Ok(engine)
    }

    fn initialise(&mut self) -> SimResult<()> {
        let config = &self.ctx.config;
        let sim = self.ctx.simulation_id.as_str();
        if config.first_mission_lands == 0 {
            return Err(SimError::config("first_mission_lands must be sol 1 or later"));
        }
        self.store.insert_simulation(
            sim,
            config.seed,
            env!("CARGO_PKG_VERSION"),
            &serde_json::to_string(config)?,
        )?;

        for kind in CommodityKind::ALL {
            let id = self.rng.id();
            self.store.insert_commodity(sim, &id, kind)?;
            self.commodity_ids.insert(kind, id);
        }

        let mut cx = SolContext {
            ctx:           &self.ctx,
            store:         &self.store,
            scheduler:     &self.scheduler,
            rng:           &mut self.rng,
            genealogy:     &mut self.genealogy,
            commodity_ids: &self.commodity_ids,
            sol:           0,
        };
        let first = config.first_mission_lands;

        // Nobody is around to consume before the first landing.
        for raw in &config.settler_consumption {
            let mut spec: ResourceSpec = raw.parse()?;
            match &mut spec {
                ResourceSpec::Consume { per_settler, .. } => *per_settler = true,
                _ => return Err(SimError::config(format!("settler consumption must be a consume spec: {raw}"))),
            }
            let entity = economy::create_resource(&mut cx, &spec, false)?;
            cx.scheduler.register_with(
                cx.store,
                0,
                first,
                PRIORITY_LANDING,
                0,
                &EventKind::CommodityGoesOnline { entity },
            )?;
        }

        let ships = parse_random_value(&config.ships_per_initial_mission, 1.0, cx.rng)?.max(0.0) as u64;
        for _ in 0..ships {
            cx.scheduler.register_with(
                cx.store,
                0,
                first,
                PRIORITY_LANDING,
                0,
                &EventKind::MissionLands {
                    settlers:  config.settlers_per_initial_ship.clone(),
                    resources: config.resources_per_initial_ship.clone(),
                },
            )?;
        }

        let mission_period = parse_random_value(&config.mission_period, 0.0, cx.rng)?.max(0.0) as Sol;
        if mission_period > 0 {
            let ships = parse_random_value(&config.ships_per_mission, 1.0, cx.rng)?.max(0.0) as u64;
            for _ in 0..ships {
                cx.scheduler.register_with(
                    cx.store,
                    0,
                    first + mission_period,
                    PRIORITY_LANDING,
                    mission_period,
                    &EventKind::MissionLands {
                        settlers:  config.settlers_per_ship.clone(),
                        resources: Vec::new(),
                    },
                )?;
            }
        }

        let supply_period = parse_random_value(&config.supply_mission_period, 0.0, cx.rng)?.max(0.0) as Sol;
        if supply_period > 0 && !config.resources_per_ship.is_empty() {
            cx.scheduler.register_with(
                cx.store,
                0,
                first + supply_period,
                PRIORITY_LANDING,
                supply_period,
                &EventKind::SupplyMissionLands { resources: config.resources_per_ship.clone() },
            )?;
        }

        let daily = [
            (PRIORITY_MAINTENANCE, EventKind::CommodityMaintenance),
            (PRIORITY_CARRY_FORWARD, EventKind::ReservoirCarryForward),
            (PRIORITY_PAIRING, EventKind::MakeFamilies),
            (PRIORITY_CONSUMPTION, EventKind::CommodityConsumption),
            (PRIORITY_SUPPLY, EventKind::CommoditySupply),
            (PRIORITY_RECONCILIATION, EventKind::ReservoirReconciliation),
        ];
        for (priority, kind) in &daily {
            cx.scheduler.register_with(cx.store, 0, 1, *priority, 1, kind)?;
        }
        Ok(())
    }

    /// Advance one sol and fire everything due on it.
    pub fn step(&mut self) -> SimResult<InvokeReport> {
        let sol = self.clock.advance();
        self.store.begin_sol()?;

        let mut cx = SolContext {
            ctx:           &self.ctx,
            store:         &self.store,
            scheduler:     &self.scheduler,
            rng:           &mut self.rng,
            genealogy:     &mut self.genealogy,
            commodity_ids: &self.commodity_ids,
            sol,
        };
        let outcome = self.scheduler.invoke_due(&self.store, sol, &mut cx).and_then(|report| {
            // File stores keep the resume point on the last committed sol.
            if !self.store.is_in_memory() {
                self.save_snapshot()?;
            }
            Ok(report)
        });
        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                self.store.rollback_sol()?;
                log::error!("{} aborted: {e}", sol_label(sol));
                return Err(e);
            }
        };
        self.store.commit_sol()?;

        if report.failed > 0 {
            log::warn!("{} {} of {} events failed", sol_label(sol), report.failed, report.fired + report.failed);
        }
        if sol.is_multiple_of(SUMMARY_INTERVAL) {
            self.log_summary(sol)?;
        }
        let interval = self.ctx.config.flush_interval;
        if interval > 0 && sol.is_multiple_of(interval) && self.store.is_in_memory() {
            self.flush()?;
        }
        Ok(report)
    }

    /// Run n sols in a loop. Used for testing and fast-forward.
    pub fn run_sols(&mut self, n: u64) -> SimResult<()> {
        self.clock.resume();
        for _ in 0..n {
            if let Err(e) = self.step() {
                self.clock.pause();
                return Err(e);
            }
        }
        self.clock.pause();
        Ok(())
    }

    /// Run until the configured limit, then flush.
    pub fn run(&mut self) -> SimResult<()> {
        match self.ctx.config.limit {
            Limit::Sols(last) => self.run_sols(last.saturating_sub(self.clock.current_sol))?,
            Limit::Population(target) => {
                self.clock.resume();
                let result = self.run_to_population(target);
                self.clock.pause();
                result?;
            }
        }
        self.flush()
    }

    fn run_to_population(&mut self, target: u64) -> SimResult<()> {
        let sim = self.ctx.simulation_id.clone();
        loop {
            self.step()?;
            let living = self.store.living_population(&sim)?;
            if living >= target {
                log::info!("{} population reached {living}", sol_label(self.clock.current_sol));
                return Ok(());
            }
            if living == 0 && self.clock.current_sol >= self.ctx.config.first_mission_lands {
                log::warn!("{} population died out", sol_label(self.clock.current_sol));
                return Ok(());
            }
        }
    }

    /// Save the resume point and, for an in-memory store, copy the
    /// database to `backup_path`.
    pub fn flush(&self) -> SimResult<()> {
        let sol = self.clock.current_sol;
        self.save_snapshot()?;

        if let (true, Some(path)) = (self.store.is_in_memory(), &self.ctx.config.backup_path) {
            self.store.backup_to(path)?;
            log::info!("{} database backed up to {path}", sol_label(sol));
        }
        Ok(())
    }

    fn save_snapshot(&self) -> SimResult<()> {
        let sol = self.clock.current_sol;
        let snapshot = SimSnapshot {
            simulation_id: self.ctx.simulation_id.clone(),
            sol,
            clock:         self.clock.clone(),
            rng_state:     self.rng.state(),
        };
        self.store.save_snapshot(&self.ctx.simulation_id, sol, &snapshot.to_json()?)?;
        log::debug!("{} snapshot saved", sol_label(sol));
        Ok(())
    }

    fn log_summary(&self, sol: Sol) -> SimResult<()> {
        let sim = self.ctx.simulation_id.as_str();
        let living = self.store.living_population(sim)?;
        let singles = self.store.singles_count(sim)?;
        let stats = self.genealogy.cache_stats();
        log::info!(
            "{} population={living} singles={singles} eligibility cache {}/{} hits={} misses={}",
            sol_label(sol),
            stats.size,
            stats.capacity,
            stats.hits,
            stats.misses
        );
        Ok(())
    }

    pub fn simulation_id(&self) -> &str {
        &self.ctx.simulation_id
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.ctx.config
    }

    pub fn current_sol(&self) -> Sol {
        self.clock.current_sol
    }

    pub fn commodity_ids(&self) -> &CommodityIds {
        &self.commodity_ids
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.genealogy.cache_stats()
    }
}
