//! colony-runner: headless driver for the colony simulation.
//!
//! Usage:
//!   colony-runner --seed 12345 --sols 6680 --db colony.db
//!   colony-runner --config colony.json --backup colony.db
//!   colony-runner --db colony.db --resume sim-12345 --sols 668

use anyhow::{Context, Result};
use colony_core::{
    config::{Limit, SimulationConfig, SimulationContext},
    engine::SimEngine,
    store::SimStore,
    types::sol_label,
};
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let resume = string_arg(&args, "--resume");

    let engine = match resume {
        Some(simulation_id) => {
            let store = SimStore::open(db)?;
            let mut engine = SimEngine::resume(simulation_id, store)
                .with_context(|| format!("cannot resume {simulation_id} from {db}"))?;
            let extra = parse_arg(&args, "--sols", 668u64);
            println!("Resuming {simulation_id} at sol {} for {extra} sols", engine.current_sol());
            engine.run_sols(extra)?;
            engine.flush()?;
            engine
        }
        None => {
            let mut config = match string_arg(&args, "--config") {
                Some(path) => SimulationConfig::load(path)?,
                None => SimulationConfig::default(),
            };
            config.seed = parse_arg(&args, "--seed", config.seed);
            if let Some(sols) = args.windows(2).find(|w| w[0] == "--sols").and_then(|w| w[1].parse().ok()) {
                config.limit = Limit::Sols(sols);
            }
            if let Some(target) = args.windows(2).find(|w| w[0] == "--population").and_then(|w| w[1].parse().ok()) {
                config.limit = Limit::Population(target);
            }
            if let Some(path) = string_arg(&args, "--backup") {
                config.backup_path = Some(path.to_string());
            }

            println!("Colony simulation runner");
            println!("  seed:   {}", config.seed);
            println!("  limit:  {:?}", config.limit);
            println!("  db:     {db}");
            println!();

            let store = if db == ":memory:" { SimStore::in_memory()? } else { SimStore::open(db)? };
            store.migrate()?;
            let simulation_id = format!("sim-{}", config.seed);
            let mut engine = SimEngine::build(SimulationContext::new(simulation_id, config), store)?;
            engine.run()?;
            engine
        }
    };

    print_summary(&engine)
}

fn print_summary(engine: &SimEngine) -> Result<()> {
    let sim = engine.simulation_id().to_string();
    let sol = engine.current_sol();
    println!();
    println!("Simulation {sim} stopped at {} (sol {sol})", sol_label(sol));
    println!("  living settlers: {}", engine.store.living_population(&sim)?);
    println!("  singles:         {}", engine.store.singles_count(&sim)?);
    println!("  storage:");
    for (commodity, total) in engine.store.commodity_storage(&sim, sol)? {
        println!("    {commodity:<12} {total:>12.2}");
    }
    let stats = engine.cache_stats();
    println!(
        "  eligibility cache: {}/{} entries, {} hits, {} misses",
        stats.size, stats.capacity, stats.hits, stats.misses
    );
    log::debug!("Summary printed for {sim}");
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
