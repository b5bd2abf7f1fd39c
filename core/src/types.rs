//! Shared primitive types used across the entire simulation.

/// A simulated day. Sol 1 is the day the first lander touches down.
pub type Sol = u64;

/// A stable, unique identifier for any entity in the simulation.
pub type EntityId = String;

/// The canonical simulation identifier.
pub type SimulationId = String;

/// Sols in one Martian year.
pub const SOLS_PER_YEAR: Sol = 668;

/// Earth days per sol.
const EARTH_DAYS_PER_SOL: f64 = 1.027_491_25;

/// Split an absolute sol into `(year, sol_of_year)`.
/// Landing day reads as year 1, so logs start at `1.001`.
pub fn from_sols(sol: Sol) -> (u64, u64) {
    (sol / SOLS_PER_YEAR + 1, sol % SOLS_PER_YEAR)
}

/// `YEAR.SOL` form used as the prefix of every log line.
pub fn sol_label(sol: Sol) -> String {
    let (year, day) = from_sols(sol);
    format!("{year}.{day:03}")
}

/// Map earth years onto sols, useful for ages and lifespans.
pub fn years_to_sols(years: f64) -> f64 {
    (years * 365.25 * EARTH_DAYS_PER_SOL).trunc()
}
