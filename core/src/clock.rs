//! Simulation clock: owns the current sol and pause state.

use crate::types::{SimulationId, Sol};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub simulation_id: SimulationId,
    pub current_sol:   Sol,
    pub paused:        bool,
}

impl SimClock {
    pub fn new(simulation_id: SimulationId) -> Self {
        Self {
            simulation_id,
            current_sol: 0,
            paused: true,
        }
    }

    /// Advance one sol. Returns the new sol.
    /// Panics if called while paused; callers must check.
    pub fn advance(&mut self) -> Sol {
        assert!(!self.paused, "advance() called on paused clock");
        self.current_sol += 1;
        self.current_sol
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_paused_at_sol_zero() {
        let clock = SimClock::new("sim".into());
        assert_eq!(clock.current_sol, 0);
        assert!(clock.paused);
    }

    #[test]
    fn advance_counts_sols() {
        let mut clock = SimClock::new("sim".into());
        clock.resume();
        assert_eq!(clock.advance(), 1);
        assert_eq!(clock.advance(), 2);
    }

    #[test]
    #[should_panic(expected = "paused clock")]
    fn advance_while_paused_panics() {
        SimClock::new("sim".into()).advance();
    }
}
