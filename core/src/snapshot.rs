//! Snapshot serialization: the state needed to resume a run.
//!
//! Everything else lives in the store already. A snapshot only adds
//! what is held in memory: the clock and the exact generator state.

use crate::{
    clock::SimClock,
    error::SimResult,
    rng::RngState,
    types::{SimulationId, Sol},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSnapshot {
    pub simulation_id: SimulationId,
    pub sol:           Sol,
    pub clock:         SimClock,
    pub rng_state:     RngState,
}

impl SimSnapshot {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
