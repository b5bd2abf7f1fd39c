//! Day-stepped colony simulation kernel.
//!
//! A persistent event scheduler drives everything: the resource economy
//! pipeline, mission landings, pairing, births and deaths. State lives
//! in SQLite so a run can be flushed and resumed bit-for-bit.

pub mod clock;
pub mod commodity;
pub mod config;
pub mod distribution;
pub mod economy;
pub mod engine;
pub mod error;
pub mod event;
pub mod genealogy;
pub mod population;
pub mod rng;
pub mod scheduler;
pub mod snapshot;
pub mod store;
pub mod types;
