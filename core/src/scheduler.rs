//! Persistent discrete-event scheduler.
//!
//! Work is registered as "run this `EventKind` on sol S, optionally every
//! P sols after that, at priority R" and stored in the `events` table.
//! Once per sol the driver calls `invoke_due`, which fires every due
//! event in `(priority, creation order, idx)` order.
//!
//! A failing event is logged with its name and arguments and the
//! remaining events still run. Only configuration errors escape.

use crate::{
    config::SimulationContext,
    error::SimResult,
    event::{EventKind, ScheduledEvent},
    store::SimStore,
    types::{sol_label, SimulationId, Sol},
};

// Fixed priorities. Lower runs first within a sol.
pub const PRIORITY_DEFAULT: i64 = 20;
pub const PRIORITY_LANDING: i64 = 20;
pub const PRIORITY_MAINTENANCE: i64 = 25;
pub const PRIORITY_CARRY_FORWARD: i64 = 30;
pub const PRIORITY_PAIRING: i64 = 35;
pub const PRIORITY_CONSUMPTION: i64 = 40;
pub const PRIORITY_SUPPLY: i64 = 50;
pub const PRIORITY_RECONCILIATION: i64 = 100;

/// Receives each due event. The engine implements this over its
/// components; tests implement it to observe firing order.
pub trait EventHandler {
    /// `idx` tells same-named events registered for the same sol apart.
    fn handle(&mut self, sol: Sol, idx: i64, kind: &EventKind) -> SimResult<()>;
}

/// Outcome of one sol's invocation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvokeReport {
    pub fired: usize,
    pub failed: usize,
}

pub struct Scheduler {
    simulation_id: SimulationId,
}

impl Scheduler {
    pub fn new(ctx: &SimulationContext) -> Self {
        Self { simulation_id: ctx.simulation_id.clone() }
    }

    /// One-shot event at the default priority.
    pub fn register(&self, store: &SimStore, now: Sol, run_on: Sol, kind: &EventKind) -> SimResult<ScheduledEvent> {
        self.register_with(store, now, run_on, PRIORITY_DEFAULT, 0, kind)
    }

    /// Persist an event. `idx` is the number of events already registered
    /// for `run_on` under the same name.
    pub fn register_with(
        &self,
        store: &SimStore,
        now: Sol,
        run_on: Sol,
        priority: i64,
        periodic: u64,
        kind: &EventKind,
    ) -> SimResult<ScheduledEvent> {
        let (function_name, args) = kind.to_parts()?;
        let idx = store.count_events(&self.simulation_id, run_on, &function_name)?;
        let mut event = ScheduledEvent {
            id: None,
            simulation_id: self.simulation_id.clone(),
            registered: now,
            run_on,
            priority,
            periodic,
            idx,
            function_name,
            args,
        };
        event.id = Some(store.insert_event(&event)?);

        log::trace!(
            "{} registered {}() for sol {} ({}) priority={} periodic={} idx={}",
            sol_label(now),
            event.function_name,
            run_on,
            sol_label(run_on),
            priority,
            periodic,
            idx
        );
        Ok(event)
    }

    pub fn due(&self, store: &SimStore, sol: Sol) -> SimResult<Vec<ScheduledEvent>> {
        store.due_events(&self.simulation_id, sol)
    }

    /// Fire everything due on `sol`. Each event runs inside its own
    /// savepoint, so a failed event leaves no partial writes behind.
    pub fn invoke_due<H: EventHandler>(
        &self,
        store: &SimStore,
        sol: Sol,
        handler: &mut H,
    ) -> SimResult<InvokeReport> {
        let due = self.due(store, sol)?;
        let mut report = InvokeReport::default();
        if due.is_empty() {
            return Ok(report);
        }
        log::debug!("{} processing {} scheduled events", sol_label(sol), due.len());

        for event in &due {
            store.begin_event()?;
            let result = event.kind().and_then(|kind| handler.handle(sol, event.idx, &kind));
            match result {
                Ok(()) => {
                    store.release_event()?;
                    report.fired += 1;
                }
                Err(e) if e.is_fatal() => {
                    store.rollback_event()?;
                    log::error!(
                        "{} {}() failed fatally (event id={:?} idx={} args={}): {e}",
                        sol_label(sol),
                        event.function_name,
                        event.id,
                        event.idx,
                        event.args
                    );
                    return Err(e);
                }
                Err(e) => {
                    store.rollback_event()?;
                    report.failed += 1;
                    log::error!(
                        "{} {}() failed (event id={:?} idx={} run_on={} args={}): {e}",
                        sol_label(sol),
                        event.function_name,
                        event.id,
                        event.idx,
                        event.run_on,
                        event.args
                    );
                }
            }
        }
        Ok(report)
    }
}
