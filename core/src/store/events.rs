//! Store methods for the event scheduler.

use rusqlite::{params, Row};

use super::SimStore;
use crate::{error::SimResult, event::ScheduledEvent, types::Sol};

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<ScheduledEvent> {
    Ok(ScheduledEvent {
        id: Some(row.get(0)?),
        simulation_id: row.get(1)?,
        registered: row.get::<_, i64>(2)? as u64,
        run_on: row.get::<_, i64>(3)? as u64,
        priority: row.get(4)?,
        periodic: row.get::<_, i64>(5)? as u64,
        idx: row.get(6)?,
        function_name: row.get(7)?,
        args: row.get(8)?,
    })
}

impl SimStore {
    /// Persist an event and return its row id (the creation order).
    pub fn insert_event(&self, event: &ScheduledEvent) -> SimResult<i64> {
        self.conn.execute(
            "INSERT INTO events (
                simulation_id, registered, run_on, priority, periodic, idx, function_name, args
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                event.simulation_id,
                event.registered as i64,
                event.run_on as i64,
                event.priority,
                event.periodic as i64,
                event.idx,
                event.function_name,
                event.args,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Events already registered for `run_on` under `function_name`.
    pub fn count_events(&self, simulation_id: &str, run_on: Sol, function_name: &str) -> SimResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events
             WHERE simulation_id = ?1 AND run_on = ?2 AND function_name = ?3",
            params![simulation_id, run_on as i64, function_name],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Events due on `sol`: those first due today, plus periodic events
    /// whose interval lands on today. Ordered by priority, then creation
    /// order, then idx.
    pub fn due_events(&self, simulation_id: &str, sol: Sol) -> SimResult<Vec<ScheduledEvent>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, simulation_id, registered, run_on, priority, periodic, idx, function_name, args
             FROM events
             WHERE simulation_id = ?1
               AND (run_on = ?2
                    OR (?2 > run_on AND periodic > 0 AND (?2 - run_on) % periodic = 0))
             ORDER BY priority ASC, id ASC, idx ASC",
        )?;
        let events = stmt
            .query_map(params![simulation_id, sol as i64], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    /// Every event registered for a simulation, in creation order.
    pub fn all_events(&self, simulation_id: &str) -> SimResult<Vec<ScheduledEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, simulation_id, registered, run_on, priority, periodic, idx, function_name, args
             FROM events WHERE simulation_id = ?1 ORDER BY id ASC",
        )?;
        let events = stmt
            .query_map(params![simulation_id], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}
