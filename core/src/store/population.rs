//! Store methods for settlers and their relationships.

use std::collections::HashSet;

use rusqlite::{params, OptionalExtension, Row};

use super::SimStore;
use crate::{
    error::{SimError, SimResult},
    genealogy::{Relationship, RelationshipKind},
    population::{Settler, SettlerState},
    types::{EntityId, Sol},
};

fn settler_from_row(row: &Row<'_>) -> rusqlite::Result<Settler> {
    let sex: String = row.get(1)?;
    let state: String = row.get(3)?;
    Ok(Settler {
        settler_id: row.get(0)?,
        sex: sex.parse().map_err(|e: SimError| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?,
        orientation: row.get(2)?,
        state: if state == "couple" { SettlerState::Couple } else { SettlerState::Single },
        birth_sol: row.get(4)?,
        death_sol: row.get::<_, i64>(5)? as u64,
        biological_mother: row.get(6)?,
        biological_father: row.get(7)?,
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    let code: i64 = row.get(3)?;
    Ok(Relationship {
        relationship_id: row.get(0)?,
        first: row.get(1)?,
        second: row.get(2)?,
        kind: RelationshipKind::from_code(code).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Integer, Box::new(e))
        })?,
        begin_sol: row.get::<_, i64>(4)? as u64,
        end_sol: row.get::<_, i64>(5)? as u64,
    })
}

const SETTLER_COLUMNS: &str = "settler_id, sex, orientation, state, birth_sol, death_sol,
     biological_mother, biological_father";

const RELATIONSHIP_COLUMNS: &str =
    "relationship_id, first, second, relationship_kind, begin_sol, end_sol";

impl SimStore {
    // ── Settlers ───────────────────────────────────────────────

    pub fn insert_settler(&self, simulation_id: &str, s: &Settler) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO settlers (
                simulation_id, settler_id, sex, orientation, state, birth_sol, death_sol,
                biological_mother, biological_father
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                simulation_id,
                s.settler_id,
                s.sex.as_str(),
                s.orientation,
                s.state.as_str(),
                s.birth_sol,
                s.death_sol as i64,
                s.biological_mother,
                s.biological_father,
            ],
        )?;
        Ok(())
    }

    pub fn settler(&self, simulation_id: &str, settler_id: &str) -> SimResult<Option<Settler>> {
        let settler = self
            .conn
            .query_row(
                &format!(
                    "SELECT {SETTLER_COLUMNS} FROM settlers
                     WHERE simulation_id = ?1 AND settler_id = ?2"
                ),
                params![simulation_id, settler_id],
                settler_from_row,
            )
            .optional()?;
        Ok(settler)
    }

    pub fn set_death_sol(&self, simulation_id: &str, settler_id: &str, sol: Sol) -> SimResult<()> {
        let changed = self.conn.execute(
            "UPDATE settlers SET death_sol = ?3
             WHERE simulation_id = ?1 AND settler_id = ?2 AND death_sol = 0",
            params![simulation_id, settler_id, sol as i64],
        )?;
        if changed == 0 {
            return Err(SimError::lookup("living settler", settler_id));
        }
        Ok(())
    }

    /// Set the state of each listed settler that is still alive.
    pub fn set_settler_state(&self, simulation_id: &str, ids: &[&str], state: SettlerState) -> SimResult<()> {
        for id in ids {
            self.conn.execute(
                "UPDATE settlers SET state = ?3
                 WHERE simulation_id = ?1 AND settler_id = ?2 AND death_sol = 0",
                params![simulation_id, id, state.as_str()],
            )?;
        }
        Ok(())
    }

    pub fn living_population(&self, simulation_id: &str) -> SimResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM settlers WHERE simulation_id = ?1 AND death_sol = 0",
            params![simulation_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn singles_count(&self, simulation_id: &str) -> SimResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM settlers
             WHERE simulation_id = ?1 AND death_sol = 0 AND state = 'single'",
            params![simulation_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Living single settlers born on or before `born_by`, oldest first.
    pub fn single_adults(&self, simulation_id: &str, born_by: i64) -> SimResult<Vec<Settler>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {SETTLER_COLUMNS} FROM settlers
             WHERE simulation_id = ?1 AND death_sol = 0 AND state = 'single' AND birth_sol <= ?2
             ORDER BY birth_sol ASC, rowid ASC"
        ))?;
        let rows = stmt
            .query_map(params![simulation_id, born_by], settler_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Relationships ──────────────────────────────────────────

    pub fn insert_relationship(&self, simulation_id: &str, r: &Relationship) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO relationships (
                simulation_id, relationship_id, first, second, relationship_kind, begin_sol, end_sol
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                simulation_id,
                r.relationship_id,
                r.first,
                r.second,
                r.kind.code(),
                r.begin_sol as i64,
                r.end_sol as i64,
            ],
        )?;
        Ok(())
    }

    pub fn relationship(&self, simulation_id: &str, relationship_id: &str) -> SimResult<Option<Relationship>> {
        let rel = self
            .conn
            .query_row(
                &format!(
                    "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
                     WHERE simulation_id = ?1 AND relationship_id = ?2"
                ),
                params![simulation_id, relationship_id],
                relationship_from_row,
            )
            .optional()?;
        Ok(rel)
    }

    pub fn end_relationship(&self, simulation_id: &str, relationship_id: &str, sol: Sol) -> SimResult<()> {
        self.conn.execute(
            "UPDATE relationships SET end_sol = ?3
             WHERE simulation_id = ?1 AND relationship_id = ?2 AND end_sol = 0",
            params![simulation_id, relationship_id, sol as i64],
        )?;
        Ok(())
    }

    /// Ongoing partnerships either side of which is `settler_id`.
    pub fn ongoing_partnerships(&self, simulation_id: &str, settler_id: &str) -> SimResult<Vec<Relationship>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
             WHERE simulation_id = ?1 AND relationship_kind = ?3 AND end_sol = 0
               AND (first = ?2 OR second = ?2)"
        ))?;
        let rows = stmt
            .query_map(
                params![simulation_id, settler_id, RelationshipKind::Partner.code()],
                relationship_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every recorded ancestor of `settler_id` with its rung.
    pub fn ancestor_rows(&self, simulation_id: &str, settler_id: &str) -> SimResult<Vec<(EntityId, RelationshipKind)>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships
             WHERE simulation_id = ?1 AND first = ?2 AND relationship_kind >= ?3
             ORDER BY relationship_kind ASC, rowid ASC"
        ))?;
        let rows = stmt
            .query_map(
                params![simulation_id, settler_id, RelationshipKind::Parent.code()],
                relationship_from_row,
            )?
            .map(|r| r.map(|r| (r.second, r.kind)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Ancestors of `settler_id` within `depth` generations.
    pub fn ancestors_of(&self, simulation_id: &str, settler_id: &str, depth: u8) -> SimResult<HashSet<EntityId>> {
        if depth == 0 {
            return Ok(HashSet::new());
        }
        let lowest = RelationshipKind::Parent.code();
        let highest = lowest + depth as i64 - 1;
        let mut stmt = self.conn.prepare_cached(
            "SELECT second FROM relationships
             WHERE simulation_id = ?1 AND first = ?2
               AND relationship_kind BETWEEN ?3 AND ?4",
        )?;
        let ancestors = stmt
            .query_map(params![simulation_id, settler_id, lowest, highest], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ancestors)
    }
}
