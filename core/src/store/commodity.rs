//! Store methods for the resource economy.

use rusqlite::{params, OptionalExtension, Row};

use super::SimStore;
use crate::{
    commodity::{
        CommodityEntity, CommodityIds, CommodityKind, Consumer, EntityTable, Reservoir, Supplier,
        Usage,
    },
    error::{SimError, SimResult},
    types::Sol,
};

fn kind_from_sql(idx: usize, text: String) -> rusqlite::Result<CommodityKind> {
    text.parse().map_err(|e: SimError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn reservoir_from_row(row: &Row<'_>) -> rusqlite::Result<Reservoir> {
    Ok(Reservoir {
        store_id: row.get(0)?,
        commodity_id: row.get(1)?,
        commodity: kind_from_sql(2, row.get(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        max_capacity: row.get(5)?,
        availability: row.get(6)?,
        is_online: row.get(7)?,
    })
}

fn supplier_from_row(row: &Row<'_>) -> rusqlite::Result<Supplier> {
    Ok(Supplier {
        supplier_id: row.get(0)?,
        commodity_id: row.get(1)?,
        commodity: kind_from_sql(2, row.get(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        supplies: row.get(5)?,
        availability: row.get(6)?,
        is_online: row.get(7)?,
    })
}

fn consumer_from_row(row: &Row<'_>) -> rusqlite::Result<Consumer> {
    Ok(Consumer {
        consumer_id: row.get(0)?,
        commodity_id: row.get(1)?,
        commodity: kind_from_sql(2, row.get(2)?)?,
        name: row.get(3)?,
        description: row.get(4)?,
        consumes: row.get(5)?,
        availability: row.get(6)?,
        is_online: row.get(7)?,
        is_per_settler: row.get(8)?,
    })
}

impl SimStore {
    // ── Commodities ────────────────────────────────────────────

    pub fn insert_commodity(&self, simulation_id: &str, commodity_id: &str, kind: CommodityKind) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO commodities (simulation_id, commodity_id, kind) VALUES (?1, ?2, ?3)",
            params![simulation_id, commodity_id, kind.as_str()],
        )?;
        Ok(())
    }

    pub fn commodity_ids(&self, simulation_id: &str) -> SimResult<CommodityIds> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, commodity_id FROM commodities WHERE simulation_id = ?1")?;
        let ids = stmt
            .query_map(params![simulation_id], |row| {
                Ok((kind_from_sql(0, row.get(0)?)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<CommodityIds, _>>()?;
        Ok(ids)
    }

    // ── Reservoirs, suppliers, consumers ───────────────────────

    pub fn insert_reservoir(&self, simulation_id: &str, r: &Reservoir) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO commodity_reservoirs (
                simulation_id, store_id, commodity_id, commodity, name, description,
                max_capacity, availability, is_online
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                simulation_id,
                r.store_id,
                r.commodity_id,
                r.commodity.as_str(),
                r.name,
                r.description,
                r.max_capacity,
                r.availability,
                r.is_online,
            ],
        )?;
        Ok(())
    }

    pub fn insert_supplier(&self, simulation_id: &str, s: &Supplier) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO commodity_suppliers (
                simulation_id, supplier_id, commodity_id, commodity, name, description,
                supplies, availability, is_online
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                simulation_id,
                s.supplier_id,
                s.commodity_id,
                s.commodity.as_str(),
                s.name,
                s.description,
                s.supplies,
                s.availability,
                s.is_online,
            ],
        )?;
        Ok(())
    }

    pub fn insert_consumer(&self, simulation_id: &str, c: &Consumer) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO commodity_consumers (
                simulation_id, consumer_id, commodity_id, commodity, name, description,
                consumes, availability, is_online, is_per_settler
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                simulation_id,
                c.consumer_id,
                c.commodity_id,
                c.commodity.as_str(),
                c.name,
                c.description,
                c.consumes,
                c.availability,
                c.is_online,
                c.is_per_settler,
            ],
        )?;
        Ok(())
    }

    /// All reservoirs, in creation order.
    pub fn reservoirs(&self, simulation_id: &str) -> SimResult<Vec<Reservoir>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT store_id, commodity_id, commodity, name, description, max_capacity,
                    availability, is_online
             FROM commodity_reservoirs WHERE simulation_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id], reservoir_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn reservoirs_for(&self, simulation_id: &str, commodity_id: &str) -> SimResult<Vec<Reservoir>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT store_id, commodity_id, commodity, name, description, max_capacity,
                    availability, is_online
             FROM commodity_reservoirs WHERE simulation_id = ?1 AND commodity_id = ?2
             ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id, commodity_id], reservoir_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn suppliers(&self, simulation_id: &str) -> SimResult<Vec<Supplier>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT supplier_id, commodity_id, commodity, name, description, supplies,
                    availability, is_online
             FROM commodity_suppliers WHERE simulation_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id], supplier_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn consumers(&self, simulation_id: &str) -> SimResult<Vec<Consumer>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT consumer_id, commodity_id, commodity, name, description, consumes,
                    availability, is_online, is_per_settler
             FROM commodity_consumers WHERE simulation_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id], consumer_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Flip a supplier, consumer or reservoir on or offline.
    pub fn set_online(&self, simulation_id: &str, entity: &CommodityEntity, online: bool) -> SimResult<()> {
        let sql = match entity.table {
            EntityTable::Supplier => {
                "UPDATE commodity_suppliers SET is_online = ?3 WHERE simulation_id = ?1 AND supplier_id = ?2"
            }
            EntityTable::Consumer => {
                "UPDATE commodity_consumers SET is_online = ?3 WHERE simulation_id = ?1 AND consumer_id = ?2"
            }
            EntityTable::Reservoir => {
                "UPDATE commodity_reservoirs SET is_online = ?3 WHERE simulation_id = ?1 AND store_id = ?2"
            }
        };
        let changed = self.conn.execute(sql, params![simulation_id, entity.id, online])?;
        if changed == 0 {
            return Err(SimError::lookup(entity.table.as_str(), entity.id.clone()));
        }
        Ok(())
    }

    // ── Capacity snapshots ─────────────────────────────────────

    pub fn upsert_capacity(
        &self,
        simulation_id: &str,
        store_id: &str,
        sol: Sol,
        capacity: f64,
        is_online: bool,
    ) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO commodity_reservoir_capacity (simulation_id, store_id, sol, capacity, is_online)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(simulation_id, store_id, sol) DO UPDATE SET
                capacity = excluded.capacity,
                is_online = excluded.is_online",
            params![simulation_id, store_id, sol as i64, capacity, is_online],
        )?;
        Ok(())
    }

    pub fn capacity_on(&self, simulation_id: &str, store_id: &str, sol: Sol) -> SimResult<Option<f64>> {
        let capacity = self
            .conn
            .query_row(
                "SELECT capacity FROM commodity_reservoir_capacity
                 WHERE simulation_id = ?1 AND store_id = ?2 AND sol = ?3",
                params![simulation_id, store_id, sol as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(capacity)
    }

    /// Copy every reservoir's previous-sol snapshot forward to `sol`.
    /// Reservoirs that already have a row for `sol` keep it.
    pub fn carry_capacity_forward(&self, simulation_id: &str, sol: Sol) -> SimResult<usize> {
        let copied = self.conn.execute(
            "INSERT OR IGNORE INTO commodity_reservoir_capacity (simulation_id, store_id, sol, capacity, is_online)
             SELECT c.simulation_id, c.store_id, ?2, c.capacity, r.is_online
             FROM commodity_reservoir_capacity c
             JOIN commodity_reservoirs r ON r.store_id = c.store_id
             WHERE c.simulation_id = ?1 AND c.sol = ?2 - 1",
            params![simulation_id, sol as i64],
        )?;
        Ok(copied)
    }

    /// Total stored capacity per commodity kind on `sol`.
    pub fn commodity_storage(&self, simulation_id: &str, sol: Sol) -> SimResult<Vec<(CommodityKind, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.commodity, COALESCE(SUM(c.capacity), 0.0)
             FROM commodity_reservoirs r
             JOIN commodity_reservoir_capacity c
               ON c.store_id = r.store_id AND c.sol = ?2
             WHERE r.simulation_id = ?1
             GROUP BY r.commodity ORDER BY r.commodity",
        )?;
        let rows = stmt
            .query_map(params![simulation_id, sol as i64], |row| {
                Ok((kind_from_sql(0, row.get(0)?)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Usage ──────────────────────────────────────────────────

    /// Record one sol's usage. Written once per key per sol.
    pub fn insert_usage(&self, simulation_id: &str, u: &Usage) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO commodity_usage (simulation_id, commodity_id, key_type, key_id, sol, debit, credit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                simulation_id,
                u.commodity_id,
                u.key_type.as_str(),
                u.key_id,
                u.sol as i64,
                u.debit,
                u.credit,
            ],
        )?;
        Ok(())
    }

    pub fn usage_for_sol(&self, simulation_id: &str, commodity_id: &str, sol: Sol) -> SimResult<Vec<Usage>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT commodity_id, key_type, key_id, sol, debit, credit
             FROM commodity_usage
             WHERE simulation_id = ?1 AND commodity_id = ?2 AND sol = ?3
             ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![simulation_id, commodity_id, sol as i64], |row| {
                let key_type = match row.get::<_, String>(1)?.as_str() {
                    "supplier" => EntityTable::Supplier,
                    "consumer" => EntityTable::Consumer,
                    _ => EntityTable::Reservoir,
                };
                Ok(Usage {
                    commodity_id: row.get(0)?,
                    key_type,
                    key_id: row.get(2)?,
                    sol: row.get::<_, i64>(3)? as u64,
                    debit: row.get(4)?,
                    credit: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ── Starvation ─────────────────────────────────────────────

    pub fn insert_starvation(&self, simulation_id: &str, commodity_id: &str, sol: Sol) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO commodity_starvation (simulation_id, commodity_id, sol)
             VALUES (?1, ?2, ?3)",
            params![simulation_id, commodity_id, sol as i64],
        )?;
        Ok(())
    }

    pub fn starvation_sols(&self, simulation_id: &str, commodity_id: &str) -> SimResult<Vec<Sol>> {
        let mut stmt = self.conn.prepare(
            "SELECT sol FROM commodity_starvation
             WHERE simulation_id = ?1 AND commodity_id = ?2 ORDER BY sol ASC",
        )?;
        let sols = stmt
            .query_map(params![simulation_id, commodity_id], |row| {
                Ok(row.get::<_, i64>(0)? as u64)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sols)
    }
}
