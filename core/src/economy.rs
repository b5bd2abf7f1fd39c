//! Resource economy pipeline.
//!
//! EXECUTION ORDER (fixed by scheduler priority, run once per sol):
//!   20  landing: new suppliers, consumers and reservoirs appear
//!   25  maintenance: availability rolls; failures go offline next sol
//!   30  carry forward: yesterday's reservoir snapshot copied to today
//!   40  consumption: one debit row per consumer
//!   50  supply: one credit row per supplier
//!  100  reconciliation: net delta split across online reservoirs
//!
//! RULES:
//!   - A reservoir's capacity on sol N is sol N-1's snapshot plus sol N's
//!     share of the delta. It is never recomputed from scratch.
//!   - Offline consumers and suppliers still write a zero row, so
//!     reconciliation never special-cases a missing row.
//!   - The delta is split evenly across the commodity's ONLINE reservoirs.

use crate::{
    commodity::{
        CommodityEntity, CommodityKind, Consumer, EntityTable, Reservoir, ResourceSpec, Supplier,
        Usage,
    },
    distribution::parse_random_value,
    engine::SolContext,
    error::{SimError, SimResult},
    event::EventKind,
    scheduler::PRIORITY_LANDING,
    types::{sol_label, Sol},
};

/// An availability sample below this takes the entity offline.
pub const AVAILABILITY_THRESHOLD: f64 = 0.5;

/// Sols between an availability failure and the entity coming back.
const OUTAGE_SOLS: Sol = 2;

fn entity_name(label: &str, id: &str) -> String {
    format!("{label}-{}", &id[..id.len().min(8)])
}

fn label(description: &str, commodity: CommodityKind, role: &str) -> String {
    if description.is_empty() {
        format!("{commodity}-{role}")
    } else {
        description.to_string()
    }
}

// ── Landing / creation ────────────────────────────────────────────

/// Bring every resource in `specs` into existence on the current sol.
/// A malformed spec is a configuration error.
pub fn land_resources(cx: &mut SolContext<'_>, specs: &[String]) -> SimResult<()> {
    for raw in specs {
        let spec: ResourceSpec = raw.parse()?;
        create_resource(cx, &spec, true)?;
    }
    Ok(())
}

/// Create one supplier, consumer or reservoir. Returns the new entity.
pub fn create_resource(cx: &mut SolContext<'_>, spec: &ResourceSpec, online: bool) -> SimResult<CommodityEntity> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let commodity = spec.commodity();
    let commodity_id = cx
        .commodity_ids
        .get(&commodity)
        .cloned()
        .ok_or_else(|| SimError::lookup("commodity", commodity.as_str()))?;
    let id = cx.rng.id();

    let entity = match spec {
        ResourceSpec::Supply { supplies, availability, description, .. } => {
            let s = Supplier {
                supplier_id: id.clone(),
                commodity_id,
                commodity,
                name: entity_name(&label(description, commodity, "supplier"), &id),
                description: description.clone(),
                supplies: supplies.clone(),
                availability: availability.clone(),
                is_online: online,
            };
            cx.store.insert_supplier(sim, &s)?;
            log::info!("{} supplier {} ({}) of {commodity} online={online}", sol_label(cx.sol), s.name, s.supplies);
            CommodityEntity { table: EntityTable::Supplier, id }
        }
        ResourceSpec::Consume { consumes, availability, per_settler, description, .. } => {
            let c = Consumer {
                consumer_id: id.clone(),
                commodity_id,
                commodity,
                name: entity_name(&label(description, commodity, "consumer"), &id),
                description: description.clone(),
                consumes: consumes.clone(),
                availability: availability.clone(),
                is_online: online,
                is_per_settler: *per_settler,
            };
            cx.store.insert_consumer(sim, &c)?;
            log::info!("{} consumer {} ({}) of {commodity} online={online}", sol_label(cx.sol), c.name, c.consumes);
            CommodityEntity { table: EntityTable::Consumer, id }
        }
        ResourceSpec::Reservoir { max_capacity, initial_capacity, availability, description, .. } => {
            let max = parse_random_value(max_capacity, f64::MAX, cx.rng)?;
            let initial = parse_random_value(initial_capacity, 0.0, cx.rng)?.min(max);
            let r = Reservoir {
                store_id: id.clone(),
                commodity_id,
                commodity,
                name: entity_name(&label(description, commodity, "reservoir"), &id),
                description: description.clone(),
                max_capacity: max,
                availability: availability.clone(),
                is_online: online,
            };
            cx.store.insert_reservoir(sim, &r)?;
            // First snapshot comes from the initial sample, not reconciliation.
            cx.store.upsert_capacity(sim, &r.store_id, cx.sol, initial, online)?;
            log::info!("{} reservoir {} of {commodity} holding {initial:.3}/{max:.3}", sol_label(cx.sol), r.name);
            CommodityEntity { table: EntityTable::Reservoir, id }
        }
    };
    Ok(entity)
}

pub fn set_online(cx: &mut SolContext<'_>, entity: &CommodityEntity, online: bool) -> SimResult<()> {
    cx.store.set_online(&cx.ctx.simulation_id, entity, online)?;
    log::debug!(
        "{} {} {} is now {}",
        sol_label(cx.sol),
        entity.table.as_str(),
        entity.id,
        if online { "online" } else { "offline" }
    );
    Ok(())
}

// ── Maintenance ───────────────────────────────────────────────────

/// Roll availability for everything currently online. A failure takes the
/// entity offline from the next sol and back online one sol after that.
pub fn maintenance(cx: &mut SolContext<'_>) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let mut candidates: Vec<(CommodityEntity, String, String)> = Vec::new();
    for s in cx.store.suppliers(sim)?.into_iter().filter(|s| s.is_online) {
        candidates.push((CommodityEntity { table: EntityTable::Supplier, id: s.supplier_id }, s.name, s.availability));
    }
    for c in cx.store.consumers(sim)?.into_iter().filter(|c| c.is_online) {
        candidates.push((CommodityEntity { table: EntityTable::Consumer, id: c.consumer_id }, c.name, c.availability));
    }
    for r in cx.store.reservoirs(sim)?.into_iter().filter(|r| r.is_online) {
        candidates.push((CommodityEntity { table: EntityTable::Reservoir, id: r.store_id }, r.name, r.availability));
    }

    for (entity, name, availability) in candidates {
        let roll = parse_random_value(&availability, 1.0, cx.rng)?;
        if roll >= AVAILABILITY_THRESHOLD {
            continue;
        }
        log::info!(
            "{} {} {name} failed, offline on sol {}",
            sol_label(cx.sol),
            entity.table.as_str(),
            cx.sol + 1
        );
        cx.scheduler.register_with(
            cx.store,
            cx.sol,
            cx.sol + 1,
            PRIORITY_LANDING,
            0,
            &EventKind::CommodityGoesOffline { entity: entity.clone() },
        )?;
        cx.scheduler.register_with(
            cx.store,
            cx.sol,
            cx.sol + OUTAGE_SOLS,
            PRIORITY_LANDING,
            0,
            &EventKind::CommodityGoesOnline { entity },
        )?;
    }
    Ok(())
}

// ── Carry forward ─────────────────────────────────────────────────

pub fn carry_forward(cx: &mut SolContext<'_>) -> SimResult<()> {
    let copied = cx.store.carry_capacity_forward(&cx.ctx.simulation_id, cx.sol)?;
    log::trace!("{} carried {copied} reservoir snapshots forward", sol_label(cx.sol));
    Ok(())
}

// ── Consumption / supply ──────────────────────────────────────────

pub fn consumption(cx: &mut SolContext<'_>) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let population = cx.store.living_population(sim)? as f64;
    for c in cx.store.consumers(sim)? {
        let debit = if c.is_online {
            let amount = parse_random_value(&c.consumes, 0.0, cx.rng)?.max(0.0);
            if c.is_per_settler {
                amount * population
            } else {
                amount
            }
        } else {
            0.0
        };
        cx.store.insert_usage(
            sim,
            &Usage {
                commodity_id: c.commodity_id,
                key_type: EntityTable::Consumer,
                key_id: c.consumer_id,
                sol: cx.sol,
                debit,
                credit: 0.0,
            },
        )?;
    }
    Ok(())
}

pub fn supply(cx: &mut SolContext<'_>) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    for s in cx.store.suppliers(sim)? {
        let credit = if s.is_online {
            parse_random_value(&s.supplies, 0.0, cx.rng)?.max(0.0)
        } else {
            0.0
        };
        cx.store.insert_usage(
            sim,
            &Usage {
                commodity_id: s.commodity_id,
                key_type: EntityTable::Supplier,
                key_id: s.supplier_id,
                sol: cx.sol,
                debit: 0.0,
                credit,
            },
        )?;
    }
    Ok(())
}

// ── Reconciliation ────────────────────────────────────────────────

/// Apply today's net delta to every commodity's reservoirs and flag
/// starvation when the commodity's total would go negative.
pub fn reconcile(cx: &mut SolContext<'_>) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let allow_negative = cx.ctx.config.allow_negative_capacity;

    let mut commodities: Vec<(CommodityKind, String)> =
        cx.commodity_ids.iter().map(|(k, id)| (*k, id.clone())).collect();
    commodities.sort();

    for (kind, commodity_id) in commodities {
        let usage = cx.store.usage_for_sol(sim, &commodity_id, cx.sol)?;
        let delta: f64 = usage.iter().map(|u| u.credit - u.debit).sum();

        let reservoirs = cx.store.reservoirs_for(sim, &commodity_id)?;
        if reservoirs.is_empty() {
            if delta != 0.0 {
                log::trace!("{} {kind}: delta {delta:.3} with nowhere to store it", sol_label(cx.sol));
            }
            continue;
        }

        let online = reservoirs.iter().filter(|r| r.is_online).count();
        let share = if online > 0 {
            delta / online as f64
        } else {
            log::warn!("{} {kind}: no reservoir online, delta {delta:.3} lost", sol_label(cx.sol));
            0.0
        };

        let mut total = 0.0;
        for r in &reservoirs {
            let baseline = match cx.store.capacity_on(sim, &r.store_id, cx.sol)? {
                Some(c) => c,
                None => cx
                    .store
                    .capacity_on(sim, &r.store_id, cx.sol.saturating_sub(1))?
                    .unwrap_or(0.0),
            };
            let raw = if r.is_online { baseline + share } else { baseline };
            total += raw;
            let capacity = if allow_negative {
                raw.min(r.max_capacity)
            } else {
                raw.clamp(0.0, r.max_capacity)
            };
            cx.store.upsert_capacity(sim, &r.store_id, cx.sol, capacity, r.is_online)?;
        }

        log::trace!("{} {kind}: delta {delta:+.3}, stored {total:.3}", sol_label(cx.sol));

        if total < 0.0 {
            log::warn!("{} {kind} exhausted ({total:.3}), starvation on sol {}", sol_label(cx.sol), cx.sol + 1);
            cx.scheduler.register_with(
                cx.store,
                cx.sol,
                cx.sol + 1,
                PRIORITY_LANDING,
                0,
                &EventKind::CommodityStarvation { commodity: kind },
            )?;
        }
    }
    Ok(())
}

/// Starvation is a modelled condition, not an error: record it.
pub fn starvation(cx: &mut SolContext<'_>, commodity: CommodityKind) -> SimResult<()> {
    let commodity_id = cx
        .commodity_ids
        .get(&commodity)
        .ok_or_else(|| SimError::lookup("commodity", commodity.as_str()))?;
    cx.store.insert_starvation(&cx.ctx.simulation_id, commodity_id, cx.sol)?;
    log::warn!("{} colony is starved of {commodity}", sol_label(cx.sol));
    Ok(())
}
