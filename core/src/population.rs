//! Population growth: landings, pairing, births and deaths.
//!
//! Every handler here runs through the scheduler. Pairing consults the
//! genealogy checker; births write the ancestor rows that checker reads.

use std::{collections::HashSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    distribution::{parse_random_value, parse_random_value_years},
    economy,
    engine::SolContext,
    error::{SimError, SimResult},
    event::EventKind,
    genealogy::{Relationship, RelationshipKind},
    types::{sol_label, years_to_sols, EntityId, Sol},
};

/// Earth years before a settler may pair.
const ADULT_AGE_YEARS: f64 = 18.0;
/// Earth years after which a mother has no further children.
const FERTILE_UNTIL_YEARS: f64 = 45.0;
/// Partners tried per pairing attempt before giving up for the sol.
const PAIRING_ATTEMPTS: usize = 32;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "m",
            Self::Female => "f",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        match s {
            "m" => Ok(Self::Male),
            "f" => Ok(Self::Female),
            other => Err(SimError::lookup("sex", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettlerState {
    Single,
    Couple,
}

impl SettlerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Couple => "couple",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settler {
    pub settler_id: EntityId,
    pub sex: Sex,
    /// Sexes this settler partners with: "m", "f" or "mf".
    pub orientation: String,
    pub state: SettlerState,
    /// May precede sol 0 for settlers who arrived as adults.
    pub birth_sol: i64,
    /// 0 while alive.
    pub death_sol: Sol,
    pub biological_mother: Option<EntityId>,
    pub biological_father: Option<EntityId>,
}

impl Settler {
    pub fn is_alive(&self) -> bool {
        self.death_sol == 0
    }

    /// Age in sols on `sol`.
    pub fn age_on(&self, sol: Sol) -> i64 {
        sol as i64 - self.birth_sol
    }

    pub fn attracted_to(&self, other: &Settler) -> bool {
        self.orientation.contains(other.sex.as_str())
    }
}

fn random_settler(cx: &mut SolContext<'_>, birth_sol: i64) -> Settler {
    let sex = if cx.rng.chance(0.5) { Sex::Male } else { Sex::Female };
    let opposite = match sex {
        Sex::Male => "f",
        Sex::Female => "m",
    };
    let roll = cx.rng.next_f64();
    let orientation = if roll < 0.90 {
        opposite.to_string()
    } else if roll < 0.95 {
        sex.as_str().to_string()
    } else {
        "mf".to_string()
    };
    Settler {
        settler_id: cx.rng.id(),
        sex,
        orientation,
        state: SettlerState::Single,
        birth_sol,
        death_sol: 0,
        biological_mother: None,
        biological_father: None,
    }
}

/// Schedule the settler's death from the configured life expectancy.
fn schedule_death(cx: &mut SolContext<'_>, settler: &Settler) -> SimResult<Sol> {
    let lifespan = parse_random_value_years(&cx.ctx.config.life_expectancy, years_to_sols(60.0), cx.rng)?;
    let earliest = cx.sol + 1;
    let due = settler.birth_sol + lifespan as i64;
    let run_on = if due < earliest as i64 { earliest } else { due as Sol };
    cx.scheduler.register(
        cx.store,
        cx.sol,
        run_on,
        &EventKind::SettlerDies { settler: settler.settler_id.clone() },
    )?;
    Ok(run_on)
}

// ── Landings ──────────────────────────────────────────────────────

pub fn mission_lands(cx: &mut SolContext<'_>, settlers: &str, resources: &[String]) -> SimResult<()> {
    let count = parse_random_value(settlers, 0.0, cx.rng)?.max(0.0) as u64;
    log::info!("{} mission landed with {count} settlers", sol_label(cx.sol));

    for _ in 0..count {
        let age = parse_random_value_years(&cx.ctx.config.settler_age, years_to_sols(30.0), cx.rng)?;
        let birth_sol = cx.sol as i64 - age as i64;
        let settler = random_settler(cx, birth_sol);
        cx.store.insert_settler(&cx.ctx.simulation_id, &settler)?;
        let dies_on = schedule_death(cx, &settler)?;
        log::debug!(
            "{} settler {} ({}) landed, dies {}",
            sol_label(cx.sol),
            settler.settler_id,
            settler.sex,
            sol_label(dies_on)
        );
    }

    economy::land_resources(cx, resources)
}

// ── Pairing ───────────────────────────────────────────────────────

/// Try to form one new couple today.
pub fn make_families(cx: &mut SolContext<'_>) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let singles = cx.store.singles_count(sim)?;
    if singles < 2 || !cx.rng.chance(cx.ctx.config.pairing_fraction_per_sol * singles as f64) {
        return Ok(());
    }

    let adult_by = cx.sol as i64 - years_to_sols(ADULT_AGE_YEARS) as i64;
    let candidates = cx.store.single_adults(sim, adult_by)?;
    let Some(first) = cx.rng.choose(&candidates).cloned() else {
        return Ok(());
    };

    let depth = cx.ctx.config.ancestor_depth;
    let start = cx.rng.range(0, candidates.len() as i64) as usize;
    let mut partner = None;
    for offset in 0..candidates.len().min(PAIRING_ATTEMPTS) {
        let other = &candidates[(start + offset) % candidates.len()];
        if other.settler_id == first.settler_id || !first.attracted_to(other) || !other.attracted_to(&first) {
            continue;
        }
        if cx.genealogy.is_eligible(cx.store, depth, &first.settler_id, &other.settler_id)? {
            partner = Some(other.clone());
            break;
        }
    }
    let Some(second) = partner else {
        log::trace!("{} no eligible partner for {}", sol_label(cx.sol), first.settler_id);
        return Ok(());
    };

    let relationship = Relationship {
        relationship_id: cx.rng.id(),
        first: first.settler_id.clone(),
        second: second.settler_id.clone(),
        kind: RelationshipKind::Partner,
        begin_sol: cx.sol,
        end_sol: 0,
    };
    cx.store.insert_relationship(sim, &relationship)?;
    cx.store
        .set_settler_state(sim, &[first.settler_id.as_str(), second.settler_id.as_str()], SettlerState::Couple)?;
    log::info!(
        "{} new family {} between {} and {}",
        sol_label(cx.sol),
        relationship.relationship_id,
        first.settler_id,
        second.settler_id
    );

    let parents = match (first.sex, second.sex) {
        (Sex::Female, Sex::Male) => Some((first.settler_id.clone(), second.settler_id.clone())),
        (Sex::Male, Sex::Female) => Some((second.settler_id.clone(), first.settler_id.clone())),
        _ => None,
    };

    match parents {
        Some((mother, father)) if cx.rng.chance(cx.ctx.config.pregnancy_probability) => {
            let delay = parse_random_value(&cx.ctx.config.first_child_delay, 300.0, cx.rng)?.max(1.0);
            let birth_on = cx.sol + delay as Sol;
            log::info!("{} {mother} and {father} expecting a child on {}", sol_label(cx.sol), sol_label(birth_on));
            cx.scheduler
                .register(cx.store, cx.sol, birth_on, &EventKind::SettlerBorn { mother, father })?;
        }
        _ => {
            let after = parse_random_value(&cx.ctx.config.partner_breakup, 760.0, cx.rng)?.max(1.0);
            cx.scheduler.register(
                cx.store,
                cx.sol,
                cx.sol + after as Sol,
                &EventKind::EndRelationship { relationship: relationship.relationship_id },
            )?;
        }
    }
    Ok(())
}

// ── Births ────────────────────────────────────────────────────────

pub fn settler_born(cx: &mut SolContext<'_>, mother_id: &str, father_id: &str) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let mother = cx
        .store
        .settler(sim, mother_id)?
        .ok_or_else(|| SimError::lookup("mother", mother_id))?;
    let father = cx
        .store
        .settler(sim, father_id)?
        .ok_or_else(|| SimError::lookup("father", father_id))?;

    if !mother.is_alive() {
        log::info!("{} mother {mother_id} died while pregnant", sol_label(cx.sol));
        return Ok(());
    }

    let today = cx.sol as i64;
    let mut child = random_settler(cx, today);
    child.biological_mother = Some(mother.settler_id.clone());
    child.biological_father = Some(father.settler_id.clone());
    cx.store.insert_settler(sim, &child)?;

    // Parents, then every recorded ancestor of each parent one rung higher.
    let mut lineage: Vec<(EntityId, RelationshipKind)> = vec![
        (mother.settler_id.clone(), RelationshipKind::Parent),
        (father.settler_id.clone(), RelationshipKind::Parent),
    ];
    for parent in [&mother, &father] {
        for (ancestor, kind) in cx.store.ancestor_rows(sim, &parent.settler_id)? {
            if let Some(rung) = RelationshipKind::ancestor(kind.generations() + 1) {
                lineage.push((ancestor, rung));
            }
        }
    }
    let mut written = HashSet::new();
    for (ancestor, kind) in lineage {
        if !written.insert((ancestor.clone(), kind)) {
            continue;
        }
        cx.store.insert_relationship(
            sim,
            &Relationship {
                relationship_id: cx.rng.id(),
                first: child.settler_id.clone(),
                second: ancestor,
                kind,
                begin_sol: cx.sol,
                end_sol: 0,
            },
        )?;
    }

    log::info!("{} settler {} born to {} and {}", sol_label(cx.sol), child.settler_id, mother_id, father_id);
    schedule_death(cx, &child)?;

    let mothers_age = mother.age_on(cx.sol) as f64;
    if mothers_age < years_to_sols(FERTILE_UNTIL_YEARS) && cx.rng.chance(cx.ctx.config.pregnancy_probability) {
        let gap = parse_random_value(&cx.ctx.config.sols_between_children, 380.0, cx.rng)?.max(1.0);
        cx.scheduler.register(
            cx.store,
            cx.sol,
            cx.sol + gap as Sol,
            &EventKind::SettlerBorn {
                mother: mother.settler_id,
                father: father.settler_id,
            },
        )?;
    }
    Ok(())
}

// ── Deaths and break-ups ──────────────────────────────────────────

pub fn settler_dies(cx: &mut SolContext<'_>, settler_id: &str) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    cx.store.set_death_sol(sim, settler_id, cx.sol)?;
    log::info!("{} settler {settler_id} dies", sol_label(cx.sol));

    for partnership in cx.store.ongoing_partnerships(sim, settler_id)? {
        cx.store.end_relationship(sim, &partnership.relationship_id, cx.sol)?;
        let survivor = if partnership.first == settler_id {
            &partnership.second
        } else {
            &partnership.first
        };
        cx.store.set_settler_state(sim, &[survivor.as_str()], SettlerState::Single)?;
        log::debug!("{} relationship {} ended by death", sol_label(cx.sol), partnership.relationship_id);
    }
    Ok(())
}

pub fn end_relationship(cx: &mut SolContext<'_>, relationship_id: &str) -> SimResult<()> {
    let ctx = cx.ctx;
    let sim = ctx.simulation_id.as_str();
    let rel = cx
        .store
        .relationship(sim, relationship_id)?
        .ok_or_else(|| SimError::lookup("relationship", relationship_id))?;
    if rel.end_sol != 0 {
        return Ok(());
    }
    cx.store.end_relationship(sim, relationship_id, cx.sol)?;
    cx.store.set_settler_state(sim, &[rel.first.as_str(), rel.second.as_str()], SettlerState::Single)?;
    log::info!("{} relationship {relationship_id} ended", sol_label(cx.sol));
    Ok(())
}
