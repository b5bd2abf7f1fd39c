//! Pairing eligibility by blood relation.
//!
//! A relationship row's kind encodes generational distance directly
//! (parent = 1 generation, grandparent = 2, ...), so collecting the
//! ancestors of a settler within N generations is one filtered lookup.
//!
//! Answers are memoised in a bounded LRU cache keyed by
//! `(depth, pair)`. Entries are NOT invalidated when relationships
//! change: the same pair is asked about on many consecutive sols and a
//! settler's ancestors are fixed at birth, so a stale answer can only
//! arise from rows written after the pair was first checked.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    config::SimulationContext,
    error::{SimError, SimResult},
    store::SimStore,
    types::{EntityId, SimulationId, Sol},
};

/// Deepest rung tracked when ancestor rows are written at birth.
pub const MAX_ANCESTOR_DEPTH: u8 = 5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Partner,
    Parent,
    Grandparent,
    GreatGrandparent,
    GreatGreatGrandparent,
    GreatGreatGreatGrandparent,
}

impl RelationshipKind {
    pub fn code(&self) -> i64 {
        match self {
            Self::Partner => 1,
            Self::Parent => 2,
            Self::Grandparent => 3,
            Self::GreatGrandparent => 4,
            Self::GreatGreatGrandparent => 5,
            Self::GreatGreatGreatGrandparent => 6,
        }
    }

    pub fn from_code(code: i64) -> SimResult<Self> {
        Ok(match code {
            1 => Self::Partner,
            2 => Self::Parent,
            3 => Self::Grandparent,
            4 => Self::GreatGrandparent,
            5 => Self::GreatGreatGrandparent,
            6 => Self::GreatGreatGreatGrandparent,
            other => return Err(SimError::lookup("relationship kind", other.to_string())),
        })
    }

    /// Ancestor rung `generations` above a settler; None for 0 or past the ladder.
    pub fn ancestor(generations: u8) -> Option<Self> {
        if generations == 0 || generations > MAX_ANCESTOR_DEPTH {
            return None;
        }
        Self::from_code(Self::Parent.code() + generations as i64 - 1).ok()
    }

    /// Generations between the two ends; 0 for partners.
    pub fn generations(&self) -> u8 {
        (self.code() - Self::Parent.code() + 1).max(0) as u8
    }
}

/// `first` relates to `second` as `kind`: for ancestor kinds, `second`
/// is the ancestor of `first`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship_id: EntityId,
    pub first: EntityId,
    pub second: EntityId,
    pub kind: RelationshipKind,
    pub begin_sol: Sol,
    /// 0 while ongoing.
    pub end_sol: Sol,
}

type CacheKey = (u8, EntityId, EntityId);

/// Fixed-capacity map evicting the least recently used entry.
struct EligibilityCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<CacheKey, (bool, u64)>,
    by_use: BTreeMap<u64, CacheKey>,
    hits: u64,
    misses: u64,
}

impl EligibilityCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::new(),
            by_use: BTreeMap::new(),
            hits: 0,
            misses: 0,
        }
    }

    fn get(&mut self, key: &CacheKey) -> Option<bool> {
        self.clock += 1;
        let Some((value, last_used)) = self.entries.get_mut(key) else {
            self.misses += 1;
            return None;
        };
        self.hits += 1;
        self.by_use.remove(last_used);
        *last_used = self.clock;
        self.by_use.insert(self.clock, key.clone());
        Some(*value)
    }

    fn insert(&mut self, key: CacheKey, value: bool) {
        if self.capacity == 0 {
            return;
        }
        self.clock += 1;
        if let Some((_, last_used)) = self.entries.remove(&key) {
            self.by_use.remove(&last_used);
        }
        while self.entries.len() >= self.capacity {
            let Some((_, oldest)) = self.by_use.pop_first() else { break };
            self.entries.remove(&oldest);
        }
        self.by_use.insert(self.clock, key.clone());
        self.entries.insert(key, (value, self.clock));
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Hit/miss counters, logged periodically by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

/// The eligibility checker for one simulation. Never share across runs.
pub struct Genealogy {
    simulation_id: SimulationId,
    cache: EligibilityCache,
}

impl Genealogy {
    pub fn new(ctx: &SimulationContext) -> Self {
        Self {
            simulation_id: ctx.simulation_id.clone(),
            cache: EligibilityCache::new(ctx.config.eligibility_cache_capacity),
        }
    }

    /// Whether `a` and `b` may pair, comparing ancestors within `depth`
    /// generations.
    ///
    /// - identical, non-empty ancestor sets (full siblings): no
    /// - any shared ancestor: no
    /// - one is the other's ancestor: no
    /// - otherwise: yes
    pub fn is_eligible(
        &mut self,
        store: &SimStore,
        depth: u8,
        a: &str,
        b: &str,
    ) -> SimResult<bool> {
        if a == b {
            return Ok(false);
        }
        let key = if a <= b {
            (depth, a.to_string(), b.to_string())
        } else {
            (depth, b.to_string(), a.to_string())
        };
        if let Some(answer) = self.cache.get(&key) {
            return Ok(answer);
        }

        let ancestors_a = store.ancestors_of(&self.simulation_id, a, depth)?;
        let ancestors_b = store.ancestors_of(&self.simulation_id, b, depth)?;
        let answer = decide(a, &ancestors_a, b, &ancestors_b);

        self.cache.insert(key, answer);
        Ok(answer)
    }

    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.cache.hits,
            misses: self.cache.misses,
            size: self.cache.len(),
            capacity: self.cache.capacity,
        }
    }
}

fn decide(a: &str, ancestors_a: &HashSet<EntityId>, b: &str, ancestors_b: &HashSet<EntityId>) -> bool {
    if !ancestors_a.is_empty() && ancestors_a == ancestors_b {
        return false;
    }
    if !ancestors_a.is_disjoint(ancestors_b) {
        return false;
    }
    !(ancestors_a.contains(b) || ancestors_b.contains(a))
}
