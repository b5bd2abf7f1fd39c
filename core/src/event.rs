//! Deferred work.
//!
//! RULE: Every piece of deferred work is an `EventKind` variant.
//! The variant name is persisted as the event's function name and its
//! fields as the JSON argument blob. The name is only resolved back to a
//! variant when the event fires, so registration never fails on a bad
//! reference. Variants are added, never renamed: renaming orphans the
//! rows already stored under the old name.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    commodity::{CommodityEntity, CommodityKind},
    error::{SimError, SimResult},
    types::{EntityId, SimulationId, Sol},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum EventKind {
    // ── Landing / creation ────────────────────────────────────
    MissionLands {
        /// Settler count spec.
        settlers: String,
        resources: Vec<String>,
    },
    SupplyMissionLands {
        resources: Vec<String>,
    },
    CommodityGoesOnline {
        entity: CommodityEntity,
    },
    CommodityGoesOffline {
        entity: CommodityEntity,
    },

    // ── Economy pipeline ──────────────────────────────────────
    CommodityMaintenance,
    ReservoirCarryForward,
    CommodityConsumption,
    CommoditySupply,
    ReservoirReconciliation,
    CommodityStarvation {
        commodity: CommodityKind,
    },

    // ── Population ────────────────────────────────────────────
    MakeFamilies,
    SettlerBorn {
        mother: EntityId,
        father: EntityId,
    },
    SettlerDies {
        settler: EntityId,
    },
    EndRelationship {
        relationship: EntityId,
    },
}

impl EventKind {
    /// Split into the persisted `(function_name, args)` pair.
    pub fn to_parts(&self) -> SimResult<(String, String)> {
        let mut value = serde_json::to_value(self)?;
        let name = value
            .get("kind")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("event serialised without a kind tag"))?;
        let args = match value.get_mut("args") {
            Some(args) => serde_json::to_string(&args.take())?,
            None => "{}".to_string(),
        };
        Ok((name, args))
    }

    /// Resolve a persisted `(function_name, args)` pair.
    pub fn from_parts(name: &str, args: &str) -> SimResult<Self> {
        let args: Value = serde_json::from_str(args)?;
        let mut tagged = serde_json::Map::new();
        tagged.insert("kind".into(), Value::String(name.to_string()));
        if !matches!(&args, Value::Object(map) if map.is_empty()) {
            tagged.insert("args".into(), args);
        }
        serde_json::from_value(Value::Object(tagged)).map_err(|e| SimError::Callback {
            kind: name.to_string(),
            message: format!("cannot resolve event: {e}"),
        })
    }
}

/// A persisted event row. Never mutated or deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEvent {
    /// Insertion order; `None` until stored.
    pub id: Option<i64>,
    pub simulation_id: SimulationId,
    /// Sol the event was registered on.
    pub registered: Sol,
    /// First sol the event is due.
    pub run_on: Sol,
    /// Lower runs first within a sol.
    pub priority: i64,
    /// 0 for one-shot, otherwise re-fires every `periodic` sols.
    pub periodic: u64,
    /// Position among same-named events registered for `run_on`.
    pub idx: i64,
    pub function_name: String,
    pub args: String,
}

impl ScheduledEvent {
    pub fn kind(&self) -> SimResult<EventKind> {
        EventKind::from_parts(&self.function_name, &self.args)
    }

    /// Whether this event fires on `sol`.
    pub fn is_due(&self, sol: Sol) -> bool {
        sol == self.run_on
            || (self.periodic > 0 && sol > self.run_on && (sol - self.run_on) % self.periodic == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commodity::EntityTable;

    #[test]
    fn unit_and_struct_variants_survive_storage() {
        for kind in [
            EventKind::CommodityMaintenance,
            EventKind::SettlerDies { settler: "abc".into() },
            EventKind::CommodityGoesOffline {
                entity: CommodityEntity { table: EntityTable::Supplier, id: "s1".into() },
            },
        ] {
            let (name, args) = kind.to_parts().unwrap();
            assert_eq!(EventKind::from_parts(&name, &args).unwrap(), kind);
        }
    }

    #[test]
    fn function_name_is_the_snake_case_variant() {
        let (name, args) = EventKind::ReservoirReconciliation.to_parts().unwrap();
        assert_eq!(name, "reservoir_reconciliation");
        assert_eq!(args, "{}");
    }

    #[test]
    fn unknown_name_resolves_to_callback_error() {
        let err = EventKind::from_parts("colonist_teleports", "{}").unwrap_err();
        assert!(matches!(err, SimError::Callback { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn periodic_events_fire_on_multiples_only() {
        let ev = ScheduledEvent {
            id: None,
            simulation_id: "s".into(),
            registered: 0,
            run_on: 10,
            priority: 20,
            periodic: 5,
            idx: 0,
            function_name: "make_families".into(),
            args: "{}".into(),
        };
        let fired: Vec<Sol> = (0..=30).filter(|s| ev.is_due(*s)).collect();
        assert_eq!(fired, vec![10, 15, 20, 25, 30]);
    }
}
