//! Physical commodities and the points that produce, consume and store them.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    distribution::Distribution,
    error::{SimError, SimResult},
    types::{EntityId, Sol},
};

/// Availability spec for anything that never fails.
pub const ALWAYS_AVAILABLE: &str = "randint:1,1";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CommodityKind {
    Electricity,
    Water,
    O2,
    Fuel,
    Food,
    Other,
}

impl CommodityKind {
    pub const ALL: [CommodityKind; 6] = [
        Self::Other,
        Self::Electricity,
        Self::O2,
        Self::Water,
        Self::Fuel,
        Self::Food,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Water => "water",
            Self::O2 => "o2",
            Self::Fuel => "fuel",
            Self::Food => "food",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for CommodityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommodityKind {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SimError::config(format!("unknown commodity '{s}'")))
    }
}

/// Commodity ids resolved once at start-up, so rows never look them up again.
pub type CommodityIds = HashMap<CommodityKind, EntityId>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityTable {
    Supplier,
    Consumer,
    Reservoir,
}

impl EntityTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supplier => "supplier",
            Self::Consumer => "consumer",
            Self::Reservoir => "reservoir",
        }
    }
}

/// Reference to one supplier, consumer or reservoir row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CommodityEntity {
    pub table: EntityTable,
    pub id: EntityId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservoir {
    pub store_id: EntityId,
    pub commodity_id: EntityId,
    pub commodity: CommodityKind,
    pub name: String,
    pub description: String,
    pub max_capacity: f64,
    pub availability: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Supplier {
    pub supplier_id: EntityId,
    pub commodity_id: EntityId,
    pub commodity: CommodityKind,
    pub name: String,
    pub description: String,
    pub supplies: String,
    pub availability: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Consumer {
    pub consumer_id: EntityId,
    pub commodity_id: EntityId,
    pub commodity: CommodityKind,
    pub name: String,
    pub description: String,
    pub consumes: String,
    pub availability: String,
    pub is_online: bool,
    /// The sampled amount is multiplied by the living population.
    pub is_per_settler: bool,
}

/// One sol's credit or debit for one supplier or consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Usage {
    pub commodity_id: EntityId,
    pub key_type: EntityTable,
    pub key_id: EntityId,
    pub sol: Sol,
    pub debit: f64,
    pub credit: f64,
}

/// A parsed resource spec such as
/// `supply=electricity supplies=randint:5,10 availability=binomial:0.999`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Supply {
        commodity: CommodityKind,
        supplies: String,
        availability: String,
        description: String,
    },
    Consume {
        commodity: CommodityKind,
        consumes: String,
        availability: String,
        per_settler: bool,
        description: String,
    },
    Reservoir {
        commodity: CommodityKind,
        /// Empty means unbounded.
        max_capacity: String,
        initial_capacity: String,
        availability: String,
        description: String,
    },
}

impl ResourceSpec {
    pub fn commodity(&self) -> CommodityKind {
        match self {
            Self::Supply { commodity, .. }
            | Self::Consume { commodity, .. }
            | Self::Reservoir { commodity, .. } => *commodity,
        }
    }
}

/// Reject a distribution spec early so a bad one stops the run at landing.
fn checked(field: &str, spec: String) -> SimResult<String> {
    Distribution::parse(&spec)
        .map_err(|e| SimError::config(format!("{field}: {e}")))?;
    Ok(spec)
}

impl FromStr for ResourceSpec {
    type Err = SimError;

    fn from_str(s: &str) -> SimResult<Self> {
        let mut fields: HashMap<&str, &str> = HashMap::new();
        for word in s.split_whitespace() {
            let (key, value) = word
                .split_once('=')
                .ok_or_else(|| SimError::config(format!("resource spec '{s}': '{word}' is not key=value")))?;
            fields.insert(key, value);
        }

        let field = |k: &str, default: &str| fields.get(k).copied().unwrap_or(default).to_string();
        let availability = checked("availability", field("availability", ALWAYS_AVAILABLE))?;

        let roles: Vec<&str> = ["supply", "consume", "reservoir"]
            .into_iter()
            .filter(|r| fields.contains_key(r))
            .collect();
        let [role] = roles.as_slice() else {
            return Err(SimError::config(format!(
                "resource spec '{s}' needs exactly one of supply=, consume=, reservoir="
            )));
        };
        let commodity: CommodityKind = fields[role].parse()?;

        match *role {
            "supply" => Ok(Self::Supply {
                commodity,
                supplies: checked("supplies", field("supplies", "0"))?,
                availability,
                description: field("description", ""),
            }),
            "consume" => {
                let per_settler = match field("per_settler", "false").as_str() {
                    "true" | "yes" | "1" => true,
                    "false" | "no" | "0" => false,
                    other => {
                        return Err(SimError::config(format!("per_settler: expected a boolean, got '{other}'")))
                    }
                };
                Ok(Self::Consume {
                    commodity,
                    consumes: checked("consumes", field("consumes", "0"))?,
                    availability,
                    per_settler,
                    description: field("description", ""),
                })
            }
            _ => Ok(Self::Reservoir {
                commodity,
                max_capacity: checked("max", field("max", ""))?,
                initial_capacity: checked("initial", field("initial", "0"))?,
                availability,
                description: field("description", ""),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_supplier() {
        let spec: ResourceSpec = "supply=electricity supplies=randint:5,10 availability=binomial:0.999 description=solar"
            .parse()
            .unwrap();
        assert_eq!(
            spec,
            ResourceSpec::Supply {
                commodity: CommodityKind::Electricity,
                supplies: "randint:5,10".into(),
                availability: "binomial:0.999".into(),
                description: "solar".into(),
            }
        );
    }

    #[test]
    fn consumer_defaults_to_fixed_and_always_available() {
        let spec: ResourceSpec = "consume=o2 consumes=normal:0.8,0.05 per_settler=true".parse().unwrap();
        match spec {
            ResourceSpec::Consume { availability, per_settler, .. } => {
                assert_eq!(availability, ALWAYS_AVAILABLE);
                assert!(per_settler);
            }
            other => panic!("expected consumer, got {other:?}"),
        }
    }

    #[test]
    fn reservoir_without_max_is_unbounded() {
        let spec: ResourceSpec = "reservoir=water initial=500".parse().unwrap();
        match spec {
            ResourceSpec::Reservoir { max_capacity, initial_capacity, .. } => {
                assert!(max_capacity.is_empty());
                assert_eq!(initial_capacity, "500");
            }
            other => panic!("expected reservoir, got {other:?}"),
        }
    }

    #[test]
    fn malformed_specs_are_configuration_errors() {
        for bad in [
            "supply=unobtainium supplies=1",
            "supplies=1",
            "supply=water consume=water",
            "supply=water supplies=poisson:3",
            "reservoir=water max",
            "consume=o2 per_settler=maybe",
        ] {
            let err = bad.parse::<ResourceSpec>().unwrap_err();
            assert!(err.is_fatal(), "'{bad}' should be fatal, got {err}");
        }
    }
}
