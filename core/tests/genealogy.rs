//! Genealogy integration tests: the eligibility policy against a real
//! family tree in the store, and the cache in front of it.

use colony_core::{
    config::{SimulationConfig, SimulationContext},
    genealogy::{Genealogy, Relationship, RelationshipKind},
    population::{Settler, SettlerState, Sex},
    store::SimStore,
};

const SIM: &str = "genealogy-test";

fn settler(id: &str, sex: Sex) -> Settler {
    Settler {
        settler_id: id.into(),
        sex,
        orientation: if sex == Sex::Male { "f".into() } else { "m".into() },
        state: SettlerState::Single,
        birth_sol: 0,
        death_sol: 0,
        biological_mother: None,
        biological_father: None,
    }
}

fn descends(store: &SimStore, child: &str, ancestor: &str, kind: RelationshipKind) {
    store
        .insert_relationship(
            SIM,
            &Relationship {
                relationship_id: format!("{child}->{ancestor}"),
                first: child.into(),
                second: ancestor.into(),
                kind,
                begin_sol: 0,
                end_sol: 0,
            },
        )
        .unwrap();
}

/// g1+g2 have p1 and s1. g3+g4 have p2. p1+p2 have c1 and c2.
/// s1+y have e1 (a first cousin of c1 and c2). u1+u2 have d1.
fn family() -> (SimStore, Genealogy) {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SimStore::in_memory().unwrap();
    store.migrate().unwrap();

    let males = ["g1", "g3", "p1", "s1", "c1", "e1", "u1"];
    let females = ["g2", "g4", "p2", "y", "c2", "d1", "u2"];
    for id in males {
        store.insert_settler(SIM, &settler(id, Sex::Male)).unwrap();
    }
    for id in females {
        store.insert_settler(SIM, &settler(id, Sex::Female)).unwrap();
    }

    use RelationshipKind::{Grandparent, Parent};
    for child in ["p1", "s1"] {
        descends(&store, child, "g1", Parent);
        descends(&store, child, "g2", Parent);
    }
    descends(&store, "p2", "g3", Parent);
    descends(&store, "p2", "g4", Parent);
    for child in ["c1", "c2"] {
        descends(&store, child, "p1", Parent);
        descends(&store, child, "p2", Parent);
        for g in ["g1", "g2", "g3", "g4"] {
            descends(&store, child, g, Grandparent);
        }
    }
    descends(&store, "e1", "s1", Parent);
    descends(&store, "e1", "y", Parent);
    descends(&store, "e1", "g1", Grandparent);
    descends(&store, "e1", "g2", Grandparent);
    descends(&store, "d1", "u1", Parent);
    descends(&store, "d1", "u2", Parent);

    let ctx = SimulationContext::new(SIM, SimulationConfig::default_test());
    let genealogy = Genealogy::new(&ctx);
    (store, genealogy)
}

#[test]
fn full_siblings_are_ineligible() {
    let (store, mut genealogy) = family();
    assert!(!genealogy.is_eligible(&store, 4, "c1", "c2").unwrap());
}

#[test]
fn unrelated_settlers_are_eligible() {
    let (store, mut genealogy) = family();
    assert!(genealogy.is_eligible(&store, 4, "c1", "d1").unwrap());
    assert!(genealogy.is_eligible(&store, 4, "g1", "u2").unwrap(), "Founders with no recorded ancestors");
}

#[test]
fn cousins_depend_on_depth() {
    let (store, mut genealogy) = family();
    assert!(
        !genealogy.is_eligible(&store, 2, "e1", "c2").unwrap(),
        "Cousins share grandparents within two generations"
    );
    assert!(
        genealogy.is_eligible(&store, 1, "e1", "c2").unwrap(),
        "Cousins share no parent"
    );
}

#[test]
fn ancestor_and_descendant_are_ineligible() {
    let (store, mut genealogy) = family();
    assert!(!genealogy.is_eligible(&store, 4, "c2", "p1").unwrap(), "Child and parent");
    assert!(!genealogy.is_eligible(&store, 4, "g1", "c2").unwrap(), "Grandparent and grandchild");
}

#[test]
fn settler_cannot_pair_with_themself() {
    let (store, mut genealogy) = family();
    assert!(!genealogy.is_eligible(&store, 4, "d1", "d1").unwrap());
}

#[test]
fn eligibility_is_symmetric_and_cached() {
    let (store, mut genealogy) = family();
    let forward = genealogy.is_eligible(&store, 4, "c1", "d1").unwrap();
    let backward = genealogy.is_eligible(&store, 4, "d1", "c1").unwrap();
    assert_eq!(forward, backward);

    let stats = genealogy.cache_stats();
    assert_eq!(stats.misses, 1, "Only the first lookup should reach the store");
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.size, 1);
}

#[test]
fn depth_is_part_of_the_cache_key() {
    let (store, mut genealogy) = family();
    genealogy.is_eligible(&store, 1, "e1", "c2").unwrap();
    genealogy.is_eligible(&store, 2, "e1", "c2").unwrap();
    assert_eq!(genealogy.cache_stats().misses, 2);
}

#[test]
fn cached_answers_are_not_invalidated() {
    let (store, mut genealogy) = family();
    assert!(genealogy.is_eligible(&store, 4, "c1", "d1").unwrap());

    // A shared ancestor recorded after the first check is not seen.
    descends(&store, "d1", "g3", RelationshipKind::Grandparent);
    assert!(genealogy.is_eligible(&store, 4, "c1", "d1").unwrap());

    let ctx = SimulationContext::new(SIM, SimulationConfig::default_test());
    let mut fresh = Genealogy::new(&ctx);
    assert!(!fresh.is_eligible(&store, 4, "c1", "d1").unwrap());
}
