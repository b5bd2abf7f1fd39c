//! Population integration tests: landings, deaths, births and break-ups.

use colony_core::{
    commodity::CommodityIds,
    config::{SimulationConfig, SimulationContext},
    engine::{SimEngine, SolContext},
    error::SimError,
    genealogy::{Genealogy, Relationship, RelationshipKind},
    population::{self, Settler, SettlerState, Sex},
    rng::SimRng,
    scheduler::Scheduler,
    store::SimStore,
};

const SIM: &str = "population-test";

/// Standalone pieces for calling the handlers directly.
struct Harness {
    ctx: SimulationContext,
    store: SimStore,
    scheduler: Scheduler,
    rng: SimRng,
    genealogy: Genealogy,
    commodity_ids: CommodityIds,
}

impl Harness {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let ctx = SimulationContext::new(SIM, SimulationConfig::default_test());
        let store = SimStore::in_memory().unwrap();
        store.migrate().unwrap();
        Self {
            scheduler: Scheduler::new(&ctx),
            genealogy: Genealogy::new(&ctx),
            rng: SimRng::new(7),
            commodity_ids: CommodityIds::new(),
            store,
            ctx,
        }
    }

    fn at(&mut self, sol: u64) -> SolContext<'_> {
        SolContext {
            ctx: &self.ctx,
            store: &self.store,
            scheduler: &self.scheduler,
            rng: &mut self.rng,
            genealogy: &mut self.genealogy,
            commodity_ids: &self.commodity_ids,
            sol,
        }
    }

    fn add(&self, id: &str, sex: Sex) {
        self.store
            .insert_settler(
                SIM,
                &Settler {
                    settler_id: id.into(),
                    sex,
                    orientation: if sex == Sex::Male { "f".into() } else { "m".into() },
                    state: SettlerState::Single,
                    birth_sol: -10_000,
                    death_sol: 0,
                    biological_mother: None,
                    biological_father: None,
                },
            )
            .unwrap();
    }

    fn relate(&self, id: &str, first: &str, second: &str, kind: RelationshipKind) {
        self.store
            .insert_relationship(
                SIM,
                &Relationship {
                    relationship_id: id.into(),
                    first: first.into(),
                    second: second.into(),
                    kind,
                    begin_sol: 0,
                    end_sol: 0,
                },
            )
            .unwrap();
    }
}

#[test]
fn mission_lands_its_settlers() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut engine = SimEngine::build_test("landing-test".into(), SimulationConfig::default_test()).unwrap();
    assert_eq!(engine.store.living_population("landing-test").unwrap(), 0);

    engine.run_sols(1).unwrap();
    assert_eq!(engine.store.living_population("landing-test").unwrap(), 10);
}

#[test]
fn first_landing_on_sol_zero_is_rejected() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = SimulationConfig::default_test();
    config.first_mission_lands = 0;

    let err = SimEngine::build_test("sol-zero-test".into(), config).err().expect("Build should fail");
    assert!(matches!(err, SimError::Configuration { .. }), "Unexpected error: {err}");
    assert!(err.is_fatal());
}

#[test]
fn settlers_past_their_lifespan_die_the_next_sol() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = SimulationConfig::default_test();
    config.settler_age = "30".into();
    config.life_expectancy = "1".into();
    let mut engine = SimEngine::build_test("death-test".into(), config).unwrap();

    engine.run_sols(1).unwrap();
    assert_eq!(engine.store.living_population("death-test").unwrap(), 10);
    engine.run_sols(1).unwrap();
    assert_eq!(engine.store.living_population("death-test").unwrap(), 0);
}

#[test]
fn child_inherits_its_parents_ancestry() {
    let mut h = Harness::new();
    for (id, sex) in [("mum", Sex::Female), ("dad", Sex::Male), ("nan", Sex::Female), ("great", Sex::Male)] {
        h.add(id, sex);
    }
    h.relate("r1", "mum", "nan", RelationshipKind::Parent);
    h.relate("r2", "mum", "great", RelationshipKind::Grandparent);

    population::settler_born(&mut h.at(100), "mum", "dad").unwrap();

    let child = h
        .store
        .single_adults(SIM, 100)
        .unwrap()
        .into_iter()
        .find(|s| s.birth_sol == 100)
        .expect("Child was not created");
    assert_eq!(child.biological_mother.as_deref(), Some("mum"));
    assert_eq!(child.biological_father.as_deref(), Some("dad"));

    let mut rows = h.store.ancestor_rows(SIM, &child.settler_id).unwrap();
    rows.sort();
    assert_eq!(
        rows,
        vec![
            ("dad".to_string(), RelationshipKind::Parent),
            ("great".to_string(), RelationshipKind::GreatGrandparent),
            ("mum".to_string(), RelationshipKind::Parent),
            ("nan".to_string(), RelationshipKind::Grandparent),
        ],
        "Parents plus each parent's ancestors one rung further up"
    );

    let death = h
        .store
        .all_events(SIM)
        .unwrap()
        .into_iter()
        .any(|e| e.function_name == "settler_dies");
    assert!(death, "Every newborn has a scheduled death");
}

#[test]
fn no_child_when_the_mother_has_died() {
    let mut h = Harness::new();
    h.add("mum", Sex::Female);
    h.add("dad", Sex::Male);
    h.store.set_death_sol(SIM, "mum", 50).unwrap();

    population::settler_born(&mut h.at(60), "mum", "dad").unwrap();
    assert_eq!(h.store.living_population(SIM).unwrap(), 1);
}

#[test]
fn birth_with_missing_parent_is_a_lookup_error() {
    let mut h = Harness::new();
    h.add("mum", Sex::Female);

    let err = population::settler_born(&mut h.at(60), "mum", "nobody").unwrap_err();
    assert!(matches!(err, SimError::Lookup { .. }), "Expected a lookup error, got {err}");
    assert!(!err.is_fatal());
}

#[test]
fn death_ends_partnership_and_frees_the_survivor() {
    let mut h = Harness::new();
    h.add("a", Sex::Female);
    h.add("b", Sex::Male);
    h.relate("couple", "a", "b", RelationshipKind::Partner);
    h.store.set_settler_state(SIM, &["a", "b"], SettlerState::Couple).unwrap();

    population::settler_dies(&mut h.at(30), "a").unwrap();

    let rel = h.store.relationship(SIM, "couple").unwrap().unwrap();
    assert_eq!(rel.end_sol, 30);
    let survivor = h.store.settler(SIM, "b").unwrap().unwrap();
    assert_eq!(survivor.state, SettlerState::Single);
    assert_eq!(h.store.settler(SIM, "a").unwrap().unwrap().death_sol, 30);
}

#[test]
fn end_relationship_returns_both_to_single() {
    let mut h = Harness::new();
    h.add("a", Sex::Female);
    h.add("b", Sex::Male);
    h.relate("couple", "a", "b", RelationshipKind::Partner);
    h.store.set_settler_state(SIM, &["a", "b"], SettlerState::Couple).unwrap();

    population::end_relationship(&mut h.at(40), "couple").unwrap();

    assert_eq!(h.store.singles_count(SIM).unwrap(), 2);
    assert!(h.store.ongoing_partnerships(SIM, "a").unwrap().is_empty());
}

#[test]
fn pairing_forms_families_over_time() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = SimulationConfig::default_test();
    config.settlers_per_initial_ship = "40".into();
    config.life_expectancy = "90".into();
    config.pairing_fraction_per_sol = 0.05;
    let mut engine = SimEngine::build_test("pairing-test".into(), config).unwrap();

    engine.run_sols(60).unwrap();
    let singles = engine.store.singles_count("pairing-test").unwrap();
    let living = engine.store.living_population("pairing-test").unwrap();
    assert_eq!(living, 40);
    assert!(singles < living, "Expected at least one couple after 60 sols, all {living} still single");
}

#[test]
fn population_limit_stops_the_run() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut config = SimulationConfig::default_test();
    config.limit = colony_core::config::Limit::Population(5);
    let mut engine = SimEngine::build_test("limit-test".into(), config).unwrap();

    engine.run().unwrap();
    assert_eq!(engine.current_sol(), 1, "Ten settlers land on sol 1, above the limit of five");
    assert!(
        engine.store.latest_snapshot("limit-test").unwrap().is_some(),
        "run() flushes on the way out"
    );
}
