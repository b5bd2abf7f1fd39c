//! Scheduler integration tests: due selection, ordering, idx, isolation.

use colony_core::{
    commodity::CommodityKind,
    config::{SimulationConfig, SimulationContext},
    error::{SimError, SimResult},
    event::{EventKind, ScheduledEvent},
    scheduler::{EventHandler, Scheduler, PRIORITY_LANDING, PRIORITY_RECONCILIATION, PRIORITY_SUPPLY},
    store::SimStore,
    types::Sol,
};

const SIM: &str = "sched-test";

fn setup() -> (SimStore, Scheduler) {
    let _ = env_logger::builder().is_test(true).try_init();
    let store = SimStore::in_memory().unwrap();
    store.migrate().unwrap();
    let ctx = SimulationContext::new(SIM, SimulationConfig::default_test());
    (store, Scheduler::new(&ctx))
}

/// Records what fires. Optionally writes to the store and then fails.
struct Recorder<'a> {
    store: &'a SimStore,
    fired: Vec<(Sol, i64, EventKind)>,
    fail_on: Option<EventKind>,
    fatal: bool,
}

impl<'a> Recorder<'a> {
    fn new(store: &'a SimStore) -> Self {
        Self { store, fired: Vec::new(), fail_on: None, fatal: false }
    }
}

impl EventHandler for Recorder<'_> {
    fn handle(&mut self, sol: Sol, idx: i64, kind: &EventKind) -> SimResult<()> {
        self.fired.push((sol, idx, kind.clone()));
        if self.fail_on.as_ref() == Some(kind) {
            // A partial write that must not survive the failure.
            self.store.insert_starvation(SIM, "water-id", sol)?;
            if self.fatal {
                return Err(SimError::config("bad distribution kind 'poisson'"));
            }
            return Err(SimError::Callback { kind: "test".into(), message: "boom".into() });
        }
        Ok(())
    }
}

#[test]
fn periodic_event_fires_on_every_multiple() {
    let (store, scheduler) = setup();
    scheduler
        .register_with(&store, 0, 10, PRIORITY_LANDING, 5, &EventKind::MakeFamilies)
        .unwrap();

    let due_on: Vec<Sol> = (0..=25)
        .filter(|sol| !scheduler.due(&store, *sol).unwrap().is_empty())
        .collect();
    assert_eq!(due_on, vec![10, 15, 20, 25], "Periodic event fired on the wrong sols: {due_on:?}");
}

#[test]
fn one_shot_event_fires_once() {
    let (store, scheduler) = setup();
    scheduler.register(&store, 0, 3, &EventKind::ReservoirReconciliation).unwrap();

    assert_eq!(scheduler.due(&store, 3).unwrap().len(), 1);
    for sol in [2, 4, 6, 100] {
        assert!(scheduler.due(&store, sol).unwrap().is_empty(), "One-shot event due again on sol {sol}");
    }
    assert_eq!(store.all_events(SIM).unwrap().len(), 1, "Fired events are retained");
}

#[test]
fn idx_counts_same_named_events_per_sol() {
    let (store, scheduler) = setup();
    let dies = |id: &str| EventKind::SettlerDies { settler: id.into() };

    let idx: Vec<i64> = ["a", "b", "c"]
        .iter()
        .map(|id| scheduler.register(&store, 0, 7, &dies(id)).unwrap().idx)
        .collect();
    assert_eq!(idx, vec![0, 1, 2]);

    let other_name = scheduler.register(&store, 0, 7, &EventKind::MakeFamilies).unwrap();
    assert_eq!(other_name.idx, 0, "idx is per function name");
    let other_sol = scheduler.register(&store, 0, 8, &dies("d")).unwrap();
    assert_eq!(other_sol.idx, 0, "idx is per run_on sol");
}

#[test]
fn due_events_run_in_priority_order() {
    let (store, scheduler) = setup();
    // Registered in reverse of the order they must run.
    scheduler
        .register_with(&store, 0, 1, PRIORITY_RECONCILIATION, 0, &EventKind::ReservoirReconciliation)
        .unwrap();
    scheduler
        .register_with(&store, 0, 1, PRIORITY_SUPPLY, 0, &EventKind::CommoditySupply)
        .unwrap();
    scheduler
        .register_with(&store, 0, 1, PRIORITY_LANDING, 0, &EventKind::SupplyMissionLands { resources: vec![] })
        .unwrap();
    scheduler
        .register_with(&store, 0, 1, PRIORITY_LANDING, 0, &EventKind::MakeFamilies)
        .unwrap();

    let mut recorder = Recorder::new(&store);
    let report = scheduler.invoke_due(&store, 1, &mut recorder).unwrap();
    assert_eq!(report.fired, 4);

    let order: Vec<EventKind> = recorder.fired.into_iter().map(|(_, _, k)| k).collect();
    assert_eq!(
        order,
        vec![
            EventKind::SupplyMissionLands { resources: vec![] },
            EventKind::MakeFamilies,
            EventKind::CommoditySupply,
            EventKind::ReservoirReconciliation,
        ],
        "Events must run by priority, then creation order"
    );
}

#[test]
fn failing_event_does_not_stop_the_rest() {
    let (store, scheduler) = setup();
    scheduler.register(&store, 0, 2, &EventKind::MakeFamilies).unwrap();
    scheduler.register(&store, 0, 2, &EventKind::CommodityMaintenance).unwrap();
    scheduler.register(&store, 0, 2, &EventKind::CommoditySupply).unwrap();

    let mut recorder = Recorder::new(&store);
    recorder.fail_on = Some(EventKind::CommodityMaintenance);
    let report = scheduler.invoke_due(&store, 2, &mut recorder).unwrap();

    assert_eq!(report.fired, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(recorder.fired.len(), 3, "Every due event must still be attempted");
    assert!(
        store.starvation_sols(SIM, "water-id").unwrap().is_empty(),
        "Writes made by a failed event must be rolled back"
    );
}

#[test]
fn unknown_function_name_is_skipped() {
    let (store, scheduler) = setup();
    store
        .insert_event(&ScheduledEvent {
            id: None,
            simulation_id: SIM.into(),
            registered: 0,
            run_on: 4,
            priority: PRIORITY_LANDING,
            periodic: 0,
            idx: 0,
            function_name: "no_such_handler".into(),
            args: "{}".into(),
        })
        .unwrap();
    scheduler
        .register(&store, 0, 4, &EventKind::CommodityStarvation { commodity: CommodityKind::Water })
        .unwrap();

    let mut recorder = Recorder::new(&store);
    let report = scheduler.invoke_due(&store, 4, &mut recorder).unwrap();
    assert_eq!(report.failed, 1, "Unresolvable event counts as failed");
    assert_eq!(report.fired, 1);
    assert_eq!(recorder.fired.len(), 1, "Only the resolvable event reaches the handler");
}

#[test]
fn configuration_error_propagates() {
    let (store, scheduler) = setup();
    scheduler.register(&store, 0, 5, &EventKind::CommodityConsumption).unwrap();
    scheduler.register(&store, 0, 5, &EventKind::CommoditySupply).unwrap();

    let mut recorder = Recorder::new(&store);
    recorder.fail_on = Some(EventKind::CommodityConsumption);
    recorder.fatal = true;
    let err = scheduler.invoke_due(&store, 5, &mut recorder).unwrap_err();

    assert!(err.is_fatal(), "Expected a fatal configuration error, got {err}");
    assert_eq!(recorder.fired.len(), 1, "Nothing runs after a fatal error");
}

#[test]
fn event_arguments_survive_persistence() {
    let (store, scheduler) = setup();
    let born = EventKind::SettlerBorn { mother: "m-1".into(), father: "f-1".into() };
    scheduler.register(&store, 0, 9, &born).unwrap();

    let mut recorder = Recorder::new(&store);
    scheduler.invoke_due(&store, 9, &mut recorder).unwrap();
    assert_eq!(recorder.fired, vec![(9, 0, born)]);
}
