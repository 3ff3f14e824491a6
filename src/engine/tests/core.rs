#[test]
fn test_from_documents_loads_everything() {
    let engine = engine();
    let snapshot = engine.current_snapshot();
    assert_eq!(snapshot.generation(), 3);
    assert_eq!(snapshot.schema().entity_types().count(), 4);
    assert_eq!(snapshot.schema().actions().count(), 9);
    assert_eq!(snapshot.entities().len(), 7);
    assert_eq!(snapshot.policies().len(), 6);
}

#[test]
fn test_entity_round_trips_through_engine() {
    let engine = engine();
    let dave = Entity::new(user("dave"))
        .with_attr("joblevel", AttrValue::Long(4))
        .with_attr("location", "Oslo")
        .with_parent(uid("Application::TinyTodo"));
    assert!(engine.upsert_entity(dave.clone()).unwrap().is_none());

    let fetched = engine.get_entity(&user("dave")).unwrap();
    assert_eq!(fetched, dave);
    for (name, value) in dave.attrs() {
        assert_eq!(fetched.attr(name), Some(value));
    }
}

#[test]
fn test_snapshot_is_isolated_from_later_mutations() {
    let engine = engine();
    let read = request("User::alice", "GetList", "List::groceries");
    let snapshot = engine.current_snapshot();

    engine.remove_policy(&PolicyId::new("P1-owner-read")).unwrap();

    assert_allow(&snapshot.evaluate(&read));
    assert_deny(&engine.evaluate(&read), DenyReason::DefaultDeny);
    assert_eq!(snapshot.generation() + 1, engine.generation());
    assert!(snapshot.policies().contains(&PolicyId::new("P1-owner-read")));
}

#[test]
fn test_failed_mutation_publishes_nothing() {
    let engine = engine();
    let before = engine.current_snapshot();

    let err = engine
        .add_policy(Policy::permit("P1-owner-read"))
        .unwrap_err();
    assert_eq!(err, PolicyError::DuplicatePolicy("P1-owner-read".into()));

    let err = engine
        .upsert_entity(Entity::new(user("eve")).with_attr("joblevel", AttrValue::Long(1)))
        .unwrap_err();
    assert!(matches!(err, PolicyError::SchemaViolation { .. }));

    let err = engine.delete_entity(&user("nobody")).unwrap_err();
    assert_eq!(err, PolicyError::UnknownEntity(r#"User::"nobody""#.into()));

    let after = engine.current_snapshot();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.generation(), 3);
}

#[test]
fn test_mutations_copy_only_what_they_change() {
    let engine = engine();
    let before = engine.current_snapshot();
    engine.remove_policy(&PolicyId::new("P0-app-wide")).unwrap();
    let after = engine.current_snapshot();

    assert!(!std::ptr::eq(before.policies(), after.policies()));
    assert!(std::ptr::eq(before.entities(), after.entities()));
    assert!(std::ptr::eq(before.schema(), after.schema()));
}

#[test]
fn test_clones_share_state() {
    let engine = engine();
    let other = engine.clone();
    other.remove_policy(&PolicyId::new("P1-owner-read")).unwrap();
    assert_eq!(engine.generation(), other.generation());
    assert_deny(
        &engine.evaluate(&request("User::alice", "GetList", "List::groceries")),
        DenyReason::DefaultDeny,
    );
}

#[test]
fn test_authorize_returns_witness_or_error() {
    let engine = engine();
    let read = request("User::alice", "GetList", "List::groceries");

    let witness = engine.authorize(&read).unwrap();
    assert!(witness.covers(&user("alice"), "GetList", &list("groceries")));
    assert_eq!(witness.policies(), &[PolicyId::new("P1-owner-read")]);
    assert_eq!(witness.generation(), 3);

    let err = engine
        .authorize(&request("User::bob", "GetList", "List::groceries"))
        .unwrap_err();
    assert_eq!(err, PolicyError::AuthDenied(DenyReason::DefaultDeny));
}

#[test]
fn test_fresh_uid() {
    let engine = engine();
    let fresh = engine.fresh_uid("List").unwrap();
    assert_eq!(fresh.type_name(), "List");
    assert!(engine.get_entity(&fresh).is_none());

    assert_eq!(
        engine.fresh_uid("Robot"),
        Err(PolicyError::UnknownType("Robot".into()))
    );
}

#[test]
fn test_config_bounds_hierarchy_depth() {
    let engine = PolicyEngine::with_config(EngineConfig::default().with_max_hierarchy_depth(1));
    engine.load_schema_str(TINYTODO_SCHEMA).unwrap();
    engine.load_entities_str(TINYTODO_ENTITIES).unwrap();
    engine.load_policies_str(TINYTODO_POLICIES).unwrap();
    assert_eq!(engine.config().max_hierarchy_depth, 1);

    // carol -> readers is one hop; fine.
    assert_allow(&engine.evaluate(&request("User::carol", "GetList", "List::groceries")));

    // Edges are added bottom-up so each insertion check stays within one hop.
    engine.upsert_entity(Entity::new(uid("Team::night-shift"))).unwrap();
    engine.add_parent(&user("bob"), &uid("Team::night-shift")).unwrap();
    engine
        .add_parent(&uid("Team::night-shift"), &uid("Team::groceries-readers"))
        .unwrap();

    // bob -> night-shift -> readers is two hops.
    let decision = engine.evaluate(&request("User::bob", "GetList", "List::groceries"));
    assert!(matches!(decision.deny_reason(), Some(DenyReason::HierarchyError(_))));
}

#[test]
fn test_concurrent_evaluation_during_mutation() {
    use std::thread;

    let engine = engine();
    let mut handles = vec![];

    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let decision = engine.evaluate(&request("User::alice", "GetList", "List::groceries"));
                assert!(decision.is_allow(), "owner read must never flicker: {decision}");
                let decision = engine.evaluate(&request("User::bob", "DeleteList", "List::groceries"));
                assert!(decision.is_deny());
            }
        }));
    }

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || {
            for i in 0..50 {
                let id = format!("temp-{i}");
                engine
                    .add_policy(
                        Policy::permit(id.as_str())
                            .with_principal(ScopeConstraint::eq(uid("User::carol")))
                            .with_action(ActionConstraint::eq("UpdateList")),
                    )
                    .unwrap();
                engine.remove_policy(&PolicyId::new(id)).unwrap();
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    writer.join().unwrap();
    assert_eq!(engine.generation(), 3 + 100);
}

mod metrics_sink {
    use super::*;
    use crate::metrics::{
        EvaluationPhases, EvaluationStats, MetricsSink, MutationKind, MutationStats, set_sink,
    };
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        evaluations: Mutex<Vec<EvaluationStats>>,
        phases: Mutex<Vec<(String, EvaluationPhases)>>,
        mutations: Mutex<Vec<(MutationKind, u64)>>,
    }

    impl MetricsSink for RecordingSink {
        fn on_evaluation(&self, stats: &EvaluationStats) {
            self.evaluations.lock().unwrap().push(stats.clone());
        }

        fn on_mutation(&self, stats: &MutationStats) {
            self.mutations.lock().unwrap().push((stats.kind, stats.generation));
        }

        fn on_evaluation_phases(&self, stats: &EvaluationStats, phases: &EvaluationPhases) {
            self.phases
                .lock()
                .unwrap()
                .push((stats.principal_id.clone(), phases.clone()));
        }
    }

    // Sinks are process-wide. This is the only test that installs one.
    #[test]
    fn test_sink_receives_evaluations_and_mutations() {
        let sink = Arc::new(RecordingSink::default());
        set_sink(sink.clone());

        let engine = PolicyEngine::with_config(EngineConfig::default().with_phase_metrics(true));
        engine.load_schema_str(TINYTODO_SCHEMA).unwrap();
        engine.load_entities_str(TINYTODO_ENTITIES).unwrap();
        engine.load_policies_str(TINYTODO_POLICIES).unwrap();
        engine
            .upsert_entity(
                Entity::new(user("metrics-user"))
                    .with_attr("joblevel", AttrValue::Long(9))
                    .with_attr("location", "LA"),
            )
            .unwrap();
        assert!(sink
            .mutations
            .lock()
            .unwrap()
            .contains(&(MutationKind::UpsertEntity, 4)));

        let principal_id = r#"User::"metrics-user""#;
        engine.evaluate(&request(principal_id, "GetLists", "Application::TinyTodo"));

        let evaluations = sink.evaluations.lock().unwrap();
        let seen = evaluations
            .iter()
            .find(|s| s.principal_id == principal_id)
            .expect("evaluation recorded");
        assert!(seen.allowed);
        assert_eq!(seen.action_id, "GetLists");
        assert_eq!(seen.generation, 4);
        assert_eq!(seen.policies, vec!["P0-app-wide"]);
        drop(evaluations);

        let phases = sink.phases.lock().unwrap();
        let (_, user_phases) = phases
            .iter()
            .find(|(principal, _)| principal == principal_id)
            .expect("phases recorded");
        assert!(user_phases.total_ms >= user_phases.conditions_ms);
    }
}
