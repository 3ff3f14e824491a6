use super::*;

const POLICIES_WITHOUT_OWNER_READ: &str = r#"[
    {
        "id": "P4-shared-read",
        "effect": "permit",
        "action": {"op": "==", "action": "GetList"},
        "resource": {"op": "is", "entity_type": "List"},
        "conditions": [{"kind": "when", "body":
            {"in": [{"var": "principal"}, {"getAttr": {"of": {"var": "resource"}, "attr": "readers"}}]}
        }]
    }
]"#;

#[test]
fn test_replace_policies() {
    let engine = engine();
    let owner_read = request("User::alice", "GetList", "List::groceries");
    let shared_read = request("User::carol", "GetList", "List::groceries");
    assert_allow(&engine.evaluate(&owner_read));

    let count = engine.replace_policies_str(POLICIES_WITHOUT_OWNER_READ).unwrap();
    assert_eq!(count, 1);
    assert_eq!(engine.policies().len(), 1);
    assert_eq!(engine.generation(), 4);

    assert_deny(&engine.evaluate(&owner_read), DenyReason::DefaultDeny);
    assert_allow(&engine.evaluate(&shared_read));
}

#[test]
fn test_replace_policies_may_reuse_ids() {
    let engine = engine();
    engine.replace_policies_str(TINYTODO_POLICIES).unwrap();
    assert_eq!(engine.policies().len(), 6);
}

#[parameterized(
    malformed_json = { "[{" },
    missing_effect = { r#"[{"id": "x"}]"# },
    unknown_field = { r#"[{"id": "x", "effect": "permit", "principle": {"op": "All"}}]"# },
)]
fn test_failed_reload_keeps_previous_policies(text: &str) {
    let engine = engine();
    let before = engine.current_snapshot();

    let err = engine.replace_policies_str(text).unwrap_err();
    assert!(matches!(err, PolicyError::PolicyParseError(_)), "got {err:?}");

    let after = engine.current_snapshot();
    assert!(Arc::ptr_eq(&before, &after));
    assert_allow(&engine.evaluate(&request("User::alice", "GetList", "List::groceries")));
}

#[test]
fn test_reload_rejected_by_schema_is_atomic() {
    let engine = engine();
    let text = r#"[
        {"id": "fine", "effect": "permit", "action": {"op": "==", "action": "GetList"}},
        {"id": "broken", "effect": "permit", "action": {"op": "==", "action": "Launch"}}
    ]"#;

    let err = engine.replace_policies_str(text).unwrap_err();
    match err {
        PolicyError::SchemaViolation {
            subject,
            violations,
        } => {
            assert_eq!(subject, "policy broken");
            assert_eq!(violations[0].path, "action");
        }
        other => panic!("expected a schema violation, got {other:?}"),
    }
    assert_eq!(engine.policies().len(), 6);
    assert_eq!(engine.generation(), 3);
}

#[test]
fn test_load_policies_is_all_or_nothing() {
    let engine = engine();
    let text = r#"[
        {"id": "P9-new", "effect": "permit", "action": {"op": "==", "action": "GetLists"}},
        {"id": "P1-owner-read", "effect": "permit"}
    ]"#;

    let err = engine.load_policies_str(text).unwrap_err();
    assert_eq!(err, PolicyError::DuplicatePolicy("P1-owner-read".into()));
    assert!(!engine.current_snapshot().policies().contains(&PolicyId::new("P9-new")));
    assert_eq!(engine.policies().len(), 6);
}

#[test]
fn test_load_policies_duplicate_within_document() {
    let engine = engine_without_policies();
    let text = r#"[
        {"id": "twice", "effect": "permit"},
        {"id": "twice", "effect": "forbid"}
    ]"#;
    assert_eq!(
        engine.load_policies_str(text),
        Err(PolicyError::DuplicatePolicy("twice".into()))
    );
    assert!(engine.policies().is_empty());
}

#[test]
fn test_remove_unknown_policy() {
    let engine = engine();
    assert_eq!(
        engine.remove_policy(&PolicyId::new("P99")).unwrap_err(),
        PolicyError::UnknownPolicy("P99".into())
    );
    assert_eq!(engine.generation(), 3);
}

#[test]
fn test_reload_during_evaluation() {
    use std::thread;

    let engine = engine();
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    // Carol's shared read is granted by both documents.
                    let decision =
                        engine.evaluate(&request("User::carol", "GetList", "List::groceries"));
                    assert!(decision.is_allow(), "{decision}");
                }
            })
        })
        .collect();

    for i in 0..20 {
        let text = if i % 2 == 0 {
            POLICIES_WITHOUT_OWNER_READ
        } else {
            TINYTODO_POLICIES
        };
        engine.replace_policies_str(text).unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.generation(), 3 + 20);
    assert_eq!(engine.policies().len(), 6);
}
