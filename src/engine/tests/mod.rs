use super::*;
use crate::types::{
    ActionConstraint, AttrValue, DenyReason, Expr, PolicyMatchReason, ScopeConstraint,
};
use insta::assert_json_snapshot;
use yare::parameterized;

mod reload;

/// A shared task-list application: users in teams, lists owned by users and
/// shared with reader and editor teams.
const TINYTODO_SCHEMA: &str = r#"{
    "entityTypes": {
        "Application": {},
        "Team": {"memberOfTypes": ["Team", "Application"]},
        "User": {
            "memberOfTypes": ["Team", "Application"],
            "shape": {"type": "Record", "attributes": {
                "joblevel": {"type": "Long"},
                "location": {"type": "String"}
            }}
        },
        "List": {
            "memberOfTypes": ["Application"],
            "shape": {"type": "Record", "attributes": {
                "name": {"type": "String"},
                "owner": {"type": "Entity", "name": "User"},
                "readers": {"type": "Entity", "name": "Team"},
                "editors": {"type": "Entity", "name": "Team"},
                "tasks": {"type": "Set", "element": {"type": "Record", "attributes": {
                    "id": {"type": "Long"},
                    "name": {"type": "String"},
                    "state": {"type": "String"}
                }}}
            }}
        }
    },
    "actions": {
        "CreateList": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["Application"]}},
        "GetLists": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["Application"]}},
        "GetList": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}},
        "UpdateList": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}},
        "DeleteList": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}},
        "CreateTask": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}},
        "UpdateTask": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}},
        "DeleteTask": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}},
        "EditShare": {"appliesTo": {"principalTypes": ["User"], "resourceTypes": ["List"]}}
    }
}"#;

const TINYTODO_ENTITIES: &str = r#"[
    {"uid": {"type": "User", "id": "alice"},
     "attrs": {"joblevel": {"type": "Long", "value": 5}, "location": {"type": "String", "value": "NYC"}},
     "parents": [{"type": "Application", "id": "TinyTodo"}]},
    {"uid": {"type": "User", "id": "bob"},
     "attrs": {"joblevel": {"type": "Long", "value": 3}, "location": {"type": "String", "value": "SF"}},
     "parents": [{"type": "Application", "id": "TinyTodo"}]},
    {"uid": {"type": "User", "id": "carol"},
     "attrs": {"joblevel": {"type": "Long", "value": 1}, "location": {"type": "String", "value": "NYC"}},
     "parents": [{"type": "Team", "id": "groceries-readers"}, {"type": "Application", "id": "TinyTodo"}]},
    {"uid": {"type": "List", "id": "groceries"},
     "attrs": {
        "name": {"type": "String", "value": "Groceries"},
        "owner": {"type": "Entity", "value": {"type": "User", "id": "alice"}},
        "readers": {"type": "Entity", "value": {"type": "Team", "id": "groceries-readers"}},
        "editors": {"type": "Entity", "value": {"type": "Team", "id": "groceries-editors"}},
        "tasks": {"type": "Set", "value": [
            {"type": "Record", "value": {
                "id": {"type": "Long", "value": 0},
                "name": {"type": "String", "value": "milk"},
                "state": {"type": "String", "value": "unchecked"}
            }}
        ]}
     },
     "parents": [{"type": "Application", "id": "TinyTodo"}]},
    {"uid": {"type": "Team", "id": "groceries-readers"}, "parents": [{"type": "Application", "id": "TinyTodo"}]},
    {"uid": {"type": "Team", "id": "groceries-editors"}, "parents": [{"type": "Application", "id": "TinyTodo"}]},
    {"uid": {"type": "Application", "id": "TinyTodo"}}
]"#;

const TINYTODO_POLICIES: &str = r#"[
    {
        "id": "P0-app-wide",
        "effect": "permit",
        "action": {"op": "in", "actions": ["CreateList", "GetLists"]},
        "resource": {"op": "==", "entity": {"type": "Application", "id": "TinyTodo"}}
    },
    {
        "id": "P1-owner-read",
        "effect": "permit",
        "action": {"op": "==", "action": "GetList"},
        "resource": {"op": "is", "entity_type": "List"},
        "conditions": [{"kind": "when", "body":
            {"eq": [{"var": "principal"}, {"getAttr": {"of": {"var": "resource"}, "attr": "owner"}}]}
        }]
    },
    {
        "id": "P2-junior-no-delete",
        "effect": "forbid",
        "principal": {"op": "is", "entity_type": "User"},
        "action": {"op": "==", "action": "DeleteList"},
        "conditions": [{"kind": "when", "body":
            {"lt": [{"getAttr": {"of": {"var": "principal"}, "attr": "joblevel"}}, {"lit": {"type": "Long", "value": 3}}]}
        }]
    },
    {
        "id": "P3-owner-delete",
        "effect": "permit",
        "action": {"op": "==", "action": "DeleteList"},
        "resource": {"op": "is", "entity_type": "List"},
        "conditions": [{"kind": "when", "body":
            {"eq": [{"var": "principal"}, {"getAttr": {"of": {"var": "resource"}, "attr": "owner"}}]}
        }]
    },
    {
        "id": "P4-shared-read",
        "effect": "permit",
        "action": {"op": "==", "action": "GetList"},
        "resource": {"op": "is", "entity_type": "List"},
        "conditions": [{"kind": "when", "body":
            {"or": [
                {"in": [{"var": "principal"}, {"getAttr": {"of": {"var": "resource"}, "attr": "readers"}}]},
                {"in": [{"var": "principal"}, {"getAttr": {"of": {"var": "resource"}, "attr": "editors"}}]}
            ]}
        }]
    },
    {
        "id": "P5-shared-edit",
        "effect": "permit",
        "action": {"op": "in", "actions": ["UpdateList", "CreateTask", "UpdateTask", "DeleteTask"]},
        "resource": {"op": "is", "entity_type": "List"},
        "conditions": [{"kind": "when", "body":
            {"in": [{"var": "principal"}, {"getAttr": {"of": {"var": "resource"}, "attr": "editors"}}]}
        }]
    }
]"#;

fn engine() -> PolicyEngine {
    PolicyEngine::from_documents(TINYTODO_SCHEMA, TINYTODO_ENTITIES, TINYTODO_POLICIES)
        .expect("fixture documents should load")
}

/// The fixture schema and entities, without any policies.
fn engine_without_policies() -> PolicyEngine {
    let engine = PolicyEngine::new();
    engine.load_schema_str(TINYTODO_SCHEMA).unwrap();
    engine.load_entities_str(TINYTODO_ENTITIES).unwrap();
    engine
}

fn uid(s: &str) -> EntityUid {
    s.parse().unwrap()
}

fn user(id: &str) -> EntityUid {
    EntityUid::new("User", id).unwrap()
}

fn list(id: &str) -> EntityUid {
    EntityUid::new("List", id).unwrap()
}

fn request(principal: &str, action: &str, resource: &str) -> Request {
    Request::new(uid(principal), action, uid(resource))
}

fn assert_allow(decision: &Decision) {
    assert!(matches!(decision, Decision::Allow { .. }), "expected allow, got {decision}");
}

fn assert_deny(decision: &Decision, expected: DenyReason) {
    assert_eq!(decision.deny_reason(), Some(&expected), "got {decision}");
}

fn policy_ids(decision: &Decision) -> Vec<&str> {
    decision.policies().iter().map(PolicyId::as_str).collect()
}

include!("core.rs");
include!("evaluate.rs");
include!("listing.rs");
