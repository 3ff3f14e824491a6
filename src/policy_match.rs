use crate::error::PolicyError;
use crate::store::EntityStore;
use crate::types::{ActionConstraint, EntityUid, PolicyMatchReason, ScopeConstraint};

/// How a principal or resource constraint matched an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeMatch {
    Any,
    Eq,
    In,
    Is,
    IsIn,
}

impl From<ScopeMatch> for PolicyMatchReason {
    fn from(m: ScopeMatch) -> Self {
        match m {
            ScopeMatch::Any => PolicyMatchReason::PrincipalAny,
            ScopeMatch::Eq => PolicyMatchReason::PrincipalEq,
            ScopeMatch::In => PolicyMatchReason::PrincipalIn,
            ScopeMatch::Is => PolicyMatchReason::PrincipalIs,
            ScopeMatch::IsIn => PolicyMatchReason::PrincipalIsIn,
        }
    }
}

/// `uid in ancestor`: equality or reachability over parent edges.
pub(crate) fn in_hierarchy(
    uid: &EntityUid,
    ancestor: &EntityUid,
    store: &EntityStore,
) -> Result<bool, PolicyError> {
    Ok(uid == ancestor || store.is_descendant_of(uid, ancestor)?)
}

pub(crate) fn scope_match(
    constraint: &ScopeConstraint,
    uid: &EntityUid,
    store: &EntityStore,
) -> Result<Option<ScopeMatch>, PolicyError> {
    let matched = match constraint {
        ScopeConstraint::Any => Some(ScopeMatch::Any),
        ScopeConstraint::Eq { entity } => (entity == uid).then_some(ScopeMatch::Eq),
        ScopeConstraint::In { entity } => {
            in_hierarchy(uid, entity, store)?.then_some(ScopeMatch::In)
        }
        ScopeConstraint::Is {
            entity_type,
            within: None,
        } => (uid.type_name() == entity_type).then_some(ScopeMatch::Is),
        ScopeConstraint::Is {
            entity_type,
            within: Some(within),
        } => (uid.type_name() == entity_type && in_hierarchy(uid, within, store)?)
            .then_some(ScopeMatch::IsIn),
    };
    Ok(matched)
}

pub(crate) fn principal_match_reason(
    constraint: &ScopeConstraint,
    principal: &EntityUid,
    store: &EntityStore,
) -> Result<Option<PolicyMatchReason>, PolicyError> {
    Ok(scope_match(constraint, principal, store)?.map(Into::into))
}

pub(crate) fn action_matches(constraint: &ActionConstraint, action: &str) -> bool {
    match constraint {
        ActionConstraint::Any => true,
        ActionConstraint::Eq { action: expected } => expected == action,
        ActionConstraint::In { actions } => actions.iter().any(|a| a == action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityTypeDef, SchemaFragment, SchemaRegistry};
    use crate::types::Entity;
    use yare::parameterized;

    fn uid(s: &str) -> EntityUid {
        s.parse().unwrap()
    }

    fn store() -> EntityStore {
        let mut schema = SchemaRegistry::new();
        schema
            .register_fragment(SchemaFragment {
                entity_types: vec![
                    EntityTypeDef::new("Team").member_of("Team"),
                    EntityTypeDef::new("User").member_of("Team"),
                ],
                actions: vec![],
            })
            .unwrap();
        let mut store = EntityStore::new();
        store.upsert_entity(Entity::new(uid("Team::root")), &schema).unwrap();
        store
            .upsert_entity(Entity::new(uid("Team::eng")).with_parent(uid("Team::root")), &schema)
            .unwrap();
        store
            .upsert_entity(Entity::new(uid("User::alice")).with_parent(uid("Team::eng")), &schema)
            .unwrap();
        store
            .upsert_entity(Entity::new(uid("User::bob")), &schema)
            .unwrap();
        store
    }

    #[parameterized(
        any = { ScopeConstraint::Any, "User::bob", Some(ScopeMatch::Any) },
        eq_hit = { ScopeConstraint::eq(uid("User::alice")), "User::alice", Some(ScopeMatch::Eq) },
        eq_miss = { ScopeConstraint::eq(uid("User::alice")), "User::bob", None },
        in_self = { ScopeConstraint::in_entity(uid("Team::eng")), "Team::eng", Some(ScopeMatch::In) },
        in_transitive = { ScopeConstraint::in_entity(uid("Team::root")), "User::alice", Some(ScopeMatch::In) },
        in_miss = { ScopeConstraint::in_entity(uid("Team::root")), "User::bob", None },
        is_hit = { ScopeConstraint::is("User"), "User::bob", Some(ScopeMatch::Is) },
        is_miss = { ScopeConstraint::is("Team"), "User::bob", None },
        is_in_hit = { ScopeConstraint::is_in("User", uid("Team::root")), "User::alice", Some(ScopeMatch::IsIn) },
        is_in_wrong_type = { ScopeConstraint::is_in("User", uid("Team::root")), "Team::eng", None },
    )]
    fn test_scope_match(constraint: ScopeConstraint, entity: &str, expected: Option<ScopeMatch>) {
        let store = store();
        assert_eq!(scope_match(&constraint, &uid(entity), &store).unwrap(), expected);
    }

    #[test]
    fn test_principal_reason_mapping() {
        let store = store();
        let reason = principal_match_reason(
            &ScopeConstraint::in_entity(uid("Team::eng")),
            &uid("User::alice"),
            &store,
        )
        .unwrap();
        assert_eq!(reason, Some(PolicyMatchReason::PrincipalIn));
    }

    #[parameterized(
        any = { ActionConstraint::Any, "GetList", true },
        eq_hit = { ActionConstraint::eq("GetList"), "GetList", true },
        eq_miss = { ActionConstraint::eq("GetList"), "DeleteList", false },
        in_hit = { ActionConstraint::in_list(["UpdateList", "DeleteList"]), "DeleteList", true },
        in_miss = { ActionConstraint::in_list(["UpdateList"]), "GetList", false },
    )]
    fn test_action_matches(constraint: ActionConstraint, action: &str, expected: bool) {
        assert_eq!(action_matches(&constraint, action), expected);
    }
}
