//! Policies: effect, scope and conditions.

use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

use super::entity_uid::EntityUid;
use super::expr::Expr;

/// Identifier of a policy within a policy set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        PolicyId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(id: &str) -> Self {
        PolicyId(id.to_string())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Effect {
    Permit,
    Forbid,
}

/// Constraint on the principal or resource slot of a policy scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "op")]
pub enum ScopeConstraint {
    /// Any entity.
    #[default]
    #[serde(rename = "All")]
    Any,
    /// Exactly this entity.
    #[serde(rename = "==")]
    Eq { entity: EntityUid },
    /// This entity or any of its descendants.
    #[serde(rename = "in")]
    In { entity: EntityUid },
    /// Any entity of this type, optionally restricted to a hierarchy.
    #[serde(rename = "is")]
    Is {
        entity_type: String,
        #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
        within: Option<EntityUid>,
    },
}

impl ScopeConstraint {
    pub fn eq(entity: EntityUid) -> Self {
        ScopeConstraint::Eq { entity }
    }

    pub fn in_entity(entity: EntityUid) -> Self {
        ScopeConstraint::In { entity }
    }

    pub fn is(entity_type: impl Into<String>) -> Self {
        ScopeConstraint::Is {
            entity_type: entity_type.into(),
            within: None,
        }
    }

    pub fn is_in(entity_type: impl Into<String>, entity: EntityUid) -> Self {
        ScopeConstraint::Is {
            entity_type: entity_type.into(),
            within: Some(entity),
        }
    }

    /// Entity type names this constraint names, directly or via uids.
    pub fn type_refs(&self) -> Vec<&str> {
        match self {
            ScopeConstraint::Any => Vec::new(),
            ScopeConstraint::Eq { entity } | ScopeConstraint::In { entity } => {
                vec![entity.type_name()]
            }
            ScopeConstraint::Is {
                entity_type,
                within,
            } => {
                let mut refs = vec![entity_type.as_str()];
                if let Some(within) = within {
                    refs.push(within.type_name());
                }
                refs
            }
        }
    }

    fn fmt_slot(&self, slot: &str, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ScopeConstraint::Any => write!(f, "{slot}"),
            ScopeConstraint::Eq { entity } => write!(f, "{slot} == {entity}"),
            ScopeConstraint::In { entity } => write!(f, "{slot} in {entity}"),
            ScopeConstraint::Is {
                entity_type,
                within: None,
            } => write!(f, "{slot} is {entity_type}"),
            ScopeConstraint::Is {
                entity_type,
                within: Some(within),
            } => write!(f, "{slot} is {entity_type} in {within}"),
        }
    }
}

/// Constraint on the action slot of a policy scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "op")]
pub enum ActionConstraint {
    #[default]
    #[serde(rename = "All")]
    Any,
    #[serde(rename = "==")]
    Eq { action: String },
    #[serde(rename = "in")]
    In { actions: Vec<String> },
}

impl ActionConstraint {
    pub fn eq(action: impl Into<String>) -> Self {
        ActionConstraint::Eq {
            action: action.into(),
        }
    }

    pub fn in_list<I, S>(actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ActionConstraint::In {
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Action names this constraint names; empty for `Any`.
    pub fn actions(&self) -> Vec<&str> {
        match self {
            ActionConstraint::Any => Vec::new(),
            ActionConstraint::Eq { action } => vec![action.as_str()],
            ActionConstraint::In { actions } => actions.iter().map(String::as_str).collect(),
        }
    }
}

impl Display for ActionConstraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ActionConstraint::Any => write!(f, "action"),
            ActionConstraint::Eq { action } => write!(f, r#"action == Action::"{action}""#),
            ActionConstraint::In { actions } => write!(
                f,
                "action in [{}]",
                actions.iter().map(|a| format!(r#"Action::"{a}""#)).join(", ")
            ),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConditionKind {
    When,
    Unless,
}

/// A `when` or `unless` clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub body: Expr,
}

/// A permit or forbid rule. Immutable once built; policy sets only add and
/// remove whole policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    id: PolicyId,
    effect: Effect,
    #[serde(default)]
    principal: ScopeConstraint,
    #[serde(default)]
    action: ActionConstraint,
    #[serde(default)]
    resource: ScopeConstraint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    conditions: Vec<Condition>,
}

impl Policy {
    /// A policy with the given effect and an unconstrained scope.
    pub fn new(id: impl Into<PolicyId>, effect: Effect) -> Self {
        Policy {
            id: id.into(),
            effect,
            principal: ScopeConstraint::Any,
            action: ActionConstraint::Any,
            resource: ScopeConstraint::Any,
            conditions: Vec::new(),
        }
    }

    pub fn permit(id: impl Into<PolicyId>) -> Self {
        Policy::new(id, Effect::Permit)
    }

    pub fn forbid(id: impl Into<PolicyId>) -> Self {
        Policy::new(id, Effect::Forbid)
    }

    pub fn with_principal(mut self, constraint: ScopeConstraint) -> Self {
        self.principal = constraint;
        self
    }

    pub fn with_action(mut self, constraint: ActionConstraint) -> Self {
        self.action = constraint;
        self
    }

    pub fn with_resource(mut self, constraint: ScopeConstraint) -> Self {
        self.resource = constraint;
        self
    }

    pub fn when(mut self, body: Expr) -> Self {
        self.conditions.push(Condition {
            kind: ConditionKind::When,
            body,
        });
        self
    }

    pub fn unless(mut self, body: Expr) -> Self {
        self.conditions.push(Condition {
            kind: ConditionKind::Unless,
            body,
        });
        self
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn principal_constraint(&self) -> &ScopeConstraint {
        &self.principal
    }

    pub fn action_constraint(&self) -> &ActionConstraint {
        &self.action
    }

    pub fn resource_constraint(&self) -> &ScopeConstraint {
        &self.resource
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }
}

impl From<String> for PolicyId {
    fn from(id: String) -> Self {
        PolicyId(id)
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "@id({:?}) {}(", self.id.as_str(), self.effect)?;
        self.principal.fmt_slot("principal", f)?;
        write!(f, ", {}, ", self.action)?;
        self.resource.fmt_slot("resource", f)?;
        write!(f, ")")?;
        for condition in &self.conditions {
            write!(f, " {} {{ {} }}", condition.kind, condition.body)?;
        }
        write!(f, ";")
    }
}
