//! Authorization decision types with audit diagnostics.

use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::policy::PolicyId;

/// Why a request was denied. Denial is an expected outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(tag = "kind", content = "detail")]
pub enum DenyReason {
    /// At least one satisfied forbid policy applied.
    ForbiddenByPolicy,
    /// No satisfied permit policy applied.
    DefaultDeny,
    /// The action is undeclared or not declared for these principal/resource types.
    ActionNotApplicable,
    /// The principal or resource is not in the entity store.
    UnknownEntity(String),
    /// The entity hierarchy could not be traversed.
    HierarchyError(String),
}

impl Display for DenyReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DenyReason::ForbiddenByPolicy => write!(f, "forbidden by policy"),
            DenyReason::DefaultDeny => write!(f, "no permit policy applies"),
            DenyReason::ActionNotApplicable => write!(f, "action not applicable"),
            DenyReason::UnknownEntity(uid) => write!(f, "unknown entity {uid}"),
            DenyReason::HierarchyError(msg) => write!(f, "hierarchy error: {msg}"),
        }
    }
}

/// A condition that could not be evaluated and was therefore treated as false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub struct ConditionError {
    pub policy: PolicyId,
    pub message: String,
}

/// Audit information attached to every decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub struct Diagnostics {
    /// Every matching policy whose conditions held, in policy set order.
    pub policies: Vec<PolicyId>,
    /// Conditions that errored; these policies did not apply.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ConditionError>,
    /// Generation of the snapshot the request was evaluated against.
    pub generation: u64,
}

/// Allow or deny decision, with diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
pub enum Decision {
    Allow {
        diagnostics: Diagnostics,
    },
    Deny {
        reason: DenyReason,
        diagnostics: Diagnostics,
    },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }

    pub fn is_deny(&self) -> bool {
        !self.is_allow()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            Decision::Allow { diagnostics } | Decision::Deny { diagnostics, .. } => diagnostics,
        }
    }

    /// Policies that contributed to this decision, in policy set order.
    pub fn policies(&self) -> &[PolicyId] {
        &self.diagnostics().policies
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            Decision::Allow { .. } => None,
            Decision::Deny { reason, .. } => Some(reason),
        }
    }

    pub(crate) fn deny(reason: DenyReason, generation: u64) -> Self {
        Decision::Deny {
            reason,
            diagnostics: Diagnostics {
                generation,
                ..Diagnostics::default()
            },
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let policies = self.policies().iter().join(", ");
        match self {
            Decision::Allow { diagnostics } => {
                write!(f, "Allow(gen={}; [{policies}])", diagnostics.generation)
            }
            Decision::Deny {
                reason,
                diagnostics,
            } => write!(
                f,
                "Deny(gen={}; {reason}; [{policies}])",
                diagnostics.generation
            ),
        }
    }
}
