//! Policies that apply to a given principal, for permission listings.

use std::sync::Arc;

use itertools::Itertools;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use strum_macros::{Display as StrumDisplay, EnumString};

use super::entity_uid::EntityUid;
use super::policy::{Effect, Policy};

/// Which effects to include when listing policies.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PolicyEffectFilter {
    #[default]
    Any,
    Permit,
    Forbid,
}

impl PolicyEffectFilter {
    pub fn admits(self, effect: Effect) -> bool {
        match self {
            PolicyEffectFilter::Any => true,
            PolicyEffectFilter::Permit => effect == Effect::Permit,
            PolicyEffectFilter::Forbid => effect == Effect::Forbid,
        }
    }
}

/// How a policy's principal constraint matched.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
pub enum PolicyMatchReason {
    PrincipalAny,
    PrincipalEq,
    PrincipalIn,
    PrincipalIs,
    PrincipalIsIn,
}

/// One listed policy and why it matched.
#[derive(Debug, Clone)]
pub struct PolicyMatch {
    pub policy: Arc<Policy>,
    pub reason: PolicyMatchReason,
}

/// The policies whose principal scope covers a given principal.
///
/// Conditions are not evaluated; this answers "which rules could apply to
/// this principal", not "what is this principal allowed to do".
#[derive(Debug, Clone)]
pub struct PrincipalPolicies {
    principal: EntityUid,
    matches: Vec<PolicyMatch>,
}

impl PrincipalPolicies {
    pub fn new(principal: EntityUid, matches: Vec<PolicyMatch>) -> Self {
        PrincipalPolicies { principal, matches }
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn matches(&self) -> &[PolicyMatch] {
        &self.matches
    }

    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.matches.iter().map(|m| m.policy.as_ref())
    }

    /// Names of the actions these policies name, sorted and deduplicated.
    /// Policies with an unconstrained action contribute nothing.
    pub fn actions_by_name(&self) -> Vec<String> {
        self.policies()
            .flat_map(|p| p.action_constraint().actions())
            .map(str::to_string)
            .sorted()
            .dedup()
            .collect()
    }

    /// Policy ids, sorted.
    pub fn policy_ids(&self) -> Vec<String> {
        self.policies()
            .map(|p| p.id().to_string())
            .sorted()
            .collect()
    }
}

#[derive(Serialize)]
struct ListedPolicy<'a> {
    #[serde(flatten)]
    policy: &'a Policy,
    reason: PolicyMatchReason,
}

impl Serialize for PrincipalPolicies {
    fn serialize<S>(&self, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let listed: Vec<ListedPolicy<'_>> = self
            .matches
            .iter()
            .map(|m| ListedPolicy {
                policy: m.policy.as_ref(),
                reason: m.reason,
            })
            .collect();

        let mut s = ser.serialize_struct("PrincipalPolicies", 2)?;
        s.serialize_field("principal", &self.principal)?;
        s.serialize_field("policies", &listed)?;
        s.end()
    }
}
