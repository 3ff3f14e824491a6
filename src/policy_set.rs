//! Ordered, uniquely-identified collection of policies.

use std::sync::Arc;

use tracing::debug;

use crate::condition::validate_policy;
use crate::error::PolicyError;
use crate::policy_match::principal_match_reason;
use crate::schema::SchemaRegistry;
use crate::store::EntityStore;
use crate::types::{
    EntityUid, Policy, PolicyEffectFilter, PolicyId, PolicyMatch, PrincipalPolicies,
};

/// Policies in insertion order. Order is only observable in diagnostics;
/// decisions do not depend on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicySet {
    policies: Vec<Arc<Policy>>,
}

impl PolicySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a policy after checking its id is unused and that it only
    /// refers to declared actions, types and attributes.
    pub fn add_policy(&mut self, policy: Policy, schema: &SchemaRegistry) -> Result<(), PolicyError> {
        if self.contains(policy.id()) {
            return Err(PolicyError::DuplicatePolicy(policy.id().to_string()));
        }
        let violations = validate_policy(&policy, schema);
        if !violations.is_empty() {
            return Err(PolicyError::violation(
                format!("policy {}", policy.id()),
                violations,
            ));
        }
        debug!(event = "PolicySet", phase = "Add", policy = policy.id().as_str());
        self.policies.push(Arc::new(policy));
        Ok(())
    }

    /// Add several policies; on the first failure nothing is added.
    pub fn add_all(
        &mut self,
        policies: impl IntoIterator<Item = Policy>,
        schema: &SchemaRegistry,
    ) -> Result<usize, PolicyError> {
        let mut next = self.clone();
        let mut added = 0;
        for policy in policies {
            next.add_policy(policy, schema)?;
            added += 1;
        }
        *self = next;
        Ok(added)
    }

    pub fn remove_policy(&mut self, id: &PolicyId) -> Result<Arc<Policy>, PolicyError> {
        let index = self
            .policies
            .iter()
            .position(|p| p.id() == id)
            .ok_or_else(|| PolicyError::UnknownPolicy(id.to_string()))?;
        debug!(event = "PolicySet", phase = "Remove", policy = id.as_str());
        Ok(self.policies.remove(index))
    }

    pub fn get(&self, id: &PolicyId) -> Option<&Arc<Policy>> {
        self.policies.iter().find(|p| p.id() == id)
    }

    pub fn contains(&self, id: &PolicyId) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Policy>> {
        self.policies.iter()
    }

    pub fn ids(&self) -> Vec<&PolicyId> {
        self.policies.iter().map(|p| p.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Policies whose principal scope covers `principal`, with the reason.
    ///
    /// Conditions are not evaluated. A principal that is not in the store
    /// has no ancestors, so only `==`, `is` and unconstrained scopes match it.
    pub fn policies_for_principal(
        &self,
        principal: &EntityUid,
        store: &EntityStore,
        filter: PolicyEffectFilter,
    ) -> Result<PrincipalPolicies, PolicyError> {
        let mut matches = Vec::new();
        for policy in self.policies.iter().filter(|p| filter.admits(p.effect())) {
            if let Some(reason) =
                principal_match_reason(policy.principal_constraint(), principal, store)?
            {
                matches.push(PolicyMatch {
                    policy: policy.clone(),
                    reason,
                });
            }
        }
        Ok(PrincipalPolicies::new(principal.clone(), matches))
    }
}
