//! Proof of a successful authorization.

use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::Serialize;

use crate::types::{Diagnostics, EntityUid, PolicyId, Request};

/// Evidence that a request was allowed.
///
/// Only `PolicyEngine::authorize` can construct one, so code that takes an
/// `AuthWitness` argument cannot be reached without a passing check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthWitness {
    principal: EntityUid,
    action: String,
    resource: EntityUid,
    policies: Vec<PolicyId>,
    generation: u64,
}

impl AuthWitness {
    pub(crate) fn new(request: &Request, diagnostics: &Diagnostics) -> Self {
        AuthWitness {
            principal: request.principal.clone(),
            action: request.action.clone(),
            resource: request.resource.clone(),
            policies: diagnostics.policies.clone(),
            generation: diagnostics.generation,
        }
    }

    pub fn principal(&self) -> &EntityUid {
        &self.principal
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn resource(&self) -> &EntityUid {
        &self.resource
    }

    /// The permit policies (and only those) that allowed the request.
    pub fn policies(&self) -> &[PolicyId] {
        &self.policies
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if this witness was issued for exactly this triple.
    pub fn covers(&self, principal: &EntityUid, action: &str, resource: &EntityUid) -> bool {
        &self.principal == principal && self.action == action && &self.resource == resource
    }
}

impl Display for AuthWitness {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{} may {} {} (gen={}; [{}])",
            self.principal,
            self.action,
            self.resource,
            self.generation,
            self.policies.iter().join(", ")
        )
    }
}
