//! Request evaluation: forbid overrides permit, and the default is deny.

use tracing::{debug, trace};

use crate::condition::{EvalEnv, EvalError};
use crate::error::PolicyError;
use crate::policy_match::{action_matches, scope_match};
use crate::policy_set::PolicySet;
use crate::schema::SchemaRegistry;
use crate::store::EntityStore;
use crate::timers::{Phase, PhaseClock};
use crate::types::{
    ConditionError, Decision, DenyReason, Diagnostics, Effect, EntityUid, Policy, Request,
};

/// Evaluates requests against one consistent view of schema, entities and
/// policies. Holds only borrows; never mutates anything.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator<'a> {
    schema: &'a SchemaRegistry,
    store: &'a EntityStore,
    policies: &'a PolicySet,
    generation: u64,
}

enum Outcome {
    NotApplicable,
    Satisfied,
    Errored(String),
}

impl<'a> Evaluator<'a> {
    pub fn new(schema: &'a SchemaRegistry, store: &'a EntityStore, policies: &'a PolicySet) -> Self {
        Evaluator {
            schema,
            store,
            policies,
            generation: 0,
        }
    }

    /// Stamp decisions with the generation of the snapshot being read.
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn evaluate(&self, request: &Request) -> Decision {
        self.evaluate_timed(request, &mut PhaseClock::new(false))
    }

    pub(crate) fn evaluate_timed(&self, request: &Request, clock: &mut PhaseClock) -> Decision {
        debug!(
            event = "Evaluate",
            phase = "Start",
            principal = request.principal.to_string(),
            action = request.action.as_str(),
            resource = request.resource.to_string(),
            generation = self.generation
        );

        let resolved = clock.time(Phase::ResolveEntities, || {
            let resolve = |uid: &EntityUid| {
                self.store
                    .get(uid)
                    .ok_or_else(|| DenyReason::UnknownEntity(uid.to_string()))
            };
            Ok::<_, DenyReason>((resolve(&request.principal)?, resolve(&request.resource)?))
        });
        let (principal, resource) = match resolved {
            Ok(pair) => pair,
            Err(reason) => return self.deny(reason),
        };

        if !self
            .schema
            .action_applies(&request.action, principal.type_name(), resource.type_name())
        {
            return self.deny(DenyReason::ActionNotApplicable);
        }

        let env = EvalEnv {
            principal,
            action: &request.action,
            resource,
            context: &request.context,
            store: self.store,
        };

        let mut diagnostics = Diagnostics {
            generation: self.generation,
            ..Diagnostics::default()
        };
        let mut forbidden = false;
        let mut permitted = false;

        for policy in self.policies.iter() {
            let outcome = match self.check(policy, request, &env, clock) {
                Ok(outcome) => outcome,
                Err(message) => {
                    debug!(
                        event = "Evaluate",
                        phase = "Hierarchy",
                        policy = policy.id().as_str(),
                        error = message.as_str()
                    );
                    return self.deny(DenyReason::HierarchyError(message));
                }
            };
            match outcome {
                Outcome::NotApplicable => {}
                Outcome::Satisfied => {
                    trace!(
                        event = "Evaluate",
                        phase = "Match",
                        policy = policy.id().as_str(),
                        effect = policy.effect().to_string()
                    );
                    match policy.effect() {
                        Effect::Forbid => forbidden = true,
                        Effect::Permit => permitted = true,
                    }
                    diagnostics.policies.push(policy.id().clone());
                }
                Outcome::Errored(message) => {
                    diagnostics.errors.push(ConditionError {
                        policy: policy.id().clone(),
                        message,
                    });
                }
            }
        }

        let decision = if forbidden {
            Decision::Deny {
                reason: DenyReason::ForbiddenByPolicy,
                diagnostics,
            }
        } else if permitted {
            Decision::Allow { diagnostics }
        } else {
            Decision::Deny {
                reason: DenyReason::DefaultDeny,
                diagnostics,
            }
        };
        debug!(event = "Evaluate", phase = "Done", decision = decision.to_string());
        decision
    }

    /// Scope (principal, action, resource, short-circuiting), then
    /// conditions. `Err` is a hierarchy failure, which denies the whole
    /// request.
    fn check(
        &self,
        policy: &Policy,
        request: &Request,
        env: &EvalEnv<'_>,
        clock: &mut PhaseClock,
    ) -> Result<Outcome, String> {
        let in_scope = clock.time(Phase::MatchScope, || -> Result<bool, PolicyError> {
            if scope_match(policy.principal_constraint(), &request.principal, self.store)?
                .is_none()
            {
                return Ok(false);
            }
            if !action_matches(policy.action_constraint(), &request.action) {
                return Ok(false);
            }
            Ok(scope_match(policy.resource_constraint(), &request.resource, self.store)?.is_some())
        });
        match in_scope {
            Ok(true) => {}
            Ok(false) => return Ok(Outcome::NotApplicable),
            Err(e) => return Err(e.to_string()),
        }

        match clock.time(Phase::Conditions, || env.conditions_hold(policy)) {
            Ok(true) => Ok(Outcome::Satisfied),
            Ok(false) => Ok(Outcome::NotApplicable),
            Err(EvalError::Hierarchy(e)) => Err(e.to_string()),
            Err(e) => Ok(Outcome::Errored(e.to_string())),
        }
    }

    fn deny(&self, reason: DenyReason) -> Decision {
        debug!(event = "Evaluate", phase = "Done", reason = reason.to_string());
        Decision::deny(reason, self.generation)
    }
}
