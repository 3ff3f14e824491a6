use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::PolicyError;
use crate::evaluator::Evaluator;
use crate::loader;
use crate::metrics::{self, EvaluationStats, MutationKind};
use crate::policy_set::PolicySet;
use crate::schema::{ActionDef, EntityTypeDef, SchemaRegistry};
use crate::store::EntityStore;
use crate::timers::PhaseClock;
use crate::types::{
    Decision, Entity, EntityUid, Policy, PolicyEffectFilter, PolicyId, PrincipalPolicies, Request,
    RequestContext,
};
use crate::witness::AuthWitness;

/// One consistent view of schema, entities and policies.
///
/// Snapshots are immutable. Cloning one only bumps reference counts.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    schema: Arc<SchemaRegistry>,
    entities: Arc<EntityStore>,
    policies: Arc<PolicySet>,
    generation: u64,
}

impl EngineSnapshot {
    fn empty(config: &EngineConfig) -> Self {
        EngineSnapshot {
            schema: Arc::new(SchemaRegistry::new()),
            entities: Arc::new(EntityStore::with_max_depth(config.max_hierarchy_depth)),
            policies: Arc::new(PolicySet::new()),
            generation: 0,
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    /// Incremented by every successful mutation; starts at 0.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.schema, &self.entities, &self.policies).with_generation(self.generation)
    }

    /// Evaluate without touching the engine lock or the metrics sink.
    pub fn evaluate(&self, request: &Request) -> Decision {
        self.evaluator().evaluate(request)
    }
}

/// The main engine handle. Cloneable and thread-safe; clones share state.
///
/// Evaluations read the current snapshot without holding the lock while they
/// run. Mutations are serialized, build a new snapshot copy-on-write and
/// publish it only if they succeed.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    inner: Arc<RwLock<Arc<EngineSnapshot>>>,
    config: EngineConfig,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        PolicyEngine {
            inner: Arc::new(RwLock::new(Arc::new(EngineSnapshot::empty(&config)))),
            config,
        }
    }

    /// Build an engine from a schema, an entity and a policy document.
    pub fn from_documents(
        schema: &str,
        entities: &str,
        policies: &str,
    ) -> Result<Self, PolicyError> {
        let engine = Self::new();
        engine.load_schema_str(schema)?;
        engine.load_entities_str(entities)?;
        engine.load_policies_str(policies)?;
        Ok(engine)
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// The snapshot evaluations currently read.
    pub fn current_snapshot(&self) -> Arc<EngineSnapshot> {
        // Snapshots are swapped whole, so a poisoned lock still holds a valid one.
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn generation(&self) -> u64 {
        self.current_snapshot().generation
    }

    /// Apply `change` to a copy of the current snapshot and publish it.
    fn mutate<T>(
        &self,
        kind: MutationKind,
        change: impl FnOnce(&mut EngineSnapshot) -> Result<T, PolicyError>,
    ) -> Result<T, PolicyError> {
        let mut guard = self.inner.write()?;
        let mut next = EngineSnapshot::clone(&guard);
        let out = match change(&mut next) {
            Ok(out) => out,
            Err(err) => {
                warn!(
                    event = "Mutation",
                    phase = kind.to_string(),
                    error = err.to_string(),
                    "rejected"
                );
                return Err(err);
            }
        };
        next.generation += 1;
        let generation = next.generation;
        *guard = Arc::new(next);
        drop(guard);

        info!(event = "Mutation", phase = kind.to_string(), generation);
        metrics::record_mutation(kind, generation);
        Ok(out)
    }

    pub fn register_entity_type(&self, def: EntityTypeDef) -> Result<(), PolicyError> {
        self.mutate(MutationKind::RegisterEntityType, |s| {
            Arc::make_mut(&mut s.schema).register_entity_type(def)
        })
    }

    pub fn register_action(&self, def: ActionDef) -> Result<(), PolicyError> {
        self.mutate(MutationKind::RegisterAction, |s| {
            Arc::make_mut(&mut s.schema).register_action(def)
        })
    }

    /// Register a JSON schema document; all of it or none of it.
    pub fn load_schema_str(&self, text: &str) -> Result<(), PolicyError> {
        let fragment = loader::parse_schema(text)?;
        self.mutate(MutationKind::LoadSchema, |s| {
            Arc::make_mut(&mut s.schema).register_fragment(fragment)
        })
    }

    /// Insert or replace an entity, returning the previous version.
    pub fn upsert_entity(&self, entity: Entity) -> Result<Option<Entity>, PolicyError> {
        self.mutate(MutationKind::UpsertEntity, |s| {
            Arc::make_mut(&mut s.entities).upsert_entity(entity, &s.schema)
        })
    }

    pub fn delete_entity(&self, uid: &EntityUid) -> Result<Entity, PolicyError> {
        self.mutate(MutationKind::DeleteEntity, |s| {
            Arc::make_mut(&mut s.entities).delete_entity(uid)
        })
    }

    pub fn add_parent(&self, child: &EntityUid, parent: &EntityUid) -> Result<(), PolicyError> {
        self.mutate(MutationKind::AddParent, |s| {
            Arc::make_mut(&mut s.entities).add_parent(child, parent, &s.schema)
        })
    }

    /// Returns whether the edge existed.
    pub fn remove_parent(&self, child: &EntityUid, parent: &EntityUid) -> Result<bool, PolicyError> {
        self.mutate(MutationKind::RemoveParent, |s| {
            Arc::make_mut(&mut s.entities).remove_parent(child, parent)
        })
    }

    /// Load a JSON entity document; all of it or none of it.
    pub fn load_entities_str(&self, text: &str) -> Result<usize, PolicyError> {
        let entities = loader::parse_entities(text)?;
        self.mutate(MutationKind::LoadEntities, |s| {
            Arc::make_mut(&mut s.entities).upsert_all(entities, &s.schema)
        })
    }

    pub fn get_entity(&self, uid: &EntityUid) -> Option<Entity> {
        self.current_snapshot().entities.get(uid).cloned()
    }

    pub fn is_descendant_of(
        &self,
        uid: &EntityUid,
        ancestor: &EntityUid,
    ) -> Result<bool, PolicyError> {
        self.current_snapshot().entities.is_descendant_of(uid, ancestor)
    }

    /// An unused uid of a registered type. Not reserved: a concurrent upsert
    /// may claim it first.
    pub fn fresh_uid(&self, type_name: &str) -> Result<EntityUid, PolicyError> {
        let snapshot = self.current_snapshot();
        if !snapshot.schema.contains_type(type_name) {
            return Err(PolicyError::UnknownType(type_name.to_string()));
        }
        snapshot.entities.fresh_uid(type_name)
    }

    pub fn add_policy(&self, policy: Policy) -> Result<(), PolicyError> {
        self.mutate(MutationKind::AddPolicy, |s| {
            Arc::make_mut(&mut s.policies).add_policy(policy, &s.schema)
        })
    }

    pub fn remove_policy(&self, id: &PolicyId) -> Result<Arc<Policy>, PolicyError> {
        self.mutate(MutationKind::RemovePolicy, |s| {
            Arc::make_mut(&mut s.policies).remove_policy(id)
        })
    }

    /// Add every policy in a JSON policy document, or none of them.
    pub fn load_policies_str(&self, text: &str) -> Result<usize, PolicyError> {
        let policies = loader::compile_policies(text)?;
        self.mutate(MutationKind::LoadPolicies, |s| {
            Arc::make_mut(&mut s.policies).add_all(policies, &s.schema)
        })
    }

    /// Replace the whole policy set with a JSON policy document. On failure
    /// the previous set stays in place.
    pub fn replace_policies_str(&self, text: &str) -> Result<usize, PolicyError> {
        let policies = loader::compile_policies(text)?;
        self.mutate(MutationKind::ReplacePolicies, |s| {
            let mut set = PolicySet::new();
            let count = set.add_all(policies, &s.schema)?;
            s.policies = Arc::new(set);
            Ok(count)
        })
    }

    pub fn policies(&self) -> Vec<Arc<Policy>> {
        self.current_snapshot().policies.iter().cloned().collect()
    }

    /// Policies whose principal scope covers `principal`; conditions are not
    /// evaluated.
    pub fn policies_for_principal(
        &self,
        principal: &EntityUid,
        filter: PolicyEffectFilter,
    ) -> Result<PrincipalPolicies, PolicyError> {
        let snapshot = self.current_snapshot();
        snapshot
            .policies
            .policies_for_principal(principal, &snapshot.entities, filter)
    }

    /// Decide a request. Never fails: anything that goes wrong is a `Deny`.
    pub fn evaluate(&self, request: &Request) -> Decision {
        let started = Instant::now();
        let snapshot = self.current_snapshot();
        let mut clock = PhaseClock::new(self.config.record_phase_metrics);
        let decision = snapshot.evaluator().evaluate_timed(request, &mut clock);
        let duration = started.elapsed();

        match decision.deny_reason() {
            None => info!(
                event = "Request",
                phase = "Result",
                principal = request.principal.to_string(),
                action = request.action.as_str(),
                resource = request.resource.to_string(),
                decision = decision.to_string()
            ),
            Some(reason) => debug!(
                event = "Request",
                phase = "Result",
                principal = request.principal.to_string(),
                action = request.action.as_str(),
                resource = request.resource.to_string(),
                reason = reason.to_string()
            ),
        }

        let stats = EvaluationStats {
            duration,
            allowed: decision.is_allow(),
            principal_id: request.principal.to_string(),
            action_id: request.action.clone(),
            policies: decision.policies().iter().map(ToString::to_string).collect(),
            generation: snapshot.generation,
        };
        metrics::record_evaluation(&stats, clock.finish().as_ref());
        decision
    }

    pub fn is_authorized(
        &self,
        principal: &EntityUid,
        action: &str,
        resource: &EntityUid,
        context: RequestContext,
    ) -> Decision {
        self.evaluate(
            &Request::new(principal.clone(), action, resource.clone()).with_context(context),
        )
    }

    /// Evaluate and, on `Allow`, hand back proof of it.
    pub fn authorize(&self, request: &Request) -> Result<AuthWitness, PolicyError> {
        match self.evaluate(request) {
            Decision::Allow { diagnostics } => Ok(AuthWitness::new(request, &diagnostics)),
            Decision::Deny { reason, .. } => Err(PolicyError::AuthDenied(reason)),
        }
    }
}

#[cfg(test)]
mod tests;
