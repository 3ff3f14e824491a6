//! Entity store: an arena of entities indexed by uid, with parent edges.
//!
//! The hierarchy is kept acyclic by construction: every edge insertion is
//! preceded by a reachability check from the new parent back to the child.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::config::DEFAULT_MAX_HIERARCHY_DEPTH;
use crate::error::PolicyError;
use crate::schema::SchemaRegistry;
use crate::types::{Entity, EntityUid};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStore {
    entities: HashMap<EntityUid, Entity>,
    max_depth: usize,
}

impl Default for EntityStore {
    fn default() -> Self {
        EntityStore::with_max_depth(DEFAULT_MAX_HIERARCHY_DEPTH)
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose traversals give up after `max_depth` parent hops.
    pub fn with_max_depth(max_depth: usize) -> Self {
        EntityStore {
            entities: HashMap::new(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Insert or replace an entity, returning the previous one if any.
    ///
    /// The entity's parents must already be in the store, must not close a
    /// cycle, and the entity must conform to its registered type.
    pub fn upsert_entity(
        &mut self,
        entity: Entity,
        schema: &SchemaRegistry,
    ) -> Result<Option<Entity>, PolicyError> {
        let uid = entity.uid();
        for parent in entity.parents() {
            if parent == uid {
                return Err(cycle(uid, parent));
            }
            if !self.entities.contains_key(parent) {
                return Err(PolicyError::UnknownEntity(parent.to_string()));
            }
        }
        for parent in entity.parents() {
            if self.is_descendant_of(parent, uid)? {
                return Err(cycle(uid, parent));
            }
        }
        schema.validate_entity(&entity)?;

        debug!(event = "Store", phase = "Upsert", entity = uid.to_string());
        Ok(self.entities.insert(uid.clone(), entity))
    }

    /// Upsert a batch of entities. Parents may name entities that appear later
    /// in the batch. Either the whole batch is applied or nothing is.
    pub fn upsert_all(
        &mut self,
        entities: Vec<Entity>,
        schema: &SchemaRegistry,
    ) -> Result<usize, PolicyError> {
        let mut next = self.clone();
        let count = entities.len();
        let mut pending = entities;

        while !pending.is_empty() {
            let (ready, blocked): (Vec<Entity>, Vec<Entity>) = pending
                .into_iter()
                .partition(|e| e.parents().iter().all(|p| p != e.uid() && next.contains(p)));
            if ready.is_empty() {
                return Err(stalled(&next, &blocked));
            }
            for entity in ready {
                next.upsert_entity(entity, schema)?;
            }
            pending = blocked;
        }

        *self = next;
        Ok(count)
    }

    /// Add a parent edge `child -> parent`. Adding an existing edge is a no-op.
    pub fn add_parent(
        &mut self,
        child: &EntityUid,
        parent: &EntityUid,
        schema: &SchemaRegistry,
    ) -> Result<(), PolicyError> {
        for uid in [child, parent] {
            if !self.entities.contains_key(uid) {
                return Err(PolicyError::UnknownEntity(uid.to_string()));
            }
        }
        if child == parent || self.is_descendant_of(parent, child)? {
            warn!(
                event = "Store",
                phase = "AddParent",
                child = child.to_string(),
                parent = parent.to_string(),
                "rejected edge that would create a cycle"
            );
            return Err(cycle(child, parent));
        }
        schema.validate_parent(child, parent)?;

        if let Some(entity) = self.entities.get_mut(child) {
            entity.parents_mut().insert(parent.clone());
        }
        debug!(
            event = "Store",
            phase = "AddParent",
            child = child.to_string(),
            parent = parent.to_string()
        );
        Ok(())
    }

    /// Remove a parent edge. Returns whether the edge existed.
    pub fn remove_parent(
        &mut self,
        child: &EntityUid,
        parent: &EntityUid,
    ) -> Result<bool, PolicyError> {
        let entity = self
            .entities
            .get_mut(child)
            .ok_or_else(|| PolicyError::UnknownEntity(child.to_string()))?;
        Ok(entity.parents_mut().remove(parent))
    }

    /// Delete one entity. Its children are kept; their edges to it are pruned.
    pub fn delete_entity(&mut self, uid: &EntityUid) -> Result<Entity, PolicyError> {
        let removed = self
            .entities
            .remove(uid)
            .ok_or_else(|| PolicyError::UnknownEntity(uid.to_string()))?;
        for entity in self.entities.values_mut() {
            entity.parents_mut().remove(uid);
        }
        debug!(event = "Store", phase = "Delete", entity = uid.to_string());
        Ok(removed)
    }

    /// True if `ancestor` is reachable from `uid` over one or more parent edges.
    ///
    /// Breadth-first and lazy: stops as soon as the ancestor is found. An
    /// entity is not its own ancestor. Unknown `uid`s have no ancestors.
    pub fn is_descendant_of(
        &self,
        uid: &EntityUid,
        ancestor: &EntityUid,
    ) -> Result<bool, PolicyError> {
        let mut found = false;
        self.walk_ancestors(uid, |candidate| {
            found = candidate == ancestor;
            found
        })?;
        Ok(found)
    }

    /// Every ancestor of `uid`, nearest first.
    pub fn ancestors(&self, uid: &EntityUid) -> Result<Vec<EntityUid>, PolicyError> {
        let mut out = Vec::new();
        self.walk_ancestors(uid, |candidate| {
            out.push(candidate.clone());
            false
        })?;
        Ok(out)
    }

    /// Visit each distinct ancestor once in BFS order until `visit` returns true.
    fn walk_ancestors(
        &self,
        uid: &EntityUid,
        mut visit: impl FnMut(&EntityUid) -> bool,
    ) -> Result<(), PolicyError> {
        let Some(start) = self.entities.get(uid) else {
            return Ok(());
        };
        let mut seen: HashSet<&EntityUid> = HashSet::new();
        let mut frontier: VecDeque<(&EntityUid, usize)> =
            start.parents().iter().map(|p| (p, 1)).collect();

        while let Some((current, depth)) = frontier.pop_front() {
            if depth > self.max_depth {
                return Err(PolicyError::HierarchyTooDeep {
                    from: uid.to_string(),
                    limit: self.max_depth,
                });
            }
            if !seen.insert(current) {
                continue;
            }
            if visit(current) {
                return Ok(());
            }
            if let Some(entity) = self.entities.get(current) {
                frontier.extend(entity.parents().iter().map(|p| (p, depth + 1)));
            }
        }
        Ok(())
    }

    pub fn get(&self, uid: &EntityUid) -> Option<&Entity> {
        self.entities.get(uid)
    }

    pub fn contains(&self, uid: &EntityUid) -> bool {
        self.entities.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn uids(&self) -> impl Iterator<Item = &EntityUid> {
        self.entities.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entities_of_type<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a Entity> {
        self.entities
            .values()
            .filter(move |e| e.type_name() == type_name)
    }

    /// A uid of the given type with a numeric id not yet in use.
    pub fn fresh_uid(&self, type_name: &str) -> Result<EntityUid, PolicyError> {
        let mut n = self.entities.len();
        loop {
            let uid = EntityUid::new(type_name, n.to_string())?;
            if !self.entities.contains_key(&uid) {
                return Ok(uid);
            }
            n += 1;
        }
    }
}

/// Why no entity in `blocked` could be inserted: an entity naming itself as
/// parent, a parent that is neither stored nor in the batch, or a loop of
/// parents within the batch.
fn stalled(store: &EntityStore, blocked: &[Entity]) -> PolicyError {
    if let Some(entity) = blocked.iter().find(|e| e.parents().contains(e.uid())) {
        return cycle(entity.uid(), entity.uid());
    }
    let in_batch: HashSet<&EntityUid> = blocked.iter().map(Entity::uid).collect();
    for entity in blocked {
        for parent in entity.parents() {
            if !store.contains(parent) && !in_batch.contains(parent) {
                return PolicyError::UnknownEntity(parent.to_string());
            }
        }
    }
    match blocked
        .iter()
        .find_map(|e| e.parents().iter().find(|p| !store.contains(p)).map(|p| (e.uid(), p)))
    {
        Some((child, parent)) => cycle(child, parent),
        None => PolicyError::InvalidFormat("entity batch could not be ordered".to_string()),
    }
}

fn cycle(child: &EntityUid, parent: &EntityUid) -> PolicyError {
    PolicyError::CycleDetected {
        child: child.to_string(),
        parent: parent.to_string(),
    }
}
