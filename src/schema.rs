//! Schema registry: entity type and action declarations.
//!
//! The registry is append-only for the lifetime of a process. Entities,
//! policies and requests are all checked against it.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PolicyError, Violation};
use crate::types::{AttrDecl, Entity, EntityUid, conform_record, is_valid_type_name};

/// Declaration of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityTypeDef {
    name: String,
    attributes: BTreeMap<String, AttrDecl>,
    member_of: BTreeSet<String>,
}

impl EntityTypeDef {
    pub fn new(name: impl Into<String>) -> Self {
        EntityTypeDef {
            name: name.into(),
            attributes: BTreeMap::new(),
            member_of: BTreeSet::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, decl: AttrDecl) -> Self {
        self.attributes.insert(name.into(), decl);
        self
    }

    /// Allow entities of this type to have parents of type `parent`.
    pub fn member_of(mut self, parent: impl Into<String>) -> Self {
        self.member_of.insert(parent.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrDecl> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttrDecl> {
        self.attributes.get(name)
    }

    pub fn parent_types(&self) -> &BTreeSet<String> {
        &self.member_of
    }

    fn type_refs(&self) -> impl Iterator<Item = &str> {
        self.member_of
            .iter()
            .map(String::as_str)
            .chain(self.attributes.values().flat_map(|d| d.ty.entity_refs()))
    }
}

/// Declaration of one action: which principal and resource types it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDef {
    name: String,
    principal_types: BTreeSet<String>,
    resource_types: BTreeSet<String>,
}

impl ActionDef {
    pub fn new(name: impl Into<String>) -> Self {
        ActionDef {
            name: name.into(),
            principal_types: BTreeSet::new(),
            resource_types: BTreeSet::new(),
        }
    }

    pub fn with_principal_type(mut self, type_name: impl Into<String>) -> Self {
        self.principal_types.insert(type_name.into());
        self
    }

    pub fn with_resource_type(mut self, type_name: impl Into<String>) -> Self {
        self.resource_types.insert(type_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn principal_types(&self) -> &BTreeSet<String> {
        &self.principal_types
    }

    pub fn resource_types(&self) -> &BTreeSet<String> {
        &self.resource_types
    }

    /// True if `(principal_type, resource_type)` is a declared pair.
    pub fn applies_to(&self, principal_type: &str, resource_type: &str) -> bool {
        self.principal_types.contains(principal_type) && self.resource_types.contains(resource_type)
    }
}

/// A whole schema document, registered atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaFragment {
    pub entity_types: Vec<EntityTypeDef>,
    pub actions: Vec<ActionDef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaRegistry {
    entity_types: BTreeMap<String, EntityTypeDef>,
    actions: BTreeMap<String, ActionDef>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type.
    ///
    /// Parent types and entity-typed attributes must name registered types or
    /// the type itself.
    pub fn register_entity_type(&mut self, def: EntityTypeDef) -> Result<(), PolicyError> {
        self.check_new_type(&def)?;
        self.check_type_refs(&def, |name| name == def.name())?;
        debug!(event = "Schema", phase = "EntityType", name = def.name());
        self.entity_types.insert(def.name.clone(), def);
        Ok(())
    }

    /// Register an action; its principal and resource types must already exist.
    pub fn register_action(&mut self, def: ActionDef) -> Result<(), PolicyError> {
        if !is_valid_type_name(&def.name) {
            return Err(PolicyError::InvalidFormat(format!(
                "invalid action name '{}'",
                def.name
            )));
        }
        if self.actions.contains_key(&def.name) {
            return Err(PolicyError::DuplicateAction(def.name));
        }
        if let Some(unknown) = def
            .principal_types
            .iter()
            .chain(def.resource_types.iter())
            .find(|t| !self.entity_types.contains_key(*t))
        {
            return Err(PolicyError::UnknownEntityTypeRef {
                action: def.name.clone(),
                type_name: unknown.clone(),
            });
        }
        debug!(event = "Schema", phase = "Action", name = def.name());
        self.actions.insert(def.name.clone(), def);
        Ok(())
    }

    /// Register a whole document. Types in the fragment may reference each
    /// other in any order. Either everything is registered or nothing is.
    pub fn register_fragment(&mut self, fragment: SchemaFragment) -> Result<(), PolicyError> {
        let mut next = self.clone();
        let mut added = Vec::with_capacity(fragment.entity_types.len());
        for def in fragment.entity_types {
            next.check_new_type(&def)?;
            added.push(def.name.clone());
            next.entity_types.insert(def.name.clone(), def);
        }
        for name in &added {
            if let Some(def) = next.entity_types.get(name) {
                next.check_type_refs(def, |_| false)?;
            }
        }
        for action in fragment.actions {
            next.register_action(action)?;
        }
        *self = next;
        Ok(())
    }

    fn check_new_type(&self, def: &EntityTypeDef) -> Result<(), PolicyError> {
        if !is_valid_type_name(&def.name) || def.name == "Action" {
            return Err(PolicyError::InvalidFormat(format!(
                "invalid entity type name '{}'",
                def.name
            )));
        }
        if self.entity_types.contains_key(&def.name) {
            return Err(PolicyError::DuplicateType(def.name.clone()));
        }
        Ok(())
    }

    fn check_type_refs(
        &self,
        def: &EntityTypeDef,
        also_known: impl Fn(&str) -> bool,
    ) -> Result<(), PolicyError> {
        match def
            .type_refs()
            .find(|name| !also_known(name) && !self.entity_types.contains_key(*name))
        {
            Some(unknown) => Err(PolicyError::UnknownType(unknown.to_string())),
            None => Ok(()),
        }
    }

    pub fn entity_type(&self, name: &str) -> Option<&EntityTypeDef> {
        self.entity_types.get(name)
    }

    pub fn contains_type(&self, name: &str) -> bool {
        self.entity_types.contains_key(name)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &EntityTypeDef> {
        self.entity_types.values()
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }

    pub fn actions(&self) -> impl Iterator<Item = &ActionDef> {
        self.actions.values()
    }

    /// True if `action` is declared for this principal/resource type pair.
    pub fn action_applies(&self, action: &str, principal_type: &str, resource_type: &str) -> bool {
        self.actions
            .get(action)
            .is_some_and(|def| def.applies_to(principal_type, resource_type))
    }

    /// Check an entity's attributes and parent types against its declared type.
    ///
    /// Every offence is reported, not just the first.
    pub fn validate_entity(&self, entity: &Entity) -> Result<(), PolicyError> {
        let Some(def) = self.entity_types.get(entity.type_name()) else {
            return Err(PolicyError::violation(
                entity.uid(),
                vec![Violation::new(
                    "type",
                    format!("entity type {} is not registered", entity.type_name()),
                )],
            ));
        };

        let mut violations = Vec::new();
        conform_record(&def.attributes, entity.attrs(), "", &mut violations);
        for parent in entity.parents() {
            if !def.member_of.contains(parent.type_name()) {
                violations.push(parent_violation(def, parent));
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::violation(entity.uid(), violations))
        }
    }

    /// Check that `parent` may be a parent of `child` per the child's type.
    pub fn validate_parent(&self, child: &EntityUid, parent: &EntityUid) -> Result<(), PolicyError> {
        let Some(def) = self.entity_types.get(child.type_name()) else {
            return Err(PolicyError::UnknownType(child.type_name().to_string()));
        };
        if def.member_of.contains(parent.type_name()) {
            Ok(())
        } else {
            Err(PolicyError::violation(child, vec![parent_violation(def, parent)]))
        }
    }
}

fn parent_violation(def: &EntityTypeDef, parent: &EntityUid) -> Violation {
    Violation::new(
        "parents",
        format!(
            "{} may not be a member of {parent} (type {})",
            def.name,
            parent.type_name()
        ),
    )
}
