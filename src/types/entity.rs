//! Entities held by the entity store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use super::attr_value::AttrValue;
use super::entity_uid::EntityUid;

/// An entity: its uid, attribute values and direct parents.
///
/// Parents are referenced by uid only; the store owns every entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    uid: EntityUid,
    #[serde(default)]
    attrs: BTreeMap<String, AttrValue>,
    #[serde(default)]
    parents: BTreeSet<EntityUid>,
}

impl Entity {
    pub fn new(uid: EntityUid) -> Self {
        Entity {
            uid,
            attrs: BTreeMap::new(),
            parents: BTreeSet::new(),
        }
    }

    /// Add one attribute and return the updated entity.
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Add one parent and return the updated entity.
    pub fn with_parent(mut self, parent: EntityUid) -> Self {
        self.parents.insert(parent);
        self
    }

    pub fn uid(&self) -> &EntityUid {
        &self.uid
    }

    pub fn type_name(&self) -> &str {
        self.uid.type_name()
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    pub fn parents(&self) -> &BTreeSet<EntityUid> {
        &self.parents
    }

    pub(crate) fn parents_mut(&mut self) -> &mut BTreeSet<EntityUid> {
        &mut self.parents
    }
}

impl Display for Entity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.uid)
    }
}
