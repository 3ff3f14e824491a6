//! Attribute values carried by entities and request context.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::entity_uid::EntityUid;

/// Tagged attribute value.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
#[serde(tag = "type", content = "value")]
pub enum AttrValue {
    Bool(bool),
    Long(i64),
    String(String),
    #[schema(no_recursion)]
    Set(Vec<AttrValue>),
    #[schema(no_recursion)]
    Record(BTreeMap<String, AttrValue>),
    Entity(EntityUid),
}

impl AttrValue {
    /// Short name of the value's kind, used in violation and condition errors.
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Bool(_) => "Boolean",
            AttrValue::Long(_) => "Long",
            AttrValue::String(_) => "String",
            AttrValue::Set(_) => "Set",
            AttrValue::Record(_) => "Record",
            AttrValue::Entity(_) => "Entity",
        }
    }

    pub fn string(s: impl Into<String>) -> Self {
        AttrValue::String(s.into())
    }

    pub fn entity(uid: &EntityUid) -> Self {
        AttrValue::Entity(uid.clone())
    }

    /// Equality where sets compare as sets (order and duplicates ignored).
    pub fn semantic_eq(&self, other: &AttrValue) -> bool {
        match (self, other) {
            (AttrValue::Set(a), AttrValue::Set(b)) => {
                a.iter().all(|x| b.iter().any(|y| x.semantic_eq(y)))
                    && b.iter().all(|y| a.iter().any(|x| x.semantic_eq(y)))
            }
            (AttrValue::Record(a), AttrValue::Record(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.semantic_eq(w)))
            }
            _ => self == other,
        }
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Long(n) => write!(f, "{n}"),
            AttrValue::String(s) => write!(f, "{s:?}"),
            AttrValue::Set(xs) => write!(f, "[{}]", xs.iter().join(", ")),
            AttrValue::Record(fields) => write!(
                f,
                "{{{}}}",
                fields.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            AttrValue::Entity(uid) => write!(f, "{uid}"),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Long(n)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<EntityUid> for AttrValue {
    fn from(uid: EntityUid) -> Self {
        AttrValue::Entity(uid)
    }
}
