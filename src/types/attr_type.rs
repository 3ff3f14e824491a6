//! Declared attribute shapes, checked against values at registration time.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::error::Violation;

use super::attr_value::AttrValue;

/// The declared type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttrType {
    Boolean,
    Long,
    String,
    Set(Box<AttrType>),
    Record(BTreeMap<String, AttrDecl>),
    /// Reference to an entity of the named type.
    Entity(String),
}

/// One declared attribute: its type and whether it must be present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttrDecl {
    pub ty: AttrType,
    pub required: bool,
}

impl AttrDecl {
    pub fn required(ty: AttrType) -> Self {
        AttrDecl { ty, required: true }
    }

    pub fn optional(ty: AttrType) -> Self {
        AttrDecl {
            ty,
            required: false,
        }
    }
}

impl Display for AttrType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AttrType::Boolean => write!(f, "Boolean"),
            AttrType::Long => write!(f, "Long"),
            AttrType::String => write!(f, "String"),
            AttrType::Set(elem) => write!(f, "Set<{elem}>"),
            AttrType::Record(_) => write!(f, "Record"),
            AttrType::Entity(name) => write!(f, "Entity<{name}>"),
        }
    }
}

impl AttrType {
    /// Every entity type name this type refers to, nested ones included.
    pub fn entity_refs(&self) -> Vec<&str> {
        match self {
            AttrType::Entity(name) => vec![name.as_str()],
            AttrType::Set(elem) => elem.entity_refs(),
            AttrType::Record(attrs) => attrs.values().flat_map(|d| d.ty.entity_refs()).collect(),
            _ => Vec::new(),
        }
    }

    /// Check `value` against this type, pushing one violation per offending path.
    pub fn conform(&self, value: &AttrValue, path: &str, out: &mut Vec<Violation>) {
        match (self, value) {
            (AttrType::Boolean, AttrValue::Bool(_))
            | (AttrType::Long, AttrValue::Long(_))
            | (AttrType::String, AttrValue::String(_)) => {}
            (AttrType::Set(elem), AttrValue::Set(items)) => {
                for (i, item) in items.iter().enumerate() {
                    elem.conform(item, &format!("{path}[{i}]"), out);
                }
            }
            (AttrType::Record(decls), AttrValue::Record(fields)) => {
                conform_record(decls, fields, path, out);
            }
            (AttrType::Entity(name), AttrValue::Entity(uid)) => {
                if uid.type_name() != name {
                    out.push(Violation::new(
                        path,
                        format!("expected entity of type {name}, found {uid}"),
                    ));
                }
            }
            (expected, found) => out.push(Violation::new(
                path,
                format!("expected {expected}, found {}", found.kind()),
            )),
        }
    }
}

/// Check a set of named values against declared attributes: missing required
/// attributes, undeclared attributes and per-attribute type conformance.
pub fn conform_record(
    decls: &BTreeMap<String, AttrDecl>,
    fields: &BTreeMap<String, AttrValue>,
    prefix: &str,
    out: &mut Vec<Violation>,
) {
    let join = |name: &str| {
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}.{name}")
        }
    };

    for (name, decl) in decls {
        match fields.get(name) {
            Some(value) => decl.ty.conform(value, &join(name), out),
            None if decl.required => {
                out.push(Violation::new(join(name), "required attribute is missing"))
            }
            None => {}
        }
    }
    for name in fields.keys().filter(|name| !decls.contains_key(*name)) {
        out.push(Violation::new(join(name), "attribute is not declared"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityUid;

    fn task_type() -> AttrType {
        let mut attrs = BTreeMap::new();
        attrs.insert("id".to_string(), AttrDecl::required(AttrType::Long));
        attrs.insert("name".to_string(), AttrDecl::required(AttrType::String));
        attrs.insert("state".to_string(), AttrDecl::optional(AttrType::String));
        AttrType::Record(attrs)
    }

    #[test]
    fn test_conform_accepts_matching_values() {
        let mut task = BTreeMap::new();
        task.insert("id".to_string(), AttrValue::Long(1));
        task.insert("name".to_string(), AttrValue::string("milk"));

        let mut out = Vec::new();
        AttrType::Set(Box::new(task_type())).conform(
            &AttrValue::Set(vec![AttrValue::Record(task)]),
            "tasks",
            &mut out,
        );
        assert!(out.is_empty(), "{out:?}");
    }

    #[test]
    fn test_conform_reports_every_nested_offence() {
        let mut task = BTreeMap::new();
        task.insert("id".to_string(), AttrValue::string("one"));
        task.insert("colour".to_string(), AttrValue::string("red"));

        let mut out = Vec::new();
        AttrType::Set(Box::new(task_type())).conform(
            &AttrValue::Set(vec![AttrValue::Record(task)]),
            "tasks",
            &mut out,
        );
        let paths: Vec<&str> = out.iter().map(|v| v.path.as_str()).collect();
        assert_eq!(paths, vec!["tasks[0].id", "tasks[0].name", "tasks[0].colour"]);
    }

    #[test]
    fn test_conform_checks_entity_type() {
        let mut out = Vec::new();
        let uid = EntityUid::new("User", "alice").unwrap();
        AttrType::Entity("Team".into()).conform(&AttrValue::Entity(uid), "readers", &mut out);
        assert_eq!(out.len(), 1);
        assert!(out[0].problem.contains("expected entity of type Team"));
    }

    #[test]
    fn test_entity_refs_are_collected() {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            "members".to_string(),
            AttrDecl::required(AttrType::Set(Box::new(AttrType::Entity("User".into())))),
        );
        attrs.insert("owner".to_string(), AttrDecl::required(AttrType::Entity("Team".into())));
        let record = AttrType::Record(attrs);
        let refs = record.entity_refs();
        assert_eq!(refs, vec!["User", "Team"]);
    }
}
