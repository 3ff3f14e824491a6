//! Entity identifiers: a type name plus an id string.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PolicyError;

/// Type names are identifiers, optionally namespaced: `User`, `App::List`.
static TYPE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(::[A-Za-z_][A-Za-z0-9_]*)*$")
        .expect("type name pattern is valid")
});

/// Returns true if `name` is usable as an entity type or action name.
pub fn is_valid_type_name(name: &str) -> bool {
    TYPE_NAME.is_match(name)
}

/// Unique identifier of an entity, rendered as `Type::"id"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct EntityUid {
    #[serde(rename = "type")]
    type_name: String,
    id: String,
}

impl EntityUid {
    /// Build a uid from a type name and an id.
    ///
    /// Fails with `InvalidFormat` when the type name is not an identifier path.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Result<Self, PolicyError> {
        let type_name = type_name.into();
        if !is_valid_type_name(&type_name) {
            return Err(PolicyError::InvalidFormat(format!(
                "invalid entity type name '{type_name}'"
            )));
        }
        Ok(EntityUid {
            type_name,
            id: id.into(),
        })
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Uid of the entity representing an action, `Action::"<name>"`.
    pub(crate) fn action(name: &str) -> Self {
        EntityUid {
            type_name: "Action".to_string(),
            id: name.to_string(),
        }
    }
}

impl Display for EntityUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, r#"{}::"{}""#, self.type_name, self.id)
    }
}

impl FromStr for EntityUid {
    type Err = PolicyError;

    /// Accepts:
    /// - List::"groceries"
    /// - List::groceries
    /// - App::Team::"reviewers"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // A quoted id may itself contain "::", so split on the first quote.
        let (type_part, id) = match s.find("::\"") {
            Some(idx) => {
                let id = &s[idx + 3..];
                let id = id.strip_suffix('"').ok_or_else(|| {
                    PolicyError::InvalidFormat(format!("unterminated quoted id in '{s}'"))
                })?;
                (&s[..idx], id)
            }
            None => s.rsplit_once("::").ok_or_else(|| {
                PolicyError::InvalidFormat(format!("expected Type::\"id\", got '{s}'"))
            })?,
        };
        if id.is_empty() {
            return Err(PolicyError::InvalidFormat(format!("empty id in '{s}'")));
        }
        EntityUid::new(type_part, id)
    }
}
