//! Condition expressions attached to policies.
//!
//! Conditions are a small expression tree; the interpreter lives in
//! `crate::condition`. The JSON form is externally tagged, e.g.
//!
//! ```json
//! {"eq": [{"getAttr": {"of": {"var": "resource"}, "attr": "owner"}}, {"var": "principal"}]}
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};

use super::attr_value::AttrValue;

/// The request-bound variables a condition can read.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    Lit(AttrValue),
    Var(Var),
    Set(Vec<Expr>),
    GetAttr { of: Box<Expr>, attr: String },
    HasAttr { of: Box<Expr>, attr: String },
    Eq(Box<Expr>, Box<Expr>),
    Neq(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Lte(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    Gte(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    /// Hierarchy membership: entity `in` entity, or `in` a set of entities.
    In(Box<Expr>, Box<Expr>),
    /// Set membership: `left.contains(right)`.
    Contains(Box<Expr>, Box<Expr>),
    /// String glob match, `*` matches any run of characters.
    Like { of: Box<Expr>, pattern: String },
}

impl Expr {
    pub fn principal() -> Self {
        Expr::Var(Var::Principal)
    }

    pub fn action() -> Self {
        Expr::Var(Var::Action)
    }

    pub fn resource() -> Self {
        Expr::Var(Var::Resource)
    }

    pub fn context() -> Self {
        Expr::Var(Var::Context)
    }

    pub fn lit(value: impl Into<AttrValue>) -> Self {
        Expr::Lit(value.into())
    }

    pub fn set(items: Vec<Expr>) -> Self {
        Expr::Set(items)
    }

    pub fn attr(self, attr: impl Into<String>) -> Self {
        Expr::GetAttr {
            of: Box::new(self),
            attr: attr.into(),
        }
    }

    pub fn has(self, attr: impl Into<String>) -> Self {
        Expr::HasAttr {
            of: Box::new(self),
            attr: attr.into(),
        }
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::Eq(Box::new(self), Box::new(other))
    }

    pub fn not_equals(self, other: Expr) -> Self {
        Expr::Neq(Box::new(self), Box::new(other))
    }

    pub fn less_than(self, other: Expr) -> Self {
        Expr::Lt(Box::new(self), Box::new(other))
    }

    pub fn less_or_equal(self, other: Expr) -> Self {
        Expr::Lte(Box::new(self), Box::new(other))
    }

    pub fn greater_than(self, other: Expr) -> Self {
        Expr::Gt(Box::new(self), Box::new(other))
    }

    pub fn greater_or_equal(self, other: Expr) -> Self {
        Expr::Gte(Box::new(self), Box::new(other))
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_in(self, other: Expr) -> Self {
        Expr::In(Box::new(self), Box::new(other))
    }

    pub fn contains(self, other: Expr) -> Self {
        Expr::Contains(Box::new(self), Box::new(other))
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        Expr::Like {
            of: Box::new(self),
            pattern: pattern.into(),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Expr::Lit(value) => write!(f, "{value}"),
            Expr::Var(var) => write!(f, "{var}"),
            Expr::Set(items) => write!(f, "[{}]", items.iter().join(", ")),
            Expr::GetAttr { of, attr } => write!(f, "{of}.{attr}"),
            Expr::HasAttr { of, attr } => write!(f, "{of} has {attr}"),
            Expr::Eq(l, r) => write!(f, "({l} == {r})"),
            Expr::Neq(l, r) => write!(f, "({l} != {r})"),
            Expr::Lt(l, r) => write!(f, "({l} < {r})"),
            Expr::Lte(l, r) => write!(f, "({l} <= {r})"),
            Expr::Gt(l, r) => write!(f, "({l} > {r})"),
            Expr::Gte(l, r) => write!(f, "({l} >= {r})"),
            Expr::And(l, r) => write!(f, "({l} && {r})"),
            Expr::Or(l, r) => write!(f, "({l} || {r})"),
            Expr::Not(e) => write!(f, "!{e}"),
            Expr::In(l, r) => write!(f, "({l} in {r})"),
            Expr::Contains(l, r) => write!(f, "{l}.contains({r})"),
            Expr::Like { of, pattern } => write!(f, "({of} like {pattern:?})"),
        }
    }
}
