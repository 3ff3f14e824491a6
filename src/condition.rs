//! Condition evaluation and static policy checks.
//!
//! Evaluation is pure: it reads the request and the entity store and never
//! mutates anything. Every failure (missing attribute, wrong operand type,
//! dangling entity reference) is an `EvalError`; the evaluator treats the
//! owning policy as not satisfied.

use std::collections::BTreeSet;

use regex::Regex;
use thiserror::Error;

use crate::error::{PolicyError, Violation};
use crate::policy_match::in_hierarchy;
use crate::schema::{ActionDef, SchemaRegistry};
use crate::store::EntityStore;
use crate::types::{
    ActionConstraint, AttrValue, ConditionKind, Entity, EntityUid, Expr, Policy, RequestContext,
    ScopeConstraint, Var,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum EvalError {
    #[error("{on} has no attribute '{attr}'")]
    MissingAttribute { on: String, attr: String },
    #[error("type error: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("entity {0} does not exist")]
    UnknownEntity(String),
    #[error("invalid pattern '{0}'")]
    InvalidPattern(String),
    /// Hierarchy traversal failed; this is not a condition failure and
    /// denies the whole request.
    #[error(transparent)]
    Hierarchy(PolicyError),
}

/// Everything a condition may observe.
pub(crate) struct EvalEnv<'a> {
    pub principal: &'a Entity,
    pub action: &'a str,
    pub resource: &'a Entity,
    pub context: &'a RequestContext,
    pub store: &'a EntityStore,
}

impl EvalEnv<'_> {
    /// True if every `when` clause holds and no `unless` clause does.
    pub(crate) fn conditions_hold(&self, policy: &Policy) -> Result<bool, EvalError> {
        for condition in policy.conditions() {
            let holds = as_bool(self.eval(&condition.body)?)?;
            match condition.kind {
                ConditionKind::When if !holds => return Ok(false),
                ConditionKind::Unless if holds => return Ok(false),
                _ => {}
            }
        }
        Ok(true)
    }

    pub(crate) fn eval(&self, expr: &Expr) -> Result<AttrValue, EvalError> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Var(var) => Ok(self.var(*var)),
            Expr::Set(items) => Ok(AttrValue::Set(
                items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<_, _>>()?,
            )),
            Expr::GetAttr { of, attr } => self.get_attr(self.eval(of)?, attr),
            Expr::HasAttr { of, attr } => self.has_attr(self.eval(of)?, attr).map(AttrValue::Bool),
            Expr::Eq(l, r) => Ok(AttrValue::Bool(self.eval(l)?.semantic_eq(&self.eval(r)?))),
            Expr::Neq(l, r) => Ok(AttrValue::Bool(!self.eval(l)?.semantic_eq(&self.eval(r)?))),
            Expr::Lt(l, r) => self.compare(l, r, |a, b| a < b),
            Expr::Lte(l, r) => self.compare(l, r, |a, b| a <= b),
            Expr::Gt(l, r) => self.compare(l, r, |a, b| a > b),
            Expr::Gte(l, r) => self.compare(l, r, |a, b| a >= b),
            Expr::And(l, r) => {
                if !as_bool(self.eval(l)?)? {
                    return Ok(AttrValue::Bool(false));
                }
                Ok(AttrValue::Bool(as_bool(self.eval(r)?)?))
            }
            Expr::Or(l, r) => {
                if as_bool(self.eval(l)?)? {
                    return Ok(AttrValue::Bool(true));
                }
                Ok(AttrValue::Bool(as_bool(self.eval(r)?)?))
            }
            Expr::Not(inner) => Ok(AttrValue::Bool(!as_bool(self.eval(inner)?)?)),
            Expr::In(l, r) => self.is_in(self.eval(l)?, self.eval(r)?).map(AttrValue::Bool),
            Expr::Contains(l, r) => match self.eval(l)? {
                AttrValue::Set(items) => {
                    let needle = self.eval(r)?;
                    Ok(AttrValue::Bool(items.iter().any(|i| i.semantic_eq(&needle))))
                }
                other => Err(mismatch("Set", &other)),
            },
            Expr::Like { of, pattern } => match self.eval(of)? {
                AttrValue::String(s) => Ok(AttrValue::Bool(glob_match(pattern, &s)?)),
                other => Err(mismatch("String", &other)),
            },
        }
    }

    fn var(&self, var: Var) -> AttrValue {
        match var {
            Var::Principal => AttrValue::entity(self.principal.uid()),
            Var::Action => AttrValue::Entity(EntityUid::action(self.action)),
            Var::Resource => AttrValue::entity(self.resource.uid()),
            Var::Context => self.context.to_record(),
        }
    }

    fn entity(&self, uid: &EntityUid) -> Result<&Entity, EvalError> {
        if uid == self.principal.uid() {
            return Ok(self.principal);
        }
        if uid == self.resource.uid() {
            return Ok(self.resource);
        }
        self.store
            .get(uid)
            .ok_or_else(|| EvalError::UnknownEntity(uid.to_string()))
    }

    fn get_attr(&self, value: AttrValue, attr: &str) -> Result<AttrValue, EvalError> {
        let missing = |on: String| EvalError::MissingAttribute {
            on,
            attr: attr.to_string(),
        };
        match value {
            AttrValue::Entity(uid) => self
                .entity(&uid)?
                .attr(attr)
                .cloned()
                .ok_or_else(|| missing(uid.to_string())),
            AttrValue::Record(mut fields) => fields
                .remove(attr)
                .ok_or_else(|| missing("record".to_string())),
            other => Err(mismatch("Entity or Record", &other)),
        }
    }

    fn has_attr(&self, value: AttrValue, attr: &str) -> Result<bool, EvalError> {
        match value {
            AttrValue::Entity(uid) => Ok(self.entity(&uid)?.attr(attr).is_some()),
            AttrValue::Record(fields) => Ok(fields.contains_key(attr)),
            other => Err(mismatch("Entity or Record", &other)),
        }
    }

    fn compare(
        &self,
        l: &Expr,
        r: &Expr,
        op: impl Fn(i64, i64) -> bool,
    ) -> Result<AttrValue, EvalError> {
        match (self.eval(l)?, self.eval(r)?) {
            (AttrValue::Long(a), AttrValue::Long(b)) => Ok(AttrValue::Bool(op(a, b))),
            (AttrValue::Long(_), other) | (other, _) => Err(mismatch("Long", &other)),
        }
    }

    fn is_in(&self, left: AttrValue, right: AttrValue) -> Result<bool, EvalError> {
        let uid = match left {
            AttrValue::Entity(uid) => uid,
            other => return Err(mismatch("Entity", &other)),
        };
        let within = |ancestor: &EntityUid| {
            in_hierarchy(&uid, ancestor, self.store).map_err(EvalError::Hierarchy)
        };
        match right {
            AttrValue::Entity(ancestor) => within(&ancestor),
            AttrValue::Set(items) => {
                for item in &items {
                    let AttrValue::Entity(ancestor) = item else {
                        return Err(mismatch("Entity", item));
                    };
                    if within(ancestor)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(mismatch("Entity or Set", &other)),
        }
    }
}

fn as_bool(value: AttrValue) -> Result<bool, EvalError> {
    match value {
        AttrValue::Bool(b) => Ok(b),
        other => Err(mismatch("Boolean", &other)),
    }
}

fn mismatch(expected: &'static str, found: &AttrValue) -> EvalError {
    EvalError::TypeMismatch {
        expected,
        found: found.kind(),
    }
}

/// Match `value` against a pattern where `*` matches any run of characters.
fn glob_match(pattern: &str, value: &str) -> Result<bool, EvalError> {
    let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
    let re = Regex::new(&format!("(?s)^{body}$"))
        .map_err(|_| EvalError::InvalidPattern(pattern.to_string()))?;
    Ok(re.is_match(value))
}

/// Check a policy against the schema before it is admitted.
///
/// Flags unknown actions, unknown entity types in the scope or in entity
/// literals, and attribute reads on `principal`/`resource` that no candidate
/// type declares. Returns every violation found.
pub(crate) fn validate_policy(policy: &Policy, schema: &SchemaRegistry) -> Vec<Violation> {
    let mut out = Vec::new();

    let actions = policy.action_constraint().actions();
    for action in &actions {
        if schema.action(action).is_none() {
            out.push(Violation::new("action", format!("unknown action {action}")));
        }
    }

    for (path, scope) in [
        ("principal", policy.principal_constraint()),
        ("resource", policy.resource_constraint()),
    ] {
        for type_name in scope.type_refs() {
            if !schema.contains_type(type_name) {
                out.push(Violation::new(path, format!("unknown entity type {type_name}")));
            }
        }
    }

    let principal_types = candidate_types(
        schema,
        policy.principal_constraint(),
        policy.action_constraint(),
        |def| def.principal_types(),
    );
    let resource_types = candidate_types(
        schema,
        policy.resource_constraint(),
        policy.action_constraint(),
        |def| def.resource_types(),
    );

    for (n, condition) in policy.conditions().iter().enumerate() {
        let mut check = ExprCheck {
            schema,
            principal_types: &principal_types,
            resource_types: &resource_types,
            path: format!("conditions[{n}]"),
            out: &mut out,
        };
        check.walk(&condition.body);
    }
    out
}

/// Types the scope variable can take given the scope and action constraints.
fn candidate_types(
    schema: &SchemaRegistry,
    scope: &ScopeConstraint,
    actions: &ActionConstraint,
    applies: impl Fn(&ActionDef) -> &BTreeSet<String>,
) -> BTreeSet<String> {
    let mut types: BTreeSet<String> = match scope {
        ScopeConstraint::Eq { entity } => BTreeSet::from([entity.type_name().to_string()]),
        ScopeConstraint::Is { entity_type, .. } => BTreeSet::from([entity_type.clone()]),
        ScopeConstraint::Any | ScopeConstraint::In { .. } => {
            schema.entity_types().map(|d| d.name().to_string()).collect()
        }
    };
    if !matches!(actions, ActionConstraint::Any) {
        let allowed: BTreeSet<&String> = actions
            .actions()
            .into_iter()
            .filter_map(|a| schema.action(a))
            .flat_map(|def| applies(def).iter())
            .collect();
        types.retain(|t| allowed.contains(t));
    }
    types
}

struct ExprCheck<'a> {
    schema: &'a SchemaRegistry,
    principal_types: &'a BTreeSet<String>,
    resource_types: &'a BTreeSet<String>,
    path: String,
    out: &'a mut Vec<Violation>,
}

impl ExprCheck<'_> {
    fn walk(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(value) => self.literal(value),
            Expr::Var(_) => {}
            Expr::Set(items) => items.iter().for_each(|i| self.walk(i)),
            Expr::GetAttr { of, attr } => {
                self.attribute_read(of, attr);
                self.walk(of);
            }
            Expr::HasAttr { of, .. } | Expr::Like { of, .. } => self.walk(of),
            Expr::Not(inner) => self.walk(inner),
            Expr::Eq(l, r)
            | Expr::Neq(l, r)
            | Expr::Lt(l, r)
            | Expr::Lte(l, r)
            | Expr::Gt(l, r)
            | Expr::Gte(l, r)
            | Expr::And(l, r)
            | Expr::Or(l, r)
            | Expr::In(l, r)
            | Expr::Contains(l, r) => {
                self.walk(l);
                self.walk(r);
            }
        }
    }

    fn literal(&mut self, value: &AttrValue) {
        match value {
            AttrValue::Entity(uid) => {
                if uid.type_name() != "Action" && !self.schema.contains_type(uid.type_name()) {
                    self.out.push(Violation::new(
                        self.path.clone(),
                        format!("unknown entity type {}", uid.type_name()),
                    ));
                }
            }
            AttrValue::Set(items) => items.iter().for_each(|i| self.literal(i)),
            AttrValue::Record(fields) => fields.values().for_each(|v| self.literal(v)),
            _ => {}
        }
    }

    fn attribute_read(&mut self, of: &Expr, attr: &str) {
        let (var, candidates) = match of {
            Expr::Var(Var::Principal) => ("principal", self.principal_types),
            Expr::Var(Var::Resource) => ("resource", self.resource_types),
            _ => return,
        };
        // Nothing can match; leave it to the scope checks above.
        if candidates.is_empty() {
            return;
        }
        let declared = candidates.iter().any(|t| {
            self.schema
                .entity_type(t)
                .is_some_and(|def| def.attribute(attr).is_some())
        });
        if !declared {
            self.out.push(Violation::new(
                self.path.clone(),
                format!("attribute '{attr}' is not declared on any type {var} can have"),
            ));
        }
    }
}
