//! Data model types: identifiers, values, entities, policies, requests and
//! decisions.
//!
//! Canonical string forms:
//! - Entity: `Type::"id"` or `NS::Type::"id"`
//! - Action (as a value inside conditions): `Action::"GetList"`
//!
//! Quoting rules: ids may be quoted; parsing accepts both quoted and
//! unquoted forms where unambiguous.

mod attr_type;
mod attr_value;
mod decision;
mod entity;
mod entity_uid;
mod expr;
mod policy;
mod principal_policies;
mod request;
mod request_context;

pub use attr_type::{AttrDecl, AttrType, conform_record};
pub use attr_value::AttrValue;
pub use decision::{ConditionError, Decision, DenyReason, Diagnostics};
pub use entity::Entity;
pub use entity_uid::{EntityUid, is_valid_type_name};
pub use expr::{Expr, Var};
pub use policy::{
    ActionConstraint, Condition, ConditionKind, Effect, Policy, PolicyId, ScopeConstraint,
};
pub use principal_policies::{
    PolicyEffectFilter, PolicyMatch, PolicyMatchReason, PrincipalPolicies,
};
pub use request::Request;
pub use request_context::RequestContext;
