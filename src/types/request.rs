//! Authorization request type.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::entity_uid::EntityUid;
use super::request_context::RequestContext;

/// The API-level request: principal, action, resource and context.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq, Hash)]
pub struct Request {
    pub principal: EntityUid,
    pub action: String,
    pub resource: EntityUid,
    #[serde(default, skip_serializing_if = "RequestContext::is_empty")]
    pub context: RequestContext,
}

impl Request {
    pub fn new(principal: EntityUid, action: impl Into<String>, resource: EntityUid) -> Self {
        Request {
            principal,
            action: action.into(),
            resource,
            context: RequestContext::new(),
        }
    }

    /// Replace the request context and return the updated request.
    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}
