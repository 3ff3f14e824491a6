// src/lib.rs
pub use config::{DEFAULT_MAX_HIERARCHY_DEPTH, EngineConfig};
pub use engine::{EngineSnapshot, PolicyEngine};
pub use error::{PolicyError, Violation};
pub use evaluator::Evaluator;
pub use loader::{compile_policies, parse_entities, parse_schema};
pub use policy_set::PolicySet;
pub use schema::{ActionDef, EntityTypeDef, SchemaFragment, SchemaRegistry};
pub use store::EntityStore;
pub use types::*;
pub use witness::AuthWitness;

pub mod metrics;

mod condition;
mod config;
mod engine;
mod error;
mod evaluator;
mod loader;
mod policy_match;
mod policy_set;
mod schema;
mod store;
mod timers;
mod types;
mod witness;
