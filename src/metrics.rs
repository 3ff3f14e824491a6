//! Backend-agnostic metrics via a pluggable, process-wide sink.
//!
//! The engine reports every evaluation and every successful mutation to the
//! installed [`MetricsSink`]. Without one, events go to a no-op sink.
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use listgate_core::metrics::{set_sink, EvaluationStats, MetricsSink, MutationStats};
//!
//! #[derive(Default)]
//! struct Counter(AtomicU64);
//!
//! impl MetricsSink for Counter {
//!     fn on_evaluation(&self, _stats: &EvaluationStats) {
//!         self.0.fetch_add(1, Ordering::Relaxed);
//!     }
//!     fn on_mutation(&self, _stats: &MutationStats) {}
//! }
//!
//! set_sink(Arc::new(Counter::default()));
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use once_cell::sync::Lazy;
use serde::Serialize;
use strum_macros::Display as StrumDisplay;
use tracing::debug;

/// One evaluation, as seen by the sink.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationStats {
    pub duration: Duration,
    pub allowed: bool,
    /// e.g. `User::"alice"`
    pub principal_id: String,
    pub action_id: String,
    /// Policies listed in the decision's diagnostics.
    pub policies: Vec<String>,
    pub generation: u64,
}

/// Evaluation time broken down by phase, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationPhases {
    pub resolve_entities_ms: f64,
    pub match_scope_ms: f64,
    pub conditions_ms: f64,
    pub total_ms: f64,
}

impl EvaluationPhases {
    /// Time not attributed to any measured phase.
    pub fn overhead_ms(&self) -> f64 {
        self.total_ms - (self.resolve_entities_ms + self.match_scope_ms + self.conditions_ms)
    }
}

/// Which engine operation published a new snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, StrumDisplay)]
pub enum MutationKind {
    RegisterEntityType,
    RegisterAction,
    LoadSchema,
    UpsertEntity,
    DeleteEntity,
    AddParent,
    RemoveParent,
    LoadEntities,
    AddPolicy,
    RemovePolicy,
    LoadPolicies,
    ReplacePolicies,
}

#[derive(Debug, Clone, Serialize)]
pub struct MutationStats {
    pub kind: MutationKind,
    /// Generation of the snapshot the mutation published.
    pub generation: u64,
    pub at: SystemTime,
}

/// Consumer of engine metrics. Called on the hot path; must not block.
pub trait MetricsSink: Send + Sync {
    fn on_evaluation(&self, stats: &EvaluationStats);

    fn on_mutation(&self, stats: &MutationStats);

    /// Only called when the engine is configured to record phase timings.
    fn on_evaluation_phases(&self, _stats: &EvaluationStats, _phases: &EvaluationPhases) {}
}

struct NoOpSink;

impl MetricsSink for NoOpSink {
    fn on_evaluation(&self, _stats: &EvaluationStats) {}
    fn on_mutation(&self, _stats: &MutationStats) {}
}

static SINK: Lazy<RwLock<Arc<dyn MetricsSink>>> = Lazy::new(|| RwLock::new(Arc::new(NoOpSink)));

fn sink() -> Arc<dyn MetricsSink> {
    SINK.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Install the process-wide sink, replacing the previous one. Events
/// already in flight may still reach the old sink.
pub fn set_sink(new: Arc<dyn MetricsSink>) {
    *SINK.write().unwrap_or_else(PoisonError::into_inner) = new;
    debug!(event = "Metrics", phase = "SetSink", "metrics sink installed");
}

pub(crate) fn record_evaluation(stats: &EvaluationStats, phases: Option<&EvaluationPhases>) {
    let sink = sink();
    sink.on_evaluation(stats);
    if let Some(phases) = phases {
        sink.on_evaluation_phases(stats, phases);
    }
}

pub(crate) fn record_mutation(kind: MutationKind, generation: u64) {
    sink().on_mutation(&MutationStats {
        kind,
        generation,
        at: SystemTime::now(),
    });
}
