//! Per-phase timing of an evaluation.
//!
//! Timing is opt-in: a disabled `PhaseClock` never reads the system clock.

use std::time::{Duration, Instant};

use crate::metrics::EvaluationPhases;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    ResolveEntities,
    MatchScope,
    Conditions,
}

/// RAII guard that adds the time it was alive to a slot when dropped.
struct PhaseTimer<'a> {
    start: Instant,
    slot: &'a mut Duration,
}

impl Drop for PhaseTimer<'_> {
    fn drop(&mut self) {
        *self.slot += self.start.elapsed();
    }
}

/// Accumulates time spent per phase across one evaluation.
#[derive(Debug, Clone)]
pub(crate) struct PhaseClock {
    started: Option<Instant>,
    resolve_entities: Duration,
    match_scope: Duration,
    conditions: Duration,
}

impl PhaseClock {
    pub(crate) fn new(enabled: bool) -> Self {
        PhaseClock {
            started: enabled.then(Instant::now),
            resolve_entities: Duration::ZERO,
            match_scope: Duration::ZERO,
            conditions: Duration::ZERO,
        }
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.started.is_some()
    }

    /// Run `f`, charging its wall time to `phase`.
    pub(crate) fn time<T>(&mut self, phase: Phase, f: impl FnOnce() -> T) -> T {
        if !self.is_enabled() {
            return f();
        }
        let slot = match phase {
            Phase::ResolveEntities => &mut self.resolve_entities,
            Phase::MatchScope => &mut self.match_scope,
            Phase::Conditions => &mut self.conditions,
        };
        let _timer = PhaseTimer {
            start: Instant::now(),
            slot,
        };
        f()
    }

    pub(crate) fn elapsed(&self, phase: Phase) -> Duration {
        match phase {
            Phase::ResolveEntities => self.resolve_entities,
            Phase::MatchScope => self.match_scope,
            Phase::Conditions => self.conditions,
        }
    }

    /// The recorded phases, or `None` if the clock was disabled.
    pub(crate) fn finish(&self) -> Option<EvaluationPhases> {
        let started = self.started?;
        Some(EvaluationPhases {
            resolve_entities_ms: ms(self.resolve_entities),
            match_scope_ms: ms(self.match_scope),
            conditions_ms: ms(self.conditions),
            total_ms: ms(started.elapsed()),
        })
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}
