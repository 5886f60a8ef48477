//! Circuit breaker for upstream dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded number of probe calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failures_in_window >= failure_threshold
//!                and calls_in_window >= min_calls_to_evaluate
//! Open → Half-Open: now - opened_at >= recovery_timeout (on next evaluation)
//! Half-Open → Closed: success_threshold consecutive probe successes
//! Half-Open → Open: any probe failure (opened_at reset), or a probe
//!                   still outstanding after recovery_timeout
//! ```
//!
//! # Design Decisions
//! - Per-dependency state kept behind [`BreakerStateStore`], so every
//!   dispatcher sharing a store shares one view of the dependency
//! - Fixed counting windows: a window opens at the first outcome recorded
//!   after the previous one expired
//! - Config is re-read from the config store on every evaluation
//! - Each half-open period has an epoch; only outcomes of probes admitted
//!   in the current epoch move a half-open circuit. A probe whose caller
//!   was cancelled never reports, so it is written off as failed once the
//!   recovery timeout passes
//! - Breaker logic never errors; it reports state and accepts outcomes

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::store::{load_breaker_config, ConfigStore};
use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitStatus {
    #[default]
    Closed,
    Open,
    HalfOpen,
}

impl CircuitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Closed => "closed",
            CircuitStatus::Open => "open",
            CircuitStatus::HalfOpen => "half_open",
        }
    }
}

/// Mutable breaker state for one dependency. Timestamps are epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub status: CircuitStatus,
    pub consecutive_successes: u32,
    pub failures_in_window: u32,
    pub calls_in_window: u32,
    pub window_started_at: u64,
    pub opened_at: u64,
    /// Probes admitted since entering half-open.
    pub half_open_calls: u32,
    /// Epoch millis of entering half-open.
    #[serde(default)]
    pub half_open_since: u64,
    /// Incremented on every entry into half-open.
    #[serde(default)]
    pub half_open_epoch: u64,
}

impl CircuitBreakerState {
    pub fn closed(now: u64) -> Self {
        Self {
            status: CircuitStatus::Closed,
            consecutive_successes: 0,
            failures_in_window: 0,
            calls_in_window: 0,
            window_started_at: now,
            opened_at: 0,
            half_open_calls: 0,
            half_open_since: 0,
            half_open_epoch: 0,
        }
    }

    fn open(&mut self, now: u64) {
        self.status = CircuitStatus::Open;
        self.opened_at = now;
        self.consecutive_successes = 0;
        self.failures_in_window = 0;
        self.calls_in_window = 0;
        self.half_open_calls = 0;
    }

    fn half_open(&mut self, now: u64) {
        self.status = CircuitStatus::HalfOpen;
        self.consecutive_successes = 0;
        self.half_open_calls = 0;
        self.half_open_since = now;
        self.half_open_epoch += 1;
    }

    fn close(&mut self, now: u64) {
        let epoch = self.half_open_epoch;
        *self = Self::closed(now);
        self.half_open_epoch = epoch;
    }

    fn probes_outstanding(&self) -> bool {
        self.half_open_calls > self.consecutive_successes
    }

    fn is_current_probe(&self, admission: Admission) -> bool {
        admission == Admission::Probe(self.half_open_epoch)
    }

    fn roll_window(&mut self, cfg: &CircuitBreakerConfig, now: u64) {
        let window_ms = cfg.monitor_window().as_millis() as u64;
        if now.saturating_sub(self.window_started_at) >= window_ms {
            self.window_started_at = now;
            self.failures_in_window = 0;
            self.calls_in_window = 0;
        }
    }

    fn should_open(&self, cfg: &CircuitBreakerConfig) -> bool {
        self.failures_in_window >= cfg.failure_threshold.max(1)
            && self.calls_in_window >= cfg.min_calls_to_evaluate
    }
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self::closed(0)
    }
}

/// Whether a call may proceed to the dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed (or breaker disabled).
    #[default]
    Allowed,
    /// Circuit half-open; this call is one of the bounded probes of the
    /// given half-open epoch.
    Probe(u64),
    /// Circuit open, or half-open with all probe slots taken.
    Rejected,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }

    pub fn is_probe(&self) -> bool {
        matches!(self, Admission::Probe(_))
    }
}

/// A status change produced by an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitStatus,
    pub to: CircuitStatus,
}

fn transition(from: CircuitStatus, state: &CircuitBreakerState) -> Option<Transition> {
    (from != state.status).then_some(Transition {
        from,
        to: state.status,
    })
}

/// Apply time-based transitions: lost probes reopen a half-open circuit,
/// and an open circuit turns half-open once its recovery timeout passes.
pub fn evaluate(
    state: &mut CircuitBreakerState,
    cfg: &CircuitBreakerConfig,
    now: u64,
) -> Option<Transition> {
    let from = state.status;
    let recovery_ms = cfg.recovery_timeout().as_millis() as u64;

    if state.status == CircuitStatus::HalfOpen && state.probes_outstanding() {
        let deadline = state.half_open_since.saturating_add(recovery_ms);
        if now >= deadline {
            state.open(deadline);
        }
    }
    if state.status == CircuitStatus::Open
        && now.saturating_sub(state.opened_at) >= recovery_ms
    {
        state.half_open(now);
    }
    transition(from, state)
}

/// Decide admission for one call, after applying time-based transitions.
pub fn admit(
    state: &mut CircuitBreakerState,
    cfg: &CircuitBreakerConfig,
    now: u64,
) -> (Admission, Option<Transition>) {
    let transition = evaluate(state, cfg, now);
    let admission = match state.status {
        CircuitStatus::Closed => Admission::Allowed,
        CircuitStatus::Open => Admission::Rejected,
        CircuitStatus::HalfOpen => {
            if state.half_open_calls < cfg.effective_half_open_calls() {
                state.half_open_calls += 1;
                Admission::Probe(state.half_open_epoch)
            } else {
                Admission::Rejected
            }
        }
    };
    (admission, transition)
}

/// Record a successful call admitted as `admission`.
pub fn on_success(
    state: &mut CircuitBreakerState,
    cfg: &CircuitBreakerConfig,
    admission: Admission,
    now: u64,
) -> Option<Transition> {
    let from = state.status;
    match state.status {
        CircuitStatus::Closed => {
            state.roll_window(cfg, now);
            state.calls_in_window += 1;
            state.consecutive_successes = state.consecutive_successes.saturating_add(1);
            if state.should_open(cfg) {
                state.open(now);
            }
        }
        // Calls admitted before this half-open period say nothing about it.
        CircuitStatus::HalfOpen if !state.is_current_probe(admission) => {}
        CircuitStatus::HalfOpen => {
            state.consecutive_successes += 1;
            if state.consecutive_successes >= cfg.effective_success_threshold() {
                state.close(now);
            }
        }
        // Late outcome of a call admitted before the circuit opened.
        CircuitStatus::Open => {}
    }
    transition(from, state)
}

/// Record a failed call admitted as `admission`.
pub fn on_failure(
    state: &mut CircuitBreakerState,
    cfg: &CircuitBreakerConfig,
    admission: Admission,
    now: u64,
) -> Option<Transition> {
    let from = state.status;
    match state.status {
        CircuitStatus::Closed => {
            state.roll_window(cfg, now);
            state.calls_in_window += 1;
            state.failures_in_window += 1;
            state.consecutive_successes = 0;
            if state.should_open(cfg) {
                state.open(now);
            }
        }
        CircuitStatus::HalfOpen if state.is_current_probe(admission) => state.open(now),
        CircuitStatus::HalfOpen | CircuitStatus::Open => {}
    }
    transition(from, state)
}

/// Storage for per-dependency breaker state.
///
/// `update` must apply the closure atomically with respect to other
/// updates of the same dependency.
pub trait BreakerStateStore: Send + Sync {
    fn update(&self, dependency: &str, f: &mut dyn FnMut(&mut CircuitBreakerState));

    fn snapshot(&self, dependency: &str) -> Option<CircuitBreakerState>;
}

/// Process-wide breaker state shared by every dispatcher holding it.
#[derive(Debug, Default)]
pub struct InMemoryBreakerStore {
    states: DashMap<String, CircuitBreakerState>,
}

impl InMemoryBreakerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BreakerStateStore for InMemoryBreakerStore {
    fn update(&self, dependency: &str, f: &mut dyn FnMut(&mut CircuitBreakerState)) {
        let mut entry = self.states.entry(dependency.to_string()).or_default();
        f(entry.value_mut());
    }

    fn snapshot(&self, dependency: &str) -> Option<CircuitBreakerState> {
        self.states.get(dependency).map(|r| r.value().clone())
    }
}

/// Gate consulted by callers of an upstream dependency.
#[async_trait]
pub trait Breaker: Send + Sync {
    async fn admit(&self, dependency: &str) -> Admission;

    /// Report the success of a call that `admit` let through as `admission`.
    async fn record_success(&self, dependency: &str, admission: Admission);

    /// Report the failure of a call that `admit` let through as `admission`.
    async fn record_failure(&self, dependency: &str, admission: Admission);

    /// False when the dependency's breaker is switched off and calls bypass it.
    async fn is_enabled(&self, dependency: &str) -> bool;

    /// Current status, applying any due Open → Half-Open transition.
    async fn state(&self, dependency: &str) -> CircuitStatus;
}

/// Config-driven circuit breaker.
#[derive(Clone)]
pub struct CircuitBreaker {
    config_store: Arc<dyn ConfigStore>,
    states: Arc<dyn BreakerStateStore>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        states: Arc<dyn BreakerStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config_store,
            states,
            clock,
        }
    }

    /// Stored state for reporting, without applying transitions.
    pub fn snapshot(&self, dependency: &str) -> CircuitBreakerState {
        self.states.snapshot(dependency).unwrap_or_default()
    }

    /// Status and state as the next evaluation would see them. Read-only:
    /// nothing is written to the state store.
    pub async fn view(&self, dependency: &str) -> (CircuitStatus, CircuitBreakerState) {
        let cfg = self.config(dependency).await;
        let mut state = self.snapshot(dependency);
        if !cfg.enabled {
            return (CircuitStatus::Closed, state);
        }
        evaluate(&mut state, &cfg, self.clock.now_millis());
        (state.status, state)
    }

    async fn config(&self, dependency: &str) -> CircuitBreakerConfig {
        load_breaker_config(self.config_store.as_ref(), dependency).await
    }

    fn apply<R>(
        &self,
        dependency: &str,
        mut step: impl FnMut(&mut CircuitBreakerState, u64) -> (R, Option<Transition>),
    ) -> R
    where
        R: Default,
    {
        let now = self.clock.now_millis();
        let mut result = R::default();
        let mut changed = None;
        let mut snapshot = None;
        self.states.update(dependency, &mut |state| {
            let (r, t) = step(state, now);
            result = r;
            changed = t;
            snapshot = Some(state.clone());
        });

        if let Some(t) = changed {
            log_transition(dependency, t, snapshot.as_ref());
            metrics::record_breaker_transition(dependency, t.to);
        }
        result
    }
}

fn log_transition(dependency: &str, t: Transition, state: Option<&CircuitBreakerState>) {
    let opened_at = state.map(|s| s.opened_at).unwrap_or_default();
    if t.to == CircuitStatus::Open {
        tracing::warn!(
            dependency = %dependency,
            from = t.from.as_str(),
            opened_at,
            "Circuit opened"
        );
    } else {
        tracing::info!(
            dependency = %dependency,
            from = t.from.as_str(),
            to = t.to.as_str(),
            "Circuit state changed"
        );
    }
}

#[async_trait]
impl Breaker for CircuitBreaker {
    async fn admit(&self, dependency: &str) -> Admission {
        let cfg = self.config(dependency).await;
        if !cfg.enabled {
            return Admission::Allowed;
        }
        self.apply(dependency, |state, now| admit(state, &cfg, now))
    }

    async fn record_success(&self, dependency: &str, admission: Admission) {
        let cfg = self.config(dependency).await;
        if !cfg.enabled {
            return;
        }
        self.apply(dependency, |state, now| {
            ((), on_success(state, &cfg, admission, now))
        });
    }

    async fn record_failure(&self, dependency: &str, admission: Admission) {
        let cfg = self.config(dependency).await;
        if !cfg.enabled {
            return;
        }
        self.apply(dependency, |state, now| {
            ((), on_failure(state, &cfg, admission, now))
        });
    }

    async fn is_enabled(&self, dependency: &str) -> bool {
        self.config(dependency).await.enabled
    }

    async fn state(&self, dependency: &str) -> CircuitStatus {
        let cfg = self.config(dependency).await;
        if !cfg.enabled {
            return CircuitStatus::Closed;
        }
        self.apply(dependency, |state, now| {
            let t = evaluate(state, &cfg, now);
            (state.status, t)
        })
    }
}
