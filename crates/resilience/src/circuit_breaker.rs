use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

// ============================================================================
// Circuit Breaker Gate
// ============================================================================
//
// Tracks failures of a downstream dependency and temporarily blocks calls
// when it is unhealthy.
//
// States:
// - Closed: calls pass through, failures land in a sliding window
// - Open: calls fail immediately until the cool-down elapses
// - HalfOpen: a bounded number of trial calls decide the next state
//
// Every transition bumps an epoch. Outcomes of calls admitted under an older
// epoch are ignored, so a slow call that started before the circuit opened
// cannot close it again.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within `window` that open the circuit.
    pub failure_threshold: u32,
    /// Length of the sliding failure window.
    pub window: Duration,
    /// Time the circuit stays open before trial calls are allowed.
    pub cool_down: Duration,
    /// Trial calls allowed in flight while half-open.
    pub half_open_max_calls: u32,
    /// Calls running longer than this are abandoned and count as failures.
    pub call_timeout: Option<Duration>,
    /// Clear the failure window on every success (consecutive-failure policy).
    pub reset_on_success: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
            half_open_max_calls: 1,
            call_timeout: None,
            reset_on_success: true,
        }
    }
}

/// Why a guarded call did not produce a value.
#[derive(Debug, Error)]
pub enum GateError<E> {
    /// The circuit refused the call; the operation was never started.
    #[error("Circuit breaker is open")]
    Open,

    /// The operation exceeded the configured call timeout.
    #[error("Call timed out after {0:?}")]
    Timeout(Duration),

    /// The operation ran and failed.
    #[error("Operation failed: {0}")]
    Failed(E),
}

impl<E> GateError<E> {
    /// Returns true if the operation was short-circuited.
    pub fn is_open(&self) -> bool {
        matches!(self, GateError::Open)
    }
}

struct BreakerState {
    state: CircuitState,
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    last_transition: Instant,
    half_open_in_flight: u32,
    epoch: u64,
}

/// Process-wide breaker for one dependency.
///
/// Clones share the same state.
#[derive(Clone)]
pub struct CircuitBreakerGate {
    name: &'static str,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<BreakerState>>,
}

impl CircuitBreakerGate {
    pub fn new(name: &'static str, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: VecDeque::new(),
                opened_at: None,
                last_transition: Instant::now(),
                half_open_in_flight: 0,
                epoch: 0,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Executes an operation with circuit breaker protection.
    ///
    /// Every error counts as a failure of the dependency.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(operation, |_| true).await
    }

    /// Executes an operation, letting `counts_as_failure` decide which errors
    /// are held against the dependency.
    ///
    /// Errors the predicate rejects (e.g. a "not found" answer) are returned to
    /// the caller but recorded as a successful round-trip.
    pub async fn call_classified<F, Fut, T, E, C>(
        &self,
        operation: F,
        counts_as_failure: C,
    ) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let Some(permit) = self.try_acquire() else {
            metrics::counter!("circuit_breaker_short_circuits_total", "breaker" => self.name)
                .increment(1);
            tracing::debug!(breaker = self.name, "call short-circuited");
            return Err(GateError::Open);
        };

        let outcome = match self.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result.map_err(GateError::Failed),
                Err(_) => Err(GateError::Timeout(limit)),
            },
            None => operation().await.map_err(GateError::Failed),
        };

        match &outcome {
            Ok(_) => permit.succeed(),
            Err(GateError::Failed(err)) if !counts_as_failure(err) => permit.succeed(),
            Err(_) => permit.fail(),
        }
        outcome
    }

    /// Executes an operation and maps any gate error through `fallback`.
    ///
    /// The fallback never reaches the dependency.
    pub async fn call_or_else<F, Fut, T, E, R>(&self, operation: F, fallback: R) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: FnOnce(GateError<E>) -> T,
    {
        match self.call(operation).await {
            Ok(value) => value,
            Err(err) => fallback(err),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Failures currently counted in the window.
    pub fn failure_count(&self) -> usize {
        self.lock().failures.len()
    }

    /// Time since the last state transition.
    pub fn time_in_state(&self) -> Duration {
        self.lock().last_transition.elapsed()
    }

    /// Manually reset the circuit breaker
    pub fn reset(&self) {
        let mut state = self.lock();
        tracing::info!(breaker = self.name, "circuit breaker manually reset");
        self.transition(&mut state, CircuitState::Closed, Instant::now());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut state = self.lock();
        let now = Instant::now();

        if state.state == CircuitState::Open {
            let cooled = state
                .opened_at
                .is_none_or(|opened| now.duration_since(opened) >= self.config.cool_down);
            if !cooled {
                return None;
            }
            self.transition(&mut state, CircuitState::HalfOpen, now);
        }

        if state.state == CircuitState::HalfOpen {
            if state.half_open_in_flight >= self.config.half_open_max_calls {
                return None;
            }
            state.half_open_in_flight += 1;
        }

        Some(Permit {
            gate: self,
            epoch: state.epoch,
            admitted_in: state.state,
            settled: false,
        })
    }

    fn record_success(&self, epoch: u64, admitted_in: CircuitState) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        match admitted_in {
            CircuitState::HalfOpen => {
                tracing::info!(breaker = self.name, "trial call succeeded, closing circuit");
                self.transition(&mut state, CircuitState::Closed, Instant::now());
            }
            CircuitState::Closed => {
                if self.config.reset_on_success {
                    state.failures.clear();
                }
            }
            CircuitState::Open => {}
        }
    }

    fn record_failure(&self, epoch: u64, admitted_in: CircuitState) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }
        let now = Instant::now();
        match admitted_in {
            CircuitState::HalfOpen => {
                tracing::warn!(breaker = self.name, "trial call failed, reopening circuit");
                self.transition(&mut state, CircuitState::Open, now);
            }
            CircuitState::Closed => {
                let window = self.config.window;
                while state
                    .failures
                    .front()
                    .is_some_and(|at| now.duration_since(*at) > window)
                {
                    state.failures.pop_front();
                }
                state.failures.push_back(now);

                if state.failures.len() >= self.config.failure_threshold as usize {
                    tracing::warn!(
                        breaker = self.name,
                        failures = state.failures.len(),
                        "circuit breaker opening"
                    );
                    self.transition(&mut state, CircuitState::Open, now);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Gives back a half-open slot held by a call that never finished.
    fn release(&self, epoch: u64, admitted_in: CircuitState) {
        let mut state = self.lock();
        if state.epoch == epoch && admitted_in == CircuitState::HalfOpen {
            state.half_open_in_flight = state.half_open_in_flight.saturating_sub(1);
        }
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState, now: Instant) {
        let from = state.state;
        state.state = to;
        state.epoch += 1;
        state.last_transition = now;
        state.half_open_in_flight = 0;
        match to {
            CircuitState::Open => state.opened_at = Some(now),
            CircuitState::HalfOpen => state.failures.clear(),
            CircuitState::Closed => {
                state.failures.clear();
                state.opened_at = None;
            }
        }

        if from != to {
            tracing::info!(breaker = self.name, %from, %to, "circuit breaker transition");
            metrics::counter!(
                "circuit_breaker_transitions_total",
                "breaker" => self.name,
                "to" => to.as_str()
            )
            .increment(1);
        }
        metrics::gauge!("circuit_breaker_state", "breaker" => self.name).set(to.gauge_value());
    }
}

/// Admission ticket for one guarded call.
struct Permit<'a> {
    gate: &'a CircuitBreakerGate,
    epoch: u64,
    admitted_in: CircuitState,
    settled: bool,
}

impl Permit<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.gate.record_success(self.epoch, self.admitted_in);
    }

    fn fail(mut self) {
        self.settled = true;
        self.gate.record_failure(self.epoch, self.admitted_in);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.gate.release(self.epoch, self.admitted_in);
        }
    }
}
