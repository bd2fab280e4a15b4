//! Circuit breaker for the execution bridge.
//!
//! Closed: calls flow. After `threshold` consecutive remote failures the
//! circuit opens and calls fail fast. Once `open_for` has elapsed the
//! circuit is half-open: calls flow again, the first success closes it and
//! the next failure reopens it.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::bridge::BridgeError;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_OPEN_FOR: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        })
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    open_for: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, threshold: u32, open_for: Duration) -> Self {
        Self {
            name: name.into(),
            threshold: threshold.max(1),
            open_for,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call may go through now.
    pub fn allow(&self) -> bool {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state != CircuitState::Open
    }

    /// Feed the result of a call that was allowed. Only remote errors and
    /// timeouts count against the downstream.
    pub fn record<T>(&self, result: &Result<T, BridgeError>) {
        match result {
            Ok(_) => self.record_success(),
            Err(BridgeError::RemoteError(_) | BridgeError::Timeout) => self.record_failure(),
            Err(BridgeError::InvalidParams(_)) => {}
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            tracing::info!(breaker = %self.name, "circuit closed after successful trial");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.failures,
                    threshold = self.threshold,
                    "downstream failure"
                );
                if inner.failures >= self.threshold {
                    self.trip(&mut inner);
                }
            }
            CircuitState::HalfOpen => self.trip(&mut inner),
            CircuitState::Open => {}
        }
    }

    fn trip(&self, inner: &mut Inner) {
        tracing::error!(
            breaker = %self.name,
            failures = inner.failures,
            open_secs = self.open_for.as_secs(),
            "circuit open"
        );
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
    }

    fn refresh(&self, inner: &mut Inner) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or(self.open_for);
        if elapsed >= self.open_for {
            tracing::info!(breaker = %self.name, "circuit half-open");
            inner.state = CircuitState::HalfOpen;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new("bridge", DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_FOR)
    }
}
