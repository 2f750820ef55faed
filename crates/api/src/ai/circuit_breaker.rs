//! Circuit breaker for the AI backend
//!
//! Opens after consecutive failures so that a dead backend costs nothing on
//! the ingest path; after the backoff one test request is let through.

use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Minimum backoff duration when circuit opens
    pub min_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
struct BreakerState {
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
    current_backoff: Duration,
}

impl BreakerState {
    fn closed(min_backoff: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            last_failure_time: None,
            current_backoff: min_backoff,
        }
    }
}

#[derive(Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit breaker is open - call rejected
    Rejected,
    /// Inner error from the operation
    Inner(E),
}

/// Failure-counting breaker guarding one backend
pub struct CircuitBreaker {
    state: RwLock<BreakerState>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: RwLock::new(BreakerState::closed(config.min_backoff)),
            config,
        }
    }

    /// Check if circuit breaker allows the request
    pub async fn is_call_permitted(&self) -> bool {
        let state = self.state.read().await;

        if state.consecutive_failures < self.config.failure_threshold {
            return true;
        }
        match state.last_failure_time {
            Some(last_failure) if last_failure.elapsed() < state.current_backoff => {
                tracing::debug!(
                    failures = state.consecutive_failures,
                    backoff_remaining = ?state.current_backoff.saturating_sub(last_failure.elapsed()),
                    "AI circuit OPEN - skipping call"
                );
                false
            }
            _ => {
                tracing::debug!("AI circuit HALF-OPEN - allowing test request");
                true
            }
        }
    }

    /// Record a successful call - resets circuit breaker
    pub async fn record_success(&self) {
        let mut state = self.state.write().await;
        if state.consecutive_failures > 0 {
            tracing::info!(
                previous_failures = state.consecutive_failures,
                "AI circuit reset - request succeeded"
            );
            *state = BreakerState::closed(self.config.min_backoff);
        }
    }

    /// Record a failed call - increments failure count and opens circuit if threshold reached
    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        state.consecutive_failures += 1;
        state.last_failure_time = Some(Instant::now());

        if state.consecutive_failures >= self.config.failure_threshold {
            let exponent = state
                .consecutive_failures
                .saturating_sub(self.config.failure_threshold)
                .min(16);
            state.current_backoff = self
                .config
                .min_backoff
                .saturating_mul(2u32.pow(exponent))
                .min(self.config.max_backoff);

            tracing::warn!(
                consecutive_failures = state.consecutive_failures,
                backoff = ?state.current_backoff,
                "AI circuit OPENED"
            );
        } else {
            tracing::debug!(
                consecutive_failures = state.consecutive_failures,
                threshold = self.config.failure_threshold,
                "AI failure recorded - circuit still closed"
            );
        }
    }

    /// Execute an async operation with circuit breaker protection
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.is_call_permitted().await {
            return Err(CircuitBreakerError::Rejected);
        }

        match operation().await {
            Ok(result) => {
                self.record_success().await;
                Ok(result)
            }
            Err(err) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }
}
