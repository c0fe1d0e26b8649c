use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CircuitState {
    pub failure_count: u32,
    pub failure_start: Option<Instant>,
}

/// Failure counter guarding cache reads.
///
/// The circuit opens once more than `threshold` failures were recorded and
/// stays open until `ttl` has elapsed since the first of them, at which
/// point the state resets. There is no sliding window: the first failure
/// anchors the whole period.
#[derive(Debug)]
pub struct FailureCircuit {
    threshold: u32,
    ttl: Duration,
    state: Mutex<CircuitState>,
}

impl FailureCircuit {
    pub fn new(threshold: u32, ttl: Duration) -> Self {
        Self {
            threshold,
            ttl,
            state: Mutex::new(CircuitState::default()),
        }
    }

    /// Whether reads must be refused right now. Expires a stale window first.
    pub fn is_open(&self) -> bool {
        let mut state = self.state.lock();
        if let Some(start) = state.failure_start {
            if Instant::now() > start + self.ttl {
                *state = CircuitState::default();
            }
        }
        state.failure_count > self.threshold
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_start.get_or_insert_with(Instant::now);
        state.failure_count = state.failure_count.saturating_add(1);
    }

    pub fn state(&self) -> CircuitState {
        *self.state.lock()
    }

    pub fn reset(&self) {
        *self.state.lock() = CircuitState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_resets_after_ttl() {
        let circuit = FailureCircuit::new(3, Duration::from_millis(5000));

        for _ in 0..3 {
            circuit.record_failure();
            assert!(!circuit.is_open());
        }
        circuit.record_failure();
        assert!(circuit.is_open());
        assert_eq!(circuit.state().failure_count, 4);

        // The window is anchored at the first failure.
        tokio::time::advance(Duration::from_millis(5000)).await;
        assert!(circuit.is_open());
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!circuit.is_open());
        assert_eq!(circuit.state(), CircuitState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_isolated_instances() {
        let a = FailureCircuit::new(0, Duration::from_secs(1));
        let b = FailureCircuit::new(0, Duration::from_secs(1));
        a.record_failure();
        assert!(a.is_open());
        assert!(!b.is_open());
        a.reset();
        assert!(!a.is_open());
    }
}
