// src/health/recovery.rs
use std::time::Duration;

/// One explicit recovery period shared by both down scopes.
pub const DEFAULT_RECOVERY_PERIOD: Duration = Duration::from_secs(20);

/// One-shot recovery timer: after the fixed period the reset runs
/// unconditionally. No re-probing and no backoff; a down flag set without a
/// scheduled reset cannot occur because callers schedule in the same breath
/// as they mark.
#[derive(Debug, Clone)]
pub struct RecoveryTimer {
    period: Duration,
}

impl RecoveryTimer {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn schedule<F>(&self, reset: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let period = self.period;
        tokio::spawn(async move {
            tokio::time::sleep(period).await;
            reset();
        });
    }
}

impl Default for RecoveryTimer {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_reset_runs_after_period() {
        let timer = RecoveryTimer::new(Duration::from_millis(30));
        let down = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&down);
        timer.schedule(move || flag.store(false, Ordering::SeqCst));

        assert!(down.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!down.load(Ordering::SeqCst));
    }
}
