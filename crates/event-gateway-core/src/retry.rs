// File: src/retry.rs
//
// Runtime-mutable retry policy for the gateway pipeline

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{GatewayError, GatewayResult};

/// Bounded application-level retry with atomically mutable knobs.
///
/// Attempts and delay are read per attempt, so a reconfigure takes
/// effect on the next retry without restarting listeners.
#[derive(Debug)]
pub struct RetryPolicy {
    attempts: AtomicU32,
    delay_ms: AtomicU64,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts: AtomicU32::new(attempts.max(1)),
            delay_ms: AtomicU64::new(delay_ms),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }

    pub fn set_attempts(&self, attempts: u32) {
        self.attempts.store(attempts.max(1), Ordering::Relaxed);
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::Relaxed);
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 5000)
    }
}

/// Sleep that yields promptly on shutdown.
///
/// Returns `Interrupted` when the shutdown flag flips before the
/// duration elapses, so retry loops can bail at the next checkpoint.
pub async fn interruptible_sleep(
    duration: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> GatewayResult<()> {
    if *shutdown.borrow() {
        return Err(GatewayError::Interrupted { waited: Duration::ZERO });
    }
    let started = std::time::Instant::now();
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = shutdown.changed() => {
            if *shutdown.borrow() {
                Err(GatewayError::Interrupted { waited: started.elapsed() })
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_floor_at_one() {
        let policy = RetryPolicy::new(0, 100);
        assert_eq!(policy.attempts(), 1);
        policy.set_attempts(0);
        assert_eq!(policy.attempts(), 1);
    }

    #[test]
    fn knobs_are_mutable_at_runtime() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_millis(5000));
        policy.set_attempts(7);
        policy.set_delay_ms(250);
        assert_eq!(policy.attempts(), 7);
        assert_eq!(policy.delay(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn sleep_interrupts_on_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        let sleeper = tokio::spawn(async move {
            interruptible_sleep(Duration::from_secs(30), &mut rx).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        let result = sleeper.await.unwrap();
        assert!(matches!(result, Err(GatewayError::Interrupted { .. })));
    }

    #[tokio::test]
    async fn sleep_completes_when_not_interrupted() {
        let (_tx, mut rx) = watch::channel(false);
        let result = interruptible_sleep(Duration::from_millis(5), &mut rx).await;
        assert!(result.is_ok());
    }
}
