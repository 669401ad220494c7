//! Retry utilities with pluggable sleeping.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Attempt budget and the fixed cooldown between attempts.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before each retry.
    pub cooldown: Duration,
}

impl RetryConfig {
    /// Same cooldown before every retry.
    #[must_use]
    pub fn fixed(max_attempts: u32, cooldown: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cooldown,
        }
    }
}

/// Retry result indicating what happened.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success { value: T, attempts: u32 },
    /// Every attempt failed.
    Failed { last_error: E, attempts: u32 },
    /// Cancellation was requested while waiting for the next attempt.
    Cancelled { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success { attempts, .. }
            | RetryResult::Failed { attempts, .. }
            | RetryResult::Cancelled { attempts, .. } => *attempts,
        }
    }
}

/// Source of delays for retry cooldowns and pacing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delay requested so far, in order.
    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, duration: Duration) -> usize {
        self.recorded().iter().filter(|d| **d == duration).count()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Sleep unless the token fires first. Returns false when cancelled.
pub async fn sleep_or_cancel(
    sleeper: &dyn Sleeper,
    duration: Duration,
    cancel: &CancellationToken,
) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    tokio::select! {
        _ = sleeper.sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Execute an async operation, retrying any failure after the cooldown
/// until the attempt budget runs out. No cooldown follows the last attempt.
///
/// `on_failure` sees every failed attempt with the delay that will follow it,
/// or `None` when no retry follows.
pub async fn with_retry<T, E, F, Fut, L>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    cancel: &CancellationToken,
    mut on_failure: L,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: FnMut(u32, &E, Option<Duration>),
{
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation(attempts).await {
            Ok(value) => return RetryResult::Success { value, attempts },
            Err(error) => {
                if attempts >= config.max_attempts {
                    on_failure(attempts, &error, None);
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                on_failure(attempts, &error, Some(config.cooldown));

                if !sleep_or_cancel(sleeper, config.cooldown, cancel).await {
                    return RetryResult::Cancelled {
                        last_error: error,
                        attempts,
                    };
                }
            }
        }
    }
}
