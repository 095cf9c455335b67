//! Retry policy for opening the broker session.
//!
//! Uses `backon` for exponential backoff with jitter. Only retryable
//! errors (connectivity failures) are retried; everything else fails on the
//! first attempt.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Deserialize;
use tracing::{error, warn};

use crate::bus::{BusError, Result};

fn default_min_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_max_times() -> usize {
    30
}

/// How connection failures are handled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Return the first error.
    #[default]
    FailFast,
    /// Retry connectivity failures with exponential backoff and jitter.
    Backoff {
        #[serde(default = "default_min_delay_ms")]
        min_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
        #[serde(default = "default_max_times")]
        max_times: usize,
    },
}

impl RetryPolicy {
    /// Backoff with the default bounds: 100ms to 5s, 30 attempts.
    pub fn backoff() -> Self {
        RetryPolicy::Backoff {
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_times: default_max_times(),
        }
    }

    /// Backoff builder for the policy, `None` for `FailFast`.
    pub fn builder(&self) -> Option<ExponentialBuilder> {
        match self {
            RetryPolicy::FailFast => None,
            RetryPolicy::Backoff {
                min_delay_ms,
                max_delay_ms,
                max_times,
            } => Some(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(*min_delay_ms))
                    .with_max_delay(Duration::from_millis(*max_delay_ms))
                    .with_max_times(*max_times)
                    .with_jitter(),
            ),
        }
    }
}

/// Run `op` under the policy.
///
/// # Arguments
/// * `policy` - Retry policy to apply
/// * `target` - Human-readable name for logging (e.g., "broker")
/// * `op` - Async function that attempts the operation
pub async fn with_policy<T, F, Fut>(policy: &RetryPolicy, target: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(builder) = policy.builder() else {
        return op().await;
    };

    op.retry(builder)
        .when(BusError::is_retryable)
        .notify(|e: &BusError, delay: Duration| {
            warn!(
                target_name = %target,
                error = %e,
                delay = ?delay,
                "Attempt failed, retrying after backoff"
            );
        })
        .await
        .inspect_err(|e| {
            if e.is_retryable() {
                error!(target_name = %target, error = %e, "Giving up");
            }
        })
}
