//! ---
//! awm_section: "01-core-runtime"
//! awm_subsection: "module"
//! awm_type: "source"
//! awm_scope: "code"
//! awm_description: "Shared primitives and utilities for the AirWatch runtime."
//! awm_version: "v0.1.0"
//! awm_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::time::sleep;
use tracing::warn;

/// Policy parameters for a bounded retry loop with linear backoff.
///
/// Both the acquisition job and the telemetry insert path run through this
/// single helper so backoff behaviour stays in one place.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Linear backoff: the delay after attempt `n` is `base_delay * n`.
    pub fn linear(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delay applied after the provided attempt (1-indexed).
    pub fn delay_after(&self, attempt: usize) -> Duration {
        self.base_delay.saturating_mul(attempt as u32)
    }
}

/// Drive `operation` until it returns `Ok`, up to the policy's attempt
/// budget. The first successful attempt wins; exhaustion yields the last
/// error. The closure receives the 1-indexed attempt number.
pub async fn retry_with_policy<T, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_error = None;
    for attempt in 1..=policy.max_attempts() {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                warn!(label, attempt, error = %err, "attempt failed");
                last_error = Some(err);
                if attempt < policy.max_attempts() {
                    sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("retry budget for '{}' was empty", label)))
}
