//! Backoff for transient Kubernetes API failures.
//!
//! Startup work (installing the CRD, first client calls) and other
//! cluster-facing operations can fail transiently. [`Backoff::retry`] wraps
//! any async operation with exponential backoff and jitter so concurrent
//! controllers don't hammer the API server in lockstep.

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Exponential backoff policy
#[derive(Clone, Debug)]
pub struct Backoff {
    /// Maximum number of attempts (0 = retry forever)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Ceiling for the delay between retries
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// A policy that never gives up, for work the operator cannot run without
    pub fn forever() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The delay doubles after each failure, capped at `max_delay`, with a
    /// 0.5x-1.5x jitter factor applied per sleep.
    pub async fn retry<F, Fut, T, E>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        let mut delay = self.base_delay;

        loop {
            attempt += 1;

            match op().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if self.max_attempts > 0 && attempt >= self.max_attempts {
                        error!(
                            operation = %operation,
                            attempt = attempt,
                            error = %e,
                            "operation failed after max attempts"
                        );
                        return Err(e);
                    }

                    let jitter = rand::thread_rng().gen_range(0.5..1.5);
                    let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        error = %e,
                        delay_ms = jittered.as_millis(),
                        "operation failed, retrying"
                    );

                    tokio::time::sleep(jittered).await;

                    delay = Duration::from_secs_f64(
                        (delay.as_secs_f64() * 2.0).min(self.max_delay.as_secs_f64()),
                    );
                }
            }
        }
    }
}
