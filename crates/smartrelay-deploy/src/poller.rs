// SPDX-License-Identifier: MIT

//! Bounded polling primitive
//!
//! Every higher-level wait in the deployer (OTA completion, reboot, version
//! convergence) is an instantiation of [`poll`] with a different probe, never
//! a bespoke retry loop.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Wall-clock budget and retry interval for one poll run.
///
/// Both values must be strictly positive. `interval >= timeout` is not
/// rejected, it simply yields a run with very few attempts.
#[derive(Debug, Clone, Copy)]
pub struct PollBudget {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollBudget {
    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Terminal result of one poll run. A run is atomic from the caller's
/// perspective: it either produced a value or exhausted its budget.
#[derive(Debug)]
pub enum PollOutcome<T, E> {
    Succeeded(T),
    /// Budget exhausted. Only the last probe error is kept; the attempt
    /// count is retained for diagnostics.
    TimedOut { last_error: E, attempts: u32 },
}

impl<T, E> PollOutcome<T, E> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, PollOutcome::Succeeded(_))
    }

    pub fn succeeded(self) -> Option<T> {
        match self {
            PollOutcome::Succeeded(value) => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }
}

/// Repeatedly invoke `probe` until it succeeds or `budget.timeout` elapses,
/// sleeping `budget.interval` between attempts.
///
/// The first attempt runs before any time check, so at least one attempt is
/// made even when the timeout is smaller than the interval. A successful
/// attempt returns immediately without sleeping again. A probe failure is
/// never fatal: it is logged and retried until the budget runs out.
pub async fn poll<T, E, F, Fut>(what: &str, budget: PollBudget, mut probe: F) -> PollOutcome<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        tracing::debug!("{what}: probe attempt {attempts}");

        match probe().await {
            Ok(value) => {
                tracing::debug!("{what}: satisfied after {attempts} attempt(s)");
                return PollOutcome::Succeeded(value);
            }
            Err(e) => {
                if start.elapsed() < budget.timeout {
                    tracing::debug!(
                        "{what}: not satisfied yet ({e}), retrying in {:?}",
                        budget.interval
                    );
                    tokio::time::sleep(budget.interval).await;
                } else {
                    tracing::warn!("{what}: timed out after {attempts} attempt(s), last: {e}");
                    return PollOutcome::TimedOut {
                        last_error: e,
                        attempts,
                    };
                }
            }
        }
    }
}
