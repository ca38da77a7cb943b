//! Retry-until-predicate confirmation of asynchronous device writes.
//!
//! Device state propagation is not transactional with the write API: a
//! shadow command returns before the device has applied it. [`confirm`] is
//! the only retry primitive in the workspace; every "did my write take
//! effect" check is built on it. Writes themselves are never retried.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default delays between confirmation reads (milliseconds).
pub const DEFAULT_DELAYS_MS: [u64; 3] = [300, 600, 1200];

/// Ascending sequence of waits used by [`confirm`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    delays: Vec<Duration>,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_DELAYS_MS)
    }
}

impl PollSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    pub fn from_millis(delays: &[u64]) -> Self {
        Self {
            delays: delays.iter().map(|ms| Duration::from_millis(*ms)).collect(),
        }
    }

    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }

    /// Sum of all delays; the longest a confirmation can wait.
    pub fn total(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Outcome of a confirmation poll.
#[derive(Debug, Clone)]
pub struct Confirmation<T> {
    /// Last successfully fetched state, if any fetch succeeded.
    pub observed: Option<T>,
    /// Whether the predicate held for `observed`.
    pub ok: bool,
    /// Number of waits performed before returning.
    pub waits: usize,
    /// Set when the cancellation token fired before the predicate held.
    pub cancelled: bool,
}

/// Poll `fetch` until `predicate` holds.
///
/// For each delay in `schedule` the caller is suspended, then `fetch` runs
/// and the predicate is tested; the first success returns immediately.
/// After the sequence is exhausted one final fetch decides the result.
/// Fetch errors count as a failed attempt. Cancellation stops waiting at
/// once and returns with `ok = false`.
pub async fn confirm<T, E, F, Fut, P>(
    mut fetch: F,
    predicate: P,
    schedule: &PollSchedule,
    cancel: &CancellationToken,
) -> Confirmation<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&T) -> bool,
{
    let mut observed: Option<T> = None;
    let mut waits = 0usize;

    for (attempt, delay) in schedule.delays().iter().enumerate() {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(attempt = attempt + 1, "Confirmation cancelled");
                return Confirmation { observed, ok: false, waits, cancelled: true };
            }
            _ = tokio::time::sleep(*delay) => {}
        }
        waits += 1;

        match fetch().await {
            Ok(state) => {
                let ok = predicate(&state);
                observed = Some(state);
                if ok {
                    return Confirmation {
                        observed,
                        ok: true,
                        waits,
                        cancelled: false,
                    };
                }
                tracing::debug!(attempt = attempt + 1, "Confirmation predicate not yet satisfied");
            }
            Err(e) => {
                tracing::warn!(attempt = attempt + 1, error = %e, "Confirmation read failed");
            }
        }
    }

    // Final check after the last backoff.
    if cancel.is_cancelled() {
        return Confirmation {
            observed,
            ok: false,
            waits,
            cancelled: true,
        };
    }
    let ok = match fetch().await {
        Ok(state) => {
            let ok = predicate(&state);
            observed = Some(state);
            ok
        }
        Err(e) => {
            tracing::warn!(error = %e, "Final confirmation read failed");
            false
        }
    };

    if !ok {
        tracing::warn!(waits, "Confirmation timed out");
    }
    Confirmation {
        observed,
        ok,
        waits,
        cancelled: false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
