//! Bounded retry for single provider actions (one comment, one reaction).

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{
    errors::ProviderError,
    pacing::{random_secs, sleep_or_cancel},
    settings::Timings,
};

/// Failure of one attempt.
#[derive(Debug)]
pub enum ActionError {
    /// Classified provider failure; retry policy depends on its kind.
    Provider(ProviderError),
    /// Give up immediately, whatever attempts remain.
    Abort(String),
}

impl From<ProviderError> for ActionError {
    fn from(e: ProviderError) -> Self {
        ActionError::Provider(e)
    }
}

/// Run `op` up to `timings.max_attempts` times.
///
/// - `RateLimited { wait }`: sleep `wait + 1s`, retry.
/// - `PermissionDenied` / `Abort`: stop at once.
/// - anything else: sleep a randomized `retry_backoff`, retry.
///
/// Returns `true` on success. Exhausted attempts or cancellation during a wait
/// return `false`; nothing is raised.
pub async fn retry_action<F, Fut>(
    action: &str,
    timings: &Timings,
    cancel: &CancellationToken,
    mut op: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ActionError>>,
{
    let attempts = timings.max_attempts.max(1);
    for attempt in 1..=attempts {
        let err = match op().await {
            Ok(()) => return true,
            Err(e) => e,
        };
        let last = attempt == attempts;

        let wait = match err {
            ActionError::Abort(reason) => {
                warn!(action, reason = %reason, "action aborted");
                return false;
            }
            ActionError::Provider(ProviderError::PermissionDenied(msg)) => {
                warn!(action, error = %msg, "permission denied, not retrying");
                return false;
            }
            ActionError::Provider(ProviderError::RateLimited { wait }) => {
                warn!(action, attempt, wait_secs = wait.as_secs(), "rate limited");
                wait + Duration::from_secs(1)
            }
            ActionError::Provider(e) => {
                warn!(action, attempt, kind = ?e.kind(), error = %e, "action failed");
                random_secs(timings.retry_backoff)
            }
        };

        if last {
            break;
        }
        if !sleep_or_cancel(cancel, wait).await {
            return false;
        }
    }
    false
}
