//! Cancellation and timeout composition.
//!
//! # Design Decisions
//! - A call is aborted by whichever fires first: the caller's token or the
//!   per-call deadline
//! - Caller cancellation is polled first, so when both are ready at once the
//!   outcome is `Cancelled`, never an ambiguous or dropped error
//! - Timeout errors are distinct from caller cancellation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::dispatch::error::DispatchError;

/// Drive `operation` until it finishes, `cancel` fires, or `deadline` passes.
///
/// `timeout` is only used to describe the deadline in the error.
pub async fn run_cancellable<F>(
    operation: F,
    deadline: Instant,
    timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<F::Output, DispatchError>
where
    F: Future,
{
    let caller = async {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        biased;
        _ = caller => Err(DispatchError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => Err(DispatchError::Timeout(timeout)),
        output = operation => Ok(output),
    }
}
