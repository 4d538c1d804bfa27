use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::request::PollRequest;
use crate::status::{PollOutcome, StatusSource, StatusState};

/// Check `source` until the resource reaches a terminal state, the wait
/// budget runs out, or `cancel` fires.
///
/// The first check runs immediately. After every non-terminal check the
/// snapshot detail goes to `on_progress`, then the poll sleeps until the next
/// check time. A check is only issued if it starts at or before
/// `request.max_wait()` (measured from the call); it may finish after that.
///
/// # Returns
/// * `Ok(PollOutcome::Completed(detail))` - the resource reported success
/// * `Ok(PollOutcome::Failed(detail))` - the resource reported failure (not retried)
/// * `Ok(PollOutcome::TimedOut)` - no further check fits in the budget, or cancelled
/// * `Err(_)` - `source` failed; transport errors are never retried
pub async fn poll_until_condition<S>(
    request: &PollRequest,
    source: &S,
    mut on_progress: Option<&mut (dyn FnMut(&S::Detail) + Send)>,
    cancel: &CancellationToken,
) -> Result<PollOutcome<S::Detail>, S::Error>
where
    S: StatusSource + ?Sized,
{
    let started = Instant::now();
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let snapshot = source.fetch_status(request.resource_id()).await?;
        let elapsed = started.elapsed();

        debug!(
            resource_id = %request.resource_id(),
            attempt,
            state = ?snapshot.state,
            elapsed_ms = elapsed.as_millis() as u64,
            "Status check finished"
        );

        match snapshot.state {
            StatusState::Success => return Ok(PollOutcome::Completed(snapshot.detail)),
            StatusState::Failed => return Ok(PollOutcome::Failed(snapshot.detail)),
            StatusState::Pending | StatusState::InProgress => {}
        }

        if let Some(observer) = on_progress.as_deref_mut() {
            observer(&snapshot.detail);
        }

        let next_check = match elapsed.checked_add(request.interval()) {
            Some(next) if next <= request.max_wait() => next,
            _ => {
                debug!(
                    resource_id = %request.resource_id(),
                    attempts = attempt,
                    max_wait_ms = request.max_wait().as_millis() as u64,
                    "Wait budget exhausted"
                );
                return Ok(PollOutcome::TimedOut);
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(resource_id = %request.resource_id(), attempts = attempt, "Poll cancelled");
                return Ok(PollOutcome::TimedOut);
            }
            _ = tokio::time::sleep_until(started + next_check) => {}
        }
    }
}
