//! Poll Until - bounded polling of a remote resource
//!
//! Used by the View & Data client to wait for a translation job, but nothing
//! here knows about HTTP: the caller supplies a [`StatusSource`] and gets back
//! a single [`PollOutcome`].
//!
//! Flow:
//! 1. First check runs immediately
//! 2. `Success` / `Failed` snapshots resolve the poll
//! 3. `Pending` / `InProgress` snapshots are reported to the progress observer,
//!    then the poll waits one interval (cancellable) before checking again
//! 4. If the next check could not start before `max_wait`, the poll resolves
//!    to `TimedOut` without issuing it

mod poll;
mod request;
mod status;

pub use poll::poll_until_condition;
pub use request::{PollError, PollRequest};
pub use status::{from_fn, FnSource, PollOutcome, StatusSnapshot, StatusSource, StatusState};

pub use tokio_util::sync::CancellationToken;
