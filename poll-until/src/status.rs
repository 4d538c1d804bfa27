use std::future::Future;

use async_trait::async_trait;

/// Remote state of a polled resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusState {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl StatusState {
    /// `Success` and `Failed` end the poll
    pub fn is_terminal(self) -> bool {
        matches!(self, StatusState::Success | StatusState::Failed)
    }
}

/// One observation of a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot<D> {
    pub state: StatusState,
    pub detail: D,
}

impl<D> StatusSnapshot<D> {
    pub fn new(state: StatusState, detail: D) -> Self {
        Self { state, detail }
    }

    pub fn pending(detail: D) -> Self {
        Self::new(StatusState::Pending, detail)
    }

    pub fn in_progress(detail: D) -> Self {
        Self::new(StatusState::InProgress, detail)
    }

    pub fn success(detail: D) -> Self {
        Self::new(StatusState::Success, detail)
    }

    pub fn failed(detail: D) -> Self {
        Self::new(StatusState::Failed, detail)
    }
}

/// How a poll resolved
///
/// `TimedOut` is a normal value: running out of wait budget (or being
/// cancelled by the caller) is something the caller branches on, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<D> {
    Completed(D),
    TimedOut,
    Failed(D),
}

impl<D> PollOutcome<D> {
    pub fn is_completed(&self) -> bool {
        matches!(self, PollOutcome::Completed(_))
    }

    pub fn detail(&self) -> Option<&D> {
        match self {
            PollOutcome::Completed(detail) | PollOutcome::Failed(detail) => Some(detail),
            PollOutcome::TimedOut => None,
        }
    }
}

/// Fetches the current status of a resource
///
/// An `Err` is a transport failure and ends the poll immediately. A remote
/// job that reports failure must be returned as `Ok` with
/// [`StatusState::Failed`].
#[async_trait]
pub trait StatusSource: Send + Sync {
    type Detail: Send;
    type Error: Send;

    async fn fetch_status(
        &self,
        resource_id: &str,
    ) -> Result<StatusSnapshot<Self::Detail>, Self::Error>;
}

/// [`StatusSource`] backed by a closure, see [`from_fn`]
pub struct FnSource<F> {
    fetch: F,
}

/// Wrap a closure taking the resource id as a [`StatusSource`]
pub fn from_fn<F>(fetch: F) -> FnSource<F> {
    FnSource { fetch }
}

#[async_trait]
impl<F, Fut, D, E> StatusSource for FnSource<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StatusSnapshot<D>, E>> + Send,
    D: Send,
    E: Send,
{
    type Detail = D;
    type Error = E;

    async fn fetch_status(&self, resource_id: &str) -> Result<StatusSnapshot<D>, E> {
        (self.fetch)(resource_id.to_string()).await
    }
}
