use std::time::Duration;

/// Errors raised when building a poll request
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,
}

/// What to poll and for how long
///
/// `max_wait` may be zero (exactly one check) and may be smaller than
/// `interval` (also exactly one check). Only a zero interval is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollRequest {
    resource_id: String,
    max_wait: Duration,
    interval: Duration,
}

impl PollRequest {
    pub fn new(
        resource_id: impl Into<String>,
        max_wait: Duration,
        interval: Duration,
    ) -> Result<Self, PollError> {
        if interval.is_zero() {
            return Err(PollError::ZeroInterval);
        }

        Ok(Self {
            resource_id: resource_id.into(),
            max_wait,
            interval,
        })
    }

    /// Millisecond shorthand, mostly for tests and CLI flags
    pub fn from_millis(
        resource_id: impl Into<String>,
        max_wait_ms: u64,
        interval_ms: u64,
    ) -> Result<Self, PollError> {
        Self::new(
            resource_id,
            Duration::from_millis(max_wait_ms),
            Duration::from_millis(interval_ms),
        )
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
