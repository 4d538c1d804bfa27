//! Waiting for a translation job
//!
//! Adapts the status endpoint to [`poll_until::StatusSource`] so the generic
//! poll loop drives it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use poll_until::{
    poll_until_condition, CancellationToken, PollOutcome, PollRequest, StatusSnapshot,
    StatusSource,
};
use std::time::Duration;

use crate::api_client::{Manifest, ViewDataClient};

/// Status source backed by the translation status endpoint
pub struct TranslationStatus<'a> {
    client: &'a ViewDataClient,
}

impl<'a> TranslationStatus<'a> {
    pub fn new(client: &'a ViewDataClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<'a> StatusSource for TranslationStatus<'a> {
    type Detail = Manifest;
    type Error = anyhow::Error;

    async fn fetch_status(&self, urn: &str) -> Result<StatusSnapshot<Manifest>> {
        let manifest = self.client.get_status(urn).await?;
        Ok(StatusSnapshot::new(manifest.state(), manifest))
    }
}

impl ViewDataClient {
    /// Poll the translation status of `urn` until it completes, fails, the
    /// `timeout` elapses, or `cancel` fires
    ///
    /// `on_progress` receives the status manifest of every check that is still
    /// pending or in progress.
    ///
    /// # Returns
    /// * `Ok(PollOutcome::Completed(manifest))` - translation finished
    /// * `Ok(PollOutcome::Failed(manifest))` - service reported failure
    /// * `Ok(PollOutcome::TimedOut)` - gave up waiting (or cancelled)
    /// * `Err(_)` - status request failed
    pub async fn check_translation_status(
        &self,
        urn: &str,
        timeout: Duration,
        interval: Duration,
        on_progress: Option<&mut (dyn FnMut(&Manifest) + Send)>,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome<Manifest>> {
        let request =
            PollRequest::new(urn, timeout, interval).context("Invalid translation poll settings")?;

        tracing::info!(
            "⏳ Waiting for translation of {} (timeout={}s, interval={}s)",
            urn,
            timeout.as_secs(),
            interval.as_secs()
        );

        let outcome =
            poll_until_condition(&request, &TranslationStatus::new(self), on_progress, cancel)
                .await
                .with_context(|| format!("Failed to check translation status of {}", urn))?;

        match &outcome {
            PollOutcome::Completed(_) => tracing::info!("✅ Translation of {} complete", urn),
            PollOutcome::Failed(manifest) => tracing::warn!(
                "❌ Translation of {} failed: status={} progress={}",
                urn,
                manifest.status,
                manifest.progress
            ),
            PollOutcome::TimedOut => {
                tracing::warn!("Translation of {} still running after {}s", urn, timeout.as_secs())
            }
        }

        Ok(outcome)
    }

    /// [`ViewDataClient::check_translation_status`] with the configured
    /// timeout and interval
    pub async fn wait_for_translation(
        &self,
        urn: &str,
        on_progress: Option<&mut (dyn FnMut(&Manifest) + Send)>,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome<Manifest>> {
        let config = self.config();
        self.check_translation_status(
            urn,
            config.translation_timeout,
            config.translation_interval,
            on_progress,
            cancel,
        )
        .await
    }
}
