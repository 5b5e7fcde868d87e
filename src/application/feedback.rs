//! Feedback submission and retraining triggers.

use crate::application::cached_client::CachedPredictionClient;
use crate::domain::ports::FeedbackPayload;
use crate::domain::repositories::BacktestRepository;
use crate::domain::types::{TrainingConfig, TrainingJob};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of one bounded submission batch.
///
/// A mid-batch failure stops the batch but `submitted` still reflects the
/// items that reached the service, never zero-ed out.
#[derive(Debug)]
pub struct BatchOutcome {
    pub submitted: usize,
    pub failure: Option<String>,
}

pub struct FeedbackSubmitter {
    client: Arc<CachedPredictionClient>,
    backtests: Arc<dyn BacktestRepository>,
}

impl FeedbackSubmitter {
    pub fn new(
        client: Arc<CachedPredictionClient>,
        backtests: Arc<dyn BacktestRepository>,
    ) -> Self {
        Self { client, backtests }
    }

    /// Push up to `batch_size` unsubmitted backtest results to the
    /// prediction service. Each item is marked submitted only after its
    /// remote call succeeds; the first failure (or cancellation) stops the
    /// batch and the count so far is returned.
    pub async fn submit_batch(
        &self,
        token: &CancellationToken,
        batch_size: usize,
    ) -> Result<BatchOutcome> {
        let pending = self
            .backtests
            .find_unsubmitted(batch_size)
            .await
            .context("Failed to load unsubmitted backtest results")?;

        let mut submitted = 0usize;
        let mut failure = None;

        for result in &pending {
            if token.is_cancelled() {
                warn!("Feedback submission cancelled after {} items", submitted);
                failure = Some("cancelled".to_string());
                break;
            }

            let payload = FeedbackPayload {
                backtest_result_id: result.id,
                strategy_id: result.strategy_id,
                composite_score: result.composite_score,
                metrics: result.metrics.clone(),
            };

            if let Err(e) = self.client.submit_feedback(&payload).await {
                warn!(
                    "Feedback submission failed on result {} after {} items: {}",
                    result.id, submitted, e
                );
                failure = Some(e.to_string());
                break;
            }

            // Marked only after the remote call succeeded. A crash between
            // the two leaves the item unsubmitted and it is retried later.
            if let Err(e) = self.backtests.mark_submitted(result.id).await {
                warn!(
                    "Failed to mark result {} submitted after {} items: {:#}",
                    result.id, submitted, e
                );
                failure = Some(format!("Failed to mark result {} submitted: {}", result.id, e));
                break;
            }
            submitted += 1;
        }

        info!(
            "Submitted {} of {} pending backtest results as feedback",
            submitted,
            pending.len()
        );

        Ok(BatchOutcome { submitted, failure })
    }

    /// Submit one asynchronous training job. Returns the job identifier
    /// and initial status without waiting for completion.
    pub async fn trigger_retraining(
        &self,
        token: &CancellationToken,
        config: &TrainingConfig,
    ) -> Result<TrainingJob> {
        let job = tokio::select! {
            biased;
            _ = token.cancelled() => {
                anyhow::bail!("Retraining trigger cancelled for {}", config.model);
            }
            result = self.client.train(config) => result
                .with_context(|| format!("Failed to trigger retraining for {}", config.model))?,
        };

        info!(
            "Retraining job {} queued for model family {} ({:?})",
            job.job_id, job.model, job.status
        );
        Ok(job)
    }
}
