//! Strategy candidate generation.

use crate::application::cached_client::CachedPredictionClient;
use crate::domain::errors::PipelineError;
use crate::domain::repositories::StrategyRepository;
use crate::domain::types::{RiskLevel, Strategy};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Outcome of one generation pass.
///
/// `received` may be lower than `requested`: the downstream service owns
/// novelty and a short batch is a valid partial result, not a failure.
#[derive(Debug)]
pub struct GenerationOutcome {
    pub requested: usize,
    pub received: usize,
    pub strategies: Vec<Strategy>,
}

pub struct StrategyGenerator {
    client: Arc<CachedPredictionClient>,
    strategies: Arc<dyn StrategyRepository>,
}

impl StrategyGenerator {
    pub fn new(
        client: Arc<CachedPredictionClient>,
        strategies: Arc<dyn StrategyRepository>,
    ) -> Self {
        Self { client, strategies }
    }

    /// Request `count` candidates under the given risk profile and persist
    /// each valid one as an inactive strategy. A gateway failure aborts;
    /// malformed candidates are skipped and logged.
    pub async fn generate(
        &self,
        token: &CancellationToken,
        risk_level: RiskLevel,
        target_return: f64,
        count: usize,
    ) -> Result<GenerationOutcome> {
        let risk = risk_level.to_string();
        let candidates = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(PipelineError::Cancelled { stage: "generating" }.into());
            }
            result = self.client.generate_strategies(&risk, target_return, count) => {
                result.context("Strategy generation request failed")?
            }
        };

        if candidates.len() < count {
            warn!(
                "Prediction service returned {} of {} requested candidates",
                candidates.len(),
                count
            );
        }

        let received = candidates.len();
        let mut strategies = Vec::with_capacity(received);

        for candidate in candidates {
            if candidate.name.trim().is_empty() {
                warn!("Skipping candidate with empty name");
                continue;
            }
            if !candidate.parameters.is_object() {
                warn!(
                    "Skipping candidate '{}': parameters are not an object",
                    candidate.name
                );
                continue;
            }

            let strategy = Strategy::new(candidate.name, candidate.parameters, risk_level);
            self.strategies
                .create(&strategy)
                .await
                .with_context(|| format!("Failed to persist strategy {}", strategy.id))?;
            strategies.push(strategy);
        }

        info!(
            "Generated {} strategies ({} requested, {} received, {} skipped)",
            strategies.len(),
            count,
            received,
            received - strategies.len()
        );

        Ok(GenerationOutcome {
            requested: count,
            received,
            strategies,
        })
    }
}
