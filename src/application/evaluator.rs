//! Scoring, ranking and activation gating for discovered strategies.

use crate::domain::errors::PipelineError;
use crate::domain::ports::BacktestRunner;
use crate::domain::repositories::{BacktestRepository, StrategyRepository};
use crate::domain::scoring::CompositeScorer;
use crate::domain::types::{BacktestResult, RankedStrategy, Strategy};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tracing::{debug, info, warn};

/// Activation, deactivation and ranking decisions for one run.
///
/// `activated` and `deactivated` are disjoint by construction: each
/// strategy takes at most one of the two branches.
#[derive(Debug)]
pub struct EvaluationOutcome {
    /// Top-N by composite score, rank 1-based and contiguous
    pub ranked: Vec<RankedStrategy>,
    pub activated: Vec<Uuid>,
    pub deactivated: Vec<Uuid>,
}

pub struct StrategyEvaluator {
    strategies: Arc<dyn StrategyRepository>,
    backtests: Arc<dyn BacktestRepository>,
    /// Backtest execution fallback for strategies with no stored result
    runner: Option<Arc<dyn BacktestRunner>>,
    scorer: Arc<dyn CompositeScorer>,
    top_n: usize,
}

impl StrategyEvaluator {
    pub fn new(
        strategies: Arc<dyn StrategyRepository>,
        backtests: Arc<dyn BacktestRepository>,
        runner: Option<Arc<dyn BacktestRunner>>,
        scorer: Arc<dyn CompositeScorer>,
        top_n: usize,
    ) -> Self {
        Self {
            strategies,
            backtests,
            runner,
            scorer,
            top_n,
        }
    }

    /// Score every strategy from its latest backtest result, apply the
    /// activation/deactivation bands, and rank the full set.
    ///
    /// Strategies without a result (and no runner to produce one) or with
    /// an out-of-range score are skipped and logged, never fatal.
    pub async fn evaluate_and_rank(
        &self,
        token: &CancellationToken,
        candidates: &[Strategy],
        min_score: f64,
        deactivate_threshold: f64,
    ) -> Result<EvaluationOutcome> {
        let mut scored: Vec<(Strategy, f64)> = Vec::with_capacity(candidates.len());

        for strategy in candidates {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled { stage: "evaluating" }.into());
            }

            let result = match self.latest_result(strategy).await? {
                Some(result) => result,
                None => {
                    debug!("No backtest result for strategy {}, skipping", strategy.id);
                    continue;
                }
            };

            let score = result.composite_score;
            if !(0.0..=1.0).contains(&score) || score.is_nan() {
                warn!(
                    "Strategy {} has out-of-range composite score {}, skipping",
                    strategy.id, score
                );
                continue;
            }

            scored.push((strategy.clone(), score));
        }

        let mut activated = Vec::new();
        let mut deactivated = Vec::new();

        for (strategy, score) in &scored {
            if *score >= min_score {
                if !strategy.active {
                    self.strategies
                        .set_active(strategy.id, true)
                        .await
                        .with_context(|| format!("Failed to activate strategy {}", strategy.id))?;
                    activated.push(strategy.id);
                    info!(
                        "Activated strategy {} '{}' (score {:.3})",
                        strategy.id, strategy.name, score
                    );
                }
            } else if strategy.active && *score < deactivate_threshold {
                self.strategies
                    .set_active(strategy.id, false)
                    .await
                    .with_context(|| format!("Failed to deactivate strategy {}", strategy.id))?;
                deactivated.push(strategy.id);
                info!(
                    "Deactivated strategy {} '{}' (score {:.3})",
                    strategy.id, strategy.name, score
                );
            }
        }

        // Total order: score descending, strategy id as the deterministic
        // tie-break. Ranks are 1-based and contiguous.
        scored.sort_by(|(a, sa), (b, sb)| sb.total_cmp(sa).then_with(|| a.id.cmp(&b.id)));

        let ranked = scored
            .iter()
            .take(self.top_n)
            .enumerate()
            .map(|(idx, (strategy, score))| {
                // Active flag as of the end of this run
                let active = if *score >= min_score {
                    true
                } else if strategy.active && *score < deactivate_threshold {
                    false
                } else {
                    strategy.active
                };
                RankedStrategy {
                    rank: idx + 1,
                    strategy_id: strategy.id,
                    name: strategy.name.clone(),
                    composite_score: *score,
                    active,
                }
            })
            .collect();

        Ok(EvaluationOutcome {
            ranked,
            activated,
            deactivated,
        })
    }

    /// Latest stored result, or one produced via the external backtest
    /// runner when available.
    async fn latest_result(&self, strategy: &Strategy) -> Result<Option<BacktestResult>> {
        if let Some(result) = self
            .backtests
            .find_latest_for_strategy(strategy.id)
            .await
            .with_context(|| format!("Failed to load backtest result for {}", strategy.id))?
        {
            return Ok(Some(result));
        }

        let Some(runner) = &self.runner else {
            return Ok(None);
        };

        match runner.run(strategy).await {
            Ok(metrics) => {
                let result =
                    BacktestResult::from_metrics(strategy.id, metrics, self.scorer.as_ref());
                self.backtests
                    .create(&result)
                    .await
                    .with_context(|| format!("Failed to persist backtest result for {}", strategy.id))?;
                Ok(Some(result))
            }
            Err(e) => {
                warn!("Backtest execution failed for strategy {}: {:#}", strategy.id, e);
                Ok(None)
            }
        }
    }
}
