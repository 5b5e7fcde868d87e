//! Discovery run state machine.
//!
//! One invocation sequences Generator -> Evaluator -> optional feedback
//! submission and retraining triggers, and assembles a single report.
//! Generation and evaluation failures are fatal; the optional stages
//! degrade to partial results.

use crate::application::evaluator::StrategyEvaluator;
use crate::application::feedback::FeedbackSubmitter;
use crate::application::generator::StrategyGenerator;
use crate::domain::repositories::StrategyRepository;
use crate::domain::types::{DiscoveryReport, RiskLevel, Strategy, TrainingConfig};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Pipeline states for one discovery run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Generating,
    Evaluating,
    FeedbackPending,
    RetrainPending,
    Completed,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::Generating => "generating",
            RunState::Evaluating => "evaluating",
            RunState::FeedbackPending => "feedback_pending",
            RunState::RetrainPending => "retrain_pending",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-run configuration supplied by the caller
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub generate_count: usize,
    pub risk_level: RiskLevel,
    pub target_return: f64,
    pub min_composite_score: f64,
    pub deactivate_threshold: f64,
    /// Number of ranked strategies included in the report
    pub top_n: usize,
    pub feedback_enabled: bool,
    pub feedback_batch_size: usize,
    pub retrain_enabled: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            generate_count: 10,
            risk_level: RiskLevel::Moderate,
            target_return: 0.15,
            min_composite_score: 0.65,
            deactivate_threshold: 0.50,
            top_n: 10,
            feedback_enabled: true,
            feedback_batch_size: 100,
            retrain_enabled: false,
        }
    }
}

pub struct DiscoveryOrchestrator {
    generator: StrategyGenerator,
    evaluator: StrategyEvaluator,
    feedback: FeedbackSubmitter,
    strategies: Arc<dyn StrategyRepository>,
    config: DiscoveryConfig,
}

impl DiscoveryOrchestrator {
    pub fn new(
        generator: StrategyGenerator,
        evaluator: StrategyEvaluator,
        feedback: FeedbackSubmitter,
        strategies: Arc<dyn StrategyRepository>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            generator,
            evaluator,
            feedback,
            strategies,
            config,
        }
    }

    /// Execute one complete discovery run.
    ///
    /// Produces exactly one report or one fatal error, never both.
    pub async fn run(&self, token: &CancellationToken) -> Result<DiscoveryReport> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        let mut state = RunState::Idle;
        info!("Discovery run {} starting (state: {})", run_id, state);

        // --- Generating (fatal on failure) -------------------------------
        state = self.transition(run_id, state, RunState::Generating);
        let generation = match self
            .generator
            .generate(
                token,
                self.config.risk_level,
                self.config.target_return,
                self.config.generate_count,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(run_id, state, RunState::Failed);
                error!("Discovery run {} failed during generation: {:#}", run_id, e);
                return Err(e).context("Generation stage failed");
            }
        };

        // --- Evaluating (fatal on failure) -------------------------------
        state = self.transition(run_id, state, RunState::Evaluating);
        let candidates = match self.evaluation_set(&generation.strategies).await {
            Ok(set) => set,
            Err(e) => {
                self.transition(run_id, state, RunState::Failed);
                error!("Discovery run {} failed loading active set: {:#}", run_id, e);
                return Err(e).context("Evaluation stage failed");
            }
        };
        let evaluation = match self
            .evaluator
            .evaluate_and_rank(
                token,
                &candidates,
                self.config.min_composite_score,
                self.config.deactivate_threshold,
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.transition(run_id, state, RunState::Failed);
                error!("Discovery run {} failed during evaluation: {:#}", run_id, e);
                return Err(e).context("Evaluation stage failed");
            }
        };

        // --- FeedbackPending (non-fatal) ---------------------------------
        let mut feedback_submitted = 0usize;
        if self.config.feedback_enabled && !token.is_cancelled() {
            state = self.transition(run_id, state, RunState::FeedbackPending);
            match self
                .feedback
                .submit_batch(token, self.config.feedback_batch_size)
                .await
            {
                Ok(outcome) => {
                    feedback_submitted = outcome.submitted;
                    if let Some(reason) = outcome.failure {
                        warn!(
                            "Run {}: feedback batch stopped early ({}), {} submitted",
                            run_id, reason, outcome.submitted
                        );
                    }
                }
                Err(e) => {
                    warn!("Run {}: feedback stage failed, continuing: {:#}", run_id, e);
                }
            }
        }

        // --- RetrainPending (non-fatal, per-family isolation) ------------
        let mut retraining_triggered = false;
        if self.config.retrain_enabled && !token.is_cancelled() {
            state = self.transition(run_id, state, RunState::RetrainPending);
            for config in TrainingConfig::standard_set() {
                if token.is_cancelled() {
                    warn!("Run {}: retraining cancelled, keeping partial report", run_id);
                    break;
                }
                match self.feedback.trigger_retraining(token, &config).await {
                    Ok(_) => retraining_triggered = true,
                    Err(e) => {
                        warn!(
                            "Run {}: retraining trigger for {} failed, skipping: {:#}",
                            run_id, config.model, e
                        );
                    }
                }
            }
        }

        // --- Completed ---------------------------------------------------
        self.transition(run_id, state, RunState::Completed);
        let report = DiscoveryReport {
            run_id,
            generated_count: generation.strategies.len(),
            activated_count: evaluation.activated.len(),
            deactivated_count: evaluation.deactivated.len(),
            feedback_submitted_count: feedback_submitted,
            retraining_triggered,
            duration: started.elapsed(),
            top_strategies: evaluation.ranked,
            completed_at: Utc::now(),
        };

        info!(
            "Discovery run {} completed in {:.1}s: {} generated, {} activated, {} deactivated",
            run_id,
            report.duration.as_secs_f64(),
            report.generated_count,
            report.activated_count,
            report.deactivated_count
        );

        Ok(report)
    }

    /// Generated candidates plus the existing active set, deduplicated.
    async fn evaluation_set(&self, generated: &[Strategy]) -> Result<Vec<Strategy>> {
        let mut seen: HashSet<Uuid> = generated.iter().map(|s| s.id).collect();
        let mut set = generated.to_vec();

        let active = self
            .strategies
            .find_active()
            .await
            .context("Failed to load active strategies")?;
        for strategy in active {
            if seen.insert(strategy.id) {
                set.push(strategy);
            }
        }
        Ok(set)
    }

    fn transition(&self, run_id: Uuid, from: RunState, to: RunState) -> RunState {
        info!("Run {}: {} -> {}", run_id, from, to);
        to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_display() {
        assert_eq!(RunState::FeedbackPending.to_string(), "feedback_pending");
        assert_eq!(RunState::Failed.to_string(), "failed");
    }
}
