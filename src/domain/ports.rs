//! Service abstractions for the prediction service and backtest execution.

use crate::domain::errors::GatewayError;
use crate::domain::types::{BacktestMetrics, Strategy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The request surface exposed by the prediction service.
///
/// Kinds carry their wire method name and whether a response may be
/// memoized. Mutating kinds must reach the service on every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    GenerateStrategies,
    Predict,
    PredictBatch,
    SubmitFeedback,
    TriggerTraining,
    TrainingStatus,
    Health,
}

impl RequestKind {
    pub fn method(&self) -> &'static str {
        match self {
            RequestKind::GenerateStrategies => "generate_strategies",
            RequestKind::Predict => "predict",
            RequestKind::PredictBatch => "predict_batch",
            RequestKind::SubmitFeedback => "submit_feedback",
            RequestKind::TriggerTraining => "train",
            RequestKind::TrainingStatus => "training_status",
            RequestKind::Health => "health",
        }
    }

    pub fn cacheable(&self) -> bool {
        !matches!(
            self,
            RequestKind::SubmitFeedback | RequestKind::TriggerTraining
        )
    }
}

/// Candidate strategy as returned by the prediction service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub name: String,
    pub parameters: Value,
    #[serde(default)]
    pub expected_return: Option<f64>,
}

/// Prediction request for a single (race, runner) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub race_id: String,
    pub runner_id: String,
    pub features: Vec<f64>,
}

/// Model output for one prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub probability: f64,
    pub confidence: f64,
    pub model_id: String,
}

/// Training signal pushed back to the prediction service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub backtest_result_id: uuid::Uuid,
    pub strategy_id: uuid::Uuid,
    pub composite_score: f64,
    pub metrics: BacktestMetrics,
}

/// Liveness report from the prediction service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "ok"
    }
}

/// Transport-level access to the prediction service.
///
/// One `call` per request; the RPC channel is primary, REST serves health
/// checks. Implementations must be safe for concurrent use.
#[async_trait]
pub trait PredictionGateway: Send + Sync {
    async fn call(&self, kind: RequestKind, params: &Value) -> Result<Value, GatewayError>;

    /// Release the underlying transport connection.
    async fn close(&self) -> Result<(), GatewayError>;
}

/// Backtest execution, external to this crate's core.
///
/// The evaluator falls back to this when a strategy has no stored result.
#[async_trait]
pub trait BacktestRunner: Send + Sync {
    async fn run(&self, strategy: &Strategy) -> anyhow::Result<BacktestMetrics>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutating_kinds_are_not_cacheable() {
        assert!(!RequestKind::SubmitFeedback.cacheable());
        assert!(!RequestKind::TriggerTraining.cacheable());
        assert!(RequestKind::GenerateStrategies.cacheable());
        assert!(RequestKind::Predict.cacheable());
    }
}
