use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Risk profile a strategy is generated under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Conservative,
    Moderate,
    Aggressive,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Conservative => write!(f, "conservative"),
            RiskLevel::Moderate => write!(f, "moderate"),
            RiskLevel::Aggressive => write!(f, "aggressive"),
        }
    }
}

impl FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskLevel::Conservative),
            "moderate" => Ok(RiskLevel::Moderate),
            "aggressive" => Ok(RiskLevel::Aggressive),
            _ => anyhow::bail!(
                "Invalid risk level: {}. Must be 'conservative', 'moderate', or 'aggressive'",
                s
            ),
        }
    }
}

/// An automated betting strategy.
///
/// Created inactive by the generator; the `active` flag is flipped only by
/// the evaluator. Strategies are never deleted, deactivation is a flag flip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: Uuid,
    pub name: String,
    pub parameters: serde_json::Value,
    pub risk_level: RiskLevel,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    pub fn new(name: String, parameters: serde_json::Value, risk_level: RiskLevel) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            parameters,
            risk_level,
            active: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw return/risk metrics produced by one backtest run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestMetrics {
    pub total_return: Decimal,
    pub sharpe_ratio: f64,
    /// Peak-to-trough drawdown as a fraction (0.25 = 25%)
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
}

/// Recommendation label derived from the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongBet,
    ModerateBet,
    CautiousBet,
    Skip,
}

impl Recommendation {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.80 {
            Recommendation::StrongBet
        } else if score >= 0.65 {
            Recommendation::ModerateBet
        } else if score >= 0.50 {
            Recommendation::CautiousBet
        } else {
            Recommendation::Skip
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::StrongBet => write!(f, "strong_bet"),
            Recommendation::ModerateBet => write!(f, "moderate_bet"),
            Recommendation::CautiousBet => write!(f, "cautious_bet"),
            Recommendation::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for Recommendation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strong_bet" => Ok(Recommendation::StrongBet),
            "moderate_bet" => Ok(Recommendation::ModerateBet),
            "cautious_bet" => Ok(Recommendation::CautiousBet),
            "skip" => Ok(Recommendation::Skip),
            _ => anyhow::bail!("Invalid recommendation label: {}", s),
        }
    }
}

/// Result of one backtest run for a strategy.
///
/// Immutable once created, apart from the feedback submission marker which
/// is flipped by the repository after the remote call succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: Uuid,
    pub strategy_id: Uuid,
    pub metrics: BacktestMetrics,
    /// Scalar quality summary in [0, 1]
    pub composite_score: f64,
    pub recommendation: Recommendation,
    pub feedback_submitted: bool,
    pub created_at: DateTime<Utc>,
}

impl BacktestResult {
    /// Build a result from raw metrics, deriving the composite score and
    /// recommendation with the given scorer.
    pub fn from_metrics(
        strategy_id: Uuid,
        metrics: BacktestMetrics,
        scorer: &dyn crate::domain::scoring::CompositeScorer,
    ) -> Self {
        let composite_score = scorer.score(&metrics);
        Self {
            id: Uuid::new_v4(),
            strategy_id,
            metrics,
            composite_score,
            recommendation: Recommendation::from_score(composite_score),
            feedback_submitted: false,
            created_at: Utc::now(),
        }
    }
}

/// A single model output for a (race, runner) pair. Read-only once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub race_id: String,
    pub runner_id: String,
    pub probability: f64,
    pub confidence: f64,
    pub features: Vec<f64>,
    pub model_id: String,
    pub created_at: DateTime<Utc>,
}

/// Model families the prediction service can retrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Classifier,
    Ensemble,
    ReinforcementLearning,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Classifier => write!(f, "classifier"),
            ModelKind::Ensemble => write!(f, "ensemble"),
            ModelKind::ReinforcementLearning => write!(f, "reinforcement_learning"),
        }
    }
}

/// One asynchronous training job on the prediction service side
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingJob {
    pub job_id: String,
    pub model: ModelKind,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Hyperparameters for one retraining job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub model: ModelKind,
    pub hyperparameters: serde_json::Value,
}

impl TrainingConfig {
    /// The fixed set of model families retrained by a discovery run.
    pub fn standard_set() -> Vec<TrainingConfig> {
        vec![
            TrainingConfig {
                model: ModelKind::Classifier,
                hyperparameters: serde_json::json!({ "epochs": 50, "learning_rate": 0.001 }),
            },
            TrainingConfig {
                model: ModelKind::Ensemble,
                hyperparameters: serde_json::json!({ "estimators": 200, "max_depth": 8 }),
            },
            TrainingConfig {
                model: ModelKind::ReinforcementLearning,
                hyperparameters: serde_json::json!({ "episodes": 1000, "gamma": 0.99 }),
            },
        ]
    }
}

/// One entry of the ranked top-strategy list in a discovery report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedStrategy {
    /// 1-based, contiguous over the ranked sequence
    pub rank: usize,
    pub strategy_id: Uuid,
    pub name: String,
    pub composite_score: f64,
    pub active: bool,
}

/// Summary of one completed discovery run. Never mutated after return.
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    pub run_id: Uuid,
    pub generated_count: usize,
    pub activated_count: usize,
    pub deactivated_count: usize,
    pub feedback_submitted_count: usize,
    pub retraining_triggered: bool,
    pub duration: Duration,
    pub top_strategies: Vec<RankedStrategy>,
    pub completed_at: DateTime<Utc>,
}
