use async_trait::async_trait;
use betforge::application::cached_client::{CacheConfig, CachedPredictionClient};
use betforge::application::evaluator::StrategyEvaluator;
use betforge::application::feedback::FeedbackSubmitter;
use betforge::application::generator::StrategyGenerator;
use betforge::application::orchestrator::{DiscoveryConfig, DiscoveryOrchestrator};
use betforge::domain::errors::GatewayError;
use betforge::domain::ports::{BacktestRunner, PredictionGateway, RequestKind};
use betforge::domain::repositories::{BacktestRepository, StrategyRepository};
use betforge::domain::scoring::CompositeScorer;
use betforge::domain::types::{
    BacktestMetrics, BacktestResult, Recommendation, RiskLevel, Strategy,
};
use betforge::infrastructure::mock::{InMemoryBacktestRepository, InMemoryStrategyRepository};
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// --- Mocks ---

/// Gateway returning a fixed candidate list; retraining fails for the
/// ensemble family.
struct ScriptedGateway {
    candidate_count: usize,
    generate_calls: AtomicU64,
    train_calls: AtomicU64,
    feedback_calls: AtomicU64,
    fail_generation: bool,
}

impl ScriptedGateway {
    fn new(candidate_count: usize) -> Self {
        Self {
            candidate_count,
            generate_calls: AtomicU64::new(0),
            train_calls: AtomicU64::new(0),
            feedback_calls: AtomicU64::new(0),
            fail_generation: false,
        }
    }
}

#[async_trait]
impl PredictionGateway for ScriptedGateway {
    async fn call(&self, kind: RequestKind, params: &Value) -> Result<Value, GatewayError> {
        match kind {
            RequestKind::GenerateStrategies => {
                self.generate_calls.fetch_add(1, Ordering::SeqCst);
                if self.fail_generation {
                    return Err(GatewayError::Unreachable {
                        addr: "test".to_string(),
                        reason: "down".to_string(),
                    });
                }
                let candidates: Vec<Value> = (0..self.candidate_count)
                    .map(|i| {
                        json!({
                            "name": format!("cand-{}", i),
                            "parameters": { "index": i, "min_odds": 2.0 },
                        })
                    })
                    .collect();
                Ok(Value::Array(candidates))
            }
            RequestKind::SubmitFeedback => {
                self.feedback_calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "status": "accepted" }))
            }
            RequestKind::TriggerTraining => {
                self.train_calls.fetch_add(1, Ordering::SeqCst);
                if params["model"] == json!("ensemble") {
                    return Err(GatewayError::Service("training backlog full".to_string()));
                }
                Ok(json!({
                    "job_id": Uuid::new_v4().to_string(),
                    "model": params["model"],
                    "status": "queued",
                }))
            }
            _ => Ok(Value::Null),
        }
    }

    async fn close(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Backtest runner assigning win rates 0.9, 0.8, ... down the candidate
/// index, so scores are fully predictable.
struct IndexedRunner;

#[async_trait]
impl BacktestRunner for IndexedRunner {
    async fn run(&self, strategy: &Strategy) -> anyhow::Result<BacktestMetrics> {
        let index = strategy.parameters["index"].as_u64().unwrap_or(0) as f64;
        Ok(BacktestMetrics {
            total_return: dec!(0.10),
            sharpe_ratio: 1.0,
            max_drawdown: 0.10,
            win_rate: (9.0 - index) / 10.0,
            profit_factor: 1.5,
        })
    }
}

/// Scorer that passes the win rate straight through as the composite score.
struct WinRateScorer;

impl CompositeScorer for WinRateScorer {
    fn score(&self, metrics: &BacktestMetrics) -> f64 {
        metrics.win_rate
    }
}

struct Harness {
    gateway: Arc<ScriptedGateway>,
    strategies: Arc<InMemoryStrategyRepository>,
    backtests: Arc<InMemoryBacktestRepository>,
    orchestrator: DiscoveryOrchestrator,
}

fn build_harness(gateway: ScriptedGateway, config: DiscoveryConfig) -> Harness {
    let gateway = Arc::new(gateway);
    let client = Arc::new(CachedPredictionClient::new(
        gateway.clone(),
        CacheConfig::default(),
    ));
    let strategies = Arc::new(InMemoryStrategyRepository::new());
    let backtests = Arc::new(InMemoryBacktestRepository::new());

    let generator = StrategyGenerator::new(client.clone(), strategies.clone());
    let evaluator = StrategyEvaluator::new(
        strategies.clone(),
        backtests.clone(),
        Some(Arc::new(IndexedRunner)),
        Arc::new(WinRateScorer),
        10,
    );
    let feedback = FeedbackSubmitter::new(client.clone(), backtests.clone());
    let orchestrator = DiscoveryOrchestrator::new(
        generator,
        evaluator,
        feedback,
        strategies.clone(),
        config,
    );

    Harness {
        gateway,
        strategies,
        backtests,
        orchestrator,
    }
}

fn full_config() -> DiscoveryConfig {
    DiscoveryConfig {
        generate_count: 10,
        risk_level: RiskLevel::Moderate,
        target_return: 0.15,
        min_composite_score: 0.65,
        deactivate_threshold: 0.50,
        top_n: 10,
        feedback_enabled: true,
        feedback_batch_size: 100,
        retrain_enabled: true,
    }
}

// --- Tests ---

#[tokio::test]
async fn test_end_to_end_discovery_run() {
    let harness = build_harness(ScriptedGateway::new(10), full_config());
    let token = CancellationToken::new();

    let report = harness.orchestrator.run(&token).await.unwrap();

    assert_eq!(report.generated_count, 10);
    // Scores are 0.9, 0.8, ..., 0.0: three candidates clear 0.65
    assert_eq!(report.activated_count, 3);
    assert_eq!(report.deactivated_count, 0);

    // Ranks are 1-based and contiguous, best score first
    assert_eq!(report.top_strategies.len(), 10);
    let ranks: Vec<usize> = report.top_strategies.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, (1..=10).collect::<Vec<_>>());
    assert_eq!(report.top_strategies[0].rank, 1);
    assert!((report.top_strategies[0].composite_score - 0.9).abs() < 1e-9);
    assert!(report.top_strategies[0].active);

    // Every backtest result produced this run was pushed as feedback
    assert_eq!(report.feedback_submitted_count, 10);
    assert_eq!(harness.gateway.feedback_calls.load(Ordering::SeqCst), 10);
    assert_eq!(harness.backtests.find_unsubmitted(100).await.unwrap().len(), 0);

    // All three families attempted, ensemble failed, run still completed
    assert_eq!(harness.gateway.train_calls.load(Ordering::SeqCst), 3);
    assert!(report.retraining_triggered);

    // Activated strategies are persisted with the flag set
    let active = harness.strategies.find_active().await.unwrap();
    assert_eq!(active.len(), 3);
    assert!(active.iter().all(|s| s.active));
}

#[tokio::test]
async fn test_generation_failure_is_fatal() {
    let gateway = ScriptedGateway {
        fail_generation: true,
        ..ScriptedGateway::new(10)
    };
    let harness = build_harness(gateway, full_config());
    let token = CancellationToken::new();

    let err = harness.orchestrator.run(&token).await.unwrap_err();
    assert!(err.to_string().contains("Generation stage failed"));

    // Nothing downstream ran
    assert_eq!(harness.gateway.feedback_calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.gateway.train_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_short_candidate_batch_is_partial_result() {
    // Service returns 6 of the 10 requested candidates
    let harness = build_harness(ScriptedGateway::new(6), full_config());
    let token = CancellationToken::new();

    let report = harness.orchestrator.run(&token).await.unwrap();

    assert_eq!(report.generated_count, 6);
    assert_eq!(report.top_strategies.len(), 6);
}

#[tokio::test]
async fn test_cancelled_run_fails_during_generation() {
    let harness = build_harness(ScriptedGateway::new(10), full_config());
    let token = CancellationToken::new();
    token.cancel();

    let err = harness.orchestrator.run(&token).await.unwrap_err();
    assert!(err.to_string().contains("Generation stage failed"));
}

#[tokio::test]
async fn test_previously_active_strategy_is_deactivated() {
    let harness = build_harness(ScriptedGateway::new(0), full_config());
    let token = CancellationToken::new();

    // Existing active strategy whose latest backtest collapsed to 0.30
    let mut stale = Strategy::new(
        "stale-favourite".to_string(),
        json!({ "min_odds": 1.8 }),
        RiskLevel::Aggressive,
    );
    stale.active = true;
    harness.strategies.create(&stale).await.unwrap();
    harness
        .backtests
        .create(&BacktestResult {
            id: Uuid::new_v4(),
            strategy_id: stale.id,
            metrics: BacktestMetrics {
                total_return: dec!(-0.30),
                sharpe_ratio: -0.5,
                max_drawdown: 0.50,
                win_rate: 0.30,
                profit_factor: 0.6,
            },
            composite_score: 0.30,
            recommendation: Recommendation::Skip,
            feedback_submitted: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();

    let report = harness.orchestrator.run(&token).await.unwrap();

    assert_eq!(report.deactivated_count, 1);
    assert_eq!(report.activated_count, 0);
    assert!(harness.strategies.find_active().await.unwrap().is_empty());
}
