use async_trait::async_trait;
use betforge::application::cached_client::{CacheConfig, CachedPredictionClient};
use betforge::application::feedback::FeedbackSubmitter;
use betforge::domain::errors::GatewayError;
use betforge::domain::ports::{PredictionGateway, RequestKind};
use betforge::domain::repositories::BacktestRepository;
use betforge::domain::types::{
    BacktestMetrics, BacktestResult, Recommendation, TrainingConfig,
};
use betforge::infrastructure::mock::InMemoryBacktestRepository;
use chrono::Utc;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

// --- Mocks ---

/// Gateway that fails the Nth feedback submission and any training trigger
/// for a configured model family.
struct FlakyGateway {
    feedback_calls: AtomicU64,
    fail_feedback_on: Option<u64>,
    fail_training_for: Option<&'static str>,
}

impl FlakyGateway {
    fn reliable() -> Self {
        Self {
            feedback_calls: AtomicU64::new(0),
            fail_feedback_on: None,
            fail_training_for: None,
        }
    }
}

#[async_trait]
impl PredictionGateway for FlakyGateway {
    async fn call(&self, kind: RequestKind, params: &Value) -> Result<Value, GatewayError> {
        match kind {
            RequestKind::SubmitFeedback => {
                let n = self.feedback_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if self.fail_feedback_on == Some(n) {
                    return Err(GatewayError::Service(format!(
                        "feedback rejected on call {}",
                        n
                    )));
                }
                Ok(json!({ "status": "accepted" }))
            }
            RequestKind::TriggerTraining => {
                if let Some(family) = self.fail_training_for
                    && params["model"] == json!(family)
                {
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

/// Repository wrapper whose Nth `mark_submitted` fails.
struct FailingMarkRepository {
    inner: Arc<InMemoryBacktestRepository>,
    fail_mark_on: u64,
    marks: AtomicU64,
}

#[async_trait]
impl BacktestRepository for FailingMarkRepository {
    async fn create(&self, result: &BacktestResult) -> anyhow::Result<()> {
        self.inner.create(result).await
    }

    async fn find_latest_for_strategy(
        &self,
        strategy_id: Uuid,
    ) -> anyhow::Result<Option<BacktestResult>> {
        self.inner.find_latest_for_strategy(strategy_id).await
    }

    async fn find_unsubmitted(&self, limit: usize) -> anyhow::Result<Vec<BacktestResult>> {
        self.inner.find_unsubmitted(limit).await
    }

    async fn mark_submitted(&self, id: Uuid) -> anyhow::Result<()> {
        let n = self.marks.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_mark_on {
            anyhow::bail!("db write failed");
        }
        self.inner.mark_submitted(id).await
    }
}

fn result_with_score(score: f64) -> BacktestResult {
    BacktestResult {
        id: Uuid::new_v4(),
        strategy_id: Uuid::new_v4(),
        metrics: BacktestMetrics {
            total_return: dec!(0.12),
            sharpe_ratio: 1.1,
            max_drawdown: 0.15,
            win_rate: 0.52,
            profit_factor: 1.3,
        },
        composite_score: score,
        recommendation: Recommendation::from_score(score),
        feedback_submitted: false,
        created_at: Utc::now(),
    }
}

async fn seeded_repo(count: usize) -> Arc<InMemoryBacktestRepository> {
    let repo = Arc::new(InMemoryBacktestRepository::new());
    for _ in 0..count {
        repo.create(&result_with_score(0.6)).await.unwrap();
    }
    repo
}

fn submitter(
    gateway: FlakyGateway,
    repo: Arc<InMemoryBacktestRepository>,
) -> FeedbackSubmitter {
    let client = Arc::new(CachedPredictionClient::new(
        Arc::new(gateway),
        CacheConfig::default(),
    ));
    FeedbackSubmitter::new(client, repo)
}

// --- Tests ---

#[tokio::test]
async fn test_batch_is_bounded_by_batch_size() {
    let repo = seeded_repo(250).await;
    let submitter = submitter(FlakyGateway::reliable(), repo.clone());
    let token = CancellationToken::new();

    let outcome = submitter.submit_batch(&token, 100).await.unwrap();

    assert_eq!(outcome.submitted, 100);
    assert!(outcome.failure.is_none());
    assert_eq!(repo.find_unsubmitted(1000).await.unwrap().len(), 150);
}

#[tokio::test]
async fn test_mid_batch_failure_reports_partial_count() {
    let repo = seeded_repo(250).await;
    let gateway = FlakyGateway {
        fail_feedback_on: Some(50),
        ..FlakyGateway::reliable()
    };
    let submitter = submitter(gateway, repo.clone());
    let token = CancellationToken::new();

    let outcome = submitter.submit_batch(&token, 100).await.unwrap();

    // Item 50 failed: exactly 49 submitted, not 0 and not 50
    assert_eq!(outcome.submitted, 49);
    assert!(outcome.failure.is_some());
    assert_eq!(repo.find_unsubmitted(1000).await.unwrap().len(), 201);
}

#[tokio::test]
async fn test_mark_failure_reports_partial_count() {
    let inner = seeded_repo(250).await;
    let repo = Arc::new(FailingMarkRepository {
        inner: inner.clone(),
        fail_mark_on: 50,
        marks: AtomicU64::new(0),
    });
    let client = Arc::new(CachedPredictionClient::new(
        Arc::new(FlakyGateway::reliable()),
        CacheConfig::default(),
    ));
    let submitter = FeedbackSubmitter::new(client, repo);
    let token = CancellationToken::new();

    let outcome = submitter.submit_batch(&token, 100).await.unwrap();

    // The 50th item reached the service but its local marker write failed:
    // the batch stops with 49 counted, not an error that loses the count
    assert_eq!(outcome.submitted, 49);
    assert!(outcome.failure.is_some());
    assert_eq!(inner.find_unsubmitted(1000).await.unwrap().len(), 201);
}

#[tokio::test]
async fn test_cancellation_preserves_partial_count() {
    let repo = seeded_repo(10).await;
    let submitter = submitter(FlakyGateway::reliable(), repo.clone());
    let token = CancellationToken::new();
    token.cancel();

    let outcome = submitter.submit_batch(&token, 10).await.unwrap();

    assert_eq!(outcome.submitted, 0);
    assert!(outcome.failure.is_some());
    assert_eq!(repo.find_unsubmitted(1000).await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_retraining_failure_does_not_stop_other_families() {
    let repo = Arc::new(InMemoryBacktestRepository::new());
    let gateway = FlakyGateway {
        fail_training_for: Some("ensemble"),
        ..FlakyGateway::reliable()
    };
    let submitter = submitter(gateway, repo);
    let token = CancellationToken::new();

    let mut succeeded = 0;
    let mut failed = 0;
    for config in TrainingConfig::standard_set() {
        match submitter.trigger_retraining(&token, &config).await {
            Ok(job) => {
                assert!(!job.job_id.is_empty());
                succeeded += 1;
            }
            Err(_) => failed += 1,
        }
    }

    assert_eq!(succeeded, 2, "classifier and RL jobs must still be queued");
    assert_eq!(failed, 1);
}
