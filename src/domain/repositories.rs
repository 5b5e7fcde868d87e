//! Repository traits for the persistence layer.
//!
//! Strategy, BacktestResult and Prediction rows are owned by the storage
//! backend; the pipeline only references them by identifier. SQLite
//! implementations live in `infrastructure::persistence`, in-memory
//! implementations for tests and mock mode in `infrastructure::mock`.

use crate::domain::types::{BacktestResult, Prediction, Strategy};
use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait StrategyRepository: Send + Sync {
    async fn create(&self, strategy: &Strategy) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Strategy>>;

    /// All strategies currently flagged active.
    async fn find_active(&self) -> Result<Vec<Strategy>>;

    /// Flip the active flag. Deactivation is a flag flip, never a delete.
    async fn set_active(&self, id: Uuid, active: bool) -> Result<()>;
}

#[async_trait]
pub trait BacktestRepository: Send + Sync {
    async fn create(&self, result: &BacktestResult) -> Result<()>;

    /// Most recent result for a strategy, if any backtest has run.
    async fn find_latest_for_strategy(&self, strategy_id: Uuid) -> Result<Option<BacktestResult>>;

    /// Up to `limit` results not yet pushed to the prediction service,
    /// oldest first.
    async fn find_unsubmitted(&self, limit: usize) -> Result<Vec<BacktestResult>>;

    async fn mark_submitted(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait PredictionRepository: Send + Sync {
    async fn create(&self, prediction: &Prediction) -> Result<()>;

    async fn find_by_race(&self, race_id: &str) -> Result<Vec<Prediction>>;
}
