use crate::domain::repositories::BacktestRepository;
use crate::domain::types::{BacktestMetrics, BacktestResult, Recommendation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteBacktestRepository {
    pool: SqlitePool,
}

impl SqliteBacktestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_row(row: &SqliteRow) -> Result<BacktestResult> {
    let id: String = row.try_get("id")?;
    let strategy_id: String = row.try_get("strategy_id")?;
    let total_return: String = row.try_get("total_return")?;
    let recommendation: String = row.try_get("recommendation")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(BacktestResult {
        id: Uuid::parse_str(&id).context("Invalid backtest result id in database")?,
        strategy_id: Uuid::parse_str(&strategy_id).context("Invalid strategy id in database")?,
        metrics: BacktestMetrics {
            total_return: Decimal::from_str(&total_return)
                .context("Invalid total_return in database")?,
            sharpe_ratio: row.try_get("sharpe_ratio")?,
            max_drawdown: row.try_get("max_drawdown")?,
            win_rate: row.try_get("win_rate")?,
            profit_factor: row.try_get("profit_factor")?,
        },
        composite_score: row.try_get("composite_score")?,
        recommendation: Recommendation::from_str(&recommendation)?,
        feedback_submitted: row.try_get("feedback_submitted")?,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl BacktestRepository for SqliteBacktestRepository {
    async fn create(&self, result: &BacktestResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backtest_results
                (id, strategy_id, total_return, sharpe_ratio, max_drawdown, win_rate,
                 profit_factor, composite_score, recommendation, feedback_submitted, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.id.to_string())
        .bind(result.strategy_id.to_string())
        .bind(result.metrics.total_return.to_string())
        .bind(result.metrics.sharpe_ratio)
        .bind(result.metrics.max_drawdown)
        .bind(result.metrics.win_rate)
        .bind(result.metrics.profit_factor)
        .bind(result.composite_score)
        .bind(result.recommendation.to_string())
        .bind(result.feedback_submitted)
        .bind(result.created_at.timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert backtest result")?;

        Ok(())
    }

    async fn find_latest_for_strategy(&self, strategy_id: Uuid) -> Result<Option<BacktestResult>> {
        let row = sqlx::query(
            "SELECT * FROM backtest_results WHERE strategy_id = ? ORDER BY created_at DESC LIMIT 1",
        )
        .bind(strategy_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn find_unsubmitted(&self, limit: usize) -> Result<Vec<BacktestResult>> {
        let rows = sqlx::query(
            "SELECT * FROM backtest_results WHERE feedback_submitted = 0 ORDER BY created_at LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(map_row).collect()
    }

    async fn mark_submitted(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE backtest_results SET feedback_submitted = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to mark backtest result {} submitted", id))?;

        Ok(())
    }
}
