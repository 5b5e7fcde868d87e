use crate::domain::repositories::StrategyRepository;
use crate::domain::types::{RiskLevel, Strategy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

pub struct SqliteStrategyRepository {
    pool: SqlitePool,
}

impl SqliteStrategyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_row(row: &SqliteRow) -> Result<Strategy> {
    let id: String = row.try_get("id")?;
    let risk_level: String = row.try_get("risk_level")?;
    let parameters_json: String = row.try_get("parameters_json")?;
    let created_at: i64 = row.try_get("created_at")?;
    let updated_at: i64 = row.try_get("updated_at")?;

    Ok(Strategy {
        id: Uuid::parse_str(&id).context("Invalid strategy id in database")?,
        name: row.try_get("name")?,
        parameters: serde_json::from_str(&parameters_json)
            .context("Invalid strategy parameters in database")?,
        risk_level: RiskLevel::from_str(&risk_level)?,
        active: row.try_get("is_active")?,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
        updated_at: DateTime::from_timestamp(updated_at, 0).unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl StrategyRepository for SqliteStrategyRepository {
    async fn create(&self, strategy: &Strategy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategies (id, name, parameters_json, risk_level, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(strategy.id.to_string())
        .bind(&strategy.name)
        .bind(strategy.parameters.to_string())
        .bind(strategy.risk_level.to_string())
        .bind(strategy.active)
        .bind(strategy.created_at.timestamp())
        .bind(strategy.updated_at.timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert strategy")?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Strategy>> {
        let row = sqlx::query("SELECT * FROM strategies WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_row).transpose()
    }

    async fn find_active(&self) -> Result<Vec<Strategy>> {
        let rows = sqlx::query("SELECT * FROM strategies WHERE is_active = 1 ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_row).collect()
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        sqlx::query("UPDATE strategies SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now().timestamp())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update active flag for strategy {}", id))?;

        Ok(())
    }
}
