use crate::domain::repositories::PredictionRepository;
use crate::domain::types::Prediction;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub struct SqlitePredictionRepository {
    pool: SqlitePool,
}

impl SqlitePredictionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn map_row(row: &SqliteRow) -> Result<Prediction> {
    let id: String = row.try_get("id")?;
    let features_json: String = row.try_get("features_json")?;
    let created_at: i64 = row.try_get("created_at")?;

    Ok(Prediction {
        id: Uuid::parse_str(&id).context("Invalid prediction id in database")?,
        race_id: row.try_get("race_id")?,
        runner_id: row.try_get("runner_id")?,
        probability: row.try_get("probability")?,
        confidence: row.try_get("confidence")?,
        features: serde_json::from_str(&features_json)
            .context("Invalid feature vector in database")?,
        model_id: row.try_get("model_id")?,
        created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
    })
}

#[async_trait]
impl PredictionRepository for SqlitePredictionRepository {
    async fn create(&self, prediction: &Prediction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO predictions
                (id, race_id, runner_id, probability, confidence, features_json, model_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(prediction.id.to_string())
        .bind(&prediction.race_id)
        .bind(&prediction.runner_id)
        .bind(prediction.probability)
        .bind(prediction.confidence)
        .bind(serde_json::to_string(&prediction.features)?)
        .bind(&prediction.model_id)
        .bind(prediction.created_at.timestamp())
        .execute(&self.pool)
        .await
        .context("Failed to insert prediction")?;

        Ok(())
    }

    async fn find_by_race(&self, race_id: &str) -> Result<Vec<Prediction>> {
        let rows = sqlx::query("SELECT * FROM predictions WHERE race_id = ? ORDER BY created_at")
            .bind(race_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_row).collect()
    }
}
