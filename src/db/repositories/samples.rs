use crate::db::models::Sample;
use crate::error::Error;
use anyhow::Result;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;

/// Samples repository for the append-only `quake_event_samples` table
#[derive(Clone)]
pub struct SamplesRepository {
    pool: Arc<PgPool>,
}

impl SamplesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn append(conn: &mut PgConnection, sample: &Sample) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quake_event_samples (event_id, sensor_id, intensity, recorded_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(sample.event_id)
        .bind(sample.sensor_id)
        .bind(sample.intensity)
        .bind(sample.recorded_at)
        .execute(conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to record sample: {}", e)))?;

        Ok(())
    }

    /// All samples of an event, oldest first
    pub async fn get_by_event(&self, event_id: i64) -> Result<Vec<Sample>> {
        let result = sqlx::query_as::<_, Sample>(
            r#"
            SELECT event_id, sensor_id, intensity, recorded_at
            FROM quake_event_samples
            WHERE event_id = $1
            ORDER BY recorded_at ASC, sample_id ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get event samples: {}", e)))?;

        Ok(result)
    }
}
