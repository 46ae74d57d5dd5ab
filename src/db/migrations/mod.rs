use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Embedded migrations, applied in order. Each script is idempotent.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_detection_tables.sql",
    include_str!("sql/001_create_detection_tables.sql"),
)];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    pool.execute(sql)
        .await
        .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;

    Ok(())
}
