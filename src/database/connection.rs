use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::StoreResult;

pub async fn get_db_pool(config: &AppConfig) -> StoreResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("✅ Connected to database");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("📂 Migrations applied");

    Ok(pool)
}
