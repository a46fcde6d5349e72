use crate::error::{AppError, AppResult};
use db_pool::{create_pool as create_pg_pool, DbConfig as DbPoolConfig, PgPool};

pub(crate) const SERVICE_NAME: &str = "chat-service";

static MIGRATION: &str = include_str!("../migrations/0001_direct_chat.sql");

pub async fn init_pool(database_url: &str) -> AppResult<PgPool> {
    let mut cfg = DbPoolConfig::from_env(SERVICE_NAME).unwrap_or_default();
    cfg.service_name = SERVICE_NAME.to_string();
    if cfg.database_url.is_empty() {
        cfg.database_url = database_url.to_string();
    }
    cfg.log_config();

    let pool = create_pg_pool(cfg)
        .await
        .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Apply the schema; every statement is idempotent
pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    let client = db_pool::acquire_with_metrics(pool, SERVICE_NAME).await?;
    client.batch_execute(MIGRATION).await?;
    tracing::info!("database schema up to date");
    Ok(())
}
