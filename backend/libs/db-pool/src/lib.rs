//! Database connection pool management
//!
//! Builds a verified deadpool-postgres pool from environment configuration

mod metrics;

pub use metrics::acquire_with_metrics;
use metrics::update_pool_metrics;

pub use deadpool_postgres::{Object as PooledClient, Pool as PgPool, PoolError};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum DbPoolError {
    #[error("DATABASE_URL environment variable not set")]
    MissingUrl,

    #[error("invalid database url: {0}")]
    InvalidUrl(#[source] tokio_postgres::Error),

    #[error("failed to build pool: {0}")]
    Build(String),

    #[error("failed to acquire connection: {0}")]
    Acquire(#[from] PoolError),

    #[error("verification query failed: {0}")]
    Verify(#[source] tokio_postgres::Error),

    #[error("database verification timed out after {0}s")]
    Timeout(u64),
}

/// Database connection pool configuration
#[derive(Clone)]
pub struct DbConfig {
    /// Service name for metrics labeling
    pub service_name: String,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections
    pub max_connections: u32,
    /// Connection creation timeout (new connection to PostgreSQL)
    pub connect_timeout_secs: u64,
    /// Connection acquisition timeout (get connection from pool)
    pub acquire_timeout_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("service_name", &self.service_name)
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            service_name: String::from("unknown"),
            database_url: String::new(),
            max_connections: 20,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DbConfig {
    /// Create a new DbConfig from environment variables
    pub fn from_env(service_name: &str) -> Result<Self, DbPoolError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| DbPoolError::MissingUrl)?;
        let defaults = Self::default();

        Ok(Self {
            service_name: service_name.to_string(),
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
            acquire_timeout_secs: env_or("DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout_secs),
        })
    }

    /// Log pool configuration details
    pub fn log_config(&self) {
        info!(
            "Database Pool Configuration: \
             service={}, max_connections={}, connect_timeout={}s, acquire_timeout={}s",
            self.service_name,
            self.max_connections,
            self.connect_timeout_secs,
            self.acquire_timeout_secs
        );
    }
}

/// Build a deadpool-postgres pool and verify it with `SELECT 1`
pub async fn create_pool(config: DbConfig) -> Result<PgPool, DbPoolError> {
    debug!(
        "Creating database pool: service={}, max={}, acquire_timeout={}s, verify_timeout={}s",
        config.service_name,
        config.max_connections,
        config.acquire_timeout_secs,
        config.connect_timeout_secs
    );

    let mut pg_config: PgConfig = config
        .database_url
        .parse()
        .map_err(DbPoolError::InvalidUrl)?;
    pg_config.connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    let mgr = Manager::from_config(
        pg_config,
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let pool = Pool::builder(mgr)
        .max_size(config.max_connections as usize)
        .wait_timeout(Some(Duration::from_secs(config.acquire_timeout_secs)))
        .create_timeout(Some(Duration::from_secs(config.connect_timeout_secs)))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| DbPoolError::Build(e.to_string()))?;

    let verify = async {
        let client = pool.get().await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(DbPoolError::Verify)?;
        Ok::<(), DbPoolError>(())
    };

    match tokio::time::timeout(Duration::from_secs(config.connect_timeout_secs), verify).await {
        Ok(Ok(())) => {
            info!(
                service = %config.service_name,
                "Database pool created and verified successfully"
            );

            update_pool_metrics(&pool, &config.service_name);

            let pool_clone = pool.clone();
            let service = config.service_name.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                loop {
                    interval.tick().await;
                    update_pool_metrics(&pool_clone, &service);
                }
            });

            Ok(pool)
        }
        Ok(Err(e)) => {
            error!(
                service = %config.service_name,
                error = %e,
                "Database connection verification failed"
            );
            Err(e)
        }
        Err(_) => {
            error!(
                service = %config.service_name,
                timeout_secs = config.connect_timeout_secs,
                "Database connection verification timeout"
            );
            Err(DbPoolError::Timeout(config.connect_timeout_secs))
        }
    }
}
