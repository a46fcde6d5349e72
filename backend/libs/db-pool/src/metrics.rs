//! Prometheus metrics for database connection pool
//!
//! Tracks pool size and connection acquisition latency

use deadpool_postgres::{Object, Pool, PoolError};
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use std::time::Instant;

/// Database connection pool size by state (idle/active/max)
static DB_POOL_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

/// Time to acquire a connection from the pool
static DB_POOL_ACQUIRE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "db_pool_acquire_duration_seconds",
        "Time to acquire connection from pool",
        &["service"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

static DB_POOL_ACQUIRE_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "db_pool_acquire_errors_total",
        "Connection acquisition errors",
        &["service"]
    )
    .expect("Prometheus metrics registration should succeed at startup")
});

/// Update connection pool metrics (called periodically)
pub(crate) fn update_pool_metrics(pool: &Pool, service: &str) {
    let status = pool.status();
    let size = status.size as i64;
    let idle = status.available as i64;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);
    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set(size - idle);
    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(status.max_size as i64);
}

/// Acquire a connection from the pool and record metrics
///
/// Drop-in replacement for `pool.get().await`.
pub async fn acquire_with_metrics(pool: &Pool, service: &str) -> Result<Object, PoolError> {
    let start = Instant::now();
    let result = pool.get().await;

    DB_POOL_ACQUIRE_DURATION
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());
    if result.is_err() {
        DB_POOL_ACQUIRE_ERRORS.with_label_values(&[service]).inc();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use deadpool_postgres::{Manager, ManagerConfig, RecyclingMethod, Runtime};
    use std::time::Duration;
    use tokio_postgres::NoTls;

    #[tokio::test]
    async fn test_failed_acquire_is_recorded() {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host("127.0.0.1")
            .port(1)
            .user("nobody")
            .dbname("none")
            .connect_timeout(Duration::from_millis(200));
        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(1)
            .create_timeout(Some(Duration::from_millis(500)))
            .runtime(Runtime::Tokio1)
            .build()
            .unwrap();

        let service = "acquire-metrics-test";
        let errors_before = DB_POOL_ACQUIRE_ERRORS.with_label_values(&[service]).get();
        let samples_before = DB_POOL_ACQUIRE_DURATION
            .with_label_values(&[service])
            .get_sample_count();

        assert!(acquire_with_metrics(&pool, service).await.is_err());

        assert_eq!(
            DB_POOL_ACQUIRE_ERRORS.with_label_values(&[service]).get(),
            errors_before + 1
        );
        assert_eq!(
            DB_POOL_ACQUIRE_DURATION
                .with_label_values(&[service])
                .get_sample_count(),
            samples_before + 1
        );
    }
}
