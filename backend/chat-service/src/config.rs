use crate::error::AppError;
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::time::Duration;

/// Which [`crate::store::ChatStore`] implementation backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// In-process tables; every authenticated user is treated as an existing account
    Memory,
}

/// Key material for bearer token verification
#[derive(Clone)]
pub enum JwtKey {
    Secret(String),
    PublicKeyPem(String),
}

impl fmt::Debug for JwtKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JwtKey::Secret(_) => f.write_str("Secret([REDACTED])"),
            JwtKey::PublicKeyPem(_) => f.write_str("PublicKeyPem(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub port: u16,
    pub store: StoreBackend,
    pub jwt: JwtKey,
    /// Table consulted to confirm a token subject still has an account
    pub accounts_table: String,
    /// Empty means any origin
    pub cors_allowed_origins: Vec<String>,
    pub ws_heartbeat_interval: Duration,
    pub ws_client_timeout: Duration,
}

impl Config {
    fn parse_list(value: &str) -> Vec<String> {
        value
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect()
    }

    fn parse_secs(key: &str, default: u64) -> Duration {
        let secs = env::var(key)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|s: &u64| *s > 0)
            .unwrap_or(default);
        Duration::from_secs(secs)
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let store = match env::var("CHAT_STORE")
            .unwrap_or_else(|_| "postgres".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" | "postgresql" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Config(format!(
                    "CHAT_STORE must be 'postgres' or 'memory', got '{other}'"
                )))
            }
        };

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::Config("DATABASE_URL missing".into()));
        }

        let jwt = match (
            env::var("JWT_PUBLIC_KEY_PEM").ok().filter(|s| !s.is_empty()),
            env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
        ) {
            (Some(pem), _) => JwtKey::PublicKeyPem(pem),
            (None, Some(secret)) => JwtKey::Secret(secret),
            (None, None) => {
                return Err(AppError::Config(
                    "JWT_SECRET or JWT_PUBLIC_KEY_PEM must be set".into(),
                ))
            }
        };

        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        Ok(Self {
            database_url,
            port,
            store,
            jwt,
            accounts_table: env::var("ACCOUNTS_TABLE").unwrap_or_else(|_| "users".into()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|v| Self::parse_list(&v))
                .unwrap_or_default(),
            ws_heartbeat_interval: Self::parse_secs("WS_HEARTBEAT_INTERVAL_SECS", 5),
            ws_client_timeout: Self::parse_secs("WS_CLIENT_TIMEOUT_SECS", 30),
        })
    }

    /// In-memory configuration used by tests
    pub fn test_defaults(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            port: 0,
            store: StoreBackend::Memory,
            jwt: JwtKey::Secret(jwt_secret.to_string()),
            accounts_table: "users".into(),
            cors_allowed_origins: Vec::new(),
            ws_heartbeat_interval: Duration::from_secs(5),
            ws_client_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "CHAT_STORE",
        "DATABASE_URL",
        "JWT_SECRET",
        "JWT_PUBLIC_KEY_PEM",
        "PORT",
        "CORS_ALLOWED_ORIGINS",
        "WS_HEARTBEAT_INTERVAL_SECS",
        "WS_CLIENT_TIMEOUT_SECS",
        "ACCOUNTS_TABLE",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_memory_store_defaults() {
        clear_env();
        env::set_var("CHAT_STORE", "memory");
        env::set_var("JWT_SECRET", "s3cret");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.store, StoreBackend::Memory);
        assert_eq!(cfg.port, 3000);
        assert!(cfg.database_url.is_none());
        assert!(cfg.cors_allowed_origins.is_empty());
        assert_eq!(cfg.ws_heartbeat_interval, Duration::from_secs(5));
        assert_eq!(cfg.ws_client_timeout, Duration::from_secs(30));
        assert!(matches!(cfg.jwt, JwtKey::Secret(ref s) if s == "s3cret"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_postgres_requires_database_url() {
        clear_env();
        env::set_var("JWT_SECRET", "s3cret");

        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));

        env::set_var("DATABASE_URL", "postgres://localhost/chat");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.store, StoreBackend::Postgres);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_jwt_key_is_required_and_pem_wins() {
        clear_env();
        env::set_var("CHAT_STORE", "memory");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));

        env::set_var("JWT_SECRET", "s3cret");
        env::set_var("JWT_PUBLIC_KEY_PEM", "-----BEGIN PUBLIC KEY-----");
        let cfg = Config::from_env().unwrap();
        assert!(matches!(cfg.jwt, JwtKey::PublicKeyPem(_)));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_overrides_are_parsed() {
        clear_env();
        env::set_var("CHAT_STORE", "memory");
        env::set_var("JWT_SECRET", "s3cret");
        env::set_var("PORT", "8085");
        env::set_var("CORS_ALLOWED_ORIGINS", "https://a.example, ,https://b.example");
        env::set_var("WS_CLIENT_TIMEOUT_SECS", "0");

        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.port, 8085);
        assert_eq!(
            cfg.cors_allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        // Zero is not a usable timeout
        assert_eq!(cfg.ws_client_timeout, Duration::from_secs(30));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_store_is_rejected() {
        clear_env();
        env::set_var("CHAT_STORE", "redis");
        env::set_var("JWT_SECRET", "s3cret");
        assert!(matches!(Config::from_env(), Err(AppError::Config(_))));
        clear_env();
    }
}
