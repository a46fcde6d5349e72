use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use chat_service::{
    config::{self, JwtKey, StoreBackend},
    db, error, logging, routes,
    services::{ChatServices, LoggingNotifier},
    state::AppState,
    store::{
        AccountDirectory, ChatStore, InMemoryAccountDirectory, InMemoryChatStore,
        PgAccountDirectory, PgChatStore,
    },
    websocket::PresenceRegistry,
};
use crypto_core::TokenVerifier;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let verifier = Arc::new(match &cfg.jwt {
        JwtKey::Secret(secret) => TokenVerifier::hs256(secret.as_bytes()),
        JwtKey::PublicKeyPem(pem) => TokenVerifier::rs256_pem(pem).map_err(|e| {
            error::AppError::StartServer(format!("Failed to load JWT public key: {e}"))
        })?,
    });

    let (store, accounts): (Arc<dyn ChatStore>, Arc<dyn AccountDirectory>) = match cfg.store {
        StoreBackend::Postgres => {
            let database_url = cfg
                .database_url
                .as_deref()
                .ok_or_else(|| error::AppError::Config("DATABASE_URL missing".into()))?;
            let pool = db::init_pool(database_url).await?;
            (
                Arc::new(PgChatStore::new(pool.clone())),
                Arc::new(PgAccountDirectory::new(pool, &cfg.accounts_table)?),
            )
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory chat store; data is lost on restart");
            (
                Arc::new(InMemoryChatStore::new()),
                Arc::new(InMemoryAccountDirectory::open()),
            )
        }
    };

    let presence = PresenceRegistry::new();
    let services = Arc::new(ChatServices::new(
        store,
        accounts,
        verifier.clone(),
        presence.clone(),
        Arc::new(LoggingNotifier),
    ));

    let state = AppState {
        services,
        presence,
        verifier,
        config: cfg.clone(),
    };

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, store = ?cfg.store, "starting chat-service");

    HttpServer::new(move || {
        let cors = if state.config.cors_allowed_origins.is_empty() {
            Cors::default().allow_any_origin()
        } else {
            state
                .config
                .cors_allowed_origins
                .iter()
                .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
                .supports_credentials()
        }
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

        let verifier = state.verifier.clone();
        App::new()
            .wrap(cors)
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::RequestId::new())
            .app_data(web::Data::new(state.clone()))
            .configure(|svc| routes::configure(svc, verifier))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind REST: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("REST server: {e}")))
}
