use actix_web::{middleware, web, App, HttpResponse, HttpServer};
use exchange_service::{
    config::Config,
    error::AppError,
    handlers, logging,
    metrics::{self, MetricsMiddleware},
    repository::{InMemoryStore, PgStore, Repositories},
    services::EmailNotifier,
    state::AppState,
};
use std::sync::Arc;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "exchange-service",
    }))
}

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let config = Config::from_env()?;

    let repos = match config.database.url.as_deref() {
        Some(url) => {
            let store = PgStore::connect(url, config.database.max_connections)
                .await
                .map_err(|e| AppError::StartServer(format!("db: {e}")))?;
            tracing::info!("connected to postgres, migrations applied");
            Repositories::postgres(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Repositories::in_memory(Arc::new(InMemoryStore::new()))
        }
    };

    let notifier = EmailNotifier::new(&config.email)?;
    tracing::info!(enabled = notifier.is_enabled(), "email notifier ready");

    let bind_addr = config.bind_addr();
    let state = AppState::build(config, repos, Arc::new(notifier));

    tracing::info!(%bind_addr, "starting exchange-service");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(MetricsMiddleware)
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(handlers::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("server: {e}")))
}
