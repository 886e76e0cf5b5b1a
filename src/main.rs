//! Vehicle intake assistant - HTTP server
//!
//! Serves the conversational intake flow over a small JSON API.

use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vehicle_intake::api::{create_router, AppState};
use vehicle_intake::backend::BackendConfig;
use vehicle_intake::config::ServerConfig;
use vehicle_intake::db::Database;
use vehicle_intake::llm::LlmConfig;
use vehicle_intake::runtime::{CheckpointStore, SqliteCheckpointStore, TurnRunner};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vehicle_intake=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = ServerConfig::from_env();

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    let llm_config = LlmConfig::from_env()?;
    let llm = llm_config.build().inspect_err(|e| {
        tracing::error!(error = %e, provider = %llm_config.provider, "Model provider not configured");
    })?;
    tracing::info!(provider = %llm_config.provider, model = %llm_config.model_name(), "LLM initialized");

    let backend_config = BackendConfig::from_env();
    let backend = backend_config.build()?;
    backend.health_check().await.inspect_err(|e| {
        tracing::error!(error = %e, backend = ?backend_config, "Persistence service unreachable");
    })?;
    tracing::info!(backend = ?backend_config, "Persistence service reachable");

    let store: Arc<dyn CheckpointStore> = Arc::new(SqliteCheckpointStore::new(db));
    let state = AppState::new(TurnRunner::new(llm, backend, store));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Vehicle intake server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
