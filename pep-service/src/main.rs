use pep_service::{
    build_router,
    config::PepConfig,
    middleware::BearerVerifier,
    services::{Database, PolicyService, PolicySigner, RegistryHttpClient},
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = PepConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting policy enforcement point"
    );

    tracing::info!("Initializing database connection");
    let db = Database::new(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    db.run_migrations().await?;
    tracing::info!("Database initialized successfully");

    let registry = RegistryHttpClient::new(config.registry.clone())?;
    tracing::info!("Identity registry client initialized");

    let signer = Arc::new(PolicySigner::new(&config.security)?);
    let bearer = Arc::new(BearerVerifier::new(&config.security)?);
    tracing::info!("Signing and bearer keys loaded");

    let store: Arc<dyn pep_service::services::PolicyStore> = Arc::new(db.clone());
    let policy = PolicyService::new(store.clone(), Arc::new(registry), signer);

    let state = AppState {
        config: config.clone(),
        store,
        policy,
        bearer,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
