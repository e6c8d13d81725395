pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::PepConfig;
use crate::middleware::BearerVerifier;
use crate::services::{PolicyService, PolicyStore};
use service_core::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: PepConfig,
    pub store: Arc<dyn PolicyStore>,
    pub policy: PolicyService,
    pub bearer: Arc<BearerVerifier>,
}

pub fn build_router(state: AppState) -> Router {
    // Device owners manage device policies; service owners manage
    // service registrations. The gateway routes carry no bearer token.
    let device_routes = Router::new()
        .route("/policy", get(handlers::device::get_policies))
        .route("/policy", post(handlers::device::insert_policies))
        .route("/policy", put(handlers::device::update_policies))
        .route("/policy/:device_id", delete(handlers::device::delete_policies))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::device_owner_auth,
        ));

    let service_routes = Router::new()
        .route("/service", get(handlers::service::get_services))
        .route("/service", post(handlers::service::insert_service))
        .route("/service", put(handlers::service::update_service))
        .route(
            "/service/:service_id",
            delete(handlers::service::delete_service),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::service_owner_auth,
        ));

    let gateway_routes = Router::new()
        .route("/filter", post(handlers::gateway::filter_service_list))
        .route("/device/:device_id", get(handlers::gateway::get_device_statement));

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .merge(device_routes)
        .merge(service_routes)
        .merge(gateway_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

/// Service health check. Pings the policy store so load balancers see
/// degraded storage as unhealthy.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Policy store health check failed");
        e
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "postgres": "up"
        }
    })))
}
