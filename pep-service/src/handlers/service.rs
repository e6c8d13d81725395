//! Service-policy endpoints, reachable with the service-owner role.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::middleware::OwnerIdentity;
use crate::models::Service;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Available policies plus the requester's registered services.
pub async fn get_services(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.user_service_policies(&requester).await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn insert_service(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
    ValidatedJson(service): ValidatedJson<Service>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.register_service(&requester, &service).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

pub async fn update_service(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
    ValidatedJson(service): ValidatedJson<Service>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.update_service(&requester, &service).await?;
    Ok((StatusCode::ACCEPTED, Json(res)))
}

pub async fn delete_service(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
    Path(service_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let res = state
        .policy
        .delete_service(&requester, &service_id.to_lowercase())
        .await?;
    Ok((StatusCode::OK, Json(res)))
}
