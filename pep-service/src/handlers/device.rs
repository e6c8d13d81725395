//! Device-policy endpoints, reachable with the device-owner role.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::middleware::OwnerIdentity;
use crate::models::Device;
use crate::utils::ValidatedJson;
use crate::AppState;

/// Available policies plus the requester's devices.
pub async fn get_policies(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.user_device_policies(&requester).await?;
    Ok((StatusCode::OK, Json(res)))
}

pub async fn insert_policies(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
    ValidatedJson(device): ValidatedJson<Device>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.register_device(&requester, &device).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

pub async fn update_policies(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
    ValidatedJson(device): ValidatedJson<Device>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.update_device(&requester, &device).await?;
    Ok((StatusCode::ACCEPTED, Json(res)))
}

pub async fn delete_policies(
    State(state): State<AppState>,
    OwnerIdentity(requester): OwnerIdentity,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.delete_device(&requester, &device_id).await?;
    Ok((StatusCode::OK, Json(res)))
}
