//! Gateway endpoints. No bearer credential: trust comes from the
//! signed device token (filter) or nothing at all (signed statement,
//! which only reveals what the signature already proves).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::models::GatewayService;
use crate::AppState;

/// Filter a candidate service list against a signed device token.
pub async fn filter_service_list(
    State(state): State<AppState>,
    Json(request): Json<GatewayService>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.filter_services(&request).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// Signed statement of a device's current policy list.
pub async fn get_device_statement(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.policy.signed_device_statement(&device_id).await?;
    Ok((StatusCode::OK, Json(res)))
}
