//! Detection state endpoints.
//!
//! The detection worker owns `phone_alert`, `blocked` and the distance
//! reading; these handlers only read them. `motion` and `override` are
//! written here and are picked up the next time a phone alert is
//! confirmed. Changing either one while an alert is active does not
//! change an existing block decision.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use drivesafe_core::StateSnapshot;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::AppState;

/// Creates the detection router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/state", get(get_state))
        .route("/motion", post(set_motion))
        .route("/override", post(set_override))
}

/// Request body for setting a boolean flag.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "value": true }))]
pub struct FlagRequest {
    /// New value of the flag.
    #[schema(example = true)]
    pub value: bool,
}

/// Response after setting a flag.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "success": true, "value": true, "previous": false }))]
pub struct FlagResponse {
    /// Whether the flag was stored.
    #[schema(example = true)]
    pub success: bool,

    /// The value now stored.
    #[schema(example = true)]
    pub value: bool,

    /// The value before this request.
    #[schema(example = false)]
    pub previous: bool,
}

/// Read the whole detection record.
#[utoipa::path(
    get,
    path = "/api/state",
    tag = "detection",
    operation_id = "getState",
    summary = "Get detection state",
    description = "Returns a consistent snapshot of motion, override, phone alert, block status, \
        the last distance reading and the last inbound message.",
    responses(
        (status = 200, description = "Current detection state", body = StateSnapshot)
    )
)]
pub async fn get_state(State(state): State<AppState>) -> Json<StateSnapshot> {
    Json(state.detection().snapshot().await)
}

/// Report whether the vehicle is moving.
#[utoipa::path(
    post,
    path = "/api/motion",
    tag = "detection",
    operation_id = "setMotion",
    summary = "Set vehicle motion",
    description = "Stores the vehicle motion flag. Takes effect at the next phone alert confirmation.",
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Motion stored", body = FlagResponse),
        (status = 400, description = "Malformed body", body = super::error::ErrorResponse)
    )
)]
pub async fn set_motion(
    State(state): State<AppState>,
    Json(request): Json<FlagRequest>,
) -> ApiResult<Json<FlagResponse>> {
    let previous = state.detection().set_motion(request.value).await;
    if previous != request.value {
        info!(motion = request.value, "Vehicle motion changed");
    }

    Ok(Json(FlagResponse {
        success: true,
        value: request.value,
        previous,
    }))
}

/// Enable or disable the driver override.
#[utoipa::path(
    post,
    path = "/api/override",
    tag = "detection",
    operation_id = "setOverride",
    summary = "Set driver override",
    description = "Stores the override flag. While set, a confirmed phone alert does not block.",
    request_body = FlagRequest,
    responses(
        (status = 200, description = "Override stored", body = FlagResponse),
        (status = 400, description = "Malformed body", body = super::error::ErrorResponse)
    )
)]
pub async fn set_override(
    State(state): State<AppState>,
    Json(request): Json<FlagRequest>,
) -> ApiResult<Json<FlagResponse>> {
    let previous = state.detection().set_override(request.value).await;
    if previous != request.value {
        info!(override_active = request.value, "Driver override changed");
    }

    Ok(Json(FlagResponse {
        success: true,
        value: request.value,
        previous,
    }))
}
