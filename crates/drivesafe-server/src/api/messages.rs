//! Inbound message endpoint.
//!
//! The messaging provider (or a relay on the driver's phone) posts every
//! inbound text here. The sender becomes the correspondent for the next
//! auto-reply.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use drivesafe_core::DriveSafeError;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::ApiResult;
use crate::state::AppState;

/// Creates the messages router.
pub fn router() -> Router<AppState> {
    Router::new().route("/inbound", post(receive_inbound))
}

/// An inbound text message.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({ "from": "+15551234567", "body": "where are you?" }))]
pub struct InboundMessageRequest {
    /// Sender address. Required and must be non-empty.
    #[schema(example = "+15551234567", min_length = 1)]
    pub from: String,

    /// Message text.
    #[serde(default)]
    #[schema(example = "where are you?")]
    pub body: String,
}

/// Response after recording an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "success": true, "correspondent": "+15551234567" }))]
pub struct InboundMessageResponse {
    /// Whether the message was recorded.
    #[schema(example = true)]
    pub success: bool,

    /// The sender that the next auto-reply goes to.
    #[schema(example = "+15551234567")]
    pub correspondent: String,
}

/// Record an inbound message.
#[utoipa::path(
    post,
    path = "/api/messages/inbound",
    tag = "messages",
    operation_id = "receiveInbound",
    summary = "Record an inbound message",
    description = "Stores the sender and body of an inbound text. The sender receives the \
        auto-reply the next time a block is activated.",
    request_body = InboundMessageRequest,
    responses(
        (status = 200, description = "Message recorded", body = InboundMessageResponse),
        (status = 400, description = "Missing sender", body = super::error::ErrorResponse)
    )
)]
pub async fn receive_inbound(
    State(state): State<AppState>,
    Json(request): Json<InboundMessageRequest>,
) -> ApiResult<Json<InboundMessageResponse>> {
    let from = request.from.trim();
    if from.is_empty() {
        return Err(DriveSafeError::InvalidInboundMessage("sender is required".into()).into());
    }

    state
        .detection()
        .record_inbound_message(from, request.body.trim())
        .await;
    info!(from = %from, "Inbound message recorded");

    Ok(Json(InboundMessageResponse {
        success: true,
        correspondent: from.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults_to_empty() {
        let request: InboundMessageRequest =
            serde_json::from_str(r#"{"from": "+15551234567"}"#).unwrap();
        assert_eq!(request.from, "+15551234567");
        assert!(request.body.is_empty());
    }
}
