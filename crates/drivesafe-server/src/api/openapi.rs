//! OpenAPI specification for the drivesafe API.
//!
//! Served at `/api/openapi.json` and written to disk by the `gen-openapi`
//! binary for client generation.

use axum::Json;
use drivesafe_core::{BlockSignal, StateSnapshot};
use utoipa::OpenApi;

use super::detection::{FlagRequest, FlagResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::messages::{InboundMessageRequest, InboundMessageResponse};

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// OpenAPI document for drivesafe.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "drivesafe API",
        version = "0.1.0",
        description = r#"
# drivesafe API

drivesafe detects a phone held close to a distance sensor while the vehicle
is moving, tells the companion client to block the phone and answers the
last person who texted the driver.

## Overview

1. **Detection state**: read the shared record; report motion and the driver override
2. **Inbound messages**: record who texted the driver so the auto-reply reaches them
3. **Block stream**: the companion client connects to `GET /ws` and receives
   `{"block": true|false}` on connect and on every change

A block is decided once, when a phone alert is confirmed: it activates only if
the vehicle is moving and no override is set at that moment.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local drivesafe server")
    ),
    tags(
        (name = "system", description = "Health checks"),
        (name = "detection", description = "Shared detection state, vehicle motion and driver override"),
        (name = "messages", description = "Inbound text messages that determine the auto-reply recipient")
    ),
    paths(
        super::health::health_check,
        super::detection::get_state,
        super::detection::set_motion,
        super::detection::set_override,
        super::messages::receive_inbound,
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            StateSnapshot,
            BlockSignal,
            FlagRequest,
            FlagResponse,
            InboundMessageRequest,
            InboundMessageResponse,
        )
    )
)]
pub struct ApiDoc;
