//! Shared types and OpenAPI schemas.
//!
//! This module contains types that cross module boundaries: the samples the
//! frame decoder produces and the snapshot of the shared detection record.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One reading pulled from the distance sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceSample {
    /// A decoded distance in centimeters.
    Distance(u16),

    /// No usable reading: sensor gap, framing error, timeout or closed stream.
    NoReading,
}

impl DistanceSample {
    /// Returns the distance in centimeters, if this sample carries one.
    #[inline]
    #[must_use]
    pub const fn centimeters(self) -> Option<u16> {
        match self {
            Self::Distance(cm) => Some(cm),
            Self::NoReading => None,
        }
    }

    /// Returns `true` for the "no reading" marker.
    #[inline]
    #[must_use]
    pub const fn is_no_reading(self) -> bool {
        matches!(self, Self::NoReading)
    }
}

/// A consistent copy of the detection record taken under a single lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "motion": true,
    "override": false,
    "phone_alert": true,
    "blocked": true,
    "last_distance_cm": 11,
    "last_sender": "+15551234567",
    "last_sender_body": "where are you?"
}))]
pub struct StateSnapshot {
    /// Whether the vehicle is reported to be moving.
    #[schema(example = true)]
    pub motion: bool,

    /// Whether the driver has overridden blocking (e.g. passenger mode).
    #[serde(rename = "override")]
    #[schema(example = false)]
    pub override_active: bool,

    /// Whether a phone is confirmed to be held near the sensor.
    #[schema(example = true)]
    pub phone_alert: bool,

    /// Whether the companion client is currently told to block.
    #[schema(example = true)]
    pub blocked: bool,

    /// Most recent distance reading in centimeters.
    #[schema(example = 11)]
    pub last_distance_cm: Option<u16>,

    /// Address of whoever last messaged the driver.
    #[schema(example = "+15551234567")]
    pub last_sender: Option<String>,

    /// Body of the last inbound message.
    #[schema(example = "where are you?")]
    pub last_sender_body: Option<String>,
}

impl StateSnapshot {
    /// The address an auto-reply would go to, before falling back to config.
    #[must_use]
    pub fn correspondent(&self) -> Option<&str> {
        self.last_sender.as_deref()
    }
}
