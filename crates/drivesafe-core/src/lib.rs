//! # drivesafe-core
//!
//! Core detection pipeline for the drivesafe phone-while-driving blocker.
//!
//! This crate provides:
//! - Decoding of the distance sensor's binary frame protocol
//! - A threshold + debounce state machine that confirms "phone in hand"
//! - The synchronized detection state shared with network handlers
//! - Dispatch of block broadcasts, auto-replies and audit records
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`frame`] - Marker synchronisation and 9-byte frame decoding
//! - [`detection`] - Idle / Debouncing / Alerted state machine
//! - [`state`] - The shared, lock-protected detection record
//! - [`notify`] - Block broadcast, auto-reply gateway seam and dispatch
//! - [`audit`] - Append-only audit records and the JSON Lines sink
//! - [`source`] - Opening the sensor byte stream (device node or TCP bridge)
//! - [`worker`] - The long-running detection task and its controller
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod detection;
pub mod error;
pub mod frame;
pub mod notify;
pub mod source;
pub mod state;
pub mod types;
pub mod worker;

// Re-export primary types for convenience
pub use audit::{AuditError, AuditEvent, AuditRecord, AuditSink, JsonlAuditLog};
pub use config::{
    is_valid_phone_number, AuditConfig, Config, ConfigError, ConfigResult, DetectionConfig,
    ReplyConfig, SensorConfig, ServerConfig, SmsConfig,
};
pub use detection::{DetectionPhase, DetectionStateMachine, Transition, TransitionKind};
pub use error::{DriveSafeError, Error, Result};
pub use frame::{decode_frame, FrameDecoder, SensorFrame, FRAME_BODY_LEN, FRAME_MARKER};
pub use notify::{
    BlockSignal, GatewayError, MessagingGateway, NotificationDispatcher, ReplyOutcome,
    ReplyReceipt, ReplyRequest,
};
pub use source::{SensorEndpoint, SensorReader, SensorSource, SourceError};
pub use state::{AlertDecision, SharedState};
pub use types::{DistanceSample, StateSnapshot};
pub use worker::{DetectionController, DetectionWorker};
