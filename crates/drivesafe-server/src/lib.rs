//! # drivesafe-server
//!
//! HTTP server library for the drivesafe phone-while-driving blocker.
//!
//! This library provides the API handlers, the SMS gateway client and the
//! state wiring shared between the detection worker and the handlers.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod api;
pub mod logging;
pub mod sms;
pub mod state;
