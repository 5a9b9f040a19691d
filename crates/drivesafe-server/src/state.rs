//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use drivesafe_core::{
    Config, DetectionWorker, JsonlAuditLog, NotificationDispatcher, SensorEndpoint, SharedState,
};

use crate::sms::SmsGateway;

/// Dispatcher type used by the server.
pub type Dispatcher = NotificationDispatcher<SmsGateway, JsonlAuditLog>;

/// Worker type used by the server.
pub type Worker = DetectionWorker<SensorEndpoint, SmsGateway, JsonlAuditLog>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    detection: SharedState,
    dispatcher: Dispatcher,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
}

impl AppState {
    /// Create application state from a validated config.
    ///
    /// # Errors
    ///
    /// Returns an error if the SMS gateway client cannot be built.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let gateway = SmsGateway::from_config(&config.sms)?;
        let audit = JsonlAuditLog::new(config.audit.path.clone());
        let dispatcher = NotificationDispatcher::new(gateway, audit, &config.reply);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                detection: SharedState::new(),
                dispatcher,
                started_at: Instant::now(),
                started_at_utc: Utc::now(),
            }),
        })
    }

    /// Build the detection worker bound to this state.
    ///
    /// # Errors
    ///
    /// Returns an error if `sensor.source` is invalid.
    pub fn detection_worker(&self) -> drivesafe_core::Result<Worker> {
        let config = &self.inner.config;
        Ok(DetectionWorker::new(
            config.sensor_endpoint()?,
            &config.sensor,
            &config.detection,
            self.inner.detection.clone(),
            self.inner.dispatcher.clone(),
        ))
    }

    /// The loaded configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The shared detection record.
    #[must_use]
    pub fn detection(&self) -> &SharedState {
        &self.inner.detection
    }

    /// The transition dispatcher (block broadcasts, auto-replies, audit).
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Wall-clock time the state was created.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at_utc
    }

    /// Seconds since the state was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
