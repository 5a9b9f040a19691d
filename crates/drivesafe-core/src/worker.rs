//! The long-running detection task.
//!
//! [`DetectionWorker`] owns the sensor source, the frame decoder and the
//! state machine. It pulls samples, applies transitions to the shared state
//! and hands them to the dispatcher. It talks to the network handlers only
//! through [`SharedState`].
//!
//! [`DetectionController`] starts the worker on the tokio runtime and stops
//! it through a cancellation token.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::audit::AuditSink;
use crate::config::{DetectionConfig, SensorConfig};
use crate::detection::DetectionStateMachine;
use crate::error::{DriveSafeError, Result};
use crate::frame::FrameDecoder;
use crate::notify::{MessagingGateway, NotificationDispatcher};
use crate::source::SensorSource;
use crate::state::SharedState;

/// Drives the detection pipeline from a sensor source.
pub struct DetectionWorker<S, G, A> {
    source: S,
    machine: DetectionStateMachine,
    state: SharedState,
    dispatcher: NotificationDispatcher<G, A>,
    read_timeout: Duration,
    verify_checksum: bool,
    idle_pause: Duration,
}

impl<S, G, A> DetectionWorker<S, G, A>
where
    S: SensorSource,
    G: MessagingGateway,
    A: AuditSink,
{
    /// Assemble a worker from its collaborators and config sections.
    pub fn new(
        source: S,
        sensor: &SensorConfig,
        detection: &DetectionConfig,
        state: SharedState,
        dispatcher: NotificationDispatcher<G, A>,
    ) -> Self {
        Self {
            source,
            machine: DetectionStateMachine::from_config(detection),
            state,
            dispatcher,
            read_timeout: Duration::from_millis(sensor.read_timeout_ms),
            verify_checksum: sensor.verify_checksum,
            idle_pause: Duration::from_millis(detection.idle_pause_ms),
        }
    }

    /// Run until `cancel` fires or the source can no longer be opened.
    ///
    /// A stream that ends is reopened once; if reopening fails the worker
    /// exits with the open error and the shared state keeps its last values.
    ///
    /// # Errors
    ///
    /// Returns [`DriveSafeError::SensorOpenFailed`] when the source cannot be
    /// opened.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let endpoint = self.source.describe();
        let mut decoder = self.open_decoder().await?;
        info!(source = %endpoint, "Detection worker started");

        loop {
            let sample = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                sample = decoder.next_sample() => sample,
            };

            for transition in self.machine.observe(sample, Instant::now(), &self.state).await {
                // Reply tasks run detached; their outcome is audited.
                if self.dispatcher.dispatch(&transition).is_some() {
                    debug!("Auto-reply task started");
                }
            }

            if decoder.is_closed() {
                warn!(source = %endpoint, "Sensor stream closed, reopening");
                decoder = self.open_decoder().await?;
            }

            if sample.is_no_reading() {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.idle_pause) => {}
                }
            }
        }

        info!(source = %endpoint, "Detection worker stopped");
        Ok(())
    }

    async fn open_decoder(&mut self) -> Result<FrameDecoder<S::Reader>> {
        let reader = self.source.open().await.map_err(|err| {
            error!(error = %err, "Failed to open sensor source");
            DriveSafeError::from(err)
        })?;
        Ok(FrameDecoder::new(reader, self.read_timeout)
            .with_checksum_verification(self.verify_checksum))
    }
}

/// Starts and stops the detection worker.
#[derive(Default)]
pub struct DetectionController {
    handle: Option<JoinHandle<Result<()>>>,
    cancel_token: Option<CancellationToken>,
}

impl DetectionController {
    /// Create a controller with no worker running.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    /// Whether a worker has been started and has not finished.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn `worker` on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DriveSafeError::DetectionAlreadyRunning`] if a worker is
    /// still running.
    pub fn start<S, G, A>(&mut self, worker: DetectionWorker<S, G, A>) -> Result<()>
    where
        S: SensorSource,
        G: MessagingGateway,
        A: AuditSink,
    {
        if self.is_running() {
            return Err(DriveSafeError::DetectionAlreadyRunning);
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            let result = worker.run(token).await;
            if let Err(err) = &result {
                error!(error = %err, "Detection worker exited; distance data is frozen");
            }
            result
        });

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Signal the worker to stop and wait for it.
    ///
    /// # Errors
    ///
    /// Returns the worker's own error if it had already failed, or
    /// [`DriveSafeError::DetectionWorkerPanicked`] if the task panicked.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                error!(error = %join_err, "Detection worker panicked");
                Err(DriveSafeError::DetectionWorkerPanicked(join_err.to_string()))
            }
            Err(join_err) => {
                warn!(error = %join_err, "Detection worker task was cancelled");
                Ok(())
            }
        }
    }
}
