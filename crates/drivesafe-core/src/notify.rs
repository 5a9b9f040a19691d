//! Side effects of detection transitions.
//!
//! [`NotificationDispatcher`] turns each [`Transition`] into:
//! - an audit record (always),
//! - a block broadcast to connected observers (`BlockActivated` /
//!   `BlockCleared`),
//! - exactly one auto-reply request (`BlockActivated` only).
//!
//! Audit records are queued to a dedicated writer task that appends them on
//! the blocking pool, so a slow disk never holds up the detection loop. When
//! the queue is full the record is dropped with a warning; write failures are
//! logged and swallowed. The gateway call likewise runs on its own task.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::audit::{AuditEvent, AuditRecord, AuditSink};
use crate::config::ReplyConfig;
use crate::detection::{Transition, TransitionKind};
use crate::types::StateSnapshot;

/// Capacity of the block broadcast channel. Slow observers that fall further
/// behind than this skip ahead to the latest value.
const BLOCK_CHANNEL_CAPACITY: usize = 16;

/// Audit records queued for the writer before new ones are dropped.
const AUDIT_QUEUE_CAPACITY: usize = 256;

/// Errors reported by a [`MessagingGateway`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// No credentials configured; nothing was sent.
    #[error("messaging gateway is not configured")]
    NotConfigured,

    /// The gateway answered with an error status.
    #[error("gateway rejected message with status {status}: {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The request never reached the gateway or the reply was unreadable.
    #[error("gateway transport error: {0}")]
    Transport(String),
}

/// Outbound auto-reply request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyRequest {
    /// Recipient address.
    pub to: String,
    /// Message text.
    pub text: String,
}

/// What the gateway returned for an accepted message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyReceipt {
    /// Gateway-assigned message identifier, if any.
    pub message_id: Option<String>,
}

/// Sends auto-replies to a correspondent.
pub trait MessagingGateway: Send + Sync + 'static {
    /// Send one message.
    fn send(
        &self,
        request: &ReplyRequest,
    ) -> impl Future<Output = Result<ReplyReceipt, GatewayError>> + Send;
}

/// Broadcast payload for block observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "block": true }))]
pub struct BlockSignal {
    /// Whether the companion client should block phone interaction.
    #[schema(example = true)]
    pub block: bool,
}

/// Result of one auto-reply attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The gateway accepted the message.
    Sent {
        /// Recipient.
        to: String,
        /// Gateway receipt.
        receipt: ReplyReceipt,
    },
    /// The gateway failed; not retried.
    Failed {
        /// Recipient.
        to: String,
        /// Failure detail.
        error: GatewayError,
    },
}

enum AuditCommand {
    Append(AuditRecord),
    Flush(oneshot::Sender<()>),
}

struct DispatcherInner<G, A> {
    gateway: G,
    audit: Arc<A>,
    audit_queue: mpsc::Sender<AuditCommand>,
    blocks: broadcast::Sender<BlockSignal>,
    reply_text: String,
    default_recipient: Option<String>,
}

/// Performs the external effects of detection transitions.
pub struct NotificationDispatcher<G, A> {
    inner: Arc<DispatcherInner<G, A>>,
}

impl<G, A> Clone for NotificationDispatcher<G, A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<G: MessagingGateway, A: AuditSink> NotificationDispatcher<G, A> {
    /// Create a dispatcher with its own block broadcast channel and audit
    /// writer task. Must be called from within a tokio runtime.
    pub fn new(gateway: G, audit: A, reply: &ReplyConfig) -> Self {
        let (blocks, _) = broadcast::channel(BLOCK_CHANNEL_CAPACITY);
        let audit = Arc::new(audit);
        let (audit_queue, commands) = mpsc::channel(AUDIT_QUEUE_CAPACITY);
        tokio::spawn(run_audit_writer(Arc::clone(&audit), commands));

        Self {
            inner: Arc::new(DispatcherInner {
                gateway,
                audit,
                audit_queue,
                blocks,
                reply_text: reply.text.clone(),
                default_recipient: reply.default_recipient.clone(),
            }),
        }
    }

    /// Subscribe to block broadcasts. Only changes after this call are seen;
    /// read the shared state for the current value.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BlockSignal> {
        self.inner.blocks.subscribe()
    }

    /// The audit sink records go to.
    #[must_use]
    pub fn audit(&self) -> &A {
        &self.inner.audit
    }

    /// Wait until every audit record queued before this call is written.
    pub async fn flush_audit(&self) {
        let (done, written) = oneshot::channel();
        if self.inner.audit_queue.send(AuditCommand::Flush(done)).await.is_ok() {
            // The writer only drops `done` when it stops.
            let _ = written.await;
        }
    }

    /// Apply the side effects of `transition`.
    ///
    /// Returns the handle of the spawned auto-reply task when one was
    /// started. Must be called from within a tokio runtime.
    pub fn dispatch(&self, transition: &Transition) -> Option<JoinHandle<ReplyOutcome>> {
        let snapshot = &transition.snapshot;
        let event = AuditEvent::from(transition.kind);
        debug!(
            kind = transition.kind.as_str(),
            distance_cm = transition.distance_cm,
            "Dispatching transition"
        );

        match transition.kind {
            TransitionKind::Alerted => {
                let detail = if snapshot.blocked {
                    "block decision: activate".to_string()
                } else {
                    format!(
                        "block decision: none (motion={}, override={})",
                        snapshot.motion, snapshot.override_active
                    )
                };
                self.record(event, snapshot, None, detail);
                None
            }
            TransitionKind::BlockActivated => {
                self.broadcast(true);
                let recipient = self.recipient(snapshot);
                self.record(
                    event,
                    snapshot,
                    recipient.clone(),
                    "vehicle in motion, no override",
                );
                match recipient {
                    Some(to) => Some(self.spawn_reply(to, snapshot.clone())),
                    None => {
                        warn!("No correspondent or default recipient, auto-reply skipped");
                        self.record(
                            AuditEvent::AutoReplySkipped,
                            snapshot,
                            None,
                            "no correspondent and no default recipient",
                        );
                        None
                    }
                }
            }
            TransitionKind::PhoneUsageEnded => {
                self.record(event, snapshot, None, "");
                None
            }
            TransitionKind::BlockCleared => {
                self.broadcast(false);
                self.record(event, snapshot, None, "");
                None
            }
        }
    }

    fn recipient(&self, snapshot: &StateSnapshot) -> Option<String> {
        snapshot
            .correspondent()
            .map(str::to_string)
            .or_else(|| self.inner.default_recipient.clone())
    }

    fn broadcast(&self, block: bool) {
        // No receivers is fine: late joiners read the current state.
        match self.inner.blocks.send(BlockSignal { block }) {
            Ok(observers) => debug!(block, observers, "Block broadcast sent"),
            Err(_) => debug!(block, "Block broadcast had no observers"),
        }
    }

    fn record(
        &self,
        event: AuditEvent,
        snapshot: &StateSnapshot,
        correspondent: Option<String>,
        detail: impl Into<String>,
    ) {
        queue_audit(&self.inner.audit_queue, event, snapshot, correspondent, detail);
    }

    fn spawn_reply(&self, to: String, snapshot: StateSnapshot) -> JoinHandle<ReplyOutcome> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let request = ReplyRequest {
                to,
                text: inner.reply_text.clone(),
            };

            match inner.gateway.send(&request).await {
                Ok(receipt) => {
                    info!(to = %request.to, message_id = ?receipt.message_id, "Auto-reply sent");
                    queue_audit(
                        &inner.audit_queue,
                        AuditEvent::AutoReplySent,
                        &snapshot,
                        Some(request.to.clone()),
                        receipt.message_id.clone().unwrap_or_default(),
                    );
                    ReplyOutcome::Sent {
                        to: request.to,
                        receipt,
                    }
                }
                Err(error) => {
                    warn!(to = %request.to, error = %error, "Auto-reply failed");
                    queue_audit(
                        &inner.audit_queue,
                        AuditEvent::AutoReplyFailed,
                        &snapshot,
                        Some(request.to.clone()),
                        error.to_string(),
                    );
                    ReplyOutcome::Failed {
                        to: request.to,
                        error,
                    }
                }
            }
        })
    }
}

fn queue_audit(
    queue: &mpsc::Sender<AuditCommand>,
    event: AuditEvent,
    snapshot: &StateSnapshot,
    correspondent: Option<String>,
    detail: impl Into<String>,
) {
    let record = AuditRecord::new(event, snapshot, correspondent, detail);
    match queue.try_send(AuditCommand::Append(record)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => warn!(event = ?event, "Audit queue full, record dropped"),
        Err(TrySendError::Closed(_)) => {
            warn!(event = ?event, "Audit writer stopped, record dropped");
        }
    }
}

/// Appends queued records in order until every dispatcher handle is gone.
async fn run_audit_writer<A: AuditSink>(audit: Arc<A>, mut commands: mpsc::Receiver<AuditCommand>) {
    while let Some(command) = commands.recv().await {
        match command {
            AuditCommand::Append(record) => {
                let event = record.event;
                let sink = Arc::clone(&audit);
                match tokio::task::spawn_blocking(move || sink.append(&record)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => warn!(error = %err, event = ?event, "Audit write failed"),
                    Err(err) => warn!(error = %err, event = ?event, "Audit write task failed"),
                }
            }
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
