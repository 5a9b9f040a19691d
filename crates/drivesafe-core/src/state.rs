//! The shared detection record.
//!
//! [`SharedState`] is the only mutable resource shared between the detection
//! worker and the network handlers. Every operation takes the lock for the
//! duration of a field mutation only; no lock is held across an await on
//! anything other than the lock itself.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::types::StateSnapshot;

#[derive(Debug)]
struct DetectionState {
    motion: bool,
    override_active: bool,
    phone_alert: bool,
    blocked: bool,
    last_distance_cm: Option<u16>,
    last_sender: Option<String>,
    last_sender_body: Option<String>,
}

impl DetectionState {
    const fn new() -> Self {
        Self {
            motion: false,
            override_active: false,
            phone_alert: false,
            blocked: false,
            last_distance_cm: None,
            last_sender: None,
            last_sender_body: None,
        }
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            motion: self.motion,
            override_active: self.override_active,
            phone_alert: self.phone_alert,
            blocked: self.blocked,
            last_distance_cm: self.last_distance_cm,
            last_sender: self.last_sender.clone(),
            last_sender_body: self.last_sender_body.clone(),
        }
    }
}

/// Outcome of confirming a phone alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertDecision {
    /// Whether the block was activated by this confirmation.
    pub block: bool,

    /// The record as it stood right after the decision.
    pub snapshot: StateSnapshot,
}

/// Handle to the process-wide detection record.
///
/// Cloning the handle is cheap; all clones see the same record.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<RwLock<DetectionState>>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedState {
    /// Create a record with every flag cleared and nothing recorded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(DetectionState::new())),
        }
    }

    /// Take a consistent copy of every field.
    pub async fn snapshot(&self) -> StateSnapshot {
        self.inner.read().await.snapshot()
    }

    /// Whether the vehicle is reported to be moving.
    pub async fn motion(&self) -> bool {
        self.inner.read().await.motion
    }

    /// Whether blocking is overridden.
    pub async fn override_active(&self) -> bool {
        self.inner.read().await.override_active
    }

    /// Whether a phone alert is confirmed.
    pub async fn phone_alert(&self) -> bool {
        self.inner.read().await.phone_alert
    }

    /// Whether the block is active.
    pub async fn blocked(&self) -> bool {
        self.inner.read().await.blocked
    }

    /// The most recent distance reading.
    pub async fn last_distance_cm(&self) -> Option<u16> {
        self.inner.read().await.last_distance_cm
    }

    /// Whoever last messaged the driver.
    pub async fn correspondent(&self) -> Option<String> {
        self.inner.read().await.last_sender.clone()
    }

    // ------------------------------------------------------------------
    // Handler-owned fields
    // ------------------------------------------------------------------

    /// Record the vehicle's motion flag. Returns the previous value.
    pub async fn set_motion(&self, motion: bool) -> bool {
        let mut state = self.inner.write().await;
        std::mem::replace(&mut state.motion, motion)
    }

    /// Record the override flag. Returns the previous value.
    ///
    /// Changing the override while an alert is active does not touch the
    /// block; the decision is only taken when an alert is confirmed.
    pub async fn set_override(&self, override_active: bool) -> bool {
        let mut state = self.inner.write().await;
        std::mem::replace(&mut state.override_active, override_active)
    }

    /// Record the sender and body of an inbound message.
    pub async fn record_inbound_message(&self, from: impl Into<String>, body: impl Into<String>) {
        let from = from.into();
        let body = body.into();
        let mut state = self.inner.write().await;
        state.last_sender = Some(from);
        state.last_sender_body = Some(body);
    }

    // ------------------------------------------------------------------
    // Detection-owned fields
    // ------------------------------------------------------------------

    /// Record the latest distance reading.
    pub async fn record_distance(&self, distance_cm: u16) {
        self.inner.write().await.last_distance_cm = Some(distance_cm);
    }

    /// Confirm a phone alert and take the block decision in one step.
    ///
    /// `motion` and `override` are read under the same write lock that sets
    /// `phone_alert`, so a concurrent handler update lands either wholly
    /// before or wholly after the decision.
    pub async fn confirm_alert(&self, distance_cm: u16) -> AlertDecision {
        let mut state = self.inner.write().await;
        state.last_distance_cm = Some(distance_cm);
        state.phone_alert = true;

        let block = state.motion && !state.override_active;
        if block {
            state.blocked = true;
        }
        debug!(
            motion = state.motion,
            override_active = state.override_active,
            block,
            "Phone alert confirmed"
        );

        AlertDecision {
            block,
            snapshot: state.snapshot(),
        }
    }

    /// Clear the alert and the block. Safe to call when neither is set.
    pub async fn clear_alert(&self, distance_cm: u16) -> StateSnapshot {
        let mut state = self.inner.write().await;
        state.last_distance_cm = Some(distance_cm);
        state.phone_alert = false;
        state.blocked = false;
        state.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state_is_cleared() {
        let state = SharedState::new();
        assert_eq!(state.snapshot().await, StateSnapshot::default());
        assert!(!state.blocked().await);
        assert_eq!(state.correspondent().await, None);
    }

    #[tokio::test]
    async fn test_setters_return_previous_value() {
        let state = SharedState::new();
        assert!(!state.set_motion(true).await);
        assert!(state.set_motion(true).await);
        assert!(!state.set_override(true).await);
        assert!(state.motion().await);
        assert!(state.override_active().await);
    }

    #[tokio::test]
    async fn test_confirm_alert_blocks_only_when_moving_without_override() {
        let state = SharedState::new();

        let decision = state.confirm_alert(10).await;
        assert!(!decision.block);
        assert!(decision.snapshot.phone_alert);
        assert!(!decision.snapshot.blocked);

        state.clear_alert(40).await;
        state.set_motion(true).await;
        let decision = state.confirm_alert(10).await;
        assert!(decision.block);
        assert!(decision.snapshot.blocked);

        state.clear_alert(40).await;
        state.set_override(true).await;
        let decision = state.confirm_alert(10).await;
        assert!(!decision.block);
    }

    #[tokio::test]
    async fn test_override_does_not_clear_active_block() {
        let state = SharedState::new();
        state.set_motion(true).await;
        assert!(state.confirm_alert(9).await.block);

        state.set_override(true).await;
        state.set_motion(false).await;
        assert!(state.blocked().await);

        let snapshot = state.clear_alert(30).await;
        assert!(!snapshot.blocked);
        assert!(!snapshot.phone_alert);
        assert_eq!(snapshot.last_distance_cm, Some(30));
    }

    #[tokio::test]
    async fn test_inbound_message_sets_correspondent() {
        let state = SharedState::new();
        state.record_inbound_message("+15550001111", "hi").await;
        state.record_inbound_message("+15550002222", "call me").await;

        let snapshot = state.snapshot().await;
        assert_eq!(snapshot.correspondent(), Some("+15550002222"));
        assert_eq!(snapshot.last_sender_body.as_deref(), Some("call me"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_updates_never_tear_decision() {
        let state = SharedState::new();
        state.set_motion(true).await;

        let mut writers = Vec::new();
        for i in 0..8 {
            let state = state.clone();
            writers.push(tokio::spawn(async move {
                for j in 0..200 {
                    if (i + j) % 2 == 0 {
                        state.set_override((i + j) % 3 == 0).await;
                    } else {
                        state.set_motion((i + j) % 4 != 0).await;
                    }
                    state
                        .record_inbound_message(format!("+1555000{i:04}"), format!("m{j}"))
                        .await;
                }
            }));
        }

        for _ in 0..500 {
            let decision = state.confirm_alert(10).await;
            let s = &decision.snapshot;
            // The snapshot is taken under the decision's lock, so it always
            // agrees with the decision.
            assert_eq!(decision.block, s.motion && !s.override_active);
            if decision.block {
                assert!(s.blocked);
            }
            state.clear_alert(50).await;
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap();
        }

        let snapshot = state.snapshot().await;
        assert!(snapshot.last_sender.is_some());
        assert!(snapshot.last_sender_body.is_some());
        assert!(!snapshot.blocked);
    }
}
