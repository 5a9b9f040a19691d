//! Threshold + debounce detection of a phone held near the sensor.
//!
//! # State Machine
//!
//! ```text
//!           in range                  in range, elapsed >= debounce
//!  Idle ─────────────► Debouncing ───────────────────────────────► Alerted
//!   ▲                     │                                          │
//!   │     out of range    │              out of range                │
//!   └─────────────────────┘◄─────────────────────────────────────────┘
//! ```
//!
//! - **Idle:** no contiguous in-range run.
//! - **Debouncing:** in-range run started, waiting for it to last.
//! - **Alerted:** phone-in-hand confirmed. The block decision is taken once,
//!   on entry, from the motion/override values seen at that instant. Later
//!   changes to motion or override do not re-evaluate it.
//!
//! "No reading" samples are transparent: they neither advance nor reset the
//! machine.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::state::SharedState;
use crate::types::{DistanceSample, StateSnapshot};

/// Current phase of the detection machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionPhase {
    /// No contiguous in-range run.
    Idle,

    /// In-range run in progress since `since`.
    Debouncing {
        /// When the run started.
        since: Instant,
    },

    /// Phone-in-hand confirmed.
    Alerted,
}

/// Kind of edge emitted by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Debouncing → Alerted. Always emitted on confirmation.
    Alerted,

    /// The confirmation found the vehicle moving with no override.
    BlockActivated,

    /// Alerted → Idle.
    PhoneUsageEnded,

    /// Emitted together with every `PhoneUsageEnded`, blocked or not.
    BlockCleared,
}

impl TransitionKind {
    /// Stable snake_case name used in audit records and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Alerted => "phone_alert",
            Self::BlockActivated => "block_activated",
            Self::PhoneUsageEnded => "phone_usage_ended",
            Self::BlockCleared => "block_cleared",
        }
    }
}

/// An edge emitted by [`DetectionStateMachine::observe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// What happened.
    pub kind: TransitionKind,

    /// The distance sample that caused it.
    pub distance_cm: u16,

    /// The shared record right after the transition was applied.
    pub snapshot: StateSnapshot,
}

/// Converts a stream of distance samples into alert/block transitions.
#[derive(Debug)]
pub struct DetectionStateMachine {
    threshold_cm: u16,
    debounce: Duration,
    phase: DetectionPhase,
}

impl DetectionStateMachine {
    /// Create a machine in the `Idle` phase.
    #[must_use]
    pub const fn new(threshold_cm: u16, debounce: Duration) -> Self {
        Self {
            threshold_cm,
            debounce,
            phase: DetectionPhase::Idle,
        }
    }

    /// Create a machine from the `[detection]` config section.
    #[must_use]
    pub const fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.threshold_cm, Duration::from_secs(config.debounce_secs))
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> DetectionPhase {
        self.phase
    }

    /// Whether `distance_cm` counts as in range (inclusive).
    #[must_use]
    pub const fn in_range(&self, distance_cm: u16) -> bool {
        distance_cm <= self.threshold_cm
    }

    /// Feed one sample observed at `now` and apply any resulting transition
    /// to `state`.
    ///
    /// Returns the transitions in the order they happened: `[Alerted]` or
    /// `[Alerted, BlockActivated]` on confirmation, `[PhoneUsageEnded,
    /// BlockCleared]` when an alert ends, nothing otherwise.
    pub async fn observe(
        &mut self,
        sample: DistanceSample,
        now: Instant,
        state: &SharedState,
    ) -> Vec<Transition> {
        let Some(distance_cm) = sample.centimeters() else {
            return Vec::new();
        };

        if self.in_range(distance_cm) {
            self.observe_in_range(distance_cm, now, state).await
        } else {
            self.observe_out_of_range(distance_cm, state).await
        }
    }

    async fn observe_in_range(
        &mut self,
        distance_cm: u16,
        now: Instant,
        state: &SharedState,
    ) -> Vec<Transition> {
        let since = match self.phase {
            DetectionPhase::Alerted => {
                state.record_distance(distance_cm).await;
                return Vec::new();
            }
            DetectionPhase::Debouncing { since } => since,
            DetectionPhase::Idle => {
                debug!(distance_cm, "Distance entered alert range, debouncing");
                self.phase = DetectionPhase::Debouncing { since: now };
                now
            }
        };

        if now.saturating_duration_since(since) < self.debounce {
            state.record_distance(distance_cm).await;
            return Vec::new();
        }

        self.phase = DetectionPhase::Alerted;
        let decision = state.confirm_alert(distance_cm).await;
        info!(
            distance_cm,
            motion = decision.snapshot.motion,
            override_active = decision.snapshot.override_active,
            block = decision.block,
            "Phone in hand confirmed"
        );

        let mut transitions = vec![Transition {
            kind: TransitionKind::Alerted,
            distance_cm,
            snapshot: decision.snapshot.clone(),
        }];
        if decision.block {
            transitions.push(Transition {
                kind: TransitionKind::BlockActivated,
                distance_cm,
                snapshot: decision.snapshot,
            });
        }
        transitions
    }

    async fn observe_out_of_range(
        &mut self,
        distance_cm: u16,
        state: &SharedState,
    ) -> Vec<Transition> {
        let previous = std::mem::replace(&mut self.phase, DetectionPhase::Idle);

        match previous {
            DetectionPhase::Alerted => {
                let snapshot = state.clear_alert(distance_cm).await;
                info!(distance_cm, "Phone usage ended, clearing block");
                vec![
                    Transition {
                        kind: TransitionKind::PhoneUsageEnded,
                        distance_cm,
                        snapshot: snapshot.clone(),
                    },
                    Transition {
                        kind: TransitionKind::BlockCleared,
                        distance_cm,
                        snapshot,
                    },
                ]
            }
            DetectionPhase::Debouncing { .. } => {
                debug!(distance_cm, "Distance left alert range, debounce reset");
                state.record_distance(distance_cm).await;
                Vec::new()
            }
            DetectionPhase::Idle => {
                state.record_distance(distance_cm).await;
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: u16 = 18;
    const DEBOUNCE: Duration = Duration::from_secs(5);

    fn kinds(transitions: &[Transition]) -> Vec<TransitionKind> {
        transitions.iter().map(|t| t.kind).collect()
    }

    /// Feeds `(seconds offset, distance)` pairs and collects every transition.
    async fn feed(
        machine: &mut DetectionStateMachine,
        state: &SharedState,
        start: Instant,
        samples: &[(u64, DistanceSample)],
    ) -> Vec<Transition> {
        let mut out = Vec::new();
        for (secs, sample) in samples {
            let now = start + Duration::from_secs(*secs);
            out.extend(machine.observe(*sample, now, state).await);
        }
        out
    }

    fn d(cm: u16) -> DistanceSample {
        DistanceSample::Distance(cm)
    }

    #[tokio::test]
    async fn test_sustained_in_range_confirms_once_and_blocks() {
        let state = SharedState::new();
        state.set_motion(true).await;
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        let samples: Vec<_> = (0..=8).map(|s| (s, d(10))).collect();
        let transitions = feed(&mut machine, &state, start, &samples).await;

        assert_eq!(
            kinds(&transitions),
            vec![TransitionKind::Alerted, TransitionKind::BlockActivated]
        );
        assert_eq!(machine.phase(), DetectionPhase::Alerted);
        assert!(state.blocked().await);
        assert!(state.phone_alert().await);
    }

    #[tokio::test]
    async fn test_confirmation_happens_exactly_at_debounce() {
        let state = SharedState::new();
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        let before = feed(&mut machine, &state, start, &[(0, d(10)), (4, d(10))]).await;
        assert!(before.is_empty());
        assert!(matches!(machine.phase(), DetectionPhase::Debouncing { .. }));

        let at = feed(&mut machine, &state, start, &[(5, d(18))]).await;
        assert_eq!(kinds(&at), vec![TransitionKind::Alerted]);
    }

    #[tokio::test]
    async fn test_no_block_without_motion() {
        let state = SharedState::new();
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        let transitions = feed(&mut machine, &state, start, &[(0, d(10)), (5, d(10))]).await;

        assert_eq!(kinds(&transitions), vec![TransitionKind::Alerted]);
        assert!(state.phone_alert().await);
        assert!(!state.blocked().await);
    }

    #[tokio::test]
    async fn test_no_block_with_override() {
        let state = SharedState::new();
        state.set_motion(true).await;
        state.set_override(true).await;
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        let transitions = feed(&mut machine, &state, start, &[(0, d(10)), (6, d(10))]).await;

        assert_eq!(kinds(&transitions), vec![TransitionKind::Alerted]);
        assert!(!state.blocked().await);
    }

    #[tokio::test]
    async fn test_out_of_range_sample_restarts_debounce() {
        let state = SharedState::new();
        state.set_motion(true).await;
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        let samples = [
            (0, d(10)),
            (3, d(19)),
            (4, d(10)),
            (5, d(10)),
            (8, d(10)),
        ];
        let transitions = feed(&mut machine, &state, start, &samples).await;
        assert!(transitions.is_empty(), "debounce must restart at t=4");

        let transitions = feed(&mut machine, &state, start, &[(9, d(10))]).await;
        assert_eq!(
            kinds(&transitions),
            vec![TransitionKind::Alerted, TransitionKind::BlockActivated]
        );
    }

    #[tokio::test]
    async fn test_no_reading_is_transparent() {
        let state = SharedState::new();
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        let samples = [
            (0, d(10)),
            (2, DistanceSample::NoReading),
            (3, DistanceSample::NoReading),
            (5, d(10)),
        ];
        let transitions = feed(&mut machine, &state, start, &samples).await;

        assert_eq!(kinds(&transitions), vec![TransitionKind::Alerted]);
        assert_eq!(state.last_distance_cm().await, Some(10));
    }

    #[tokio::test]
    async fn test_leaving_alert_always_clears_block() {
        let state = SharedState::new();
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        // Never blocked: motion is false throughout.
        feed(&mut machine, &state, start, &[(0, d(10)), (5, d(10))]).await;
        let transitions = feed(&mut machine, &state, start, &[(6, d(60)), (7, d(60))]).await;

        assert_eq!(
            kinds(&transitions),
            vec![TransitionKind::PhoneUsageEnded, TransitionKind::BlockCleared]
        );
        assert_eq!(machine.phase(), DetectionPhase::Idle);
        assert!(!state.phone_alert().await);
    }

    #[tokio::test]
    async fn test_override_while_alerted_keeps_block() {
        let state = SharedState::new();
        state.set_motion(true).await;
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        feed(&mut machine, &state, start, &[(0, d(10)), (5, d(10))]).await;
        assert!(state.blocked().await);

        state.set_override(true).await;
        let transitions = feed(&mut machine, &state, start, &[(6, d(10)), (7, d(12))]).await;
        assert!(transitions.is_empty());
        assert!(state.blocked().await);

        let transitions = feed(&mut machine, &state, start, &[(8, d(25))]).await;
        assert_eq!(
            kinds(&transitions),
            vec![TransitionKind::PhoneUsageEnded, TransitionKind::BlockCleared]
        );
        assert!(!state.blocked().await);
    }

    #[tokio::test]
    async fn test_motion_after_alert_does_not_block() {
        let state = SharedState::new();
        let mut machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        let start = Instant::now();

        feed(&mut machine, &state, start, &[(0, d(10)), (5, d(10))]).await;
        state.set_motion(true).await;
        let transitions = feed(&mut machine, &state, start, &[(6, d(10)), (30, d(10))]).await;

        assert!(transitions.is_empty());
        assert!(!state.blocked().await);
    }

    #[tokio::test]
    async fn test_zero_debounce_confirms_on_first_sample() {
        let state = SharedState::new();
        let mut machine = DetectionStateMachine::new(THRESHOLD, Duration::ZERO);

        let transitions = machine.observe(d(5), Instant::now(), &state).await;
        assert_eq!(kinds(&transitions), vec![TransitionKind::Alerted]);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let machine = DetectionStateMachine::new(THRESHOLD, DEBOUNCE);
        assert!(machine.in_range(18));
        assert!(machine.in_range(0));
        assert!(!machine.in_range(19));
    }
}
