use crate::sender::FailureReason;
use std::fmt;

/// Observable lifecycle of a coordinator.
///
/// `Idle -> Accumulating -> Sending -> Accumulating | Idle`, with
/// `TornDown` terminal once the teardown flush has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Accumulating,
    Sending,
    TornDown,
}

impl CoordinatorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Accumulating => "accumulating",
            CoordinatorState::Sending => "sending",
            CoordinatorState::TornDown => "torn_down",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::TornDown)
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a flush or timer tick did.
///
/// Informational only: failures are already recovered by the time the
/// caller sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue was empty; no network call.
    Empty,
    Delivered { records: usize },
    /// Send failed and the batch went back to the queue head.
    Requeued { records: usize, reason: FailureReason },
    /// Send failed with a non-retryable reason; the batch was dropped.
    Discarded { records: usize, reason: FailureReason },
    /// A timer tick found another send in flight and skipped.
    InFlight,
    /// Teardown already ran; nothing is sent asynchronously any more.
    TornDown,
}

impl FlushOutcome {
    /// Whether a network call was made.
    pub fn attempted(&self) -> bool {
        matches!(
            self,
            FlushOutcome::Delivered { .. }
                | FlushOutcome::Requeued { .. }
                | FlushOutcome::Discarded { .. }
        )
    }
}
