//! In-memory progress for the current session and the unlock rules over it.

use std::collections::BTreeSet;

use crate::model::{ProgressState, ProgressSummary, Stage, StageError, StageStatus, TOTAL_STAGES};
use crate::time::Clock;

/// Result of a single toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToggleOutcome {
    pub stage: Stage,
    /// Whether the stage is completed after the toggle.
    pub completed_now: bool,
    /// True only on the toggle that moved the marathon into the fully
    /// completed state.
    pub became_complete: bool,
}

/// Authoritative progress state for one session.
///
/// `toggle` is the only mutation. Unlock eligibility is derived from the
/// completed set on every query and never stored.
#[derive(Debug, Clone)]
pub struct ProgressModel {
    clock: Clock,
    state: ProgressState,
    was_complete: bool,
}

impl ProgressModel {
    /// Creates an empty model.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: ProgressState::empty(clock.now()),
            was_complete: false,
        }
    }

    /// Replaces the in-memory state wholesale.
    ///
    /// The completion detector is re-armed from the loaded state, so a state
    /// that is already complete does not announce completion again.
    pub fn load(&mut self, initial: ProgressState) {
        self.was_complete = initial.completed_count() == TOTAL_STAGES as usize;
        self.state = initial;
    }

    /// Flips completion of `stage`.
    ///
    /// # Errors
    ///
    /// Returns `StageError::OutOfRange` if `stage` is not in `1..=TOTAL_STAGES`.
    pub fn toggle(&mut self, stage: u32) -> Result<ToggleOutcome, StageError> {
        let stage = Stage::new(stage)?;
        let completed_now = self.state.flip(stage);
        self.state.touch(self.clock.now());

        let complete = self.is_complete();
        let became_complete = complete && !self.was_complete;
        self.was_complete = complete;

        Ok(ToggleOutcome {
            stage,
            completed_now,
            became_complete,
        })
    }

    /// Stage 1 is always unlocked; stage `k` needs `k - 1` completed.
    ///
    /// # Errors
    ///
    /// Returns `StageError::OutOfRange` if `stage` is not in `1..=TOTAL_STAGES`.
    pub fn is_unlocked(&self, stage: u32) -> Result<bool, StageError> {
        Ok(self.unlocked(Stage::new(stage)?))
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.completed_count() == TOTAL_STAGES as usize
    }

    #[must_use]
    pub fn completed_stages(&self) -> &BTreeSet<Stage> {
        self.state.completed()
    }

    #[must_use]
    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    #[must_use]
    pub fn status(&self, stage: Stage) -> StageStatus {
        if self.state.contains(stage) {
            StageStatus::Completed
        } else if self.unlocked(stage) {
            StageStatus::Available
        } else {
            StageStatus::Locked
        }
    }

    /// Status of every stage, first to last.
    #[must_use]
    pub fn statuses(&self) -> Vec<(Stage, StageStatus)> {
        Stage::all().map(|stage| (stage, self.status(stage))).collect()
    }

    /// Whether the path from `stage` to the next one has been walked,
    /// i.e. both ends are completed. Always false for the last stage.
    #[must_use]
    pub fn segment_walked(&self, stage: Stage) -> bool {
        stage
            .next()
            .is_some_and(|next| self.state.contains(stage) && self.state.contains(next))
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary::from_state(&self.state)
    }

    fn unlocked(&self, stage: Stage) -> bool {
        match stage.previous() {
            None => true,
            Some(previous) => self.state.contains(previous),
        }
    }
}
