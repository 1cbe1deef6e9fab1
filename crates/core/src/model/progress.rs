use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::model::stage::{Stage, TOTAL_STAGES};

/// Snapshot of a user's marathon progress.
///
/// Every element of `completed` is a valid `Stage`, so the range invariant
/// holds by construction. `last_updated` only moves forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    completed: BTreeSet<Stage>,
    last_updated: DateTime<Utc>,
}

impl ProgressState {
    /// Creates an empty progress state.
    #[must_use]
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            completed: BTreeSet::new(),
            last_updated: now,
        }
    }

    /// Rehydrates a state from persisted or remote data.
    #[must_use]
    pub fn from_stages(
        completed: impl IntoIterator<Item = Stage>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            completed: completed.into_iter().collect(),
            last_updated,
        }
    }

    #[must_use]
    pub fn completed(&self) -> &BTreeSet<Stage> {
        &self.completed
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    #[must_use]
    pub fn contains(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Stage numbers in ascending order, the shape both stores persist.
    #[must_use]
    pub fn stage_numbers(&self) -> Vec<u32> {
        self.completed.iter().map(|s| s.number()).collect()
    }

    /// Flips a stage and returns whether it is completed afterwards.
    pub(crate) fn flip(&mut self, stage: Stage) -> bool {
        if self.completed.remove(&stage) {
            false
        } else {
            self.completed.insert(stage);
            true
        }
    }

    /// Records a write at `now`, never moving the timestamp backwards.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_updated {
            self.last_updated = now;
        }
    }
}

/// Aggregated numbers for the progress header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub completed: u32,
    pub remaining: u32,
    pub percent: u32,
    pub is_complete: bool,
}

impl ProgressSummary {
    #[must_use]
    pub fn from_state(state: &ProgressState) -> Self {
        let completed = u32::try_from(state.completed_count())
            .unwrap_or(TOTAL_STAGES)
            .min(TOTAL_STAGES);
        Self {
            completed,
            remaining: TOTAL_STAGES - completed,
            percent: completed * 100 / TOTAL_STAGES,
            is_complete: completed == TOTAL_STAGES,
        }
    }
}
