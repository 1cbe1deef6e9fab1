use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Number of stages in the marathon.
pub const TOTAL_STAGES: u32 = 21;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Programming errors on the stage boundary.
///
/// A caller that passes a stage outside `1..=TOTAL_STAGES` has a bug; UI
/// paths never get here because the unlock check guards them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StageError {
    #[error("stage {stage} is outside 1..={TOTAL_STAGES}")]
    OutOfRange { stage: u32 },
}

//
// ─── STAGE ─────────────────────────────────────────────────────────────────────
//

/// A validated stage number in `1..=TOTAL_STAGES`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Stage(u8);

impl Stage {
    /// The first stage, which is always unlocked.
    pub const FIRST: Stage = Stage(1);
    /// The final stage.
    #[allow(clippy::cast_possible_truncation)]
    pub const LAST: Stage = Stage(TOTAL_STAGES as u8);

    /// Creates a stage from its number.
    ///
    /// # Errors
    ///
    /// Returns `StageError::OutOfRange` if `number` is not in `1..=TOTAL_STAGES`.
    pub fn new(number: u32) -> Result<Self, StageError> {
        if (1..=TOTAL_STAGES).contains(&number) {
            #[allow(clippy::cast_possible_truncation)]
            Ok(Self(number as u8))
        } else {
            Err(StageError::OutOfRange { stage: number })
        }
    }

    /// Returns the stage number.
    #[must_use]
    pub fn number(self) -> u32 {
        u32::from(self.0)
    }

    /// Returns the preceding stage, or `None` for the first one.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        (self.0 > 1).then(|| Self(self.0 - 1))
    }

    /// Returns the following stage, or `None` for the last one.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        (self != Self::LAST).then(|| Self(self.0 + 1))
    }

    /// Iterates over every stage in order.
    pub fn all() -> impl Iterator<Item = Stage> {
        (1..=TOTAL_STAGES).filter_map(|n| Stage::new(n).ok())
    }
}

impl TryFrom<u32> for Stage {
    type Error = StageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Stage> for u32 {
    fn from(value: Stage) -> Self {
        value.number()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage({})", self.0)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Derived view of a single stage, as a collaborator renders it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Previous stage is not complete yet.
    Locked,
    /// Unlocked and waiting to be completed.
    Available,
    /// Marked as completed.
    Completed,
}

impl StageStatus {
    #[must_use]
    pub fn is_interactive(self) -> bool {
        !matches!(self, StageStatus::Locked)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_bounds_are_enforced() {
        assert_eq!(Stage::new(0), Err(StageError::OutOfRange { stage: 0 }));
        assert_eq!(Stage::new(22), Err(StageError::OutOfRange { stage: 22 }));
        assert_eq!(Stage::new(1).unwrap(), Stage::FIRST);
        assert_eq!(Stage::new(21).unwrap(), Stage::LAST);
    }

    #[test]
    fn neighbours_stop_at_the_ends() {
        assert_eq!(Stage::FIRST.previous(), None);
        assert_eq!(Stage::LAST.next(), None);
        let seven = Stage::new(7).unwrap();
        assert_eq!(seven.previous().map(Stage::number), Some(6));
        assert_eq!(seven.next().map(Stage::number), Some(8));
    }

    #[test]
    fn all_yields_every_stage_in_order() {
        let numbers: Vec<u32> = Stage::all().map(Stage::number).collect();
        assert_eq!(numbers, (1..=TOTAL_STAGES).collect::<Vec<_>>());
    }

    #[test]
    fn stage_deserialization_validates_range() {
        let parsed: Result<Vec<Stage>, _> = serde_json::from_str("[1, 2, 30]");
        assert!(parsed.is_err());
        let parsed: Vec<Stage> = serde_json::from_str("[3, 7]").unwrap();
        assert_eq!(parsed, vec![Stage::new(3).unwrap(), Stage::new(7).unwrap()]);
    }

    #[test]
    fn only_locked_stages_are_not_interactive() {
        assert!(!StageStatus::Locked.is_interactive());
        assert!(StageStatus::Available.is_interactive());
        assert!(StageStatus::Completed.is_interactive());
    }
}
