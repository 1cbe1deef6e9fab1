mod ids;
mod profile;
mod progress;
mod stage;

pub use ids::{UserId, UserIdError};
pub use profile::{ProfileError, UserProfile};
pub use progress::{ProgressState, ProgressSummary};
pub use stage::{Stage, StageError, StageStatus, TOTAL_STAGES};
