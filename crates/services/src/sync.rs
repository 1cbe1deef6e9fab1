//! Local-first load and debounced save protocol for one session.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use marathon_core::model::{ProgressState, Stage, StageStatus, UserId, UserProfile};
use marathon_core::model::ProgressSummary;
use marathon_core::{Clock, ProgressModel, ToggleOutcome};
use storage::repository::{LocalStore, StorageError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::remote::{RemoteClient, RemoteProgress};

/// Lifecycle of a coordinator. There is no teardown state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Where the initial progress came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Remote,
    Local,
    Empty,
}

/// Everything that happened during the initial load.
///
/// Failures are recorded here instead of being raised.
#[derive(Debug)]
pub struct LoadReport {
    pub source: LoadSource,
    /// `None` when no registration was attempted.
    pub registration: Option<Result<(), RemoteError>>,
    pub remote_error: Option<RemoteError>,
    pub local_error: Option<StorageError>,
}

impl LoadReport {
    pub(crate) fn empty() -> Self {
        Self {
            source: LoadSource::Empty,
            registration: None,
            remote_error: None,
            local_error: None,
        }
    }
}

/// Result of the debounced remote save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Sent,
    Failed(RemoteError),
    /// A newer toggle replaced this save before it was dispatched.
    Superseded,
}

/// Result of one toggle on a ready coordinator.
#[derive(Debug)]
pub struct ToggleReport {
    pub outcome: ToggleOutcome,
    /// Set when the local write was rejected; progress is then only held in
    /// memory until the next successful write.
    pub local_error: Option<StorageError>,
}

struct PendingSave {
    cancel: CancellationToken,
    handle: JoinHandle<SaveOutcome>,
}

/// Owns the session's progress and keeps both stores in step with it.
///
/// Local writes happen inline on every toggle. Remote writes are debounced
/// and best-effort: each one carries the full completed set, so a save that
/// completes late is overwritten by the next one.
pub struct SyncCoordinator {
    user: UserId,
    clock: Clock,
    config: SyncConfig,
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteClient>,
    phase: SyncPhase,
    model: ProgressModel,
    pending: Option<PendingSave>,
    save_seq: u64,
    last_remote: Arc<Mutex<Option<(u64, SaveOutcome)>>>,
}

impl SyncCoordinator {
    #[must_use]
    pub fn new(
        user: UserId,
        clock: Clock,
        config: SyncConfig,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteClient>,
    ) -> Self {
        Self {
            user,
            clock,
            config,
            local,
            remote,
            phase: SyncPhase::Uninitialized,
            model: ProgressModel::new(clock),
            pending: None,
            save_seq: 0,
            last_remote: Arc::new(Mutex::new(None)),
        }
    }

    /// Loads the initial progress and moves to `Ready`.
    ///
    /// Registers the user first when `registration` is given. Remote progress
    /// wins when it can be fetched within the load budget; otherwise the local
    /// copy is used, and an empty state if that is missing too.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::AlreadyLoaded` if the coordinator is already ready.
    pub async fn load(
        &mut self,
        registration: Option<&UserProfile>,
    ) -> Result<LoadReport, SyncError> {
        if self.phase == SyncPhase::Ready {
            return Err(SyncError::AlreadyLoaded);
        }
        self.phase = SyncPhase::Loading;

        let deadline = Instant::now() + self.config.effective_load_budget();
        let mut report = LoadReport::empty();

        if let Some(profile) = registration {
            let result = within(deadline, self.remote.register_user(&self.user, profile)).await;
            if let Err(err) = &result {
                tracing::warn!(user = %self.user, %err, "user registration failed");
            }
            report.registration = Some(result);
        }

        let initial = match within(deadline, self.remote.fetch_progress(&self.user)).await {
            Ok(remote) => {
                report.source = LoadSource::Remote;
                let state = self.state_from_remote(remote);
                if let Err(err) = self.local.write(&self.user, &state).await {
                    tracing::warn!(user = %self.user, %err, "could not mirror remote progress locally");
                    report.local_error = Some(err);
                }
                state
            }
            Err(err) => {
                tracing::warn!(user = %self.user, %err, "remote progress unavailable, using local copy");
                report.remote_error = Some(err);
                match self.local.read(&self.user).await {
                    Ok(Some(stages)) => {
                        report.source = LoadSource::Local;
                        ProgressState::from_stages(stages, self.clock.now())
                    }
                    Ok(None) => ProgressState::empty(self.clock.now()),
                    Err(err) => {
                        tracing::warn!(user = %self.user, %err, "local progress unreadable, starting empty");
                        report.local_error = Some(err);
                        ProgressState::empty(self.clock.now())
                    }
                }
            }
        };

        tracing::info!(
            user = %self.user,
            source = ?report.source,
            completed = initial.completed_count(),
            "progress loaded"
        );
        self.model.load(initial);
        self.phase = SyncPhase::Ready;
        Ok(report)
    }

    /// Toggles `stage`, writes the result locally and schedules a remote save.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::NotReady` before `load` has finished, and
    /// `SyncError::Stage` for a stage outside the marathon.
    pub async fn toggle(&mut self, stage: u32) -> Result<ToggleReport, SyncError> {
        if self.phase != SyncPhase::Ready {
            return Err(SyncError::NotReady);
        }
        let outcome = self.model.toggle(stage)?;

        let local_error = match self.local.write(&self.user, self.model.state()).await {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(user = %self.user, %err, "local progress write failed, keeping it in memory");
                Some(err)
            }
        };

        self.schedule_remote_save();

        if outcome.became_complete {
            tracing::info!(user = %self.user, "marathon completed");
        }
        Ok(ToggleReport {
            outcome,
            local_error,
        })
    }

    /// Waits for the currently scheduled remote save, if any.
    ///
    /// Returns `None` when nothing was scheduled.
    pub async fn flush(&mut self) -> Option<SaveOutcome> {
        let pending = self.pending.take()?;
        match pending.handle.await {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                tracing::warn!(%err, "remote save task ended abnormally");
                None
            }
        }
    }

    fn schedule_remote_save(&mut self) {
        if let Some(previous) = self.pending.take() {
            previous.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let remote = Arc::clone(&self.remote);
        let last_remote = Arc::clone(&self.last_remote);
        let user = self.user.clone();
        let snapshot = self.model.state().clone();
        let delay = self.config.debounce;
        self.save_seq += 1;
        let seq = self.save_seq;

        tracing::debug!(user = %user, seq, ?delay, "remote save scheduled");
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return SaveOutcome::Superseded,
                () = tokio::time::sleep(delay) => {}
            }

            let outcome = match remote.save_progress(&user, &snapshot).await {
                Ok(()) => SaveOutcome::Sent,
                Err(err) => {
                    tracing::warn!(user = %user, %err, "remote progress save dropped");
                    SaveOutcome::Failed(err)
                }
            };
            if let Ok(mut guard) = last_remote.lock() {
                // An older save finishing late must not hide a newer result.
                if guard.as_ref().is_none_or(|(latest, _)| *latest < seq) {
                    *guard = Some((seq, outcome.clone()));
                }
            }
            outcome
        });

        self.pending = Some(PendingSave { cancel, handle });
    }

    fn state_from_remote(&self, remote: RemoteProgress) -> ProgressState {
        let mut stages = BTreeSet::new();
        for number in remote.completed_days {
            match Stage::new(number) {
                Ok(stage) => {
                    stages.insert(stage);
                }
                Err(err) => tracing::warn!(user = %self.user, %err, "ignoring remote stage"),
            }
        }
        let last_updated = remote.last_updated.unwrap_or_else(|| self.clock.now());
        ProgressState::from_stages(stages, last_updated)
    }

    #[must_use]
    pub fn user(&self) -> &UserId {
        &self.user
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.config.debounce
    }

    /// Outcome of the newest remote save that has completed.
    ///
    /// A save scheduled earlier that completes later does not replace it.
    #[must_use]
    pub fn last_remote_outcome(&self) -> Option<SaveOutcome> {
        self.last_remote
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(_, outcome)| outcome.clone()))
    }

    #[must_use]
    pub fn completed_stages(&self) -> &BTreeSet<Stage> {
        self.model.completed_stages()
    }

    /// # Errors
    ///
    /// Returns `SyncError::Stage` for a stage outside the marathon.
    pub fn is_unlocked(&self, stage: u32) -> Result<bool, SyncError> {
        Ok(self.model.is_unlocked(stage)?)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.model.is_complete()
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<(Stage, StageStatus)> {
        self.model.statuses()
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        self.model.summary()
    }

    #[must_use]
    pub fn model(&self) -> &ProgressModel {
        &self.model
    }
}

/// Runs `op` unless `deadline` passes first.
async fn within<T>(
    deadline: Instant,
    op: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    tokio::time::timeout_at(deadline, op)
        .await
        .map_err(|_| RemoteError::Timeout)?
}
