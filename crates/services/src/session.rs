//! Identity resolution and the per-session context handed to collaborators.

use std::collections::BTreeSet;
use std::env;
use std::sync::Arc;

use marathon_core::model::{ProgressSummary, Stage, StageStatus, UserId, UserProfile};
use marathon_core::Clock;
use storage::repository::LocalStore;

use crate::config::SyncConfig;
use crate::error::{RemoteError, SyncError};
use crate::remote::{RemoteClient, UserInfo};
use crate::sync::{LoadReport, LoadSource, SaveOutcome, SyncCoordinator, ToggleReport};

/// Identifier used when the host environment does not supply a user.
pub const DEMO_USER_ID: &str = "demo_user";

/// User details as handed over by the embedding host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUser {
    pub id: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl HostUser {
    /// Reads `MARATHON_USER_ID`, `MARATHON_FIRST_NAME`, `MARATHON_LAST_NAME`
    /// and `MARATHON_USERNAME`. Returns `None` without a user id.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let id = env::var("MARATHON_USER_ID").ok()?;
        Some(Self {
            id,
            first_name: env::var("MARATHON_FIRST_NAME").unwrap_or_default(),
            last_name: env::var("MARATHON_LAST_NAME").ok(),
            username: env::var("MARATHON_USERNAME").ok(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    Host,
    Demo,
}

/// Who this session belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    user_id: UserId,
    profile: Option<UserProfile>,
    source: IdentitySource,
}

impl SessionIdentity {
    /// The shared demo identity. It is never registered remotely.
    ///
    /// # Panics
    ///
    /// Panics if `DEMO_USER_ID` is not a valid user id.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            user_id: UserId::new(DEMO_USER_ID).expect("demo user id should be valid"),
            profile: None,
            source: IdentitySource::Demo,
        }
    }

    /// Resolves the session identity from host data, falling back to the
    /// demo user when there is none or it is unusable.
    #[must_use]
    pub fn resolve(host: Option<HostUser>) -> Self {
        let Some(host) = host else {
            return Self::demo();
        };
        let user_id = match UserId::new(host.id) {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(%err, "host supplied an unusable user id, using demo user");
                return Self::demo();
            }
        };
        let profile = match UserProfile::new(host.first_name, host.last_name, host.username) {
            Ok(profile) => Some(profile),
            Err(err) => {
                tracing::warn!(user = %user_id, %err, "host profile incomplete, skipping registration");
                None
            }
        };
        Self {
            user_id,
            profile,
            source: IdentitySource::Host,
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::resolve(HostUser::from_env())
    }

    /// Overrides the user id.
    ///
    /// The host profile belongs to the host's user id, so it is dropped when
    /// the id actually changes and the new user is not registered.
    #[must_use]
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        if user_id == self.user_id {
            return self;
        }
        self.source = IdentitySource::Host;
        self.profile = None;
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    #[must_use]
    pub fn source(&self) -> IdentitySource {
        self.source
    }

    /// Host identities with a usable profile are registered on first contact.
    #[must_use]
    pub fn needs_registration(&self) -> bool {
        self.source == IdentitySource::Host && self.profile.is_some()
    }
}

/// Explicit session context: identity, coordinator and load outcome.
///
/// Built once at bootstrap and passed to whatever drives the marathon.
pub struct MarathonSession {
    identity: SessionIdentity,
    remote: Arc<dyn RemoteClient>,
    coordinator: SyncCoordinator,
    load_report: LoadReport,
}

impl MarathonSession {
    /// Resolves progress for `identity` and returns a ready session.
    ///
    /// Never fails: every remote or storage problem ends up in
    /// [`MarathonSession::load_report`] and the session starts with whatever
    /// state could be recovered.
    pub async fn bootstrap(
        identity: SessionIdentity,
        clock: Clock,
        config: SyncConfig,
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteClient>,
    ) -> Self {
        let mut coordinator = SyncCoordinator::new(
            identity.user_id().clone(),
            clock,
            config,
            local,
            Arc::clone(&remote),
        );
        let registration = identity
            .needs_registration()
            .then(|| identity.profile())
            .flatten();
        let load_report = match coordinator.load(registration).await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(%err, "progress load skipped");
                LoadReport::empty()
            }
        };

        Self {
            identity,
            remote,
            coordinator,
            load_report,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    #[must_use]
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// True when the initial progress did not come from the remote store.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.load_report.source != LoadSource::Remote
    }

    #[must_use]
    pub fn completed_stages(&self) -> &BTreeSet<Stage> {
        self.coordinator.completed_stages()
    }

    /// # Errors
    ///
    /// Returns `SyncError::Stage` for a stage outside the marathon.
    pub async fn toggle(&mut self, stage: u32) -> Result<ToggleReport, SyncError> {
        self.coordinator.toggle(stage).await
    }

    /// # Errors
    ///
    /// Returns `SyncError::Stage` for a stage outside the marathon.
    pub fn is_unlocked(&self, stage: u32) -> Result<bool, SyncError> {
        self.coordinator.is_unlocked(stage)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.coordinator.is_complete()
    }

    #[must_use]
    pub fn statuses(&self) -> Vec<(Stage, StageStatus)> {
        self.coordinator.statuses()
    }

    #[must_use]
    pub fn summary(&self) -> ProgressSummary {
        self.coordinator.summary()
    }

    /// Waits for the pending remote save before the process exits.
    pub async fn flush(&mut self) -> Option<SaveOutcome> {
        self.coordinator.flush().await
    }

    #[must_use]
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Fetches the remote registration record for this session's user.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` when the remote is unreachable or disabled.
    pub async fn user_info(&self) -> Result<UserInfo, RemoteError> {
        self.remote.fetch_user_info(self.identity.user_id()).await
    }
}
