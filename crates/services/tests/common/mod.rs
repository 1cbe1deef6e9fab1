#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use marathon_core::model::{ProgressState, Stage, UserId, UserProfile};
use marathon_core::time::fixed_now;
use services::{RemoteClient, RemoteError, RemoteProgress, UserInfo};
use storage::repository::{LocalStore, StorageError};

/// Remote double with scripted answers that records every call.
#[derive(Clone, Default)]
pub struct ScriptedRemote {
    inner: Arc<Mutex<Script>>,
}

#[derive(Default)]
struct Script {
    progress: Option<Vec<u32>>,
    fetch_error: Option<RemoteError>,
    save_error: Option<RemoteError>,
    register_error: Option<RemoteError>,
    fetch_delay: Option<Duration>,
    queued_saves: VecDeque<(Duration, Option<RemoteError>)>,
    save_attempts: usize,
    saves: Vec<Vec<u32>>,
    registrations: Vec<(String, String)>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(self, stages: &[u32]) -> Self {
        self.inner.lock().unwrap().progress = Some(stages.to_vec());
        self
    }

    pub fn failing_fetch(self, err: RemoteError) -> Self {
        self.inner.lock().unwrap().fetch_error = Some(err);
        self
    }

    pub fn failing_saves(self, err: RemoteError) -> Self {
        self.inner.lock().unwrap().save_error = Some(err);
        self
    }

    pub fn failing_registration(self, err: RemoteError) -> Self {
        self.inner.lock().unwrap().register_error = Some(err);
        self
    }

    pub fn slow_fetch(self, delay: Duration) -> Self {
        self.inner.lock().unwrap().fetch_delay = Some(delay);
        self
    }

    /// Queues the behaviour of one save call, in call order: it answers after
    /// `delay` and fails with `error` if one is given.
    pub fn queue_save(self, delay: Duration, error: Option<RemoteError>) -> Self {
        self.inner
            .lock()
            .unwrap()
            .queued_saves
            .push_back((delay, error));
        self
    }

    /// Number of save calls that have started, including ones still running.
    pub fn save_attempts(&self) -> usize {
        self.inner.lock().unwrap().save_attempts
    }

    /// Payloads of every save that reached the remote, in arrival order.
    pub fn saves(&self) -> Vec<Vec<u32>> {
        self.inner.lock().unwrap().saves.clone()
    }

    pub fn registrations(&self) -> Vec<(String, String)> {
        self.inner.lock().unwrap().registrations.clone()
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    async fn fetch_progress(&self, _user: &UserId) -> Result<RemoteProgress, RemoteError> {
        let delay = self.inner.lock().unwrap().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let script = self.inner.lock().unwrap();
        if let Some(err) = &script.fetch_error {
            return Err(err.clone());
        }
        match &script.progress {
            Some(stages) => Ok(RemoteProgress {
                completed_days: stages.clone(),
                last_updated: Some(fixed_now()),
            }),
            None => Err(RemoteError::Network("no remote record".into())),
        }
    }

    async fn save_progress(
        &self,
        _user: &UserId,
        state: &ProgressState,
    ) -> Result<(), RemoteError> {
        let scripted = {
            let mut script = self.inner.lock().unwrap();
            script.save_attempts += 1;
            script.queued_saves.pop_front()
        };
        let scripted_error = match scripted {
            Some((delay, error)) => {
                tokio::time::sleep(delay).await;
                error
            }
            None => None,
        };

        let mut script = self.inner.lock().unwrap();
        if let Some(err) = scripted_error.or_else(|| script.save_error.clone()) {
            return Err(err);
        }
        script.saves.push(state.stage_numbers());
        script.progress = Some(state.stage_numbers());
        Ok(())
    }

    async fn register_user(
        &self,
        user: &UserId,
        profile: &UserProfile,
    ) -> Result<(), RemoteError> {
        let mut script = self.inner.lock().unwrap();
        script
            .registrations
            .push((user.to_string(), profile.first_name().to_string()));
        match &script.register_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn fetch_user_info(&self, _user: &UserId) -> Result<UserInfo, RemoteError> {
        Ok(UserInfo::default())
    }
}

/// Local store whose backing medium rejects everything.
#[derive(Clone, Default)]
pub struct RejectingLocalStore;

#[async_trait]
impl LocalStore for RejectingLocalStore {
    async fn read(&self, _user: &UserId) -> Result<Option<BTreeSet<Stage>>, StorageError> {
        Err(StorageError::Connection("storage disabled".into()))
    }

    async fn write(&self, _user: &UserId, _state: &ProgressState) -> Result<(), StorageError> {
        Err(StorageError::Connection("quota exceeded".into()))
    }
}

pub fn user(raw: &str) -> UserId {
    UserId::new(raw).unwrap()
}

pub fn state(numbers: &[u32]) -> ProgressState {
    ProgressState::from_stages(numbers.iter().map(|n| Stage::new(*n).unwrap()), fixed_now())
}

pub fn numbers(stages: &BTreeSet<Stage>) -> Vec<u32> {
    stages.iter().map(|s| s.number()).collect()
}
