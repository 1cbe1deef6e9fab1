use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use marathon_core::model::{ProgressState, UserId, UserProfile};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::RemoteConfig;
use crate::error::RemoteError;

/// Progress as the remote store reports it.
///
/// Stage numbers are left unvalidated here; the coordinator decides what to
/// keep.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProgress {
    pub completed_days: Vec<u32>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Registration record kept by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub registered_at: Option<DateTime<Utc>>,
}

/// Remote mirror of user progress.
///
/// Implementations bound every call with a deadline and never retry.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Fetch the stored progress for `user`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on timeout, non-success status, transport or
    /// decode failure.
    async fn fetch_progress(&self, user: &UserId) -> Result<RemoteProgress, RemoteError>;

    /// Replace the stored progress for `user` with `state`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on timeout, non-success status or transport failure.
    async fn save_progress(&self, user: &UserId, state: &ProgressState)
    -> Result<(), RemoteError>;

    /// Register `user`. Safe to call on every session start.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on timeout, non-success status or transport failure.
    async fn register_user(&self, user: &UserId, profile: &UserProfile)
    -> Result<(), RemoteError>;

    /// Fetch the registration record for `user`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError` on timeout, non-success status, transport or
    /// decode failure.
    async fn fetch_user_info(&self, user: &UserId) -> Result<UserInfo, RemoteError>;
}

/// Builds the HTTP client when a remote is configured, otherwise the
/// offline stand-in.
#[must_use]
pub fn remote_from_config(config: Option<RemoteConfig>) -> Arc<dyn RemoteClient> {
    match config {
        Some(config) => Arc::new(HttpRemoteClient::new(config)),
        None => Arc::new(DisabledRemote),
    }
}

/// HTTP implementation of the progress endpoint.
#[derive(Clone)]
pub struct HttpRemoteClient {
    client: Client,
    config: RemoteConfig,
}

impl HttpRemoteClient {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.config.base_url().clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Runs `op` under the configured deadline. When the deadline fires the
    /// request future is dropped and its result discarded.
    async fn with_deadline<T>(
        &self,
        op: impl Future<Output = Result<T, RemoteError>>,
    ) -> Result<T, RemoteError> {
        tokio::time::timeout(self.config.timeout(), op)
            .await
            .map_err(|_| RemoteError::Timeout)?
    }
}

fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Unavailable(status));
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveProgressRequest {
    completed_days: Vec<u32>,
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn fetch_progress(&self, user: &UserId) -> Result<RemoteProgress, RemoteError> {
        let url = self.endpoint(&["progress", user.as_str()]);
        self.with_deadline(async {
            let response = self.authorize(self.client.get(url)).send().await?;
            let response = ensure_success(response)?;
            let progress: RemoteProgress = response.json().await?;
            Ok(progress)
        })
        .await
    }

    async fn save_progress(
        &self,
        user: &UserId,
        state: &ProgressState,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["progress", user.as_str()]);
        let payload = SaveProgressRequest {
            completed_days: state.stage_numbers(),
        };
        self.with_deadline(async {
            let response = self
                .authorize(self.client.post(url))
                .json(&payload)
                .send()
                .await?;
            ensure_success(response)?;
            Ok(())
        })
        .await
    }

    async fn register_user(
        &self,
        user: &UserId,
        profile: &UserProfile,
    ) -> Result<(), RemoteError> {
        let url = self.endpoint(&["user", user.as_str(), "register"]);
        self.with_deadline(async {
            let response = self
                .authorize(self.client.post(url))
                .json(profile)
                .send()
                .await?;
            ensure_success(response)?;
            Ok(())
        })
        .await
    }

    async fn fetch_user_info(&self, user: &UserId) -> Result<UserInfo, RemoteError> {
        let url = self.endpoint(&["user", user.as_str(), "info"]);
        self.with_deadline(async {
            let response = self.authorize(self.client.get(url)).send().await?;
            let response = ensure_success(response)?;
            let info: UserInfo = response.json().await?;
            Ok(info)
        })
        .await
    }
}

/// Remote used when no endpoint is configured. Every call fails fast with
/// `RemoteError::Disabled`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRemote;

#[async_trait]
impl RemoteClient for DisabledRemote {
    async fn fetch_progress(&self, _user: &UserId) -> Result<RemoteProgress, RemoteError> {
        Err(RemoteError::Disabled)
    }

    async fn save_progress(
        &self,
        _user: &UserId,
        _state: &ProgressState,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Disabled)
    }

    async fn register_user(
        &self,
        _user: &UserId,
        _profile: &UserProfile,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Disabled)
    }

    async fn fetch_user_info(&self, _user: &UserId) -> Result<UserInfo, RemoteError> {
        Err(RemoteError::Disabled)
    }
}
