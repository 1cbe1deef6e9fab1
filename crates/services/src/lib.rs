#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod remote;
pub mod session;
pub mod sync;

pub use marathon_core::Clock;

pub use config::{RemoteConfig, SyncConfig};
pub use error::{ConfigError, RemoteError, SyncError};
pub use remote::{
    DisabledRemote, HttpRemoteClient, RemoteClient, RemoteProgress, UserInfo, remote_from_config,
};
pub use session::{DEMO_USER_ID, HostUser, IdentitySource, MarathonSession, SessionIdentity};
pub use sync::{LoadReport, LoadSource, SaveOutcome, SyncCoordinator, SyncPhase, ToggleReport};
