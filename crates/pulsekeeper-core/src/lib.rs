//! Domain layer for pulsekeeper.
//!
//! Holds the account configuration model, the shared error type and the
//! seams (`RemoteService`, `ConfigRepository`, `ActivityLog`) the application
//! layer is written against.

pub mod account;
pub mod activity;
pub mod credential;
pub mod error;
pub mod remote;
pub mod repository;
pub mod status;

pub use account::{AccountSettings, EffectiveSettings, GlobalSettings, Mode, PulseConfig};
pub use activity::{ActivityLog, LogLevel, LogRecord, MemoryActivityLog};
pub use credential::Credential;
pub use error::{PulseError, Result};
pub use remote::{Identity, Presence, PulsePayload, RemoteReply, RemoteService, SessionId};
pub use repository::ConfigRepository;
pub use status::{AccountStatus, MonitorPhase, OperationOutcome, PresenceReport};
