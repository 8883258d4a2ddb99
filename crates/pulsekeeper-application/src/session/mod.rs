//! One account's session: token acquisition, pulses and the monitor that
//! schedules them.

pub mod context;
pub mod monitor;
pub mod pulse;
pub mod tokens;

pub use context::{RuntimeState, SessionContext};
pub use monitor::SessionMonitor;
pub use pulse::{FailureKind, send_pulse};
pub use tokens::{acquire_csrf_token, extract_session_id, fetch_identity, resolve_session_id};
