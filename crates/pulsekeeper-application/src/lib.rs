//! Application layer for pulsekeeper.
//!
//! [`SessionMonitor`] keeps one account alive; [`AccountRegistry`] owns the
//! set of monitors and the persisted configuration.

pub mod registry;
pub mod session;

pub use registry::{AccountRegistry, DEFAULT_START_STAGGER, REGISTRY_IDENTIFIER};
pub use session::SessionMonitor;
