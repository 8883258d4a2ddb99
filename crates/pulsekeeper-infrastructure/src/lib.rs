pub mod activity_log;
pub mod config_repository;
pub mod paths;
pub mod storage;

pub use crate::activity_log::FileActivityLog;
pub use crate::config_repository::JsonConfigRepository;
pub use crate::paths::PulsePaths;
