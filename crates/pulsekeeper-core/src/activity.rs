//! Account activity log records and sink trait.

use chrono::{DateTime, Local};
use std::sync::Mutex;
use strum::{Display, EnumString};

/// Identifier used before an account has a display name or username.
pub const SETUP_IDENTIFIER: &str = "InitialSetup";

/// Severity of an activity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Error,
    Success,
    Warning,
    User,
    System,
}

/// One line of the account activity log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub account: String,
    pub message: String,
}

impl LogRecord {
    pub fn new(level: LogLevel, account: impl Into<String>, message: impl Into<String>) -> Self {
        let account = account.into();
        Self {
            timestamp: Local::now(),
            level,
            account: if account.is_empty() {
                SETUP_IDENTIFIER.to_string()
            } else {
                account
            },
            message: message.into(),
        }
    }

    /// Formats the record as `[DD/MM/YYYY HH:mm:ss] [LEVEL] [account] message`.
    pub fn to_line(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp.format("%d/%m/%Y %H:%M:%S"),
            self.level,
            self.account,
            self.message
        )
    }
}

/// Append-only sink shared by every monitor.
///
/// Implementations must not fail the caller: a record that cannot be written
/// is reported through the implementation's own diagnostics and dropped.
pub trait ActivityLog: Send + Sync {
    fn append(&self, record: LogRecord);
}

/// Activity log kept in memory.
#[derive(Debug, Default)]
pub struct MemoryActivityLog {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Records of one level whose message contains `needle`.
    pub fn matching(&self, level: LogLevel, needle: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level && r.message.contains(needle))
            .collect()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }
}

impl ActivityLog for MemoryActivityLog {
    fn append(&self, record: LogRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_format() {
        let record = LogRecord {
            timestamp: Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap(),
            level: LogLevel::Warning,
            account: "Builderman".to_string(),
            message: "Retrying pulse... Attempt 2/3".to_string(),
        };
        assert_eq!(
            record.to_line(),
            "[07/03/2024 09:05:01] [WARNING] [Builderman] Retrying pulse... Attempt 2/3"
        );
    }

    #[test]
    fn test_empty_account_uses_setup_identifier() {
        let record = LogRecord::new(LogLevel::System, "", "booting");
        assert_eq!(record.account, SETUP_IDENTIFIER);
    }

    #[test]
    fn test_level_names() {
        let names: Vec<String> = [
            LogLevel::Info,
            LogLevel::Error,
            LogLevel::Success,
            LogLevel::Warning,
            LogLevel::User,
            LogLevel::System,
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        assert_eq!(names, ["INFO", "ERROR", "SUCCESS", "WARNING", "USER", "SYSTEM"]);
    }

    #[test]
    fn test_memory_log_filters() {
        let log = MemoryActivityLog::new();
        log.append(LogRecord::new(LogLevel::Warning, "a", "Retrying pulse... Attempt 2/3"));
        log.append(LogRecord::new(LogLevel::Warning, "a", "derived session ID"));
        log.append(LogRecord::new(LogLevel::Success, "a", "Pulse successful"));
        assert_eq!(log.count(LogLevel::Warning), 2);
        assert_eq!(log.matching(LogLevel::Warning, "Retrying").len(), 1);
    }
}
