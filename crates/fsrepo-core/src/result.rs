use crate::lifecycle::BulkKind;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSeverity::Info => write!(f, "info"),
            LogSeverity::Warning => write!(f, "warning"),
            LogSeverity::Error => write!(f, "error"),
        }
    }
}

/// One progress message from a repository operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub message: String,
    pub timestamp: String,
}

impl LogEntry {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogSeverity::Error, message)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)
    }
}

/// Outcome of a store-all or restore-all call.
///
/// Keeps warnings and errors in the order they were logged. Informational
/// entries only go to the progress handler. Once an error is logged the
/// result stays unsuccessful.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryActionResult {
    success: bool,
    entries: Vec<LogEntry>,
}

impl Default for RepositoryActionResult {
    fn default() -> Self {
        Self {
            success: true,
            entries: Vec::new(),
        }
    }
}

impl RepositoryActionResult {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The contention outcome: another bulk operation holds the repository.
    pub(crate) fn already_running(kind: BulkKind) -> Self {
        let mut result = Self::new();
        result.log_error(format!(
            "cannot start {kind}: a store-all or restore-all operation is already running"
        ));
        result
    }

    pub(crate) fn log(&mut self, entry: LogEntry) {
        match entry.severity {
            LogSeverity::Info => {}
            LogSeverity::Warning => self.entries.push(entry),
            LogSeverity::Error => {
                self.success = false;
                self.entries.push(entry);
            }
        }
    }

    pub(crate) fn log_error(&mut self, message: impl Into<String>) {
        self.log(LogEntry::error(message));
    }

    #[inline]
    pub fn success(&self) -> bool {
        self.success
    }

    /// Warnings and errors, in logging order.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.severity == LogSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries
            .iter()
            .filter(|e| e.severity == LogSeverity::Warning)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_result_is_successful() {
        let r = RepositoryActionResult::new();
        assert!(r.success());
        assert!(r.entries().is_empty());
    }

    #[test]
    fn warnings_keep_success() {
        let mut r = RepositoryActionResult::new();
        r.log(LogEntry::warning("skipped"));
        assert!(r.success());
        assert_eq!(r.warning_count(), 1);
        assert_eq!(r.error_count(), 0);
    }

    #[test]
    fn error_flips_success_permanently() {
        let mut r = RepositoryActionResult::new();
        r.log_error("boom");
        assert!(!r.success());
        r.log(LogEntry::warning("later"));
        r.log(LogEntry::info("fine"));
        assert!(!r.success());
        assert_eq!(r.error_count(), 1);
    }

    #[test]
    fn info_is_not_retained() {
        let mut r = RepositoryActionResult::new();
        r.log(LogEntry::info("stored"));
        assert!(r.entries().is_empty());
    }

    #[test]
    fn entries_preserve_order() {
        let mut r = RepositoryActionResult::new();
        r.log(LogEntry::warning("first"));
        r.log_error("second");
        r.log(LogEntry::warning("third"));
        let messages: Vec<_> = r.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn already_running_is_failed() {
        let r = RepositoryActionResult::already_running(BulkKind::RestoreAll);
        assert!(!r.success());
        assert!(r.errors().next().unwrap().message.contains("already running"));
    }

    #[test]
    fn serializes_severity_lowercase() {
        let mut r = RepositoryActionResult::new();
        r.log_error("x");
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"severity\":\"error\""));
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn entry_display() {
        assert_eq!(LogEntry::warning("careful").to_string(), "[warning] careful");
    }
}
