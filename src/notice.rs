use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

/// Routes server notices to the log, dropping plain `NOTICE` messages while
/// notices are switched off on the owning connection.
///
/// Clones share the switch, so a session keeps following
/// [`Connection::set_notices`](crate::Connection::set_notices) after connect.
#[derive(Debug, Clone)]
pub struct NoticeFilter {
    enabled: Arc<AtomicBool>,
}

impl NoticeFilter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Switches notices on or off, returning the previous setting.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        self.enabled.swap(enabled, Ordering::Relaxed)
    }

    /// Returns true if the message should be shown.
    pub fn accepts(&self, severity: &str) -> bool {
        self.is_enabled() || !severity.eq_ignore_ascii_case("NOTICE")
    }

    /// Logs one server message unless it is filtered.
    pub fn emit(&self, severity: &str, message: &str) {
        if self.accepts(severity) {
            info!(target: "pgfmt::notice", "{}: {}", severity, message);
        }
    }
}

impl Default for NoticeFilter {
    fn default() -> Self {
        Self::new(true)
    }
}
