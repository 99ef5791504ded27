//! Error and log hook registration.
//!
//! The host calls [`HookRegistry::on_error`] / [`HookRegistry::on_log`]
//! instead of devlens patching global handlers. A handler that was installed
//! before devlens can be chained and still sees every report.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use devlens_core::{ErrorReport, LogReport};
use tracing::warn;

use crate::store::StoreHandle;

/// Previously installed error handler.
pub type ErrorHandler = Arc<dyn Fn(&ErrorReport) + Send + Sync>;

/// Previously installed log handler.
pub type LogHandler = Arc<dyn Fn(&LogReport) + Send + Sync>;

/// Entry points for captured errors and log lines.
#[derive(Clone)]
pub struct HookRegistry {
    store: StoreHandle,
    previous_error: Option<ErrorHandler>,
    previous_log: Option<LogHandler>,
}

impl HookRegistry {
    pub fn new(store: StoreHandle) -> Self {
        Self {
            store,
            previous_error: None,
            previous_log: None,
        }
    }

    /// Chains a handler that runs after each error is recorded.
    #[must_use]
    pub fn with_previous_error_handler(
        mut self,
        handler: impl Fn(&ErrorReport) + Send + Sync + 'static,
    ) -> Self {
        self.previous_error = Some(Arc::new(handler));
        self
    }

    /// Chains a handler that runs after each log line is recorded.
    #[must_use]
    pub fn with_previous_log_handler(
        mut self,
        handler: impl Fn(&LogReport) + Send + Sync + 'static,
    ) -> Self {
        self.previous_log = Some(Arc::new(handler));
        self
    }

    /// Records an error, then calls the chained handler.
    ///
    /// Never blocks and never panics: a panicking chained handler is caught
    /// and logged.
    pub fn on_error(&self, report: ErrorReport) {
        let Some(previous) = &self.previous_error else {
            self.store.record_error(report);
            return;
        };

        self.store.record_error(report.clone());
        if catch_unwind(AssertUnwindSafe(|| previous(&report))).is_err() {
            warn!(message = %report.message, "Chained error handler panicked");
        }
    }

    /// Records a log line, then calls the chained handler.
    pub fn on_log(&self, report: LogReport) {
        let Some(previous) = &self.previous_log else {
            self.store.record_log(report);
            return;
        };

        self.store.record_log(report.clone());
        if catch_unwind(AssertUnwindSafe(|| previous(&report))).is_err() {
            warn!(message = %report.message, "Chained log handler panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{spawn_store, StoreLimits};
    use devlens_core::{CaptureSource, LogLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_on_error_records_and_chains() {
        let store = spawn_store(StoreLimits::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);

        let hooks = HookRegistry::new(store.clone()).with_previous_error_handler(move |r| {
            assert_eq!(r.message, "render failed");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        hooks.on_error(ErrorReport::new(CaptureSource::Server, "render failed"));

        let snapshot = store.error_log_snapshot().await.unwrap();
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_previous_handler_is_contained() {
        let store = spawn_store(StoreLimits::default());
        let hooks = HookRegistry::new(store.clone())
            .with_previous_log_handler(|_| panic!("host handler exploded"));

        hooks.on_log(LogReport::new(CaptureSource::Client, LogLevel::Info, "hello"));

        let snapshot = store.error_log_snapshot().await.unwrap();
        assert_eq!(snapshot.logs.len(), 1);
    }

    #[tokio::test]
    async fn test_without_previous_handler() {
        let store = spawn_store(StoreLimits::default());
        let hooks = HookRegistry::new(store.clone());
        hooks.on_error(ErrorReport::new(CaptureSource::Client, "a"));
        hooks.on_error(ErrorReport::new(CaptureSource::Client, "b"));

        let snapshot = store.error_log_snapshot().await.unwrap();
        let messages: Vec<_> = snapshot.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }
}
