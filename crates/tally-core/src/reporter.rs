//! Error reporting sink
//!
//! Fire-and-forget: a report failure must never abort the caller's
//! control flow, so the interface is infallible by construction.

use std::sync::{Arc, Mutex};

/// Sink for out-of-band error reports
pub trait ErrorReporter: Send + Sync {
    /// Report an error with its originating service and free-form context
    fn report(&self, service: &str, error: &str, context: &str);
}

/// Default reporter backed by `tracing`
#[derive(Clone, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, service: &str, error: &str, context: &str) {
        tracing::error!(service, context, "{}", error);
    }
}

/// Reporter that captures reports for assertions in tests
#[derive(Clone, Default)]
pub struct CapturingReporter {
    reports: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl CapturingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, String, String)> {
        self.reports.lock().expect("reporter lock").clone()
    }
}

impl ErrorReporter for CapturingReporter {
    fn report(&self, service: &str, error: &str, context: &str) {
        self.reports.lock().expect("reporter lock").push((
            service.to_string(),
            error.to_string(),
            context.to_string(),
        ));
    }
}
