//! Observability for the update engine
//!
//! - Structured one-line JSON logs with deterministic key order
//! - Process-wide minimum severity (from `EngineConfig::log_level`)
//! - Relaxed atomic counters
//! - Begin/complete scopes around top-level invocations
//!
//! Observability is read-only: nothing here can fail an invocation.

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

/// Log a lifecycle event at its default severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::ModificationBegin);
        log_event_with_fields(Event::DocumentModified, &[("document", "doc:1")]);
    }
}
