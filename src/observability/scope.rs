//! Begin/complete logging around one unit of work

use std::cell::Cell;

use super::logger::Logger;

/// Logs `{name}_BEGIN` on creation and `{name}_COMPLETE` or
/// `{name}_FAILED` when finished. Dropped unfinished, it logs
/// `{name}_INCOMPLETE`.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("MODIFICATION", &[("op", "append")]);
/// // ... run the operator ...
/// scope.complete_with_fields(&[("count", "3")]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    timer: Timer,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
        }
    }

    fn finish_fields(&self, extra: &[(&'a str, &str)]) -> Vec<(&'a str, String)> {
        let mut all = self.fields.clone();
        all.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));
        all.push(("elapsed_ms", self.timer.elapsed_ms()));
        all
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(self, extra: &[(&'a str, &str)]) {
        self.completed.set(true);
        let all = self.finish_fields(extra);
        let refs: Vec<(&str, &str)> = all.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Logger::info(&format!("{}_COMPLETE", self.name), &refs);
    }

    /// Logs `{name}_FAILED` at ERROR level with the error code and reason
    pub fn fail(self, code: &str, reason: &str) {
        self.completed.set(true);
        let all = self.finish_fields(&[("code", code), ("reason", reason)]);
        let refs: Vec<(&str, &str)> = all.iter().map(|(k, v)| (*k, v.as_str())).collect();
        Logger::error(&format!("{}_FAILED", self.name), &refs);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Wall-clock timer for elapsed-time fields
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Elapsed milliseconds as a string
    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
