//! ObservationScope for begin/complete logging around a pass
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` on `complete`
//! - Logs `{name}_FAILED` on `fail`
//! - Logs `{name}_INCOMPLETE` if dropped without either

use std::time::Instant;

use super::logger::Logger;

/// A scope that logs start and end of a unit of work
///
/// ```ignore
/// let scope = ObservationScope::new("CLEANUP");
/// // ... do work ...
/// scope.complete_with_fields(&[("deleted", "2")]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    started: Instant,
    finished: bool,
}

impl<'a> ObservationScope<'a> {
    /// Open a scope and log `{name}_BEGIN`
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Open a scope with fields on the BEGIN line
    pub fn with_fields(name: &'a str, fields: &[(&str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name,
            started: Instant::now(),
            finished: false,
        }
    }

    /// Log `{name}_COMPLETE`
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Log `{name}_COMPLETE` with result fields and elapsed time
    pub fn complete_with_fields(mut self, fields: &[(&str, &str)]) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        let mut all: Vec<(&str, &str)> = fields.to_vec();
        all.push(("elapsed_ms", elapsed.as_str()));
        Logger::info(&format!("{}_COMPLETE", self.name), &all);
    }

    /// Log `{name}_FAILED` at ERROR
    pub fn fail(mut self, reason: &str) {
        self.finished = true;
        let elapsed = self.elapsed_ms();
        Logger::error(
            &format!("{}_FAILED", self.name),
            &[("reason", reason), ("elapsed_ms", elapsed.as_str())],
        );
    }

    fn elapsed_ms(&self) -> String {
        self.started.elapsed().as_millis().to_string()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}
