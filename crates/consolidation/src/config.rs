//! Service knobs.

use chrono::Duration;

/// Settings shared by every consolidation service.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many times an operation that lost an optimistic version race is
    /// re-run from its read phase before giving up.
    pub max_conflict_retries: u32,
    /// Delivery attempts per kitchen ticket.
    pub notify_attempts: u32,
    /// Default time until a deferred payment falls due.
    pub deferred_due: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
            notify_attempts: 3,
            deferred_due: Duration::hours(24),
        }
    }
}

impl EngineConfig {
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn with_notify_attempts(mut self, attempts: u32) -> Self {
        self.notify_attempts = attempts.max(1);
        self
    }

    pub fn with_deferred_due(mut self, due: Duration) -> Self {
        self.deferred_due = due;
        self
    }
}
