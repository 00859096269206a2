use chrono::{DateTime, Utc};

/// One of the four external collaborators (§6): a source of truth for "now".
/// Injected so timeout/deadline logic is testable without real sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
