use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(180);

/// Per-violation-type alert suppression.
///
/// Keys are exact violation-type strings. State lives in memory only and is
/// lost on restart. Callers check `should_fire`, persist the event, then call
/// `record_fired`.
#[derive(Debug)]
pub struct CooldownTracker {
    window: chrono::Duration,
    last_fired: HashMap<String, DateTime<Local>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            last_fired: HashMap::new(),
        }
    }

    pub fn should_fire(&self, violation_type: &str, now: DateTime<Local>) -> bool {
        match self.last_fired.get(violation_type) {
            None => true,
            Some(last) => now.signed_duration_since(*last) >= self.window,
        }
    }

    pub fn record_fired(&mut self, violation_type: &str, now: DateTime<Local>) {
        self.last_fired.insert(violation_type.to_string(), now);
    }

    pub fn last_fired(&self, violation_type: &str) -> Option<DateTime<Local>> {
        self.last_fired.get(violation_type).copied()
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}
