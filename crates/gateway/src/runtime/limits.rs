//! Fixed-window request counters.
//!
//! Backs the per-route budgets the global per-IP governor can't express:
//! `/greeting` per IP, `/chat` per IP, and LLM calls per conversation.
//! Windows are UTC minutes; the map cleans itself lazily once it grows
//! past a threshold.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

const CLEANUP_THRESHOLD: usize = 10_000;

pub struct RateWindows {
    counters: Mutex<HashMap<String, (i64, u32)>>,
}

impl Default for RateWindows {
    fn default() -> Self {
        Self::new()
    }
}

impl RateWindows {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Count one hit against `key`; `true` while within `per_minute`.
    pub fn allow(&self, key: &str, per_minute: u32) -> bool {
        let minute = Utc::now().timestamp() / 60;
        let mut counters = self.counters.lock();

        if counters.len() > CLEANUP_THRESHOLD {
            counters.retain(|_, (m, _)| *m == minute);
        }

        let entry = counters.entry(key.to_owned()).or_insert((minute, 0));
        if entry.0 != minute {
            *entry = (minute, 0);
        }
        if entry.1 >= per_minute {
            return false;
        }
        entry.1 += 1;
        true
    }

    /// Drop windows older than the current minute.
    pub fn prune(&self) {
        let minute = Utc::now().timestamp() / 60;
        self.counters.lock().retain(|_, (m, _)| *m == minute);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_budget_then_rejects() {
        let rw = RateWindows::new();
        for _ in 0..5 {
            assert!(rw.allow("greet:1.2.3.4", 5));
        }
        assert!(!rw.allow("greet:1.2.3.4", 5));
    }

    #[test]
    fn keys_are_independent() {
        let rw = RateWindows::new();
        assert!(rw.allow("chat:a", 1));
        assert!(!rw.allow("chat:a", 1));
        assert!(rw.allow("chat:b", 1));
    }
}
