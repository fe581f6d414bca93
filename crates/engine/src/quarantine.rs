use dashmap::DashMap;

/// Per-rule evaluation-error budget. A rule that burns through the budget
/// inside one window stops being evaluated until an operator edits it.
#[derive(Debug)]
pub struct Quarantine {
    budget: u64,
    window_ms: i64,
    states: DashMap<String, Window>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started_ms: i64,
    errors: u64,
    quarantined: bool,
}

impl Quarantine {
    pub fn new(budget: u64, window_ms: i64) -> Self {
        Self {
            budget,
            window_ms,
            states: DashMap::new(),
        }
    }

    /// Records one evaluation error. Returns true exactly once, on the
    /// transition into quarantine.
    pub fn record_error(&self, rule_id: &str, now_ms: i64) -> bool {
        let mut entry = self.states.entry(rule_id.to_string()).or_insert(Window {
            started_ms: now_ms,
            errors: 0,
            quarantined: false,
        });
        if entry.quarantined {
            return false;
        }
        if now_ms.saturating_sub(entry.started_ms) > self.window_ms {
            entry.started_ms = now_ms;
            entry.errors = 0;
        }
        entry.errors += 1;
        if entry.errors >= self.budget {
            entry.quarantined = true;
            return true;
        }
        false
    }

    pub fn is_quarantined(&self, rule_id: &str) -> bool {
        self.states
            .get(rule_id)
            .map(|w| w.quarantined)
            .unwrap_or(false)
    }

    /// Called when the rule is edited or deleted; restores evaluation.
    pub fn clear(&self, rule_id: &str) {
        self.states.remove(rule_id);
    }
}
