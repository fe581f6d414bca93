use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Default)]
pub struct RuleCounters {
    evaluations: AtomicU64,
    firings: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleStats {
    pub evaluations: u64,
    pub firings: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
pub struct EngineStats {
    rules: DashMap<String, Arc<RuleCounters>>,
    spans_submitted: AtomicU64,
    spans_dropped: AtomicU64,
    violations_emitted: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, rule_id: &str) -> Arc<RuleCounters> {
        self.rules
            .entry(rule_id.to_string())
            .or_default()
            .clone()
    }

    pub fn inc_evaluations(&self, rule_id: &str) {
        self.counters(rule_id)
            .evaluations
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_firings(&self, rule_id: &str) {
        self.counters(rule_id).firings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_errors(&self, rule_id: &str) {
        self.counters(rule_id).errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rule(&self, rule_id: &str) -> RuleStats {
        let c = self.counters(rule_id);
        RuleStats {
            evaluations: c.evaluations.load(Ordering::Relaxed),
            firings: c.firings.load(Ordering::Relaxed),
            errors: c.errors.load(Ordering::Relaxed),
        }
    }

    pub fn remove_rule(&self, rule_id: &str) {
        self.rules.remove(rule_id);
    }

    pub fn inc_submitted(&self) {
        self.spans_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dropped(&self) {
        self.spans_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_violations(&self) {
        self.violations_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.spans_submitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn violations(&self) -> u64 {
        self.violations_emitted.load(Ordering::Relaxed)
    }
}
