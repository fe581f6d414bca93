use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::rules::CompiledRule;

pub type RuleTable = HashMap<String, Arc<CompiledRule>>;

/// Copy-on-write table of active rules. Readers take an `Arc` snapshot and
/// evaluate against it unaffected by concurrent writers; writers clone the
/// map, mutate the clone, and publish it in one pointer swap, so no reader
/// ever observes a half-applied mutation.
#[derive(Debug, Default)]
pub struct ActiveRules {
    inner: RwLock<Arc<RuleTable>>,
}

impl ActiveRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<RuleTable> {
        self.inner
            .read()
            .expect("rule table lock poisoned")
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<CompiledRule>> {
        self.snapshot().get(id).cloned()
    }

    pub fn load_or_replace(&self, rule: Arc<CompiledRule>) {
        let mut guard = self.inner.write().expect("rule table lock poisoned");
        let mut next = (**guard).clone();
        next.insert(rule.id().to_string(), rule);
        *guard = Arc::new(next);
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut guard = self.inner.write().expect("rule table lock poisoned");
        if !guard.contains_key(id) {
            return false;
        }
        let mut next = (**guard).clone();
        next.remove(id);
        *guard = Arc::new(next);
        true
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{CompiledRule, RuleRecord};
    use betrace_common::violation::Severity;

    fn rule(id: &str, source: &str) -> Arc<CompiledRule> {
        Arc::new(
            CompiledRule::compile(RuleRecord {
                id: id.into(),
                name: id.into(),
                source: source.into(),
                severity: Severity::Low,
                enabled: true,
                description: String::new(),
                created_at_ms: 0,
                updated_at_ms: 0,
            })
            .unwrap(),
        )
    }

    #[test]
    fn snapshot_is_immune_to_later_writes() {
        let table = ActiveRules::new();
        table.load_or_replace(rule("a", "when { x } always { y }"));

        let snap = table.snapshot();
        table.delete("a");

        assert!(snap.contains_key("a"));
        assert!(table.get("a").is_none());
    }

    #[test]
    fn replace_swaps_whole_rule() {
        let table = ActiveRules::new();
        table.load_or_replace(rule("a", "when { x } always { y }"));
        table.load_or_replace(rule("a", "when { x } never { z }"));

        assert_eq!(table.len(), 1);
        let current = table.get("a").unwrap();
        assert_eq!(current.record.source, "when { x } never { z }");
    }

    #[test]
    fn delete_missing_returns_false() {
        let table = ActiveRules::new();
        assert!(!table.delete("nope"));
    }
}
