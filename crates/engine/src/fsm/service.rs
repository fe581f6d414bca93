use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use betrace_common::time::now_unix_ms;
use betrace_common::violation::Severity;
use betrace_dsl::DslError;

use super::state::{LifecycleState, Slot};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::rules::{validate_rule_id, CompiledRule, RuleRecord};
use crate::store::RuleStore;

#[derive(Debug, Clone)]
pub struct CreateRule {
    pub id: Option<String>,
    pub name: String,
    pub source: String,
    pub severity: Severity,
    pub enabled: bool,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRule {
    pub name: Option<String>,
    pub source: Option<String>,
    pub severity: Option<Severity>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleView {
    pub id: String,
    pub name: String,
    pub source: String,
    pub severity: Severity,
    pub enabled: bool,
    pub description: String,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub state: LifecycleState,
}

impl RuleView {
    fn new(record: &RuleRecord, state: LifecycleState) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            source: record.source.clone(),
            severity: record.severity,
            enabled: record.enabled,
            description: record.description.clone(),
            created_at_ms: record.created_at_ms,
            updated_at_ms: record.updated_at_ms,
            state,
        }
    }
}

/// Mediates every mutation of the rule set so the engine's in-memory table
/// and the durable store never disagree. All transitions for one rule id
/// are serialized through a per-id async mutex; different ids progress
/// independently.
pub struct RuleService {
    engine: Arc<Engine>,
    store: Arc<dyn RuleStore>,
    slots: DashMap<String, Arc<Mutex<Slot>>>,
    lock_wait: Duration,
    max_rules: usize,
}

impl RuleService {
    pub fn new(engine: Arc<Engine>, store: Arc<dyn RuleStore>) -> Self {
        let lock_wait = engine.config().op_lock_wait;
        let max_rules = engine.config().max_rules;
        Self {
            engine,
            store,
            slots: DashMap::new(),
            lock_wait,
            max_rules,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Acquires the per-id slot, waiting at most `lock_wait` before giving
    /// up with `Busy`. A slot retired by a concurrent delete is detected by
    /// pointer identity and retried against the fresh one.
    async fn lock_slot(&self, id: &str) -> Result<OwnedMutexGuard<Slot>, EngineError> {
        let deadline = Instant::now() + self.lock_wait;
        loop {
            let slot = self
                .slots
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Slot::absent())))
                .clone();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let guard = tokio::time::timeout(remaining, slot.clone().lock_owned())
                .await
                .map_err(|_| EngineError::Busy(id.to_string()))?;
            let current = self
                .slots
                .get(id)
                .map(|entry| Arc::ptr_eq(entry.value(), &slot))
                .unwrap_or(false);
            if current {
                return Ok(guard);
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Busy(id.to_string()));
            }
        }
    }

    pub async fn create(&self, req: CreateRule) -> Result<RuleView, EngineError> {
        let id = match req.id {
            Some(id) => {
                if !validate_rule_id(&id) {
                    return Err(EngineError::Rule(DslError::Semantic {
                        message: format!("invalid rule id '{id}'"),
                    }));
                }
                id
            }
            None => uuid::Uuid::new_v4().to_string(),
        };

        let mut slot = self.lock_slot(&id).await?;
        if slot.state != LifecycleState::Deleted {
            return Err(EngineError::DuplicateId(id));
        }
        if self.engine.rule_count() >= self.max_rules {
            return Err(EngineError::Capacity(self.max_rules));
        }

        slot.transition(LifecycleState::Draft);
        slot.generation += 1;

        let now = now_unix_ms();
        let record = RuleRecord {
            id: id.clone(),
            name: if req.name.is_empty() {
                id.clone()
            } else {
                req.name
            },
            source: req.source,
            severity: req.severity,
            enabled: req.enabled,
            description: req.description,
            created_at_ms: now,
            updated_at_ms: now,
        };

        slot.transition(LifecycleState::Validating);
        let compiled = match CompiledRule::compile(record) {
            Ok(compiled) => Arc::new(compiled),
            Err(e) => {
                slot.transition(LifecycleState::Deleted);
                return Err(e.into());
            }
        };
        slot.transition(LifecycleState::Compiled);
        let bytes = match encode(&compiled.record) {
            Ok(bytes) => bytes,
            Err(e) => {
                slot.transition(LifecycleState::Deleted);
                return Err(e);
            }
        };

        self.engine.load_or_replace(compiled.clone());
        slot.transition(LifecycleState::Live);

        match self.store.put(&id, &bytes) {
            Ok(()) => {
                slot.transition(LifecycleState::Persisted);
                tracing::info!(rule_id = %id, "rule created");
                Ok(RuleView::new(&compiled.record, LifecycleState::Persisted))
            }
            Err(e) => {
                self.engine.delete(&id);
                slot.transition(LifecycleState::Retiring);
                slot.transition(LifecycleState::Deleted);
                tracing::error!(rule_id = %id, error = %e, "durable write failed, create rolled back");
                Err(EngineError::Storage(e.to_string()))
            }
        }
    }

    pub async fn update(&self, id: &str, req: UpdateRule) -> Result<RuleView, EngineError> {
        let mut slot = self.lock_slot(id).await?;
        if slot.state != LifecycleState::Persisted {
            return Err(EngineError::NotFound(id.to_string()));
        }
        let prev = self
            .engine
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;

        let record = RuleRecord {
            id: id.to_string(),
            name: req.name.unwrap_or_else(|| prev.record.name.clone()),
            source: req.source.unwrap_or_else(|| prev.record.source.clone()),
            severity: req.severity.unwrap_or(prev.record.severity),
            enabled: req.enabled.unwrap_or(prev.record.enabled),
            description: req
                .description
                .unwrap_or_else(|| prev.record.description.clone()),
            created_at_ms: prev.record.created_at_ms,
            updated_at_ms: now_unix_ms(),
        };

        slot.transition(LifecycleState::Draft);
        slot.generation += 1;
        slot.transition(LifecycleState::Validating);
        let compiled = match CompiledRule::compile(record) {
            Ok(compiled) => Arc::new(compiled),
            Err(e) => {
                slot.force(LifecycleState::Persisted);
                return Err(e.into());
            }
        };
        slot.transition(LifecycleState::Compiled);
        let bytes = match encode(&compiled.record) {
            Ok(bytes) => bytes,
            Err(e) => {
                slot.force(LifecycleState::Persisted);
                return Err(e);
            }
        };

        self.engine.load_or_replace(compiled.clone());
        slot.transition(LifecycleState::Live);

        match self.store.put(id, &bytes) {
            Ok(()) => {
                self.engine.clear_quarantine(id);
                slot.transition(LifecycleState::Persisted);
                tracing::info!(rule_id = %id, "rule updated");
                Ok(RuleView::new(&compiled.record, LifecycleState::Persisted))
            }
            Err(e) => {
                // the previous compiled rule is re-published, matching the
                // bytes still in the store
                self.engine.load_or_replace(prev);
                slot.force(LifecycleState::Persisted);
                tracing::error!(rule_id = %id, error = %e, "durable write failed, update rolled back");
                Err(EngineError::Storage(e.to_string()))
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), EngineError> {
        let mut slot = self.lock_slot(id).await?;
        if slot.state != LifecycleState::Persisted {
            return Err(EngineError::NotFound(id.to_string()));
        }
        let prev = self.engine.get(id);

        slot.transition(LifecycleState::Retiring);
        self.engine.delete(id);

        match self.store.delete(id) {
            Ok(()) => {
                slot.transition(LifecycleState::Deleted);
                self.slots.remove(id);
                tracing::info!(rule_id = %id, "rule deleted");
                Ok(())
            }
            Err(e) => {
                if let Some(prev) = prev {
                    self.engine.load_or_replace(prev);
                }
                slot.force(LifecycleState::Persisted);
                tracing::error!(rule_id = %id, error = %e, "durable delete failed, rule restored");
                Err(EngineError::Storage(e.to_string()))
            }
        }
    }

    pub fn get(&self, id: &str) -> Result<RuleView, EngineError> {
        let rule = self
            .engine
            .get(id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        Ok(RuleView::new(&rule.record, self.state_of(id)))
    }

    pub fn list(&self) -> Vec<RuleView> {
        self.engine
            .snapshot()
            .iter()
            .map(|rule| RuleView::new(&rule.record, self.state_of(rule.id())))
            .collect()
    }

    /// Never raises: either the source compiles or the error says where it
    /// does not.
    pub fn validate(&self, source: &str) -> Result<(), DslError> {
        betrace_dsl::compile(source).map(|_| ())
    }

    /// Replays the durable store into the engine after a restart. Entries
    /// that no longer decode or compile are removed so the two stores agree
    /// from the first moment.
    pub async fn recover(&self) -> Result<usize, EngineError> {
        let entries = self
            .store
            .list()
            .map_err(|e| EngineError::Storage(e.to_string()))?;

        let mut loaded = 0usize;
        for (id, bytes) in entries {
            let record: RuleRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(rule_id = %id, error = %e, "corrupt stored rule, removing");
                    let _ = self.store.delete(&id);
                    continue;
                }
            };
            if record.id != id {
                tracing::error!(rule_id = %id, record_id = %record.id, "stored rule id mismatch, removing");
                let _ = self.store.delete(&id);
                continue;
            }
            match CompiledRule::compile(record) {
                Ok(compiled) => {
                    self.engine.load_or_replace(Arc::new(compiled));
                    let mut slot = self.lock_slot(&id).await?;
                    slot.force(LifecycleState::Persisted);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::error!(rule_id = %id, error = %e, "stored rule no longer compiles, removing");
                    let _ = self.store.delete(&id);
                }
            }
        }
        tracing::info!(rules = loaded, "rule set recovered from durable store");
        Ok(loaded)
    }

    fn state_of(&self, id: &str) -> LifecycleState {
        if self.engine.is_quarantined(id) {
            return LifecycleState::Quarantined;
        }
        self.slots
            .get(id)
            .and_then(|slot| slot.value().try_lock().ok().map(|guard| guard.state))
            // a held lock means a transition is in flight while the rule is
            // still visible in the engine
            .unwrap_or(LifecycleState::Live)
    }
}

fn encode(record: &RuleRecord) -> Result<Vec<u8>, EngineError> {
    serde_json::to_vec(record).map_err(|e| EngineError::Storage(e.to_string()))
}
