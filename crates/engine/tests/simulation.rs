// Deterministic simulation of the rule lifecycle: a seeded operation stream
// drives create/update/delete with the two-store invariant checked after
// every step, and a crash at a random point must recover to exactly the
// state the operation prefix produced.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use betrace_common::violation::Severity;
use betrace_engine::store::{MemoryRuleStore, RuleStore};
use betrace_engine::{CreateRule, Engine, EngineConfig, RuleService, UpdateRule};

#[derive(Debug, Clone)]
enum Op {
    Create { id: String, source: String },
    Update { id: String, source: String },
    Delete { id: String },
}

fn generate_ops(seed: u64, count: usize) -> Vec<Op> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let id = format!("rule-{}", rng.gen_range(0..10));
            let source = format!(
                "when {{ payment.where(span.duration > {}ns) }} always {{ fraud-check }}",
                rng.gen_range(0..1_000)
            );
            match rng.gen_range(0..3) {
                0 => Op::Create { id, source },
                1 => Op::Update { id, source },
                _ => Op::Delete { id },
            }
        })
        .collect()
}

fn new_service(store: Arc<MemoryRuleStore>) -> RuleService {
    let config = EngineConfig {
        workers: Some(1),
        ..EngineConfig::default()
    };
    let (engine, _violations) = Engine::start(config);
    RuleService::new(engine, store)
}

async fn apply(service: &RuleService, op: &Op) {
    // duplicate creates and missing-id updates/deletes are legal outcomes
    // of a random stream; only store consistency matters
    match op {
        Op::Create { id, source } => {
            let _ = service
                .create(CreateRule {
                    id: Some(id.clone()),
                    name: id.clone(),
                    source: source.clone(),
                    severity: Severity::Medium,
                    enabled: true,
                    description: String::new(),
                })
                .await;
        }
        Op::Update { id, source } => {
            let _ = service
                .update(
                    id,
                    UpdateRule {
                        source: Some(source.clone()),
                        ..UpdateRule::default()
                    },
                )
                .await;
        }
        Op::Delete { id } => {
            let _ = service.delete(id).await;
        }
    }
}

fn engine_rules(service: &RuleService) -> BTreeMap<String, String> {
    service
        .engine()
        .snapshot()
        .iter()
        .map(|r| (r.id().to_string(), r.record.source.clone()))
        .collect()
}

fn store_rules(store: &MemoryRuleStore) -> BTreeMap<String, String> {
    store
        .list()
        .unwrap()
        .into_iter()
        .map(|(id, bytes)| {
            let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            (id, value["source"].as_str().unwrap().to_string())
        })
        .collect()
}

fn assert_stores_agree(service: &RuleService, store: &MemoryRuleStore, context: &str) {
    let engine = engine_rules(service);
    let stored = store_rules(store);
    assert_eq!(engine, stored, "stores diverged {context}");
}

#[tokio::test]
async fn invariant_holds_after_every_operation() {
    let store = Arc::new(MemoryRuleStore::new());
    let service = new_service(store.clone());

    for (i, op) in generate_ops(12345, 100).iter().enumerate() {
        apply(&service, op).await;
        assert_stores_agree(&service, &store, &format!("after op {i} ({op:?})"));
    }
}

#[tokio::test]
async fn same_seed_reaches_identical_final_state() {
    let mut finals = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(MemoryRuleStore::new());
        let service = new_service(store.clone());
        for op in generate_ops(77_777, 100) {
            apply(&service, &op).await;
        }
        finals.push(engine_rules(&service));
    }
    assert_eq!(finals[0], finals[1]);
}

#[tokio::test]
async fn crash_after_prefix_recovers_exactly_the_prefix_state() {
    let seed = 54_321u64;
    let ops = generate_ops(seed, 100);
    let mut rng = StdRng::seed_from_u64(seed ^ 0xc0ffee);
    let crash_at = rng.gen_range(1..ops.len());

    // run the prefix, then "crash": the engine vanishes, the store survives
    let store = Arc::new(MemoryRuleStore::new());
    {
        let service = new_service(store.clone());
        for op in &ops[..crash_at] {
            apply(&service, op).await;
        }
    }

    let recovered = new_service(store.clone());
    recovered.recover().await.unwrap();
    assert_stores_agree(&recovered, &store, "after crash recovery");

    // reference run of exactly the prefix on a clean system
    let reference_store = Arc::new(MemoryRuleStore::new());
    let reference = new_service(reference_store.clone());
    for op in &ops[..crash_at] {
        apply(&reference, op).await;
    }

    assert_eq!(
        engine_rules(&recovered),
        engine_rules(&reference),
        "recovered state differs from replaying ops 1..{crash_at}"
    );
}

#[tokio::test]
async fn repeated_crashes_lose_nothing() {
    let store = Arc::new(MemoryRuleStore::new());
    {
        let service = new_service(store.clone());
        for i in 0..10 {
            service
                .create(CreateRule {
                    id: Some(format!("stable-{i}")),
                    name: format!("stable-{i}"),
                    source: "when { payment } always { fraud-check }".into(),
                    severity: Severity::Low,
                    enabled: true,
                    description: String::new(),
                })
                .await
                .unwrap();
        }
    }

    for crash in 0..5 {
        let service = new_service(store.clone());
        let loaded = service.recover().await.unwrap();
        assert_eq!(loaded, 10, "crash {crash}: wrong rule count after recovery");
        assert_stores_agree(&service, &store, "after repeated crash");
    }
}
