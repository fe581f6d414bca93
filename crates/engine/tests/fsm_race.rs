use std::sync::Arc;

use betrace_common::violation::Severity;
use betrace_engine::store::{MemoryRuleStore, RuleStore};
use betrace_engine::{CreateRule, Engine, EngineConfig, EngineError, RuleService, UpdateRule};

fn new_service(store: Arc<MemoryRuleStore>) -> Arc<RuleService> {
    let config = EngineConfig {
        workers: Some(2),
        ..EngineConfig::default()
    };
    let (engine, _violations) = Engine::start(config);
    Arc::new(RuleService::new(engine, store))
}

fn create_req(id: &str, source: &str) -> CreateRule {
    CreateRule {
        id: Some(id.into()),
        name: id.into(),
        source: source.into(),
        severity: Severity::High,
        enabled: true,
        description: String::new(),
    }
}

fn update_req(source: &str) -> UpdateRule {
    UpdateRule {
        source: Some(source.into()),
        ..UpdateRule::default()
    }
}

fn stored_source(store: &MemoryRuleStore, id: &str) -> Option<String> {
    store.get(id).unwrap().map(|bytes| {
        serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()["source"]
            .as_str()
            .unwrap()
            .to_string()
    })
}

/// Engine and store must agree on existence and content for one id, at any
/// quiescent moment.
fn assert_consistent(service: &RuleService, store: &MemoryRuleStore, id: &str) {
    let engine_rule = service.engine().get(id);
    let store_source = stored_source(store, id);
    match (&engine_rule, &store_source) {
        (Some(rule), Some(source)) => {
            assert_eq!(&rule.record.source, source, "sources diverged for '{id}'")
        }
        (None, None) => {}
        (engine, store) => panic!(
            "inconsistent stores for '{id}': engine={:?} store={:?}",
            engine.as_ref().map(|r| &r.record.source),
            store
        ),
    }
}

#[tokio::test]
async fn race_update_vs_delete_100_rounds() {
    let store = Arc::new(MemoryRuleStore::new());
    let service = new_service(store.clone());

    let original = "when { payment.where(span.duration > 100ns) } always { fraud-check }";
    service
        .create(create_req("race-test", original))
        .await
        .unwrap();

    for iteration in 0..100 {
        let updated = format!(
            "when {{ payment.where(span.duration > {}ns) }} always {{ fraud-check }}",
            200 + iteration
        );

        let update_service = service.clone();
        let update_source = updated.clone();
        let update = tokio::spawn(async move {
            update_service
                .update("race-test", update_req(&update_source))
                .await
        });

        let delete_service = service.clone();
        let delete = tokio::spawn(async move { delete_service.delete("race-test").await });

        let update_result = update.await.unwrap();
        let delete_result = delete.await.unwrap();

        assert_consistent(&service, &store, "race-test");

        assert!(
            update_result.is_ok() || delete_result.is_ok(),
            "iteration {iteration}: neither operation made progress \
             (update: {update_result:?}, delete: {delete_result:?})"
        );

        if update_result.is_ok() && delete_result.is_ok() {
            // update then delete serialized; the rule must be fully gone
            assert!(
                service.engine().get("race-test").is_none(),
                "iteration {iteration}: both ops succeeded but rule survives"
            );
        }

        if service.engine().get("race-test").is_none() {
            service
                .create(create_req("race-test", original))
                .await
                .unwrap();
        }
    }
}

#[tokio::test]
async fn concurrent_updates_make_progress_and_converge() {
    let store = Arc::new(MemoryRuleStore::new());
    let service = new_service(store.clone());
    service
        .create(create_req(
            "concurrent-test",
            "when { payment.where(span.duration > 100ns) } always { x }",
        ))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let service = service.clone();
        let source = format!(
            "when {{ payment.where(span.duration > {}ns) }} always {{ x }}",
            100 + i
        );
        handles.push(tokio::spawn(async move {
            service.update("concurrent-test", update_req(&source)).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }
    assert!(successes >= 1, "no update made progress");

    assert_consistent(&service, &store, "concurrent-test");
    let engine_source = service
        .engine()
        .get("concurrent-test")
        .unwrap()
        .record
        .source
        .clone();
    assert_eq!(stored_source(&store, "concurrent-test").unwrap(), engine_source);
}

#[tokio::test]
async fn operations_on_distinct_ids_do_not_serialize_against_each_other() {
    let store = Arc::new(MemoryRuleStore::new());
    let service = new_service(store.clone());

    let mut handles = Vec::new();
    for i in 0..20 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let id = format!("independent-{i}");
            service
                .create(create_req(&id, "when { a } always { b }"))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(service.list().len(), 20);
    assert_eq!(store.len(), 20);
    for i in 0..20 {
        assert_consistent(&service, &store, &format!("independent-{i}"));
    }
}

#[tokio::test]
async fn create_storage_failure_interleaved_with_reads() {
    let store = Arc::new(MemoryRuleStore::new());
    let service = new_service(store.clone());

    store.fail_next_put();
    let err = service
        .create(create_req("flaky", "when { a } always { b }"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Storage(_)));
    assert_consistent(&service, &store, "flaky");

    service
        .create(create_req("flaky", "when { a } always { b }"))
        .await
        .unwrap();
    assert_consistent(&service, &store, "flaky");
}
