//! Engines wired from a configuration document

use crate::prelude::*;
use crate::prelude::assert_eq;
use rc_core::EngineConfig;
use rc_engine::DefaultReconciler;
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;

fn config(dir: &Path, machine_id: &str) -> EngineConfig {
    let doc = format!(
        r#"
        [store]
        path = '{}'
        machine_id = "{machine_id}"

        [reconciler]
        interval = "10ms"
        app_id = "{APP}"
        "#,
        dir.display()
    );
    EngineConfig::from_toml_str(&doc).unwrap()
}

fn request(id: &ConstraintId, consumer: &str, entity: &str) -> RegisterRequest {
    RegisterRequest::new(
        id.clone(),
        UNIT,
        consumer,
        1,
        HoldingScope::Workflow,
        entity,
    )
    .with_app(APP)
}

#[tokio::test]
async fn configured_engine_admits_on_its_own_loop() {
    let dir = tempfile::tempdir().unwrap();
    let executions = FakeExecutionAdapter::new();
    let hub = WaitNotifyHub::new();
    let reconciler = Arc::new(
        DefaultReconciler::from_config(
            &config(dir.path(), "node-a"),
            executions.clone(),
            hub.clone(),
        )
        .unwrap(),
    );

    let service = reconciler.service();
    let id = service
        .create_constraint("acct", "deploys", ConstraintSpec::new(1))
        .unwrap()
        .id;
    executions.set_status(APP, "wf-1", ExecutionStatus::Running);
    executions.set_status(APP, "wf-2", ExecutionStatus::Running);
    assert!(service.register(request(&id, "c1", "wf-1")).unwrap());
    assert!(!service.register(request(&id, "c2", "wf-2")).unwrap());

    let waiter = hub.wait(&ConsumerId::new("c2"));
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn({
        let reconciler = Arc::clone(&reconciler);
        async move { reconciler.run(rx).await }
    });

    executions.set_status(APP, "wf-1", ExecutionStatus::Success);
    let signal = tokio::time::timeout(Duration::from_secs(5), waiter.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(signal.consumer_id, ConsumerId::new("c2"));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    // Another engine configured on the same directory sees the outcome
    let other = DefaultReconciler::from_config(
        &config(dir.path(), "node-b"),
        executions.clone(),
        hub.clone(),
    )
    .unwrap();
    let snapshot = other.service().store().snapshot().unwrap();
    let state_of = |c: &str| snapshot.consumer(&ConsumerId::new(c)).map(|r| r.state);
    assert_eq!(state_of("c1"), Some(ConsumerState::Finished));
    assert_eq!(state_of("c2"), Some(ConsumerState::Active));
}

#[test]
fn configured_engine_rejects_unreadable_journal_dir() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"").unwrap();

    let result = DefaultReconciler::from_config(
        &config(&file, "node-a"),
        FakeExecutionAdapter::new(),
        WaitNotifyHub::new(),
    );
    assert!(result.is_err());
}
