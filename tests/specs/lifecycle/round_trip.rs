//! Round-trip specs
//!
//! Verify register → wait → unblock → finish and that usage returns to its
//! starting point.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[tokio::test]
async fn usage_returns_to_baseline_after_round_trip() {
    let cluster = Cluster::new(1, 1);
    let baseline = cluster.used_permits().await;

    assert!(cluster.register("holder", 1, "wf-0"));
    assert!(!cluster.register("c1", 1, "wf-1"));
    let waiter = cluster.hub.wait(&ConsumerId::new("c1"));
    assert_eq!(cluster.used_permits().await, 1);

    cluster.end("wf-0");
    cluster.reconcile(0).await;
    waiter.recv().await.unwrap();
    assert_eq!(cluster.state_of("c1"), Some(ConsumerState::Active));
    assert_eq!(cluster.used_permits().await, 1);

    cluster.end("wf-1");
    cluster.reconcile(0).await;
    assert_eq!(cluster.state_of("c1"), Some(ConsumerState::Finished));
    assert_eq!(cluster.used_permits().await, baseline);
}

#[tokio::test]
async fn repeated_registration_is_ignored() {
    let cluster = Cluster::new(2, 1);
    assert!(cluster.register("c1", 1, "wf-1"));
    assert!(!cluster.register("c1", 1, "wf-1"));
    assert!(!cluster
        .node(1)
        .register(cluster.request("c1", 1, "wf-1"))
        .unwrap());

    assert_eq!(cluster.states().len(), 1);
    assert_eq!(cluster.node(1).get_max_order(&cluster.constraint_id).unwrap(), 1);
}

#[tokio::test]
async fn vanished_execution_releases_its_hold() {
    let cluster = Cluster::new(1, 1);
    cluster.register("c1", 1, "wf-1");
    cluster.register("c2", 1, "wf-2");

    cluster.executions.remove(APP, "wf-1");
    let report = cluster.reconcile(0).await;

    assert_eq!(report.finished, 1);
    assert_eq!(cluster.state_of("c2"), Some(ConsumerState::Active));
}

#[tokio::test]
async fn usage_names_holders() {
    let cluster = Cluster::new(1, 2);
    cluster.register("c1", 1, "wf-1");

    let usage = cluster
        .node(0)
        .usage("acct", &[cluster.constraint_id.clone()])
        .await
        .unwrap();
    let scope = &usage[0].active_scopes[0];
    assert_eq!(scope.release_entity_type, "WORKFLOW");
    assert_eq!(scope.release_entity_id, "wf-1");
    assert_eq!(scope.release_entity_name, "wf-1");
    assert_eq!(scope.permits, 1);
    assert!(scope.acquired_at.is_some());
}
