//! Recovery specs
//!
//! Verify that a restarted node resumes from the shared journal.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[tokio::test]
async fn restarted_node_sees_committed_state() {
    let cluster = Cluster::new(1, 1);
    cluster.register("c1", 1, "wf-1");
    cluster.register("c2", 1, "wf-2");
    cluster.end("wf-1");
    cluster
        .node(0)
        .update_active_constraints(None, None)
        .await
        .unwrap();

    // Crashed before the blocked pass; a new process picks it up
    let restarted = Arc::new(cluster.restart_node(0));
    let snapshot = restarted.store().snapshot().unwrap();
    assert_eq!(snapshot.constraints.len(), 1);
    assert_eq!(
        snapshot.consumer(&ConsumerId::new("c1")).map(|r| r.state),
        Some(ConsumerState::Finished)
    );

    let report = Reconciler::new(restarted, ReconcilerConfig::default())
        .tick()
        .await
        .unwrap();
    assert_eq!(report.swept, 1);
    assert_eq!(report.unblocked, 1);
    assert_eq!(cluster.state_of("c2"), Some(ConsumerState::Active));
}

#[test]
fn order_continues_after_restart() {
    let cluster = Cluster::new(1, 1);
    cluster.register("c1", 1, "wf-1");
    cluster.register("c2", 1, "wf-2");

    let restarted = cluster.restart_node(0);
    cluster.running("wf-3");
    restarted
        .register(cluster.request("c3", 1, "wf-3"))
        .unwrap();

    assert_eq!(restarted.get_max_order(&cluster.constraint_id).unwrap(), 3);
}

#[test]
fn catalog_changes_are_shared_between_nodes() {
    let cluster = Cluster::new(2, 1);
    let mut constraint = cluster
        .node(1)
        .get(Some("acct"), &cluster.constraint_id)
        .unwrap()
        .unwrap();
    constraint.capacity = 2;
    cluster.node(1).update(constraint).unwrap();

    assert!(cluster.register("c1", 1, "wf-1"));
    assert!(cluster.register("c2", 1, "wf-2"));

    assert!(cluster.node(1).delete("acct", &cluster.constraint_id).unwrap());
    assert!(cluster.node(0).list(Some("acct")).unwrap().is_empty());
}

#[tokio::test]
async fn purge_leaves_a_journal_that_restarts_cleanly() {
    let cluster = Cluster::new(2, 2);
    cluster.register("c1", 1, "wf-1");
    cluster.register("c2", 1, "wf-2");
    cluster.register("c3", 1, "wf-3");
    cluster.end("wf-1");
    cluster.reconcile(0).await;
    assert_eq!(cluster.state_of("c3"), Some(ConsumerState::Active));

    let later = chrono::Utc::now() + chrono::Duration::hours(1);
    assert_eq!(cluster.node(1).purge_finished(later).unwrap(), 1);

    // The other node follows the compacted journal, as does a restart
    assert_eq!(cluster.node(0).store().snapshot().unwrap().consumers.len(), 2);
    let restarted = cluster.restart_node(0);
    let snapshot = restarted.store().snapshot().unwrap();
    assert!(snapshot.consumer(&ConsumerId::new("c1")).is_none());
    assert_eq!(restarted.get_max_order(&cluster.constraint_id).unwrap(), 3);

    cluster.running("wf-4");
    assert!(!restarted.register(cluster.request("c4", 1, "wf-4")).unwrap());
    assert_eq!(restarted.get_max_order(&cluster.constraint_id).unwrap(), 4);
}
