//! Fairness specs
//!
//! Verify FIFO admission per unit, the same-entity exception and ASAP
//! skipping.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[tokio::test]
async fn next_in_line_is_admitted_when_a_holder_finishes() {
    let cluster = Cluster::new(1, 2);
    assert!(cluster.register("c1", 1, "wf-1"));
    assert!(cluster.register("c2", 1, "wf-2"));
    assert!(!cluster.register("c3", 1, "wf-3"));
    let waiter = cluster.hub.wait(&ConsumerId::new("c3"));

    cluster.end("wf-1");
    let report = cluster.reconcile(0).await;

    assert_eq!(report.finished, 1);
    assert_eq!(report.unblocked, 1);
    assert_eq!(cluster.state_of("c1"), Some(ConsumerState::Finished));
    assert_eq!(cluster.state_of("c3"), Some(ConsumerState::Active));
    assert_eq!(waiter.recv().await.unwrap().consumer_id, ConsumerId::new("c3"));
}

#[tokio::test]
async fn large_request_holds_back_later_small_ones() {
    let cluster = Cluster::new(1, 3);
    assert!(cluster.register("c1", 2, "wf-1"));
    assert!(!cluster.register("big", 3, "wf-2"));
    // Would fit, but waits behind the big request
    assert!(!cluster.register("small", 1, "wf-3"));

    cluster.end("wf-1");
    cluster.reconcile(0).await;

    assert_eq!(cluster.state_of("big"), Some(ConsumerState::Active));
    assert_eq!(cluster.state_of("small"), Some(ConsumerState::Blocked));
}

#[test]
fn same_entity_does_not_wait_behind_itself() {
    let cluster = Cluster::new(1, 2);
    assert!(cluster.register("c1", 1, "wf-1"));
    assert!(!cluster.register("c2", 2, "wf-1"));
    // Same workflow as the barrier: not held back by it
    assert!(cluster.register("c3", 1, "wf-1"));
    // Another workflow is
    assert!(!cluster.register("c4", 1, "wf-2"));
}

#[test]
fn asap_admits_whatever_fits() {
    let cluster = Cluster::with_spec(1, ConstraintSpec::new(3).with_strategy(Strategy::Asap));
    assert!(cluster.register("c1", 2, "wf-1"));
    assert!(!cluster.register("big", 3, "wf-2"));
    assert!(cluster.register("small", 1, "wf-3"));
}

#[tokio::test]
async fn units_are_independent_pools() {
    let cluster = Cluster::with_spec(1, ConstraintSpec::new(1).with_unit_limit("gpu", 2));
    assert!(cluster.register("c1", 1, "wf-1"));
    assert!(!cluster.register("c2", 1, "wf-2"));

    for (consumer, entity) in [("g1", "wf-3"), ("g2", "wf-4")] {
        cluster.running(entity);
        let request = RegisterRequest::new(
            cluster.constraint_id.clone(),
            "gpu",
            consumer,
            1,
            HoldingScope::Workflow,
            entity,
        )
        .with_app(APP);
        assert!(cluster.node(0).register(request).unwrap());
    }

    assert_eq!(cluster.count(ConsumerState::Active), 3);
    assert_eq!(cluster.state_of("c2"), Some(ConsumerState::Blocked));
}

#[tokio::test]
async fn waiters_are_admitted_in_registration_order() {
    let cluster = Cluster::new(1, 1);
    cluster.register("c1", 1, "wf-1");
    for i in 2..=5 {
        cluster.register(&format!("c{i}"), 1, &format!("wf-{i}"));
    }

    let mut admitted = Vec::new();
    for i in 1..=4 {
        cluster.end(&format!("wf-{i}"));
        cluster.reconcile(0).await;
        let active: Vec<String> = cluster
            .states()
            .into_iter()
            .filter(|(_, s)| *s == ConsumerState::Active)
            .map(|(id, _)| id)
            .collect();
        admitted.extend(active);
    }

    assert_eq!(admitted, vec!["c2", "c3", "c4", "c5"]);
}
