//! Concurrency specs
//!
//! Verify that engine nodes sharing a journal never admit past capacity.

use crate::prelude::*;
use crate::prelude::assert_eq;

#[test]
fn concurrent_registrations_across_nodes_respect_capacity() {
    const CAPACITY: u32 = 3;
    const CONSUMERS: usize = 12;

    let cluster = Cluster::new(4, CAPACITY);
    for i in 0..CONSUMERS {
        cluster.running(&format!("wf-{i}"));
    }

    let admitted: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..CONSUMERS)
            .map(|i| {
                let node = Arc::clone(cluster.node(i % cluster.nodes().len()));
                let request = cluster.request(&format!("c{i}"), 1, &format!("wf-{i}"));
                scope.spawn(move || node.register(request).unwrap())
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count()
    });

    assert_eq!(admitted, CAPACITY as usize);
    assert_eq!(cluster.count(ConsumerState::Active), CAPACITY as usize);
    assert_eq!(
        cluster.count(ConsumerState::Blocked),
        CONSUMERS - CAPACITY as usize
    );
}

#[test]
fn concurrent_orders_are_unique() {
    let cluster = Cluster::new(3, 1);
    for i in 0..9 {
        cluster.running(&format!("wf-{i}"));
    }

    std::thread::scope(|scope| {
        for i in 0..9 {
            let node = Arc::clone(cluster.node(i % 3));
            let request = cluster.request(&format!("c{i}"), 1, &format!("wf-{i}"));
            scope.spawn(move || node.register(request).unwrap());
        }
    });

    let snapshot = cluster.node(0).store().snapshot().unwrap();
    let mut orders: Vec<u64> = snapshot.consumers.values().map(|r| r.order).collect();
    orders.sort_unstable();
    assert_eq!(orders, (1..=9).collect::<Vec<u64>>());
}

#[tokio::test]
async fn interleaved_reconcilers_admit_each_waiter_once() {
    let cluster = Cluster::new(3, 2);
    for i in 0..6 {
        cluster.register(&format!("c{i}"), 1, &format!("wf-{i}"));
    }
    cluster.end("wf-0");
    cluster.end("wf-1");

    let mut unblocked = 0;
    for node in 0..3 {
        unblocked += cluster.reconcile(node).await.unblocked;
    }

    assert_eq!(unblocked, 2);
    assert_eq!(cluster.count(ConsumerState::Active), 2);
    assert_eq!(cluster.count(ConsumerState::Finished), 2);
    assert_eq!(cluster.used_permits().await, 2);
}

#[tokio::test]
async fn duplicate_transitions_are_noops() {
    let cluster = Cluster::new(2, 1);
    cluster.register("c1", 1, "wf-1");
    cluster.register("c2", 1, "wf-2");
    cluster.end("wf-1");

    let first = cluster.node(0).update_active_constraints(None, None).await.unwrap();
    let second = cluster.node(1).update_active_constraints(None, None).await.unwrap();
    assert_eq!(first.finished, ids(&["c1"]));
    assert!(second.finished.is_empty());

    let a = cluster
        .node(0)
        .update_blocked_constraints(&first.constraint_ids)
        .await
        .unwrap();
    let b = cluster
        .node(1)
        .update_blocked_constraints(&first.constraint_ids)
        .await
        .unwrap();
    assert_eq!(a, ids(&["c2"]));
    // Already ACTIVE: no longer a candidate
    assert!(b.is_empty());
    assert_eq!(cluster.count(ConsumerState::Active), 1);
}
