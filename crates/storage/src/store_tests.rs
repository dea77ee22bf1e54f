// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::wal::WalEntry;
use rc_core::{
    ConstraintSpec, FakeClock, HoldingScope, ReleaseEntityPolicy, ReleaseScope, Strategy,
};
use std::time::Duration;
use yare::parameterized;

const RC: &str = "rc-1";

fn constraint(id: &str, account: &str, name: &str, capacity: u32) -> ResourceConstraint {
    ResourceConstraint::new(
        ConstraintId::new(id),
        account,
        name,
        ConstraintSpec::new(capacity),
        FakeClock::new().now(),
    )
}

fn store_with(capacity: u32) -> ConstraintStore<FakeClock> {
    let store = ConstraintStore::in_memory_with_clock(FakeClock::new());
    store
        .save_constraint(constraint(RC, "acct", "deploys", capacity))
        .unwrap();
    store
}

fn unit() -> ConstraintUnit {
    ConstraintUnit::new("env-1")
}

fn register<C: Clock>(store: &ConstraintStore<C>, id: &str, entity: &str) -> RegisterOutcome {
    let constraint = store.load(&ConstraintId::new(RC)).unwrap();
    let consumer = Consumer::new(id, 1, ReleaseScope::new(HoldingScope::Workflow, entity));
    constraint
        .register_consumer(
            &unit(),
            &consumer,
            RegisterContext::new("app-1"),
            store,
            &ReleaseEntityPolicy,
        )
        .unwrap()
}

fn state_of<C: Clock>(store: &ConstraintStore<C>, id: &str) -> Option<ConsumerState> {
    let snapshot = store.snapshot().unwrap();
    snapshot.consumer(&ConsumerId::new(id)).map(|r| r.state)
}

fn unblock<C: Clock>(store: &ConstraintStore<C>, id: &str, context: TransitionContext) -> bool {
    store
        .consumer_unblocked(&ConstraintId::new(RC), &unit(), &ConsumerId::new(id), &context)
        .unwrap()
}

fn finish<C: Clock>(store: &ConstraintStore<C>, id: &str, context: TransitionContext) -> bool {
    store
        .consumer_finished(&ConstraintId::new(RC), &unit(), &ConsumerId::new(id), &context)
        .unwrap()
}

#[test]
fn load_unknown_constraint_fails() {
    let store = ConstraintStore::in_memory();
    let err = store.load(&ConstraintId::new("missing")).unwrap_err();
    assert!(matches!(err, RegistryError::ConstraintNotFound(_)));
}

#[test]
fn register_admits_then_blocks() {
    let store = store_with(2);
    assert!(register(&store, "c1", "e1").admitted());
    assert!(register(&store, "c2", "e2").admitted());
    assert_eq!(
        register(&store, "c3", "e3"),
        RegisterOutcome::Registered(ConsumerState::Blocked)
    );

    let snapshot = store.snapshot().unwrap();
    let c1 = snapshot.consumer(&ConsumerId::new("c1")).unwrap();
    assert_eq!(c1.app_id, "app-1");
    assert!(c1.acquired_at.is_some());
    assert!(snapshot.consumer(&ConsumerId::new("c3")).unwrap().acquired_at.is_none());
    assert_eq!(store.max_order(&ConstraintId::new(RC)).unwrap(), 3);
}

#[test]
fn register_is_idempotent() {
    let store = store_with(1);
    register(&store, "c1", "e1");
    assert_eq!(register(&store, "c1", "e1"), RegisterOutcome::AlreadyRegistered);
    assert_eq!(store.snapshot().unwrap().consumers.len(), 1);
    assert_eq!(store.max_order(&ConstraintId::new(RC)).unwrap(), 1);
}

#[test]
fn stale_order_proposal_is_raised() {
    let store = store_with(5);
    register(&store, "c1", "e1");
    let consumer = Consumer::new("c2", 1, ReleaseScope::new(HoldingScope::Workflow, "e2")).with_order(1);
    let context = RegisterContext {
        order: 1,
        app_id: "app-1".to_string(),
    };
    let admit = |_: &[Consumer], _: &Consumer| ConsumerState::Active;
    store
        .register_consumer(&ConstraintId::new(RC), &unit(), &consumer, &context, 1, &admit)
        .unwrap();
    let record = store.snapshot().unwrap().consumer(&ConsumerId::new("c2")).cloned().unwrap();
    assert_eq!(record.order, 2);
}

#[test]
fn register_on_deleted_constraint_fails() {
    let store = store_with(1);
    let consumer = Consumer::new("c1", 1, ReleaseScope::new(HoldingScope::Workflow, "e1"));
    let admit = |_: &[Consumer], _: &Consumer| ConsumerState::Active;
    store.delete_constraint(&ConstraintId::new(RC)).unwrap();
    let err = store
        .register_consumer(
            &ConstraintId::new(RC),
            &unit(),
            &consumer,
            &RegisterContext::default(),
            0,
            &admit,
        )
        .unwrap_err();
    assert!(matches!(err, RegistryError::ConstraintNotFound(_)));
}

#[test]
fn unblock_is_guarded_by_capacity() {
    let store = store_with(1);
    register(&store, "c1", "e1");
    register(&store, "c2", "e2");

    assert!(!unblock(&store, "c2", TransitionContext::new().with_capacity(1)));
    assert_eq!(state_of(&store, "c2"), Some(ConsumerState::Blocked));

    assert!(finish(&store, "c1", TransitionContext::new()));
    assert!(unblock(&store, "c2", TransitionContext::new().with_capacity(1)));
    assert_eq!(state_of(&store, "c2"), Some(ConsumerState::Active));
}

#[test]
fn unblock_and_finish_are_idempotent() {
    let store = store_with(1);
    register(&store, "c1", "e1");
    register(&store, "c2", "e2");
    finish(&store, "c1", TransitionContext::new());

    assert!(unblock(&store, "c2", TransitionContext::new()));
    assert!(unblock(&store, "c2", TransitionContext::new()));
    assert_eq!(store.snapshot().unwrap().active_permits(&ConstraintId::new(RC), &unit()), 1);

    assert!(finish(&store, "c2", TransitionContext::new()));
    assert!(!finish(&store, "c2", TransitionContext::new()));
    assert!(!unblock(&store, "c2", TransitionContext::new()));
}

#[parameterized(
    matching_app = { Some("app-1"), true },
    other_app = { Some("app-2"), false },
    no_app = { None, true },
)]
fn transitions_honor_app_filter(app: Option<&str>, expected: bool) {
    let store = store_with(1);
    register(&store, "c1", "e1");
    let mut context = TransitionContext::new();
    if let Some(app) = app {
        context = context.with_app(app);
    }
    assert_eq!(finish(&store, "c1", context), expected);
}

#[test]
fn transition_on_wrong_unit_is_a_no_op() {
    let store = store_with(1);
    register(&store, "c1", "e1");
    let finished = store
        .consumer_finished(
            &ConstraintId::new(RC),
            &ConstraintUnit::new("other"),
            &ConsumerId::new("c1"),
            &TransitionContext::new(),
        )
        .unwrap();
    assert!(!finished);
    assert_eq!(state_of(&store, "c1"), Some(ConsumerState::Active));
}

#[test]
fn catalog_rejects_duplicate_names_per_account() {
    let store = store_with(1);
    let err = store
        .save_constraint(constraint("rc-2", "acct", "deploys", 1))
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateName { .. }));

    store
        .save_constraint(constraint("rc-3", "other", "deploys", 1))
        .unwrap();
    let err = store
        .save_constraint(constraint(RC, "other", "renamed", 1))
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateId(_)));
}

#[test]
fn catalog_update_keeps_owner_and_creation_time() {
    let clock = FakeClock::new();
    let store = ConstraintStore::in_memory_with_clock(clock.clone());
    let saved = store
        .save_constraint(constraint(RC, "acct", "deploys", 1))
        .unwrap();
    clock.advance(Duration::from_secs(60));

    let mut edit = saved.clone();
    edit.account_id = "thief".to_string();
    edit.capacity = 3;
    edit.strategy = Strategy::Asap;
    let updated = store.update_constraint(edit).unwrap();

    assert_eq!(updated.account_id, "acct");
    assert_eq!(updated.created_at, saved.created_at);
    assert_eq!(updated.updated_at, clock.now());
    assert_eq!(store.load(&ConstraintId::new(RC)).unwrap().spec.limits, 3);
}

#[test]
fn catalog_list_and_delete_by_account() {
    let store = store_with(1);
    store.save_constraint(constraint("rc-2", "acct", "builds", 1)).unwrap();
    store.save_constraint(constraint("rc-3", "other", "x", 1)).unwrap();

    let names: Vec<String> = store
        .list_constraints(Some("acct"))
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["builds", "deploys"]);
    assert_eq!(store.list_constraints(None).unwrap().len(), 3);

    assert_eq!(store.delete_constraints_by_account("acct").unwrap(), 2);
    assert_eq!(store.list_constraints(None).unwrap().len(), 1);
    assert!(!store.delete_constraint(&ConstraintId::new(RC)).unwrap());
}

#[test]
fn purge_drops_old_finished_records() {
    let clock = FakeClock::new();
    let store = ConstraintStore::in_memory_with_clock(clock.clone());
    store.save_constraint(constraint(RC, "acct", "deploys", 2)).unwrap();
    register(&store, "c1", "e1");
    register(&store, "c2", "e2");
    finish(&store, "c1", TransitionContext::new());
    clock.advance(Duration::from_secs(3600));

    let purged = store.purge_finished(clock.now()).unwrap();
    assert_eq!(purged, vec![ConsumerId::new("c1")]);
    assert!(state_of(&store, "c1").is_none());
    assert_eq!(state_of(&store, "c2"), Some(ConsumerState::Active));
    assert!(store.purge_finished(clock.now()).unwrap().is_empty());
}

#[test]
fn scans_and_active_units() {
    let store = store_with(1);
    register(&store, "c1", "e1");
    register(&store, "c2", "e2");
    let active = store.scan_consumers(&ConsumerFilter::active()).unwrap();
    assert_eq!(active.len(), 1);
    let units = store.active_units(&ConstraintId::new(RC)).unwrap();
    assert_eq!(units.into_iter().collect::<Vec<_>>(), vec![unit()]);
}

#[test]
fn journaled_store_recovers_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = ConstraintStore::open(dir.path(), "node-a").unwrap();
        store.save_constraint(constraint(RC, "acct", "deploys", 1)).unwrap();
        register(&store, "c1", "e1");
        register(&store, "c2", "e2");
        finish(&store, "c1", TransitionContext::new());
    }

    let store = ConstraintStore::open(dir.path(), "node-a").unwrap();
    assert_eq!(state_of(&store, "c1"), Some(ConsumerState::Finished));
    assert_eq!(state_of(&store, "c2"), Some(ConsumerState::Blocked));
    assert_eq!(store.max_order(&ConstraintId::new(RC)).unwrap(), 2);
}

#[test]
fn handles_on_one_journal_share_transitions() {
    let dir = tempfile::tempdir().unwrap();
    let a = ConstraintStore::open(dir.path(), "node-a").unwrap();
    let b = ConstraintStore::open(dir.path(), "node-b").unwrap();
    a.save_constraint(constraint(RC, "acct", "deploys", 1)).unwrap();

    assert!(register(&a, "c1", "e1").admitted());
    assert_eq!(
        register(&b, "c2", "e2"),
        RegisterOutcome::Registered(ConsumerState::Blocked)
    );

    // Only one handle wins the finish
    assert!(finish(&b, "c1", TransitionContext::new()));
    assert!(!finish(&a, "c1", TransitionContext::new()));
    assert!(unblock(&a, "c2", TransitionContext::new().with_capacity(1)));
    assert_eq!(state_of(&b, "c2"), Some(ConsumerState::Active));
}

#[test]
fn from_config_selects_backend() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConstraintStore::from_config(&StoreConfig::at(dir.path())).unwrap();
    store.save_constraint(constraint(RC, "acct", "deploys", 1)).unwrap();
    assert!(dir.path().join("wal-0.jsonl").exists());

    let memory = ConstraintStore::from_config(&StoreConfig::in_memory()).unwrap();
    assert!(memory.list_constraints(None).unwrap().is_empty());
}

fn journal_text(dir: &Path) -> String {
    let mut text = String::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "json" || ext == "jsonl") {
            text.push_str(&std::fs::read_to_string(path).unwrap());
        }
    }
    text
}

#[test]
fn purge_compacts_the_journal() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    let store = ConstraintStore::open_with_clock(dir.path(), "node-a", clock.clone()).unwrap();
    store.save_constraint(constraint(RC, "acct", "deploys", 2)).unwrap();
    register(&store, "gone-1", "e1");
    register(&store, "kept-2", "e2");
    finish(&store, "gone-1", TransitionContext::new());
    assert!(journal_text(dir.path()).contains("gone-1"));

    clock.advance(Duration::from_secs(3600));
    store.purge_finished(clock.now()).unwrap();

    // Neither the snapshot nor the new log mentions the purged record
    assert!(!journal_text(dir.path()).contains("gone-1"));
    assert!(!dir.path().join("wal-0.jsonl").exists());

    let before = store.snapshot().unwrap();
    let reopened = ConstraintStore::open(dir.path(), "node-b").unwrap();
    assert_eq!(reopened.snapshot().unwrap(), before);
    assert_eq!(reopened.max_order(&ConstraintId::new(RC)).unwrap(), 2);
    assert_eq!(state_of(&reopened, "kept-2"), Some(ConsumerState::Active));
}

#[test]
fn reopen_after_compaction_rebuilds_the_same_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConstraintStore::open(dir.path(), "node-a").unwrap();
    store.save_constraint(constraint(RC, "acct", "deploys", 1)).unwrap();
    register(&store, "c1", "e1");
    register(&store, "c2", "e2");
    assert!(store.compact().unwrap());
    finish(&store, "c1", TransitionContext::new());
    assert!(unblock(&store, "c2", TransitionContext::new().with_capacity(1)));

    let reopened = ConstraintStore::open(dir.path(), "node-a").unwrap();
    assert_eq!(reopened.snapshot().unwrap(), store.snapshot().unwrap());
    assert_eq!(state_of(&reopened, "c2"), Some(ConsumerState::Active));
}

#[test]
fn in_memory_store_has_nothing_to_compact() {
    assert!(!store_with(1).compact().unwrap());
}

#[test]
fn configured_threshold_compacts_on_size() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::at(dir.path()).with_compaction_threshold(2);
    let store = ConstraintStore::from_config(&config).unwrap();
    store.save_constraint(constraint(RC, "acct", "deploys", 1)).unwrap();
    register(&store, "c1", "e1");

    assert!(dir.path().join("snapshot-1.json").exists());
    assert!(dir.path().join("wal-1.jsonl").exists());
    assert_eq!(state_of(&store, "c1"), Some(ConsumerState::Active));
}

#[test]
fn journal_entries_carry_the_store_clock() {
    let dir = tempfile::tempdir().unwrap();
    let clock = FakeClock::new();
    clock.advance(Duration::from_secs(42));
    let store = ConstraintStore::open_with_clock(dir.path(), "node-a", clock.clone()).unwrap();
    store.save_constraint(constraint(RC, "acct", "deploys", 1)).unwrap();

    let log = std::fs::read_to_string(dir.path().join("wal-0.jsonl")).unwrap();
    let entry: WalEntry = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(
        entry.timestamp_micros,
        clock.now().timestamp_micros() as u64
    );
}
