//! Shared fixtures for the engine specs

pub use rc_adapters::{ExecutionStatus, FakeExecutionAdapter, WaitNotifyHub};
pub use rc_core::{
    ConstraintId, ConstraintSpec, ConsumerId, ConsumerState, HoldingScope, ReconcilerConfig,
    StoreConfig, Strategy,
};
pub use rc_engine::{DefaultService, PassReport, Reconciler, RegisterRequest};
pub use similar_asserts::assert_eq;
pub use std::sync::Arc;

use std::collections::BTreeMap;
use tempfile::TempDir;

pub const APP: &str = "app-1";
pub const UNIT: &str = "env-1";

pub type Node = DefaultService<FakeExecutionAdapter, WaitNotifyHub>;

/// Engine nodes sharing one journal, one execution source and one wake hub
pub struct Cluster {
    dir: TempDir,
    pub executions: FakeExecutionAdapter,
    pub hub: WaitNotifyHub,
    nodes: Vec<Arc<Node>>,
    pub constraint_id: ConstraintId,
}

impl Cluster {
    /// `nodes` engines and a FIFO constraint of `capacity` per unit
    pub fn new(nodes: usize, capacity: u32) -> Self {
        Self::with_spec(nodes, ConstraintSpec::new(capacity))
    }

    pub fn with_spec(nodes: usize, spec: ConstraintSpec) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let executions = FakeExecutionAdapter::new();
        let hub = WaitNotifyHub::new();
        let nodes: Vec<Arc<Node>> = (0..nodes.max(1))
            .map(|i| Arc::new(open_node(&dir, i, &executions, &hub)))
            .collect();
        let constraint_id = nodes[0]
            .create_constraint("acct", "deploys", spec)
            .unwrap()
            .id;
        Self {
            dir,
            executions,
            hub,
            nodes,
            constraint_id,
        }
    }

    pub fn node(&self, i: usize) -> &Arc<Node> {
        &self.nodes[i]
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// A fresh node over the same journal, as after a process restart
    pub fn restart_node(&self, i: usize) -> Node {
        open_node(&self.dir, i, &self.executions, &self.hub)
    }

    pub fn request(&self, consumer: &str, permits: u32, entity: &str) -> RegisterRequest {
        RegisterRequest::new(
            self.constraint_id.clone(),
            UNIT,
            consumer,
            permits,
            HoldingScope::Workflow,
            entity,
        )
        .with_app(APP)
    }

    /// Register through node 0; `entity` is marked running first
    pub fn register(&self, consumer: &str, permits: u32, entity: &str) -> bool {
        self.running(entity);
        self.nodes[0]
            .register(self.request(consumer, permits, entity))
            .unwrap()
    }

    pub fn running(&self, entity: &str) {
        self.executions
            .set_status(APP, entity, ExecutionStatus::Running);
    }

    pub fn end(&self, entity: &str) {
        self.executions
            .set_status(APP, entity, ExecutionStatus::Success);
    }

    pub async fn reconcile(&self, node: usize) -> PassReport {
        Reconciler::new(Arc::clone(&self.nodes[node]), ReconcilerConfig::default())
            .tick()
            .await
            .unwrap()
    }

    /// Consumer states as any node sees them
    pub fn states(&self) -> BTreeMap<String, ConsumerState> {
        self.nodes[0]
            .store()
            .snapshot()
            .unwrap()
            .consumers
            .values()
            .map(|r| (r.id.to_string(), r.state))
            .collect()
    }

    pub fn state_of(&self, consumer: &str) -> Option<ConsumerState> {
        self.states().get(consumer).copied()
    }

    pub fn count(&self, state: ConsumerState) -> usize {
        self.states().values().filter(|s| **s == state).count()
    }

    /// Permits held on the default unit according to usage
    pub async fn used_permits(&self) -> u32 {
        let usage = self.nodes[0]
            .usage("acct", &[self.constraint_id.clone()])
            .await
            .unwrap();
        usage
            .iter()
            .map(|u| u.used_permits(&UNIT.into()))
            .sum()
    }
}

fn open_node(
    dir: &TempDir,
    i: usize,
    executions: &FakeExecutionAdapter,
    hub: &WaitNotifyHub,
) -> Node {
    let config = StoreConfig::at(dir.path()).with_machine_id(format!("node-{i}"));
    DefaultService::open(&config, executions.clone(), hub.clone()).unwrap()
}

pub fn ids(items: &[&str]) -> Vec<ConsumerId> {
    items.iter().map(|s| ConsumerId::new(*s)).collect()
}
