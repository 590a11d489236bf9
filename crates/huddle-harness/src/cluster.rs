//! Simulated clients sharing one backend.
//!
//! Each [`SimClient`] is a full [`Runtime`] spawned on the current tokio
//! runtime with a [`SimDriver`], a [`SimEnv`] and its own [`MemoryStorage`].
//! Tests drive clients through their [`SessionHandle`]s and inject faults
//! through the shared [`SimBackend`].

use std::time::Duration;

use huddle_app::{MemoryStorage, RoomSnapshot, Runtime, RuntimeConfig, SessionHandle};
use huddle_core::ReconnectPolicy;
use tokio::task::JoinHandle;

use crate::{
    ClientSnapshot, InvariantRegistry, SimBackend, SimDriver, SimEnv, SystemSnapshot,
};

/// How long [`SimCluster::settle`] lets virtual time run.
pub const SETTLE: Duration = Duration::from_millis(300);

/// Runtime config tuned for simulation: a tight tick and a short, bounded
/// reconnect backoff.
pub fn sim_config() -> RuntimeConfig {
    let mut config = RuntimeConfig::new("sim");
    config.tick_interval = Duration::from_millis(50);
    config.reconnect = ReconnectPolicy {
        enabled: true,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        max_attempts: Some(5),
    };
    config
}

/// One simulated client.
pub struct SimClient {
    /// Client identifier within the cluster.
    pub id: u64,
    /// Handle to the client's runtime.
    pub handle: SessionHandle,
    /// The client's persistence, shared with its runtime.
    pub storage: MemoryStorage,
    task: Option<JoinHandle<()>>,
}

impl SimClient {
    /// Spawn a runtime for a new client.
    pub fn spawn(
        id: u64,
        backend: &SimBackend,
        env: SimEnv,
        storage: MemoryStorage,
        config: RuntimeConfig,
    ) -> Self {
        let driver = SimDriver::new(backend.clone());
        let (runtime, handle) = Runtime::new(driver, env, storage.clone(), config);
        let task = tokio::spawn(runtime.run());

        Self { id, handle, storage, task: Some(task) }
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> RoomSnapshot {
        self.handle.snapshot()
    }

    /// Whether the runtime task is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Shut the runtime down and wait for it.
    pub async fn stop(&mut self) {
        self.handle.shutdown().await;
        if let Some(task) = self.task.take()
            && let Err(error) = task.await
        {
            tracing::warn!(%error, client = self.id, "runtime task failed");
        }
    }
}

/// Several clients and one backend.
pub struct SimCluster {
    /// The shared backend.
    pub backend: SimBackend,
    /// Clients in creation order.
    pub clients: Vec<SimClient>,
    env: SimEnv,
    config: RuntimeConfig,
}

impl SimCluster {
    /// Empty cluster with [`sim_config`].
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, sim_config())
    }

    /// Empty cluster with a custom runtime config.
    pub fn with_config(seed: u64, config: RuntimeConfig) -> Self {
        Self {
            backend: SimBackend::new(),
            clients: Vec::new(),
            env: SimEnv::with_seed(seed),
            config,
        }
    }

    /// Spawn a client with empty storage. Returns its index.
    pub fn add_client(&mut self) -> usize {
        self.add_client_with_storage(MemoryStorage::new())
    }

    /// Spawn a client over existing storage. Returns its index.
    pub fn add_client_with_storage(&mut self, storage: MemoryStorage) -> usize {
        let index = self.clients.len();
        let client = SimClient::spawn(
            index as u64 + 1,
            &self.backend,
            self.env.clone(),
            storage,
            self.config.clone(),
        );
        self.clients.push(client);
        index
    }

    /// Client at `index`.
    pub fn client(&self, index: usize) -> &SimClient {
        &self.clients[index]
    }

    /// Stop the client at `index` and start a fresh runtime over the same
    /// storage, as a relaunch would.
    pub async fn restart(&mut self, index: usize) {
        let client = &mut self.clients[index];
        client.stop().await;

        let storage = client.storage.clone();
        let id = client.id;
        *client =
            SimClient::spawn(id, &self.backend, self.env.clone(), storage, self.config.clone());
    }

    /// Let virtual time run until in-flight traffic has landed.
    pub async fn settle(&self) {
        tokio::time::sleep(SETTLE).await;
    }

    /// Snapshots of every client.
    pub fn snapshot(&self) -> SystemSnapshot {
        SystemSnapshot::from_clients(
            self.clients.iter().map(|c| ClientSnapshot::new(c.id, c.snapshot())).collect(),
        )
    }

    /// Assert the always-on invariants.
    pub fn check(&self, context: &str) {
        InvariantRegistry::standard().assert_all(&self.snapshot(), context);
    }

    /// Settle, then assert every invariant including the quiescent ones.
    pub async fn check_settled(&self, context: &str) {
        self.settle().await;
        InvariantRegistry::settled().assert_all(&self.snapshot(), context);
    }

    /// Stop every client.
    pub async fn shutdown(&mut self) {
        for client in &mut self.clients {
            client.stop().await;
        }
    }
}
