//! Runtime behavior against the simulated backend.
//!
//! These tests build the runtime by hand to reach the seams the cluster
//! helper hides: the snapshot channel, storage failures, dropped handles.

use std::time::Duration;

use huddle_app::{MemoryStorage, Runtime, RuntimeConfig, SessionHandle, Storage, StorageError};
use huddle_client::{ConnectionState, Identity, ResumeRecord, SessionError, SessionPhase};
use huddle_harness::{SimBackend, SimDriver, SimEnv, sim_config};
use huddle_proto::{Opcode, Payload};
use proptest::prelude::*;
use tokio::task::JoinHandle;

fn spawn<S: Storage>(backend: &SimBackend, storage: S) -> (SessionHandle, JoinHandle<()>) {
    spawn_with(backend, storage, sim_config())
}

fn spawn_with<S: Storage>(
    backend: &SimBackend,
    storage: S,
    config: RuntimeConfig,
) -> (SessionHandle, JoinHandle<()>) {
    let (runtime, handle) =
        Runtime::new(SimDriver::new(backend.clone()), SimEnv::new(), storage, config);
    (handle, tokio::spawn(runtime.run()))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

/// Storage whose every operation fails.
struct BrokenStorage;

impl Storage for BrokenStorage {
    fn load_identity(&self) -> Result<Option<Identity>, StorageError> {
        Err(StorageError::Io("disk on fire".to_string()))
    }

    fn save_identity(&self, _identity: &Identity) -> Result<(), StorageError> {
        Err(StorageError::Io("disk on fire".to_string()))
    }

    fn load_resume(&self) -> Result<Option<ResumeRecord>, StorageError> {
        Err(StorageError::Serialization("garbage".to_string()))
    }

    fn save_resume(&self, _record: &ResumeRecord) -> Result<(), StorageError> {
        Err(StorageError::Io("disk on fire".to_string()))
    }

    fn clear_resume(&self) -> Result<(), StorageError> {
        Err(StorageError::Io("disk on fire".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_each_transition() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, MemoryStorage::new());
    let mut updates = handle.subscribe();

    let mut revisions = Vec::new();
    loop {
        updates.changed().await.unwrap();
        let snapshot = updates.borrow_and_update().clone();
        revisions.push(snapshot.revision);
        if snapshot.phase == SessionPhase::Ready {
            assert_eq!(snapshot.connection, ConnectionState::Connected);
            break;
        }
    }
    assert!(revisions.windows(2).all(|w| w[0] < w[1]));

    let before = handle.snapshot().revision;
    handle.create_room("alice", "🦊").await.unwrap();
    settle().await;

    let after = handle.snapshot();
    assert!(after.revision > before);
    assert_eq!(after.phase, SessionPhase::InRoom);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn quiet_runtime_publishes_nothing() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, MemoryStorage::new());
    settle().await;

    let mut updates = handle.subscribe();
    updates.borrow_and_update();

    // Heartbeats and ticks change nothing the frontend renders
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(!updates.has_changed().unwrap());

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_the_runtime() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, MemoryStorage::new());
    settle().await;
    assert_eq!(backend.links().len(), 1);

    let clone = handle.clone();
    drop(handle);
    settle().await;
    assert!(!task.is_finished());

    drop(clone);
    task.await.unwrap();
    assert!(backend.links().is_empty());
}

#[tokio::test(start_paused = true)]
async fn storage_failures_do_not_stop_the_session() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, BrokenStorage);
    settle().await;

    let room_id = handle.create_room("alice", "🦊").await.unwrap();
    handle.send_message("still works").await.unwrap();
    handle.leave_room().await.unwrap();
    settle().await;

    assert_eq!(handle.snapshot().phase, SessionPhase::Ready);
    assert_eq!(backend.history(&room_id).len(), 1);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_fails_outstanding_requests() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, MemoryStorage::new());
    settle().await;

    backend.set_muted(true);
    let creator = handle.clone();
    let pending = tokio::spawn(async move { creator.create_room("alice", "🦊").await });
    settle().await;
    assert!(!pending.is_finished());

    handle.shutdown().await;

    assert_eq!(pending.await.unwrap(), Err(SessionError::NotConnected));
    assert_eq!(backend.received_count(Opcode::Goodbye), 1);
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn concurrent_create_is_refused() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, MemoryStorage::new());
    settle().await;

    backend.set_muted(true);
    let creator = handle.clone();
    let first = tokio::spawn(async move { creator.create_room("alice", "🦊").await });
    settle().await;

    assert_eq!(handle.join_room("alice", "room-9", "🦊").await, Err(SessionError::JoinInProgress));

    handle.shutdown().await;
    assert!(first.await.unwrap().is_err());
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn remembered_identity_is_published_without_resuming() {
    let backend = SimBackend::new();
    let storage = MemoryStorage::new();
    storage.save_identity(&Identity::new("alice", "🦊").unwrap()).unwrap();

    let (handle, task) = spawn(&backend, storage);
    settle().await;

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Ready);
    assert_eq!(snapshot.remembered, Some(Identity::new("alice", "🦊").unwrap()));
    assert_eq!(snapshot.identity, None);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unusable_resume_record_is_discarded() {
    let backend = SimBackend::new();
    let storage = MemoryStorage::with_resume(ResumeRecord {
        room_id: "room-1".to_string(),
        nickname: "x".to_string(),
        icon: "🦊".to_string(),
    });

    let (handle, task) = spawn(&backend, storage.clone());
    settle().await;

    assert_eq!(handle.snapshot().phase, SessionPhase::Ready);
    assert_eq!(storage.load_resume().unwrap(), None);
    assert_eq!(backend.received_count(Opcode::ResumeRoom), 0);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn set_typing_bypasses_the_debouncer() {
    let backend = SimBackend::new();
    let (handle, task) = spawn(&backend, MemoryStorage::new());
    settle().await;
    handle.create_room("alice", "🦊").await.unwrap();

    handle.set_typing(true).await.unwrap();
    handle.set_typing(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    // No idle timer runs for a direct signal
    assert_eq!(backend.received_count(Opcode::SetTyping), 1);

    handle.set_typing(false).await.unwrap();
    settle().await;
    assert_eq!(backend.received_count(Opcode::SetTyping), 2);

    handle.shutdown().await;
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_typing_stop_is_not_delayed_by_a_coarse_tick() {
    let backend = SimBackend::new();
    let mut config = sim_config();
    config.tick_interval = Duration::from_secs(5);
    let (handle, task) = spawn_with(&backend, MemoryStorage::new(), config);
    settle().await;
    handle.create_room("alice", "🦊").await.unwrap();

    handle.input_changed("h").await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_999)).await;
    assert_eq!(backend.received_count(Opcode::SetTyping), 1);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(backend.received_count(Opcode::SetTyping), 2);

    handle.shutdown().await;
    task.await.unwrap();
}

#[derive(Debug, Clone)]
enum Input {
    Change(String),
    Submit,
    Blur,
    Idle(u64),
}

fn input_strategy() -> impl Strategy<Value = Input> {
    prop_oneof![
        5 => "[a-c]{0,3}".prop_map(Input::Change),
        1 => Just(Input::Submit),
        1 => Just(Input::Blur),
        2 => (100u64..4_000).prop_map(Input::Idle),
    ]
}

fn typing_signals(inputs: &[Input]) -> Vec<bool> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async {
        let backend = SimBackend::new();
        let (handle, task) = spawn(&backend, MemoryStorage::new());
        settle().await;
        handle.create_room("alice", "🦊").await.unwrap();

        for input in inputs {
            match input {
                Input::Change(text) => handle.input_changed(text).await.unwrap(),
                Input::Submit => handle.input_submitted().await.unwrap(),
                Input::Blur => handle.input_blurred().await.unwrap(),
                Input::Idle(ms) => tokio::time::sleep(Duration::from_millis(*ms)).await,
            }
        }
        tokio::time::sleep(Duration::from_secs(4)).await;

        handle.shutdown().await;
        task.await.unwrap();

        backend
            .received()
            .into_iter()
            .filter_map(|(_, frame)| match Payload::from_frame(&frame) {
                Ok(Payload::SetTyping(typing)) => Some(typing.is_typing),
                _ => None,
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The wire sees strictly alternating typing signals that start with
    /// `true` and always end with `false`.
    #[test]
    fn prop_typing_signals_alternate(inputs in prop::collection::vec(input_strategy(), 0..30)) {
        let signals = typing_signals(&inputs);

        for (index, signal) in signals.iter().enumerate() {
            prop_assert_eq!(*signal, index % 2 == 0, "signals: {:?}", signals);
        }
        prop_assert!(signals.last() != Some(&true), "left typing on: {:?}", signals);
    }
}
