//! Coordinator behaviour against an in-process shared store

use async_trait::async_trait;
use revealpoll::backend::{Backend, BackendMode, SharedBackend, Subscription, TallyCallback};
use revealpoll::common::{Error, Result, RetryPolicy, Storage, Tally, VoteOption};
use revealpoll::coordinator::{PollEvent, RejectReason, SessionState};
use revealpoll::{SubmitOutcome, VoteCoordinator};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Shared store whose reads and writes can be made to fail
struct FlakyBackend {
    store: Arc<SharedBackend>,
    reads_fail: AtomicBool,
    writes_fail: AtomicBool,
    reject_writes: AtomicBool,
    read_attempts: AtomicU32,
}

impl FlakyBackend {
    fn new(store: Arc<SharedBackend>) -> Self {
        Self {
            store,
            reads_fail: AtomicBool::new(false),
            writes_fail: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            read_attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn read(&self) -> Result<Option<Tally>> {
        self.read_attempts.fetch_add(1, Ordering::SeqCst);
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable("connection refused".into()));
        }
        self.store.read().await
    }

    async fn write(&self, tally: Tally) -> Result<()> {
        if self.writes_fail.load(Ordering::SeqCst) {
            return Err(Error::BackendUnavailable("connection reset".into()));
        }
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(Error::BackendWriteRejected("409 Conflict".into()));
        }
        self.store.write(tally).await
    }

    fn subscribe(&self, on_change: TallyCallback) -> Result<Subscription> {
        self.store.subscribe(on_change)
    }
}

/// Shared store whose writes wait until the test releases them
struct GatedBackend {
    store: Arc<SharedBackend>,
    write_started: Notify,
    release: Notify,
}

#[async_trait]
impl Backend for GatedBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Remote
    }

    async fn read(&self) -> Result<Option<Tally>> {
        self.store.read().await
    }

    async fn write(&self, tally: Tally) -> Result<()> {
        self.write_started.notify_one();
        self.release.notified().await;
        self.store.write(tally).await
    }

    fn subscribe(&self, _on_change: TallyCallback) -> Result<Subscription> {
        Ok(Subscription::noop())
    }
}

fn client(remote: Arc<dyn Backend>) -> VoteCoordinator {
    VoteCoordinator::new(Storage::new_memory())
        .unwrap()
        .with_remote(remote)
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
}

fn recorder(coordinator: &VoteCoordinator) -> (Arc<Mutex<Vec<PollEvent>>>, revealpoll::coordinator::ListenerHandle) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let handle = coordinator.subscribe(move |event| sink.lock().unwrap().push(*event));
    (events, handle)
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_fresh_client_initializes_empty_store() {
    let store = Arc::new(SharedBackend::in_memory());
    let coordinator = client(store.clone());

    assert_eq!(coordinator.init().await.unwrap(), BackendMode::Remote);
    assert_eq!(store.current().unwrap(), Some(Tally::default()));

    let outcome = coordinator.submit(VoteOption::A).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            option: VoteOption::A,
            tally: Tally::new(1, 0),
            recorded: true
        }
    );
    assert_eq!(store.current().unwrap(), Some(Tally::new(1, 0)));
    assert_eq!(coordinator.tally(), Some(Tally::new(1, 0)));
    assert!(coordinator.has_voted_already());
    assert_eq!(coordinator.last_vote(), Some(VoteOption::A));
}

#[tokio::test]
async fn test_sequential_clients_count_exactly() {
    let store = Arc::new(SharedBackend::in_memory());
    let votes = [
        VoteOption::A,
        VoteOption::B,
        VoteOption::A,
        VoteOption::A,
        VoteOption::B,
    ];

    let mut previous = Tally::default();
    for option in votes {
        let coordinator = client(store.clone());
        coordinator.init().await.unwrap();
        let outcome = coordinator.submit(option).await.unwrap();
        let SubmitOutcome::Accepted { tally, .. } = outcome else {
            panic!("vote rejected: {outcome:?}");
        };
        assert!(tally.covers(&previous), "tally went backwards");
        previous = tally;
    }

    assert_eq!(store.current().unwrap(), Some(Tally::new(3, 2)));
}

#[tokio::test]
async fn test_push_from_other_client_is_adopted() {
    let store = Arc::new(SharedBackend::in_memory());
    let watcher = client(store.clone());
    let voter = client(store.clone());
    watcher.init().await.unwrap();
    voter.init().await.unwrap();
    assert!(watcher.is_live());

    let (events, _handle) = recorder(&watcher);
    voter.submit(VoteOption::B).await.unwrap();

    eventually("push to reach watcher", || {
        watcher.tally() == Some(Tally::new(0, 1))
    })
    .await;
    assert!(events
        .lock()
        .unwrap()
        .contains(&PollEvent::TallyChanged(Tally::new(0, 1))));
    assert!(!watcher.has_voted_already());
}

#[tokio::test]
async fn test_second_submit_is_rejected_without_broadcast() {
    let store = Arc::new(SharedBackend::in_memory());
    let coordinator = client(store.clone());
    coordinator.init().await.unwrap();
    coordinator.submit(VoteOption::B).await.unwrap();

    let (events, _handle) = recorder(&coordinator);
    let outcome = coordinator.submit(VoteOption::A).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Rejected(RejectReason::AlreadyVoted {
            last_vote: Some(VoteOption::B)
        })
    );
    assert_eq!(store.current().unwrap(), Some(Tally::new(0, 1)));
    assert_eq!(coordinator.tally(), Some(Tally::new(0, 1)));

    // Let any echo of the first vote drain; it equals the cache.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unavailable_write_counts_optimistically_and_degrades() {
    let store = Arc::new(SharedBackend::in_memory());
    store.put(Tally::new(4, 2)).unwrap();
    let flaky = Arc::new(FlakyBackend::new(store.clone()));
    let coordinator = client(flaky.clone());
    coordinator.init().await.unwrap();

    flaky.writes_fail.store(true, Ordering::SeqCst);
    let (events, _handle) = recorder(&coordinator);
    let outcome = coordinator.submit(VoteOption::A).await.unwrap();

    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            option: VoteOption::A,
            tally: Tally::new(5, 2),
            recorded: false
        }
    );
    assert_eq!(coordinator.state(), SessionState::Degraded(Tally::new(5, 2)));
    assert!(coordinator.has_voted_already());
    assert!(!coordinator.is_live());
    assert_eq!(store.current().unwrap(), Some(Tally::new(4, 2)));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            PollEvent::TallyChanged(Tally::new(5, 2)),
            PollEvent::VoteAccepted(VoteOption::A)
        ]
    );
}

#[tokio::test]
async fn test_failed_read_before_vote_uses_cache() {
    let store = Arc::new(SharedBackend::in_memory());
    store.put(Tally::new(1, 1)).unwrap();
    let flaky = Arc::new(FlakyBackend::new(store.clone()));
    let coordinator = client(flaky.clone());
    coordinator.init().await.unwrap();

    flaky.reads_fail.store(true, Ordering::SeqCst);
    let outcome = coordinator.submit(VoteOption::B).await.unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            option: VoteOption::B,
            tally: Tally::new(1, 2),
            recorded: true
        }
    );
    assert_eq!(store.current().unwrap(), Some(Tally::new(1, 2)));
    assert_eq!(coordinator.mode(), Some(BackendMode::Remote));
}

#[tokio::test]
async fn test_rejected_write_keeps_remote_mode() {
    let store = Arc::new(SharedBackend::in_memory());
    let flaky = Arc::new(FlakyBackend::new(store.clone()));
    let coordinator = client(flaky.clone());
    coordinator.init().await.unwrap();

    flaky.reject_writes.store(true, Ordering::SeqCst);
    let outcome = coordinator.submit(VoteOption::B).await.unwrap();
    assert!(matches!(
        outcome,
        SubmitOutcome::Accepted {
            recorded: false,
            ..
        }
    ));
    assert_eq!(coordinator.state(), SessionState::Synced(Tally::new(0, 1)));
    assert!(coordinator.has_voted_already());
}

#[tokio::test]
async fn test_unreachable_store_falls_back_after_bounded_retries() {
    let store = Arc::new(SharedBackend::in_memory());
    let flaky = Arc::new(FlakyBackend::new(store));
    flaky.reads_fail.store(true, Ordering::SeqCst);

    let storage = Storage::new_memory();
    storage.put("tally", r#"{"optionA":7,"optionB":3}"#).unwrap();
    let coordinator = VoteCoordinator::new(storage)
        .unwrap()
        .with_remote(flaky.clone())
        .with_retry_policy(RetryPolicy::new(4, Duration::from_millis(1)));

    assert_eq!(coordinator.init().await.unwrap(), BackendMode::LocalFallback);
    assert_eq!(flaky.read_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(coordinator.state(), SessionState::Degraded(Tally::new(7, 3)));

    let outcome = coordinator.submit(VoteOption::A).await.unwrap();
    assert!(matches!(
        outcome,
        SubmitOutcome::Accepted {
            tally: Tally {
                option_a: 8,
                option_b: 3
            },
            recorded: true,
            ..
        }
    ));
    // Degraded sessions never touch the shared store.
    assert_eq!(flaky.read_attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_reinit_replaces_subscription() {
    let store = Arc::new(SharedBackend::in_memory());
    let coordinator = client(store.clone());
    coordinator.init().await.unwrap();
    coordinator.init().await.unwrap();

    eventually("old subscription to close", || store.watcher_count() == 1).await;
    assert!(coordinator.is_live());
}

#[tokio::test]
async fn test_push_during_in_flight_write_is_not_adopted() {
    let store = Arc::new(SharedBackend::in_memory());
    store.put(Tally::default()).unwrap();
    let gated = Arc::new(GatedBackend {
        store: store.clone(),
        write_started: Notify::new(),
        release: Notify::new(),
    });
    let coordinator = Arc::new(client(gated.clone()));
    coordinator.init().await.unwrap();

    let voting = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(VoteOption::A).await })
    };
    gated.write_started.notified().await;

    coordinator.on_remote_change(Tally::new(0, 5));
    assert_eq!(coordinator.tally(), Some(Tally::default()));
    assert_eq!(
        coordinator.submit(VoteOption::B).await.unwrap(),
        SubmitOutcome::Rejected(RejectReason::VoteInFlight)
    );

    gated.release.notify_one();
    let outcome = voting.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            option: VoteOption::A,
            tally: Tally::new(1, 0),
            recorded: true
        }
    );
    assert_eq!(coordinator.tally(), Some(Tally::new(1, 0)));
    assert_eq!(store.current().unwrap(), Some(Tally::new(1, 0)));
}

#[tokio::test]
async fn test_late_push_after_own_write_is_ignored() {
    let store = Arc::new(SharedBackend::in_memory());
    store.put(Tally::new(1, 0)).unwrap();
    let storage = Storage::new_memory();
    let coordinator = VoteCoordinator::new(storage.clone())
        .unwrap()
        .with_remote(store.clone());
    coordinator.init().await.unwrap();
    coordinator.submit(VoteOption::A).await.unwrap();
    assert_eq!(coordinator.tally(), Some(Tally::new(2, 0)));

    let (events, _handle) = recorder(&coordinator);
    coordinator.on_remote_change(Tally::new(1, 0));

    assert_eq!(coordinator.tally(), Some(Tally::new(2, 0)));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(
        storage.get_json::<Tally>("tally").unwrap(),
        Some(Tally::new(2, 0))
    );
}

#[tokio::test]
async fn test_push_during_in_flight_write_is_replayed_after() {
    let store = Arc::new(SharedBackend::in_memory());
    store.put(Tally::default()).unwrap();
    let gated = Arc::new(GatedBackend {
        store: store.clone(),
        write_started: Notify::new(),
        release: Notify::new(),
    });
    let coordinator = Arc::new(client(gated.clone()));
    coordinator.init().await.unwrap();
    let (events, _handle) = recorder(&coordinator);

    let voting = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.submit(VoteOption::A).await })
    };
    gated.write_started.notified().await;

    coordinator.on_remote_change(Tally::new(1, 3));
    assert_eq!(coordinator.tally(), Some(Tally::default()));
    assert!(events.lock().unwrap().is_empty());

    gated.release.notify_one();
    let outcome = voting.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        SubmitOutcome::Accepted {
            option: VoteOption::A,
            tally: Tally::new(1, 0),
            recorded: true
        }
    );
    assert_eq!(coordinator.tally(), Some(Tally::new(1, 3)));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            PollEvent::TallyChanged(Tally::new(1, 0)),
            PollEvent::VoteAccepted(VoteOption::A),
            PollEvent::TallyChanged(Tally::new(1, 3)),
        ]
    );
}
