//! Vote coordinator: the only place the logical tally changes
//!
//! Increment protocol is read-modify-write with overwrite semantics:
//! 1. read the latest tally from the active backend (cached value on error)
//! 2. add one vote for the chosen option
//! 3. write the whole tally back
//! 4. adopt the written tally, or on failure an optimistic increment of the
//!    cached tally
//!
//! Two clients voting at the same moment can still lose one vote (last write
//! wins on the whole record). The in-flight flag only keeps a client from
//! racing with the echo of its own write.

use super::flag::VoteFlag;
use super::listeners::{ListenerHandle, ListenerRegistry, PollEvent};
use super::state::SessionState;
use crate::backend::{
    Backend, BackendMode, LocalBackend, RemoteBackend, Subscription, TallyCallback,
};
use crate::common::{ClientConfig, Error, Result, RetryPolicy, Storage, Tally, VoteOption};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of a vote request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted {
        option: VoteOption,
        tally: Tally,
        /// False when the backend write failed and the tally is optimistic
        recorded: bool,
    },
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyVoted { last_vote: Option<VoteOption> },
    /// This client's previous vote is still being written
    VoteInFlight,
}

struct Inner {
    state: SessionState,
    has_voted: bool,
    last_vote: Option<VoteOption>,
    write_in_flight: bool,
    /// Latest push that arrived while our own write was in flight
    deferred: Option<Tally>,
}

/// State reachable from backend callbacks
struct Shared {
    local: Arc<LocalBackend>,
    flag: VoteFlag,
    listeners: Arc<ListenerRegistry>,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mirror_locally(&self, tally: &Tally) {
        if let Err(e) = self.local.store(tally) {
            warn!(error = %e, "failed to cache tally locally");
        }
    }

    fn on_remote_change(&self, tally: Tally) {
        {
            let mut inner = self.lock();
            let Some(current) = inner.state.tally() else {
                debug!(tally = %tally, "ignoring push before init");
                return;
            };
            if inner.write_in_flight {
                debug!(tally = %tally, "deferring push while our write is in flight");
                inner.deferred = Some(tally);
                return;
            }
            if current == tally {
                return;
            }
            // Fan-out is asynchronous, so an older write can land after a newer one.
            if !tally.covers(&current) {
                debug!(tally = %tally, current = %current, "ignoring stale push");
                return;
            }
            inner.state = inner.state.with_tally(tally);
        }

        debug!(tally = %tally, "adopted pushed tally");
        self.mirror_locally(&tally);
        self.listeners.emit(&PollEvent::TallyChanged(tally));
    }
}

pub struct VoteCoordinator {
    shared: Arc<Shared>,
    remote: Option<Arc<dyn Backend>>,
    retry: RetryPolicy,
    subscription: Mutex<Option<Subscription>>,
}

impl std::fmt::Debug for VoteCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteCoordinator").finish_non_exhaustive()
    }
}

impl VoteCoordinator {
    /// Local-only coordinator over the client's storage. Use `with_remote` to
    /// attach a shared store before calling `init`.
    pub fn new(storage: Storage) -> Result<Self> {
        let flag = VoteFlag::new(storage.clone());
        let has_voted = flag.has_voted()?;
        let last_vote = flag.last_vote()?;

        Ok(Self {
            shared: Arc::new(Shared {
                local: Arc::new(LocalBackend::new(storage)),
                flag,
                listeners: ListenerRegistry::new(),
                inner: Mutex::new(Inner {
                    state: SessionState::Uninitialized,
                    has_voted,
                    last_vote,
                    write_in_flight: false,
                    deferred: None,
                }),
            }),
            remote: None,
            retry: RetryPolicy::default(),
            subscription: Mutex::new(None),
        })
    }

    /// Coordinator wired from client configuration: file-backed local state
    /// plus a `RemoteBackend` when a server URL is set.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let storage = Storage::new_file(config.state_file())?;
        let retry = RetryPolicy::new(
            config.init_attempts,
            Duration::from_millis(config.init_retry_delay_ms),
        )
        .with_attempt_timeout(config.init_timeout());

        let mut coordinator = Self::new(storage)?.with_retry_policy(retry);
        if let Some(remote) = RemoteBackend::from_config(config)? {
            coordinator = coordinator.with_remote(Arc::new(remote));
        }
        Ok(coordinator)
    }

    pub fn with_remote(mut self, remote: Arc<dyn Backend>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Policy for reaching the shared store during `init`
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Establish the session: `Synced` when the shared store answers,
    /// `Degraded` otherwise. Calling it again re-runs the decision and
    /// replaces the previous live subscription.
    pub async fn init(&self) -> Result<BackendMode> {
        let previous = self.lock_subscription().take();
        if let Some(old) = previous {
            old.unsubscribe();
        }

        if let Some(remote) = &self.remote {
            match self.connect_remote(remote.as_ref()).await {
                Ok(tally) => {
                    self.enter(SessionState::Synced(tally));
                    self.shared.mirror_locally(&tally);
                    match remote.subscribe(self.remote_callback()) {
                        Ok(sub) => *self.lock_subscription() = Some(sub),
                        Err(e) => warn!(error = %e, "live tally updates unavailable"),
                    }
                    info!(tally = %tally, "synced with shared store");
                    self.shared.listeners.emit(&PollEvent::TallyChanged(tally));
                    return Ok(BackendMode::Remote);
                }
                Err(e) => {
                    warn!(error = %e, "shared store unreachable, using local fallback");
                }
            }
        }

        let tally = match self.shared.local.load() {
            Ok(stored) => stored.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "local tally unreadable, starting from zero");
                Tally::default()
            }
        };
        self.enter(SessionState::Degraded(tally));
        info!(tally = %tally, "running on local fallback");
        self.shared.listeners.emit(&PollEvent::TallyChanged(tally));
        Ok(BackendMode::LocalFallback)
    }

    async fn connect_remote(&self, remote: &dyn Backend) -> Result<Tally> {
        let current = self.retry.run("read shared tally", || remote.read()).await?;
        match current {
            Some(tally) => Ok(tally),
            None => {
                let zero = Tally::default();
                info!("shared tally missing, initializing");
                self.retry
                    .run("initialize shared tally", || remote.write(zero))
                    .await?;
                Ok(zero)
            }
        }
    }

    fn enter(&self, state: SessionState) {
        let mut inner = self.shared.lock();
        inner.state = state;
        inner.deferred = None;
    }

    fn remote_callback(&self) -> TallyCallback {
        let shared = Arc::downgrade(&self.shared);
        Arc::new(move |tally| {
            if let Some(shared) = shared.upgrade() {
                shared.on_remote_change(tally);
            }
        })
    }

    fn lock_subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn backend_for(&self, mode: BackendMode) -> Result<Arc<dyn Backend>> {
        match mode {
            BackendMode::Remote => self.remote.clone().ok_or(Error::NotInitialized),
            BackendMode::LocalFallback => Ok(self.shared.local.clone() as Arc<dyn Backend>),
        }
    }

    /// Cast one vote for this client.
    ///
    /// Backend failures never surface here: the vote is counted locally
    /// (optimistically) and the session may drop to `Degraded`.
    pub async fn submit(&self, option: VoteOption) -> Result<SubmitOutcome> {
        let (cached, mode) = {
            let mut inner = self.shared.lock();
            if inner.has_voted {
                info!(option = %option, "vote rejected: already voted");
                return Ok(SubmitOutcome::Rejected(RejectReason::AlreadyVoted {
                    last_vote: inner.last_vote,
                }));
            }
            if inner.write_in_flight {
                return Ok(SubmitOutcome::Rejected(RejectReason::VoteInFlight));
            }
            let (Some(cached), Some(mode)) = (inner.state.tally(), inner.state.mode()) else {
                return Err(Error::NotInitialized);
            };
            inner.write_in_flight = true;
            (cached, mode)
        };

        let backend = match self.backend_for(mode) {
            Ok(backend) => backend,
            Err(e) => {
                self.shared.lock().write_in_flight = false;
                return Err(e);
            }
        };

        let base = match backend.read().await {
            Ok(Some(latest)) => latest,
            Ok(None) => Tally::default(),
            Err(e) => {
                warn!(error = %e, "read before vote failed, using cached tally");
                cached
            }
        };
        let proposed = base.incremented(option);

        let (adopted, recorded, degrade) = match backend.write(proposed).await {
            Ok(()) => (proposed, true, false),
            Err(e) => {
                let degrade = mode == BackendMode::Remote && e.is_unavailable();
                warn!(
                    error = %e,
                    mode = %mode,
                    degrade,
                    "vote write failed, counting it optimistically"
                );
                (cached.incremented(option), false, degrade)
            }
        };

        let replay = {
            let mut inner = self.shared.lock();
            inner.write_in_flight = false;
            inner.has_voted = true;
            inner.last_vote = Some(option);
            inner.state = if degrade {
                SessionState::Degraded(adopted)
            } else {
                inner.state.with_tally(adopted)
            };
            let deferred = inner.deferred.take();
            deferred.filter(|pushed| !degrade && *pushed != adopted && pushed.covers(&adopted))
        };

        if degrade {
            let dropped = self.lock_subscription().take();
            if let Some(sub) = dropped {
                sub.unsubscribe();
            }
        }
        if let Err(e) = self.shared.flag.record(option) {
            warn!(error = %e, "failed to persist vote flag");
        }
        if mode == BackendMode::Remote || !recorded {
            self.shared.mirror_locally(&adopted);
        }

        info!(option = %option, tally = %adopted, recorded, "vote accepted");
        self.shared.listeners.emit(&PollEvent::TallyChanged(adopted));
        self.shared.listeners.emit(&PollEvent::VoteAccepted(option));

        if let Some(pushed) = replay {
            self.shared.on_remote_change(pushed);
        }

        Ok(SubmitOutcome::Accepted {
            option,
            tally: adopted,
            recorded,
        })
    }

    /// Entry point for store pushes. Backends call this through the
    /// subscription; it is public so a presentation shell with its own
    /// transport can feed pushes in directly.
    pub fn on_remote_change(&self, tally: Tally) {
        self.shared.on_remote_change(tally);
    }

    /// Listen to every `PollEvent`
    pub fn subscribe(
        &self,
        listener: impl Fn(&PollEvent) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.shared.listeners.register(listener)
    }

    pub fn subscribe_to_tally_updates(
        &self,
        listener: impl Fn(Tally) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.shared.listeners.register(move |event| {
            if let PollEvent::TallyChanged(tally) = event {
                listener(*tally);
            }
        })
    }

    pub fn on_vote_accepted(
        &self,
        listener: impl Fn(VoteOption) + Send + Sync + 'static,
    ) -> ListenerHandle {
        self.shared.listeners.register(move |event| {
            if let PollEvent::VoteAccepted(option) = event {
                listener(*option);
            }
        })
    }

    pub fn has_voted_already(&self) -> bool {
        self.shared.lock().has_voted
    }

    /// Option to highlight on later steps
    pub fn last_vote(&self) -> Option<VoteOption> {
        self.shared.lock().last_vote
    }

    pub fn tally(&self) -> Option<Tally> {
        self.shared.lock().state.tally()
    }

    pub fn mode(&self) -> Option<BackendMode> {
        self.shared.lock().state.mode()
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// Whether a live subscription to the shared store is running
    pub fn is_live(&self) -> bool {
        self.lock_subscription()
            .as_ref()
            .is_some_and(Subscription::is_active)
    }
}
