//! Reconciliation loop: one cancelable periodic poller per resource kind.
//!
//! A `PollSession` fetches once immediately, then on a fixed interval, and
//! publishes every result through a `watch` channel. A successful fetch
//! replaces the published snapshot wholesale. A failed fetch republishes the
//! previous snapshot with the error attached and polling carries on.
//!
//! Forced refreshes (from the dispatcher) and timer ticks may overlap. The
//! one that completes last is what subscribers see; `Snapshot::seq` records
//! the order fetches were started in so a subscriber can tell.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::model::{ResourceKind, Snapshot};

mod kinds;

pub use kinds::{
    container_logs, containers, engine_overview, images, networks, volumes, LogSession,
};

/// Produces one complete fetch result per call.
pub type Fetcher<P> = Arc<dyn Fn() -> BoxFuture<'static, Result<P, EngineError>> + Send + Sync>;

/// Sustained reachability of the engine as seen by one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline {
        since: DateTime<Utc>,
        consecutive_failures: u32,
    },
}

impl Connectivity {
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// What subscribers observe after every tick.
#[derive(Debug)]
pub struct Published<P> {
    pub snapshot: Option<Arc<Snapshot<P>>>,   // last successful fetch
    pub last_error: Option<EngineError>,      // cleared by the next success
    pub connectivity: Connectivity,
}

impl<P> Clone for Published<P> {
    fn clone(&self) -> Self {
        Self {
            snapshot: self.snapshot.clone(),
            last_error: self.last_error.clone(),
            connectivity: self.connectivity.clone(),
        }
    }
}

impl<P> Default for Published<P> {
    fn default() -> Self {
        Self { snapshot: None, last_error: None, connectivity: Connectivity::Online }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Polling,
    Stopped,
}

struct Shared<P> {
    kind: ResourceKind,
    fetcher: Fetcher<P>,
    tx: watch::Sender<Published<P>>,
    stopped: Mutex<bool>,   // publish gate; flipped once by `stop`
    kill_flag: AtomicBool,  // lock-free read of the same fact before fetching
    seq: AtomicU64,
}

impl<P: Send + Sync + 'static> Shared<P> {
    fn gate(&self) -> MutexGuard<'_, bool> {
        match self.stopped.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// One fetch-and-publish. Returns false if the session was stopped.
    async fn reconcile(&self) -> bool {
        if self.kill_flag.load(Ordering::Acquire) {
            return false;
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let result = (self.fetcher)().await;
        self.publish(seq, result)
    }

    fn publish(&self, seq: u64, result: Result<P, EngineError>) -> bool {
        // Held across the send so `stop` cannot return while a publish is
        // half done.
        let stopped = self.gate();
        if *stopped {
            debug!(kind = %self.kind, seq, "dropping result of stopped session");
            return false;
        }

        let next = match result {
            Ok(data) => {
                debug!(kind = %self.kind, seq, "publishing snapshot");
                Published {
                    snapshot: Some(Arc::new(Snapshot { data, fetched_at: Utc::now(), seq })),
                    last_error: None,
                    connectivity: Connectivity::Online,
                }
            }
            Err(err) => {
                let prev = self.tx.borrow();
                let connectivity = if err.is_offline() {
                    match &prev.connectivity {
                        Connectivity::Offline { since, consecutive_failures } => {
                            Connectivity::Offline {
                                since: *since,
                                consecutive_failures: consecutive_failures + 1,
                            }
                        }
                        Connectivity::Online => Connectivity::Offline {
                            since: Utc::now(),
                            consecutive_failures: 1,
                        },
                    }
                } else {
                    Connectivity::Online
                };
                warn!(kind = %self.kind, seq, error = %err, "poll failed");
                let next = Published {
                    snapshot: prev.snapshot.clone(),
                    last_error: Some(err),
                    connectivity,
                };
                drop(prev);
                next
            }
        };
        self.tx.send_replace(next);
        true
    }
}

/// A periodic poller bound to one resource kind (or one container's logs).
///
/// `idle -> polling -> stopped`. Dropping the session stops it.
pub struct PollSession<P> {
    shared: Arc<Shared<P>>,
    task: Option<JoinHandle<()>>,
}

impl<P: Send + Sync + 'static> PollSession<P> {
    /// An idle session. Nothing is fetched until `start`.
    pub fn new(kind: ResourceKind, fetcher: Fetcher<P>) -> Self {
        let (tx, _) = watch::channel(Published::default());
        Self {
            shared: Arc::new(Shared {
                kind,
                fetcher,
                tx,
                stopped: Mutex::new(false),
                kill_flag: AtomicBool::new(false),
                seq: AtomicU64::new(0),
            }),
            task: None,
        }
    }

    /// Build and start in one go. Must be called inside a tokio runtime.
    pub fn spawn(kind: ResourceKind, period: Duration, fetcher: Fetcher<P>) -> Self {
        let mut session = Self::new(kind, fetcher);
        session.start(period);
        session
    }

    /// Fetch now, then every `period`. No-op unless the session is idle.
    pub fn start(&mut self, period: Duration) {
        if self.state() != SessionState::Idle {
            return;
        }
        let shared = Arc::clone(&self.shared);
        let period = period.max(Duration::from_millis(1));
        debug!(kind = %shared.kind, ?period, "poll session started");

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            // Late ticks are coalesced, never queued up behind a slow fetch.
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !shared.reconcile().await {
                    break;
                }
            }
        }));
    }

    /// Stop polling. Idempotent. Once this returns, nothing more is fetched
    /// by the session and nothing more is published, including the result of
    /// a fetch that was in flight.
    pub fn stop(&mut self) {
        {
            let mut stopped = self.shared.gate();
            if *stopped {
                return;
            }
            *stopped = true;
            self.shared.kill_flag.store(true, Ordering::Release);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!(kind = %self.shared.kind, "poll session stopped");
    }

    pub fn state(&self) -> SessionState {
        if self.shared.kill_flag.load(Ordering::Acquire) {
            SessionState::Stopped
        } else if self.task.is_some() {
            SessionState::Polling
        } else {
            SessionState::Idle
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.shared.kind
    }

    /// Receiver of every publication. Dropping it unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<Published<P>> {
        self.shared.tx.subscribe()
    }

    /// The current publication.
    pub fn latest(&self) -> Published<P> {
        self.shared.tx.borrow().clone()
    }

    /// Run one out-of-cycle fetch-and-publish and wait for it.
    pub async fn refresh(&self) -> bool {
        self.shared.reconcile().await
    }

    /// A cloneable handle that forces refreshes of this session.
    pub fn refresher(&self) -> Refresher<P> {
        Refresher { shared: Arc::clone(&self.shared) }
    }
}

impl<P> Drop for PollSession<P> {
    fn drop(&mut self) {
        // Same as `stop`, without the `P` bounds.
        match self.shared.stopped.lock() {
            Ok(mut stopped) => *stopped = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        self.shared.kill_flag.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Forces an out-of-cycle reconciliation of one session.
pub struct Refresher<P> {
    shared: Arc<Shared<P>>,
}

impl<P> Clone for Refresher<P> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<P: Send + Sync + 'static> Refresher<P> {
    pub fn kind(&self) -> ResourceKind {
        self.shared.kind
    }

    /// Fetch and publish now. Returns false if the session is stopped.
    pub async fn refresh(&self) -> bool {
        self.shared.reconcile().await
    }

    /// False once the session has been stopped or dropped.
    pub fn is_live(&self) -> bool {
        !self.shared.kill_flag.load(Ordering::Acquire)
    }
}
