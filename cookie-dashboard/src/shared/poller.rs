//! Polling controller for the metrics endpoint
//!
//! Fetches a snapshot once per interval, keeps the hourly cache warm, falls
//! back to it when a fetch fails, and publishes every state change over a
//! `watch` channel.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::cache::{Clock, HourlyCache, KeyValueStore, SystemClock};
use super::derived::{format_title, DerivedMetrics};
use super::error::FetchError;
use super::source::SnapshotSource;
use super::types::Snapshot;

/// How overlapping fetches are resolved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// A response older than the last applied one is discarded
    #[default]
    LatestDispatched,
    /// Whichever response resolves last wins, regardless of dispatch order
    LastResolved,
}

/// Poller configuration
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Metrics endpoint URL
    pub url: String,
    /// Interval between fetches
    pub poll_interval: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Location of the persistent cache file
    pub cache_path: PathBuf,
    /// Resolution of overlapping fetches
    pub overlap_policy: OverlapPolicy,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:5000/api/data".to_string(),
            poll_interval: Duration::from_millis(1000),
            request_timeout: Duration::from_secs(5),
            cache_path: PathBuf::from(".cookie_dashboard_cache.json"),
            overlap_policy: OverlapPolicy::default(),
        }
    }
}

impl PollerConfig {
    /// Create a new configuration with custom URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Build from `COOKIE_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: std::env::var("COOKIE_API_URL").unwrap_or(defaults.url),
            poll_interval: env_millis("COOKIE_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            request_timeout: env_millis("COOKIE_REQUEST_TIMEOUT_MS")
                .unwrap_or(defaults.request_timeout),
            cache_path: std::env::var("COOKIE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            overlap_policy: match std::env::var("COOKIE_OVERLAP_POLICY").as_deref() {
                Ok("last-resolved") => OverlapPolicy::LastResolved,
                _ => defaults.overlap_policy,
            },
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set cache file location
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Set overlap policy
    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

/// Where the current snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Live,
    Cache,
}

/// Everything the presentation layer needs, published on every change
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub snapshot: Option<Snapshot>,
    pub derived: Option<DerivedMetrics>,
    /// User-visible failure, set only when nothing can be shown
    pub error: Option<String>,
    /// True until the first fetch settles or a cached snapshot is adopted
    pub loading: bool,
    pub origin: Option<SnapshotOrigin>,
    pub title: Option<String>,
    /// Sequence number of the last applied live response
    pub applied_seq: u64,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            snapshot: None,
            derived: None,
            error: None,
            loading: true,
            origin: None,
            title: None,
            applied_seq: 0,
        }
    }
}

impl DashboardState {
    /// Make `snapshot` current and recompute everything derived from it
    pub fn adopt(&mut self, snapshot: Snapshot, origin: SnapshotOrigin) {
        self.derived = Some(DerivedMetrics::from_snapshot(&snapshot));
        self.title = Some(format_title(snapshot.cookie_count));
        self.snapshot = Some(snapshot);
        self.origin = Some(origin);
        self.error = None;
        self.loading = false;
    }

    /// Surface a failure
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(reason.into());
        self.loading = false;
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Periodically fetches snapshots and maintains [`DashboardState`]
pub struct PollingController<Src, S, C = SystemClock> {
    source: Src,
    cache: HourlyCache<S, C>,
    poll_interval: Duration,
    overlap_policy: OverlapPolicy,
    next_seq: AtomicU64,
    /// Bumped for every live snapshot applied, in apply order
    applied_revision: AtomicU64,
    /// Revision of the snapshot last written to the cache
    persisted_revision: Mutex<u64>,
    stopped: Arc<AtomicBool>,
    state_tx: watch::Sender<DashboardState>,
}

impl<Src, S, C> PollingController<Src, S, C>
where
    Src: SnapshotSource,
    S: KeyValueStore + 'static,
    C: Clock + 'static,
{
    pub fn new(source: Src, cache: HourlyCache<S, C>) -> Self {
        let (state_tx, _) = watch::channel(DashboardState::default());
        Self {
            source,
            cache,
            poll_interval: Duration::from_millis(1000),
            overlap_policy: OverlapPolicy::default(),
            next_seq: AtomicU64::new(0),
            applied_revision: AtomicU64::new(0),
            persisted_revision: Mutex::new(0),
            stopped: Arc::new(AtomicBool::new(false)),
            state_tx,
        }
    }

    /// Apply interval and overlap policy from a [`PollerConfig`]
    pub fn with_config(self, config: &PollerConfig) -> Self {
        self.with_poll_interval(config.poll_interval)
            .with_overlap_policy(config.overlap_policy)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.overlap_policy = policy;
        self
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<DashboardState> {
        self.state_tx.subscribe()
    }

    /// Copy of the current state
    pub fn state(&self) -> DashboardState {
        self.state_tx.borrow().clone()
    }

    pub fn cache(&self) -> &HourlyCache<S, C> {
        &self.cache
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Adopt a same-hour cached snapshot for first paint; returns true if one was found
    pub fn load_cached(&self) -> bool {
        let Some(cached) = self.cache.get() else {
            return false;
        };
        self.state_tx.send_if_modified(|state| {
            if state.has_snapshot() {
                return false;
            }
            state.adopt(cached, SnapshotOrigin::Cache);
            true
        })
    }

    /// Reserve the sequence number for a new fetch
    pub fn dispatch(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Fetch once and apply the result
    pub async fn poll_once(&self) -> bool {
        let seq = self.dispatch();
        let result = self.source.fetch().await;
        self.complete(seq, result)
    }

    /// Apply the outcome of fetch `seq`; returns true if state changed
    ///
    /// The cache write happens after the state lock is released, so readers
    /// of the `watch` channel never wait on disk I/O. It still runs on the
    /// calling thread; the store is one small file.
    pub fn complete(&self, seq: u64, result: Result<Snapshot, FetchError>) -> bool {
        if self.is_stopped() {
            debug!("Discarding response #{} after stop", seq);
            return false;
        }

        let policy = self.overlap_policy;
        let mut to_persist = None;
        let changed = self.state_tx.send_if_modified(|state| {
            let superseded =
                policy == OverlapPolicy::LatestDispatched && seq < state.applied_seq;

            match result {
                Ok(snapshot) => {
                    if superseded {
                        debug!(
                            "Discarding response #{} (already applied #{})",
                            seq, state.applied_seq
                        );
                        return false;
                    }
                    let revision = self.applied_revision.fetch_add(1, Ordering::Relaxed) + 1;
                    to_persist = Some((revision, snapshot.clone()));
                    state.adopt(snapshot, SnapshotOrigin::Live);
                    state.applied_seq = seq;
                    true
                }
                Err(error) => {
                    warn!("Error fetching data (#{}): {}", seq, error);
                    if superseded {
                        return false;
                    }
                    match self.cache.get() {
                        Some(cached) => {
                            debug!("Serving cached snapshot after failed fetch #{}", seq);
                            state.adopt(cached, SnapshotOrigin::Cache);
                            true
                        }
                        None if !state.has_snapshot() => {
                            state.fail(format!("Failed to fetch data: {}", error));
                            true
                        }
                        None => {
                            // Keep showing what we have
                            std::mem::replace(&mut state.loading, false)
                        }
                    }
                }
            }
        });

        if let Some((revision, snapshot)) = to_persist {
            self.persist(revision, &snapshot);
        }
        changed
    }

    /// Write `snapshot` unless a later-applied one is already in the cache
    fn persist(&self, revision: u64, snapshot: &Snapshot) {
        let mut persisted = self.persisted_revision.lock();
        if revision <= *persisted {
            debug!("Skipping cache write for superseded revision {}", revision);
            return;
        }
        self.cache.set(snapshot);
        *persisted = revision;
    }

    /// Load the cache for first paint, then poll on a fixed interval until stopped
    ///
    /// Fetches are fire-and-forget: each runs in its own task, so a slow
    /// response never delays the next tick.
    pub fn start(self: &Arc<Self>) -> PollerHandle {
        if self.load_cached() {
            info!("Loaded cached snapshot for first paint");
        }

        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            info!("Polling every {:?}", controller.poll_interval);
            let mut timer = interval(controller.poll_interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;

                let seq = controller.dispatch();
                let fetcher = Arc::clone(&controller);
                tokio::spawn(async move {
                    let result = fetcher.source.fetch().await;
                    fetcher.complete(seq, result);
                });
            }
        });

        PollerHandle {
            task,
            stopped: Arc::clone(&self.stopped),
        }
    }
}

/// Handle to a running poll loop
pub struct PollerHandle {
    task: JoinHandle<()>,
    stopped: Arc<AtomicBool>,
}

impl PollerHandle {
    /// Stop the timer; responses still in flight are discarded when they land
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            info!("Stopping poller");
        }
        self.task.abort();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
