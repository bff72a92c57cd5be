/// Run coordinator - fans a check run out over every configured protocol
///
/// The coordinator:
/// - Reads the protocol list and the current local status once per run
/// - Probes all protocols concurrently, each bounded by its own timeouts
/// - Persists every new result
/// - Calls the registered listeners once per transition into `Connected`
pub mod listener;
pub mod notify;

pub use listener::{ListenerId, TransitionListener};
pub use notify::{LogSink, NotificationSink, SubscriberNotifier, WebhookSink};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::models::{CheckResult, CheckStatus, ProtocolConfig};
use crate::probe::Checker;
use crate::store::{StatusStore, StoreError};

/// Tally of one `run_once`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub checked: usize,
    pub connected: usize,
    pub disconnected: usize,
    pub errors: usize,
    /// Transitions into `Connected` seen in this run
    pub notified: usize,
}

impl RunSummary {
    fn record(&mut self, status: CheckStatus, notified: bool) {
        self.checked += 1;
        match status {
            CheckStatus::Connected => self.connected += 1,
            CheckStatus::Disconnected => self.disconnected += 1,
            CheckStatus::Error => self.errors += 1,
        }
        if notified {
            self.notified += 1;
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "checked {} (connected {}, disconnected {}, error {}), {} notified",
            self.checked, self.connected, self.disconnected, self.errors, self.notified
        )
    }
}

type Listeners = Vec<(ListenerId, Arc<dyn TransitionListener>)>;

pub struct RunCoordinator {
    store: Arc<dyn StatusStore>,
    checker: Arc<dyn Checker>,
    listeners: RwLock<Listeners>,
    next_listener: AtomicU64,
    stop_tx: watch::Sender<bool>,
}

impl RunCoordinator {
    pub fn new(store: Arc<dyn StatusStore>, checker: Arc<dyn Checker>) -> Self {
        let (stop_tx, _stop_rx) = watch::channel(false);
        Self {
            store,
            checker,
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            stop_tx,
        }
    }

    /// Add a listener; listeners run in registration order
    pub fn register(&self, listener: Arc<dyn TransitionListener>) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().unwrap_or_else(PoisonError::into_inner).push((id, listener));
        id
    }

    /// Remove a listener; true if it was registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn listeners_snapshot(&self) -> Listeners {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Check every protocol once
    ///
    /// Only failing to read the protocol list or the status snapshot fails
    /// the run; per-protocol failures are logged and contained.
    pub async fn run_once(&self) -> Result<RunSummary, StoreError> {
        let protocols = self.store.list_protocols().await?;
        // Snapshot taken before any write of this run
        let previous = self.store.local_status().await?;
        let listeners = self.listeners_snapshot();

        info!(protocols = protocols.len(), "Starting check run");

        let outcomes = join_all(protocols.iter().map(|config| {
            self.check_and_update(config, previous.get(&config.id), &listeners)
        }))
        .await;

        let mut summary = RunSummary::default();
        for (status, notified) in outcomes {
            summary.record(status, notified);
        }

        info!("Check run finished: {}", summary);
        Ok(summary)
    }

    async fn check_and_update(
        &self,
        config: &ProtocolConfig,
        previous: Option<&CheckResult>,
        listeners: &Listeners,
    ) -> (CheckStatus, bool) {
        let result = self.checker.check(config).await.into_result(&config.id);
        debug!(
            protocol = %config.id,
            status = %result.status,
            latency_ms = ?result.latency_ms,
            "Check completed"
        );

        if let Err(e) = self.store.update_local_status(result.clone()).await {
            error!(protocol = %config.id, "Failed to persist check result: {}", e);
        }

        let previous_status = previous.map(|r| r.status);
        if previous_status == Some(result.status) {
            return (result.status, false);
        }

        info!(
            protocol = %config.id,
            from = previous_status.map(|s| s.as_str()).unwrap_or("none"),
            to = %result.status,
            "Protocol status changed"
        );

        if !result.is_connected() {
            return (result.status, false);
        }

        self.notify_listeners(previous, &result, config, listeners).await;
        (result.status, true)
    }

    async fn notify_listeners(
        &self,
        old: Option<&CheckResult>,
        new: &CheckResult,
        config: &ProtocolConfig,
        listeners: &Listeners,
    ) {
        for (id, listener) in listeners {
            let call = AssertUnwindSafe(listener.on_transition(old, new, config)).catch_unwind();
            match call.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(protocol = %config.id, listener = id.0, "Listener failed: {:#}", e),
                Err(_) => error!(protocol = %config.id, listener = id.0, "Listener panicked"),
            }
        }
    }

    /// Run until [`stop`](Self::stop) is called, waiting `interval` between runs
    ///
    /// The stop signal is observed between runs; a run in progress completes.
    pub async fn run_forever(&self, interval: Duration) {
        let mut stop_rx = self.stop_tx.subscribe();
        info!(interval_secs = interval.as_secs(), "Run loop started");

        loop {
            let stopped = *stop_rx.borrow();
            if stopped {
                break;
            }

            if let Err(e) = self.run_once().await {
                error!("Check run failed: {}", e);
            }

            tokio::select! {
                _ = sleep(interval) => {}
                _ = stop_rx.changed() => {}
            }
        }

        info!("Run loop stopped");
    }

    /// Ask `run_forever` to return after the current run
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }
}
