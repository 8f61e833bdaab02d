//! Graceful-shutdown coordination: drain in-flight work, then force-close.
//!
//! The coordinator owns a monotonic state machine
//! `Running → Draining { deadline } → Closed`, published on a watch channel.
//! Every request acquires a [`ConnectionHandle`] that lives until the
//! response body has been fully written (the tracking middleware moves it
//! into the response stream), so long downloads keep the server draining.
//! Socket-level liveness comes from the per-listener [`Handle`]s, which also
//! close idle keep-alive connections as soon as draining starts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum_server::Handle;
use tokio::sync::watch;
use tokio::time::Instant;

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Listeners accept new connections.
    Running,
    /// New connections are refused; existing ones may finish until the
    /// deadline.
    Draining { deadline: Instant },
    /// Terminal. All connections are gone or were force-closed.
    Closed,
}

impl ShutdownState {
    /// Short name for logs and the health endpoint.
    pub fn name(&self) -> &'static str {
        match self {
            ShutdownState::Running => "running",
            ShutdownState::Draining { .. } => "draining",
            ShutdownState::Closed => "closed",
        }
    }
}

/// How often the drain loop re-checks connection counts.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Tracks in-flight work and enforces the bounded drain on shutdown.
pub struct ShutdownCoordinator {
    state_tx: watch::Sender<ShutdownState>,
    inflight: AtomicUsize,
    listeners: Mutex<Vec<Handle>>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("inflight", &self.inflight())
            .finish()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        let (state_tx, _) = watch::channel(ShutdownState::Running);
        Self {
            state_tx,
            inflight: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener handle so drain can observe and force-close its
    /// connections.
    pub fn register_listener(&self, handle: Handle) {
        self.listeners.lock().unwrap().push(handle);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ShutdownState {
        *self.state_tx.borrow()
    }

    /// Watch for state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state_tx.subscribe()
    }

    /// Register one unit of in-flight work. The returned handle must be
    /// held until the work (including response streaming) is done.
    pub fn track(self: &Arc<Self>) -> ConnectionHandle {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        ConnectionHandle {
            coordinator: self.clone(),
        }
    }

    /// In-flight work units.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::SeqCst)
    }

    fn live_connections(&self) -> usize {
        self.listeners
            .lock()
            .unwrap()
            .iter()
            .map(|h| h.connection_count())
            .sum()
    }

    fn idle(&self) -> bool {
        self.inflight() == 0 && self.live_connections() == 0
    }

    fn stop_accepting(&self) {
        for handle in self.listeners.lock().unwrap().iter() {
            // No duration: the deadline is enforced by the drain loop below.
            handle.graceful_shutdown(None);
        }
    }

    fn force_close(&self) {
        for handle in self.listeners.lock().unwrap().iter() {
            handle.shutdown();
        }
    }

    /// Run the drain protocol: stop accepting, wait up to `wait` for live
    /// connections to finish, force-close the rest, end `Closed`.
    ///
    /// Transitions are monotonic; a second call (or a call after `Closed`)
    /// returns immediately. Forced closes are the designed outcome of the
    /// deadline, not an error.
    pub async fn shutdown(&self, wait: Duration) {
        let deadline = Instant::now() + wait;
        let entered = self.state_tx.send_if_modified(|state| {
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining { deadline };
                true
            } else {
                false
            }
        });
        if !entered {
            return;
        }

        self.stop_accepting();
        tracing::info!(
            wait_secs = wait.as_secs_f64(),
            inflight = self.inflight(),
            "shutdown requested, draining connections"
        );

        loop {
            if self.idle() {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(
                    inflight = self.inflight(),
                    connections = self.live_connections(),
                    "drain deadline reached, force-closing remaining connections"
                );
                self.force_close();
                break;
            }
            tokio::time::sleep(DRAIN_POLL.min(deadline - now)).await;
        }

        self.state_tx.send_replace(ShutdownState::Closed);
        tracing::info!("shutdown complete");
    }
}

/// RAII accounting for one in-flight request.
///
/// Created when request processing begins; dropping it (handler return,
/// stream completion, client disconnect, task abort) deregisters the work.
#[derive(Debug)]
pub struct ConnectionHandle {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.coordinator.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}
