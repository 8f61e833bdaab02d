//! Application state shared across all request handlers.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use shareport_config::ShareportConfig;
use shareport_core::{PathLocks, ShareRegistry};

use crate::router::CustomHandler;
use crate::shutdown::ShutdownCoordinator;

/// One registered custom handler.
///
/// The handler owns its URL prefix outright: the router forwards the raw
/// request and returns the response unmodified, with no path validation.
#[derive(Clone)]
pub struct CustomHandlerEntry {
    pub prefix: String,
    pub handler: Arc<dyn CustomHandler>,
    /// Hidden entries are omitted from the index page.
    pub hidden: bool,
}

/// Shared application state threaded through the router.
///
/// Wrapped in `Arc` and shared via Axum's `State` extractor.
pub struct AppState {
    /// Share table. Mutable at runtime through `add`/`remove`.
    pub registry: Arc<ShareRegistry>,
    /// Custom handlers, checked before the share table. Insertion order.
    pub custom_handlers: RwLock<Vec<CustomHandlerEntry>>,
    /// Per-path serialization of mutating operations.
    pub locks: PathLocks,
    /// Full configuration.
    pub config: ShareportConfig,
    /// Drain state machine; also consulted by the health endpoint.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server start time (for the uptime metric).
    pub start_time: Instant,
    /// Request counters for the health endpoint.
    pub total_requests: AtomicU64,
    pub total_uploads: AtomicU64,
    pub total_downloads: AtomicU64,
}

impl AppState {
    pub fn new(
        registry: Arc<ShareRegistry>,
        config: ShareportConfig,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            registry,
            custom_handlers: RwLock::new(Vec::new()),
            locks: PathLocks::new(),
            config,
            shutdown,
            start_time: Instant::now(),
            total_requests: AtomicU64::new(0),
            total_uploads: AtomicU64::new(0),
            total_downloads: AtomicU64::new(0),
        }
    }

    /// Register a custom handler under a URL prefix.
    ///
    /// The prefix must not collide with another handler. A share with the
    /// same name keeps working but becomes unreachable, since custom
    /// handlers win the dispatch; refuse that too.
    pub fn register_handler(
        &self,
        prefix: &str,
        handler: Arc<dyn CustomHandler>,
        hidden: bool,
    ) -> anyhow::Result<()> {
        if prefix.is_empty() || prefix.contains('/') {
            anyhow::bail!("Invalid handler prefix: {:?}", prefix);
        }
        if self.registry.lookup(prefix).is_ok() {
            anyhow::bail!("Prefix '{}' is already a share", prefix);
        }
        let mut handlers = self.custom_handlers.write().unwrap();
        if handlers.iter().any(|h| h.prefix == prefix) {
            anyhow::bail!("Handler prefix '{}' is already registered", prefix);
        }
        handlers.push(CustomHandlerEntry {
            prefix: prefix.to_string(),
            handler,
            hidden,
        });
        Ok(())
    }

    /// Remove a custom handler by prefix.
    pub fn unregister_handler(&self, prefix: &str) -> anyhow::Result<()> {
        let mut handlers = self.custom_handlers.write().unwrap();
        let idx = handlers
            .iter()
            .position(|h| h.prefix == prefix)
            .ok_or_else(|| anyhow::anyhow!("Handler prefix '{}' not found", prefix))?;
        handlers.remove(idx);
        Ok(())
    }

    /// Look up a custom handler for a first path segment.
    pub fn custom_handler(&self, prefix: &str) -> Option<Arc<dyn CustomHandler>> {
        self.custom_handlers
            .read()
            .unwrap()
            .iter()
            .find(|h| h.prefix == prefix)
            .map(|h| h.handler.clone())
    }

    /// Non-hidden custom handler prefixes, for the index page.
    pub fn visible_handler_prefixes(&self) -> Vec<String> {
        self.custom_handlers
            .read()
            .unwrap()
            .iter()
            .filter(|h| !h.hidden)
            .map(|h| h.prefix.clone())
            .collect()
    }
}
