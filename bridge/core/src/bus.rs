//! Command Bus - Duplex Queues Between Interpreter and Terminal
//!
//! The bus decouples a blocking interpreter from a polling HTTP client:
//!
//! ```text
//!   POST /session                                     GET /session
//!        │                                                 ▲
//!        ▼                                                 │
//!  enqueue_inbound ──► inbound channel          outbound queue ──► wait_for_outbound
//!                           │                         ▲
//!                     dispatch loop                   │
//!                           │                  enqueue_outbound
//!            ┌──────────────┼──────────────┐          │
//!            ▼              ▼              ▼          │
//!      interceptors   ConsumerRegistry   spawn_blocking(consumer) ──► interpreter
//!      (every cmd)    (LIFO, one-shot)
//! ```
//!
//! # Dispatch
//!
//! The dispatch loop handles inbound commands strictly in arrival order:
//! every interceptor sees the command (in registration order), then the most
//! recently registered consumer is fired. The consumer callback itself runs
//! on the blocking pool so that a consumer which blocks (or takes a long
//! time) never stalls intake of the next command.
//!
//! Panics inside interceptors and consumers are caught and logged. They are
//! counted in [`BusStats`] and never stop the loop.
//!
//! # Long Poll
//!
//! [`CommandBus::wait_for_outbound`] is a timed wait on a [`Notify`] paired
//! with the outbound queue. Worst-case latency is the bound itself.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, error, info, warn};

use crate::commands::{InboundCommand, OutboundCommand};
use crate::config::BusConfig;
use crate::consumer::{ConsumerHandle, ConsumerRegistry};

/// Callback observing every inbound command
pub type Interceptor = Arc<dyn Fn(&InboundCommand) + Send + Sync + 'static>;

/// Errors returned by bus operations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BusError {
    /// The bus has been shut down
    #[error("Command bus is shut down")]
    Closed,
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Default)]
struct Counters {
    inbound_enqueued: AtomicU64,
    dispatched: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    interceptor_failures: AtomicU64,
    consumer_failures: AtomicU64,
    outbound_enqueued: AtomicU64,
    outbound_delivered: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of bus activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Inbound commands accepted by `enqueue_inbound`
    pub inbound_enqueued: u64,
    /// Inbound commands taken off the channel by the dispatch loop
    pub dispatched: u64,
    /// Inbound commands handed to a consumer
    pub delivered: u64,
    /// Inbound commands dropped because no consumer was waiting
    pub dropped: u64,
    /// Interceptor invocations that panicked
    pub interceptor_failures: u64,
    /// Consumer callbacks that panicked
    pub consumer_failures: u64,
    /// Outbound commands accepted by `enqueue_outbound`
    pub outbound_enqueued: u64,
    /// Outbound commands handed to a poller
    pub outbound_delivered: u64,
}

// =============================================================================
// Bus
// =============================================================================

struct BusInner {
    config: BusConfig,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<InboundCommand>>>,
    outbound: Mutex<VecDeque<OutboundCommand>>,
    outbound_ready: Notify,
    outbound_drained: Notify,
    consumers: ConsumerRegistry,
    interceptors: RwLock<Vec<Interceptor>>,
    closed: AtomicBool,
    counters: Counters,
}

/// The duplex command bus
///
/// Cheap to clone; all clones share the same queues and registry.
#[derive(Clone)]
pub struct CommandBus {
    inner: Arc<BusInner>,
}

impl CommandBus {
    /// Create the bus and start its dispatch loop
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime; the dispatch loop is
    /// spawned onto the current runtime.
    #[must_use]
    pub fn start(config: BusConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(BusInner {
            config,
            inbound_tx: Mutex::new(Some(inbound_tx)),
            outbound: Mutex::new(VecDeque::new()),
            outbound_ready: Notify::new(),
            outbound_drained: Notify::new(),
            consumers: ConsumerRegistry::new(),
            interceptors: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
            counters: Counters::default(),
        });

        tokio::spawn(Self::dispatch_loop(Arc::clone(&inner), inbound_rx));
        info!(
            poll_timeout_ms = inner.config.poll_timeout_ms,
            "Command bus started"
        );

        Self { inner }
    }

    /// Get the bus configuration
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    // -------------------------------------------------------------------------
    // Inbound
    // -------------------------------------------------------------------------

    /// Queue a command from the client
    ///
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the bus has been shut down.
    pub fn enqueue_inbound(&self, cmd: InboundCommand) -> Result<(), BusError> {
        let guard = self.inner.inbound_tx.lock();
        let tx = guard.as_ref().ok_or(BusError::Closed)?;
        tx.send(cmd).map_err(|_| BusError::Closed)?;
        bump(&self.inner.counters.inbound_enqueued);
        Ok(())
    }

    /// Register a consumer for the next inbound command
    ///
    /// The consumer goes to the front of the registry, so it is served
    /// before every consumer registered earlier. The callback receives the
    /// command and the consumer's own handle; it runs on the blocking pool
    /// and may block.
    pub fn register_one_shot_consumer<F>(&self, callback: F) -> ConsumerHandle
    where
        F: FnOnce(InboundCommand, ConsumerHandle) + Send + 'static,
    {
        self.inner.consumers.register(Box::new(callback))
    }

    /// Add a standing callback run on every inbound command
    ///
    /// Interceptors run in registration order, before consumer selection,
    /// whether or not a consumer is waiting.
    pub fn add_interceptor<F>(&self, interceptor: F)
    where
        F: Fn(&InboundCommand) + Send + Sync + 'static,
    {
        self.inner.interceptors.write().push(Arc::new(interceptor));
    }

    /// Get the number of consumers waiting for input
    #[must_use]
    pub fn pending_consumers(&self) -> usize {
        self.inner.consumers.len()
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    /// Queue a command for the client
    ///
    /// Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] if the bus has been shut down.
    pub fn enqueue_outbound(&self, cmd: OutboundCommand) -> Result<(), BusError> {
        if self.is_shut_down() {
            return Err(BusError::Closed);
        }
        debug!(kind = cmd.kind(), "Outbound command queued");
        self.inner.outbound.lock().push_back(cmd);
        bump(&self.inner.counters.outbound_enqueued);
        self.inner.outbound_ready.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for the next outbound command
    ///
    /// Returns `None` when nothing became available in time. Commands are
    /// returned in enqueue order and each is returned to exactly one caller.
    pub async fn wait_for_outbound(&self, timeout: Duration) -> Option<OutboundCommand> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let notified = self.inner.outbound_ready.notified();
            tokio::pin!(notified);
            // Register before checking the queue so a push in between wakes us
            notified.as_mut().enable();

            if let Some(cmd) = self.pop_outbound() {
                return Some(cmd);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop_outbound();
            }
        }
    }

    /// Wait for the next outbound command using the configured poll bound
    pub async fn poll_outbound(&self) -> Option<OutboundCommand> {
        self.wait_for_outbound(self.inner.config.poll_timeout())
            .await
    }

    /// Get the number of outbound commands not yet picked up
    #[must_use]
    pub fn pending_outbound(&self) -> usize {
        self.inner.outbound.lock().len()
    }

    /// Wait until every queued outbound command has been picked up
    ///
    /// Returns immediately when the queue is already empty. Callers bound the
    /// wait themselves.
    pub async fn wait_for_outbound_drained(&self) {
        loop {
            let drained = self.inner.outbound_drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.pending_outbound() == 0 {
                return;
            }
            drained.await;
        }
    }

    fn pop_outbound(&self) -> Option<OutboundCommand> {
        let (cmd, now_empty) = {
            let mut queue = self.inner.outbound.lock();
            let cmd = queue.pop_front()?;
            (cmd, queue.is_empty())
        };
        bump(&self.inner.counters.outbound_delivered);
        if now_empty {
            self.inner.outbound_drained.notify_waiters();
        }
        Some(cmd)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Shut the bus down
    ///
    /// Closes the inbound channel (the dispatch loop exits once it drains),
    /// rejects further enqueues, and revokes every pending consumer so that
    /// blocked waiters observe closure. Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        drop(self.inner.inbound_tx.lock().take());
        let revoked = self.inner.consumers.revoke_all();
        self.inner.outbound_ready.notify_waiters();

        info!(revoked_consumers = revoked, "Command bus shut down");
    }

    /// Check if the bus has been shut down
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Get a snapshot of the activity counters
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let c = &self.inner.counters;
        BusStats {
            inbound_enqueued: c.inbound_enqueued.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            interceptor_failures: c.interceptor_failures.load(Ordering::Relaxed),
            consumer_failures: c.consumer_failures.load(Ordering::Relaxed),
            outbound_enqueued: c.outbound_enqueued.load(Ordering::Relaxed),
            outbound_delivered: c.outbound_delivered.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    async fn dispatch_loop(
        inner: Arc<BusInner>,
        mut inbound_rx: mpsc::UnboundedReceiver<InboundCommand>,
    ) {
        while let Some(cmd) = inbound_rx.recv().await {
            bump(&inner.counters.dispatched);
            Self::dispatch(&inner, cmd);
        }
        info!("Inbound channel closed, dispatch loop stopped");
    }

    fn dispatch(inner: &Arc<BusInner>, cmd: InboundCommand) {
        // Snapshot so interceptors can register more interceptors without deadlock
        let interceptors: Vec<Interceptor> = inner.interceptors.read().clone();
        for (index, interceptor) in interceptors.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| interceptor(&cmd))).is_err() {
                bump(&inner.counters.interceptor_failures);
                error!(interceptor = index, "Interceptor panicked; continuing dispatch");
            }
        }

        let Some((handle, callback)) = inner.consumers.take_head() else {
            bump(&inner.counters.dropped);
            debug!("No consumer waiting, inbound command dropped");
            return;
        };

        bump(&inner.counters.delivered);
        let consumer_id = handle.id();
        debug!(consumer_id = %consumer_id, "Dispatching inbound command");

        let inner = Arc::clone(inner);
        let spawned = tokio::runtime::Handle::try_current().map(|runtime| {
            runtime.spawn_blocking(move || {
                if catch_unwind(AssertUnwindSafe(|| callback(cmd, handle))).is_err() {
                    bump(&inner.counters.consumer_failures);
                    error!(consumer_id = %consumer_id, "Consumer panicked");
                }
            })
        });
        if spawned.is_err() {
            warn!(consumer_id = %consumer_id, "No runtime available to run consumer");
        }
    }
}

impl std::fmt::Debug for CommandBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBus")
            .field("pending_consumers", &self.pending_consumers())
            .field("pending_outbound", &self.pending_outbound())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
