//! Consumer Registry - One-Shot Input Waits
//!
//! A consumer represents one pending interpreter wait for "the next line".
//! The registry keeps pending consumers in registration order, newest first,
//! and hands the head to the dispatch loop.
//!
//! # State Token
//!
//! ```text
//!                 take_head()
//!        ┌──────────────────────────► Fired
//!  Pending
//!        └──────────────────────────► Revoked
//!                 ConsumerHandle::revoke()
//! ```
//!
//! Both transitions are a compare-exchange on the same atomic and happen
//! while holding the registry lock, so a consumer is either fired or
//! revoked, never both, and its callback runs at most once.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::commands::InboundCommand;

/// Callback run when a consumer fires
pub type ConsumerCallback = Box<dyn FnOnce(InboundCommand, ConsumerHandle) + Send + 'static>;

/// Unique identifier for a registered consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(u64);

impl ConsumerId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer-{}", self.0)
    }
}

/// Lifecycle state of a consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsumerState {
    /// Registered and waiting for input
    Pending,
    /// Selected by dispatch; the callback has been (or is being) run
    Fired,
    /// Removed before it fired
    Revoked,
}

impl ConsumerState {
    const PENDING: u8 = 0;
    const FIRED: u8 = 1;
    const REVOKED: u8 = 2;

    fn from_u8(raw: u8) -> Self {
        match raw {
            Self::PENDING => Self::Pending,
            Self::FIRED => Self::Fired,
            _ => Self::Revoked,
        }
    }
}

struct ConsumerSlot {
    id: ConsumerId,
    state: AtomicU8,
    callback: Mutex<Option<ConsumerCallback>>,
}

impl ConsumerSlot {
    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(
                ConsumerState::PENDING,
                to,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Revocation handle for a registered consumer
///
/// Returned to whoever registered the consumer and also passed to the
/// callback when it fires. Dropping the handle does not revoke the consumer.
#[derive(Clone)]
pub struct ConsumerHandle {
    slot: Arc<ConsumerSlot>,
    registry: Weak<Mutex<VecDeque<Arc<ConsumerSlot>>>>,
}

impl ConsumerHandle {
    /// Get the consumer's identifier
    #[must_use]
    pub fn id(&self) -> ConsumerId {
        self.slot.id
    }

    /// Get the consumer's current state
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.slot.state.load(Ordering::Acquire))
    }

    /// Check if the consumer is still waiting for input
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state() == ConsumerState::Pending
    }

    /// Remove the consumer from the registry
    ///
    /// Returns true if this call revoked a pending consumer. Revoking a
    /// consumer that already fired or was already revoked is a no-op.
    pub fn revoke(&self) -> bool {
        let Some(entries) = self.registry.upgrade() else {
            // Registry is gone, nothing can fire this consumer any more
            let revoked = self.slot.transition(ConsumerState::REVOKED);
            if revoked {
                self.slot.callback.lock().take();
            }
            return revoked;
        };

        let callback = {
            let mut entries = entries.lock();
            if !self.slot.transition(ConsumerState::REVOKED) {
                return false;
            }
            entries.retain(|slot| slot.id != self.slot.id);
            self.slot.callback.lock().take()
        };

        // Dropped outside the lock; callbacks may own channel senders
        drop(callback);
        tracing::debug!(consumer_id = %self.slot.id, "Consumer revoked");
        true
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("id", &self.slot.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Ordered set of pending consumers, newest first
///
/// All mutation is serialized by one mutex.
#[derive(Clone, Default)]
pub struct ConsumerRegistry {
    entries: Arc<Mutex<VecDeque<Arc<ConsumerSlot>>>>,
}

impl ConsumerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer at the front of the list
    pub fn register(&self, callback: ConsumerCallback) -> ConsumerHandle {
        let slot = Arc::new(ConsumerSlot {
            id: ConsumerId::next(),
            state: AtomicU8::new(ConsumerState::PENDING),
            callback: Mutex::new(Some(callback)),
        });

        self.entries.lock().push_front(Arc::clone(&slot));
        tracing::debug!(consumer_id = %slot.id, "Consumer registered");

        ConsumerHandle {
            slot,
            registry: Arc::downgrade(&self.entries),
        }
    }

    /// Fire the most recently registered pending consumer
    ///
    /// Removes the head of the list, marks it fired and returns its handle
    /// together with its callback. Returns `None` if nothing is pending.
    pub fn take_head(&self) -> Option<(ConsumerHandle, ConsumerCallback)> {
        let mut entries = self.entries.lock();
        while let Some(slot) = entries.pop_front() {
            if !slot.transition(ConsumerState::FIRED) {
                continue;
            }
            let Some(callback) = slot.callback.lock().take() else {
                continue;
            };
            let handle = ConsumerHandle {
                slot,
                registry: Arc::downgrade(&self.entries),
            };
            return Some((handle, callback));
        }
        None
    }

    /// Revoke every pending consumer, dropping their callbacks
    ///
    /// Returns the number of consumers revoked.
    pub fn revoke_all(&self) -> usize {
        let drained: Vec<Arc<ConsumerSlot>> = self.entries.lock().drain(..).collect();
        let mut revoked = 0;
        for slot in drained {
            if slot.transition(ConsumerState::REVOKED) {
                drop(slot.callback.lock().take());
                revoked += 1;
            }
        }
        revoked
    }

    /// Get the number of pending consumers
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if no consumer is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl fmt::Debug for ConsumerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerRegistry")
            .field("pending", &self.len())
            .finish()
    }
}
