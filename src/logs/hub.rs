//! Bounded log history with typed observers.

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::{AppError, Result};

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    /// Arrival order, starting at 1.
    pub seq: u64,
    /// Line text without the trailing newline.
    #[serde(rename = "line")]
    pub text: String,
    /// Time the hub received the line.
    pub timestamp: DateTime<Utc>,
}

/// Receives every line appended to a [`LogHub`].
///
/// Called with the hub lock held, so implementations must not block and
/// must not call back into the hub. Errors and panics are contained by the
/// hub and never reach the producer.
pub trait LogObserver: Send + Sync {
    /// Handle one line.
    ///
    /// # Errors
    ///
    /// Any error is logged at debug level and otherwise ignored.
    fn on_line(&self, line: &LogLine) -> Result<()>;
}

/// Identifier returned by [`LogHub::subscribe`].
pub type ObserverId = u64;

struct HubState {
    next_seq: u64,
    next_observer: ObserverId,
    lines: VecDeque<LogLine>,
    observers: HashMap<ObserverId, Arc<dyn LogObserver>>,
}

/// Fixed-capacity ring of recent lines plus a fan-out registry.
///
/// The ring and the observer map share one mutex, so a line is recorded
/// and delivered in the same critical section: observers see lines in
/// arrival order, and a subscriber never misses a line that arrives after
/// its `subscribe` call returns.
pub struct LogHub {
    capacity: usize,
    state: Mutex<HubState>,
}

impl std::fmt::Debug for LogHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("LogHub")
            .field("capacity", &self.capacity)
            .field("lines", &state.lines.len())
            .field("observers", &state.observers.len())
            .finish()
    }
}

impl LogHub {
    /// Create an empty hub holding at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            state: Mutex::new(HubState {
                next_seq: 1,
                next_observer: 1,
                lines: VecDeque::with_capacity(capacity),
                observers: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ring capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record `text` and deliver it to every observer.
    pub fn append(&self, text: impl Into<String>) -> LogLine {
        let mut state = self.lock();

        let line = LogLine {
            seq: state.next_seq,
            text: text.into(),
            timestamp: Utc::now(),
        };
        state.next_seq = state.next_seq.saturating_add(1);

        if state.lines.len() == self.capacity {
            state.lines.pop_front();
        }
        state.lines.push_back(line.clone());

        for (id, observer) in &state.observers {
            match catch_unwind(AssertUnwindSafe(|| observer.on_line(&line))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => debug!(observer = id, %err, "log observer rejected line"),
                Err(_) => debug!(observer = id, "log observer panicked"),
            }
        }

        line
    }

    /// Register an observer for future lines.
    pub fn subscribe(&self, observer: Arc<dyn LogObserver>) -> ObserverId {
        let mut state = self.lock();
        let id = state.next_observer;
        state.next_observer += 1;
        state.observers.insert(id, observer);
        id
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.lock().observers.remove(&id).is_some()
    }

    /// Number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.lock().observers.len()
    }

    /// Subscribe a bounded channel.
    ///
    /// Lines that arrive while the channel is full are dropped for this
    /// subscriber only. The returned guard unsubscribes when dropped.
    pub fn subscribe_channel(
        self: &Arc<Self>,
        buffer: usize,
    ) -> (Subscription, mpsc::Receiver<LogLine>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let id = self.subscribe(Arc::new(ChannelObserver { tx }));
        let guard = Subscription {
            hub: Arc::downgrade(self),
            id,
        };
        (guard, rx)
    }

    /// The last `n` lines in arrival order.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<LogLine> {
        let state = self.lock();
        let skip = state.lines.len().saturating_sub(n);
        state.lines.iter().skip(skip).cloned().collect()
    }
}

/// Forwards lines into a bounded `mpsc` channel.
struct ChannelObserver {
    tx: mpsc::Sender<LogLine>,
}

impl LogObserver for ChannelObserver {
    fn on_line(&self, line: &LogLine) -> Result<()> {
        self.tx
            .try_send(line.clone())
            .map_err(|err| AppError::Io(format!("subscriber channel: {err}")))
    }
}

/// Unsubscribes its observer when dropped.
#[derive(Debug)]
pub struct Subscription {
    hub: Weak<LogHub>,
    id: ObserverId,
}

impl Subscription {
    /// Observer id held by this guard.
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
