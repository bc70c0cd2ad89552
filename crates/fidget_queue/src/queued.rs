use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fidget_core::{Message, TargetId};

/// Opaque handle returned by `add_msg`, used to remove the message later.
///
/// Handles are never reused within one daemon, and their order is the
/// queue's insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageHandle(pub(crate) u64);

impl MessageHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

/// Daemon-side bookkeeping kept next to an immutable message.
#[derive(Debug, Default)]
pub(crate) struct DispatchStats {
    count: AtomicU64,
    /// 0 means never dispatched; ticks start at 1.
    last_tick: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn record(&self, tick: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.last_tick.store(tick, Ordering::Relaxed);
    }
}

/// A live message as seen through traversal, search and tick reports.
///
/// Cheap to clone; it shares the message and its bookkeeping with the queue.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    handle: MessageHandle,
    message: Arc<Message>,
    stats: Arc<DispatchStats>,
}

impl QueuedMessage {
    pub(crate) fn new(handle: MessageHandle, message: Message) -> Self {
        Self {
            handle,
            message: Arc::new(message),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    pub fn handle(&self) -> MessageHandle {
        self.handle
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn target(&self) -> &TargetId {
        self.message.target()
    }

    pub fn weight(&self) -> u32 {
        self.message.weight()
    }

    /// Number of successful dispatches so far.
    pub fn dispatch_count(&self) -> u64 {
        self.stats.count.load(Ordering::Relaxed)
    }

    /// Tick of the most recent successful dispatch.
    pub fn last_dispatched_tick(&self) -> Option<u64> {
        match self.stats.last_tick.load(Ordering::Relaxed) {
            0 => None,
            t => Some(t),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.message.label()
    }

    pub(crate) fn record_dispatch(&self, tick: u64) {
        self.stats.record(tick);
    }

    pub(crate) fn into_message(self) -> Arc<Message> {
        self.message
    }
}

/// `msg#3 (scratches head)`, or just `msg#3` for an unlabelled message.
impl fmt::Display for QueuedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => write!(f, "{} ({})", self.handle, label),
            None => write!(f, "{}", self.handle),
        }
    }
}
