//! In-process event bus backed by `tokio::sync::broadcast` channels.
//!
//! [`EventBus`] keeps one bounded channel per [`MessageKind`]. Publishing
//! never blocks: a subscriber that falls more than `capacity` messages behind
//! loses the oldest ones, and its [`Subscription`] counts the loss, logs it
//! and records it to the dead-letter queue.
//!
//! Shared via `Arc<EventBus>` between the dispatcher and every worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;

use crate::dlq::{DeadLetterQueue, DlqMessage};
use crate::event::{BusMessage, MessageKind};

/// Default per-subscriber queue length.
pub const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Event bus is closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

#[derive(Default)]
struct KindCounters {
    published: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct BusStats {
    task: KindCounters,
    email_queued: KindCounters,
}

impl BusStats {
    fn counters(&self, kind: MessageKind) -> &KindCounters {
        match kind {
            MessageKind::Task => &self.task,
            MessageKind::EmailQueued => &self.email_queued,
        }
    }
}

/// Point-in-time counters for one message kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStatsSnapshot {
    pub published: u64,
    pub dropped: u64,
    pub subscribers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStatsSnapshot {
    pub closed: bool,
    pub kinds: Vec<(MessageKind, KindStatsSnapshot)>,
}

impl BusStatsSnapshot {
    pub fn kind(&self, kind: MessageKind) -> KindStatsSnapshot {
        self.kinds
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, s)| *s)
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// In-process fan-out bus.
///
/// ```rust
/// use agora_events::bus::EventBus;
/// use agora_events::event::{BusMessage, MessageKind};
///
/// let bus = EventBus::new(16);
/// let _sub = bus.subscribe(MessageKind::EmailQueued, "email-queue");
/// assert_eq!(bus.publish(BusMessage::EmailQueued), Ok(1));
/// ```
pub struct EventBus {
    capacity: usize,
    senders: Mutex<HashMap<MessageKind, broadcast::Sender<BusMessage>>>,
    closed: AtomicBool,
    stats: Arc<BusStats>,
    dead_letters: Option<Arc<dyn DeadLetterQueue>>,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            senders: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            stats: Arc::new(BusStats::default()),
            dead_letters: None,
        }
    }

    /// Record dropped messages to `dlq`.
    pub fn with_dead_letters(mut self, dlq: Arc<dyn DeadLetterQueue>) -> Self {
        self.dead_letters = Some(dlq);
        self
    }

    fn sender(&self, kind: MessageKind) -> broadcast::Sender<BusMessage> {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders
            .entry(kind)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Subscribe to one kind of message.
    ///
    /// `name` identifies the consumer in logs and dead-letter records. A
    /// subscription taken after [`shutdown`](Self::shutdown) is already
    /// closed.
    pub fn subscribe(&self, kind: MessageKind, name: impl Into<String>) -> Subscription {
        let receiver = if self.is_closed() {
            broadcast::channel(1).1
        } else {
            self.sender(kind).subscribe()
        };
        Subscription {
            name: name.into(),
            kind,
            receiver,
            stats: Arc::clone(&self.stats),
            dead_letters: self.dead_letters.clone(),
        }
    }

    /// Deliver `message` to every live subscriber of its kind.
    ///
    /// Returns the number of subscribers reached; zero is not an error.
    pub fn publish(&self, message: BusMessage) -> Result<usize, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }
        let kind = message.kind();
        self.stats
            .counters(kind)
            .published
            .fetch_add(1, Ordering::Relaxed);
        // A send error only means there are no receivers right now.
        Ok(self.sender(kind).send(message).unwrap_or(0))
    }

    /// Close the bus. Subscribers drain what is already queued, then see the end.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        tracing::info!("Event bus shut down");
    }

    /// Accept publishes again after a [`shutdown`](Self::shutdown).
    ///
    /// Subscriptions taken before the shutdown stay closed.
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
        tracing::info!("Event bus reopened");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> BusStatsSnapshot {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        let kinds = MessageKind::ALL
            .iter()
            .map(|&kind| {
                let counters = self.stats.counters(kind);
                (
                    kind,
                    KindStatsSnapshot {
                        published: counters.published.load(Ordering::Relaxed),
                        dropped: counters.dropped.load(Ordering::Relaxed),
                        subscribers: senders.get(&kind).map_or(0, |s| s.receiver_count()),
                    },
                )
            })
            .collect();
        BusStatsSnapshot {
            closed: self.is_closed(),
            kinds,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// One consumer's queue. Dropping it unsubscribes.
pub struct Subscription {
    name: String,
    kind: MessageKind,
    receiver: broadcast::Receiver<BusMessage>,
    stats: Arc<BusStats>,
    dead_letters: Option<Arc<dyn DeadLetterQueue>>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Next message, or `None` once the bus is shut down and the queue is empty.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.record_drop(skipped).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!(subscriber = %self.name, "Event bus closed");
                    return None;
                }
            }
        }
    }

    async fn record_drop(&self, skipped: u64) {
        self.stats
            .counters(self.kind)
            .dropped
            .fetch_add(skipped, Ordering::Relaxed);
        tracing::warn!(
            subscriber = %self.name,
            kind = %self.kind,
            skipped,
            "Subscriber lagged, oldest messages dropped"
        );
        if let Some(dlq) = &self.dead_letters {
            let message = DlqMessage::new(format!(
                "bus subscriber {} dropped {skipped} {} message(s)",
                self.name, self.kind
            ));
            if let Err(e) = dlq.record(&message).await {
                tracing::error!(error = %e, subscriber = %self.name, "Failed to record bus drop");
            }
        }
    }
}
