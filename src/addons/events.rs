//! Event channel for add-on lifecycle notifications.
//!
//! Every subscriber owns an unbounded queue, so no subscriber misses an
//! event published after it subscribed, and events arrive in the order they
//! were published.

use super::types::AddonError;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::trace;

/// Lifecycle event for one add-on.
#[derive(Debug, Clone)]
pub enum AddonEvent {
    /// Download progress, fraction in `[0, 1]` as reported by the transport.
    Progress { id: String, fraction: f64 },
    /// Archive unpacked into the install directory.
    Unpacked { id: String },
    /// Installation finished.
    Succeeded { id: String },
    /// Installation failed.
    Failed { id: String, error: Arc<AddonError> },
}

impl AddonEvent {
    /// Returns the add-on ID the event belongs to.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Progress { id, .. }
            | Self::Unpacked { id }
            | Self::Succeeded { id }
            | Self::Failed { id, .. } => id,
        }
    }

    /// Returns true for success and failure events.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }
}

/// Sending side of one subscription.
#[derive(Debug)]
struct Subscriber {
    tx: UnboundedSender<AddonEvent>,
    /// Only events for this add-on are queued.
    item: Option<String>,
}

impl Subscriber {
    fn wants(&self, event: &AddonEvent) -> bool {
        self.item.as_deref().is_none_or(|id| event.id() == id)
    }
}

/// Publishes add-on events to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventChannel {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl EventChannel {
    /// Creates a channel with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.register(None)
    }

    /// Subscribes to events for one add-on.
    ///
    /// Events for other add-ons are never queued for this subscriber.
    #[must_use]
    pub fn subscribe_to(&self, id: impl Into<String>) -> Subscription {
        self.register(Some(id.into()))
    }

    fn register(&self, item: Option<String>) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { tx, item });
        Subscription { rx, filter: None }
    }

    /// Publishes an event to every live subscriber.
    ///
    /// Subscribers whose receiving side was dropped are pruned.
    pub fn publish(&self, event: AddonEvent) {
        trace!("[ADDON-EVENTS] {:?}", event);
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| {
            if sub.wants(&event) {
                sub.tx.send(event.clone()).is_ok()
            } else {
                !sub.tx.is_closed()
            }
        });
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| !sub.tx.is_closed());
        subscribers.len()
    }
}

/// Receiving side of an [`EventChannel`] subscription.
#[derive(Debug)]
pub struct Subscription {
    rx: UnboundedReceiver<AddonEvent>,
    filter: Option<String>,
}

impl Subscription {
    /// Restricts this subscription to events for one add-on.
    #[must_use]
    pub fn for_item(mut self, id: impl Into<String>) -> Self {
        self.filter = Some(id.into());
        self
    }

    fn accepts(&self, event: &AddonEvent) -> bool {
        self.filter.as_deref().is_none_or(|id| event.id() == id)
    }

    /// Waits for the next event. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<AddonEvent> {
        while let Some(event) = self.rx.recv().await {
            if self.accepts(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Returns the next queued event without waiting.
    pub fn try_recv(&mut self) -> Option<AddonEvent> {
        while let Ok(event) = self.rx.try_recv() {
            if self.accepts(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Converts the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = AddonEvent> + Send + Unpin {
        let filter = self.filter;
        UnboundedReceiverStream::new(self.rx)
            .filter(move |event| filter.as_deref().is_none_or(|id| event.id() == id))
    }
}
