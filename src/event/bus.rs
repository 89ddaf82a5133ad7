use super::{Cancellable, EventKind, PacketEvent};
use log::{error, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// The result of an observer callback. Errors are logged and do not stop the
/// remaining observers from running.
pub type ObserverResult = Result<(), failure::Error>;

type Observer = Arc<dyn for<'a, 'b> Fn(&'b mut PacketEvent<'a>) -> ObserverResult + Send + Sync>;

/// The order in which observers run. Lower priorities run first, so higher
/// priorities get the final say on cancellation. `Monitor` observers run last
/// and should only watch the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Runs first
    Lowest,
    /// Runs after `Lowest`
    Low,
    /// The default priority
    Normal,
    /// Runs after `Normal`
    High,
    /// Runs after `High`
    Highest,
    /// Runs last
    Monitor,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A handle used to unsubscribe an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: EventKind,
    priority: Priority,
    ignore_cancelled: bool,
    observer: Observer,
}

/// A synchronous publish/subscribe bus for packet events. Publishing may
/// happen concurrently from many connections.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: RwLock<Vec<Subscription>>,
}

impl EventBus {
    /// Create a bus without observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of the given kind. Observers with
    /// `ignore_cancelled` set are skipped while the event is cancelled.
    pub fn subscribe<F>(
        &self,
        kind: EventKind,
        priority: Priority,
        ignore_cancelled: bool,
        observer: F,
    ) -> SubscriptionId
    where
        F: for<'a, 'b> Fn(&'b mut PacketEvent<'a>) -> ObserverResult + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        // keep the list sorted by priority, in subscription order within one
        let index = subscriptions
            .iter()
            .position(|s| s.priority > priority)
            .unwrap_or_else(|| subscriptions.len());
        subscriptions.insert(
            index,
            Subscription {
                id,
                kind,
                priority,
                ignore_cancelled,
                observer: Arc::new(observer),
            },
        );

        id
    }

    /// Subscribe to received packets at normal priority
    pub fn on_inbound<F>(&self, observer: F) -> SubscriptionId
    where
        F: for<'a, 'b> Fn(&'b mut PacketEvent<'a>) -> ObserverResult + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Inbound, Priority::Normal, false, observer)
    }

    /// Subscribe to sent packets at normal priority
    pub fn on_outbound<F>(&self, observer: F) -> SubscriptionId
    where
        F: for<'a, 'b> Fn(&'b mut PacketEvent<'a>) -> ObserverResult + Send + Sync + 'static,
    {
        self.subscribe(EventKind::Outbound, Priority::Normal, false, observer)
    }

    /// Remove an observer, returning whether it was subscribed
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// The number of observers for the given kind of event
    pub fn observers(&self, kind: EventKind) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == kind)
            .count()
    }

    /// Deliver an event to every observer of its kind before returning. A
    /// failing observer is logged and skipped.
    pub fn publish(&self, event: &mut PacketEvent) {
        // snapshot so observers may subscribe or unsubscribe while running
        let observers = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.kind == event.kind())
            .map(|s| (s.ignore_cancelled, Arc::clone(&s.observer)))
            .collect::<Vec<_>>();

        for (ignore_cancelled, observer) in observers {
            if ignore_cancelled && event.is_cancelled() {
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| observer(&mut *event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(
                    "Observer failed handling {} event for {}: {}",
                    event.kind(),
                    event.packet(),
                    e
                ),
                Err(panic) => error!(
                    "Observer panicked handling {} event for {}: {}",
                    event.kind(),
                    event.packet(),
                    panic_message(&panic)
                ),
            }
        }
    }
}

/// The message a panic was raised with, if it has one
pub(crate) fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
