//! Synchronous publish/subscribe hub shared by every view
//!
//! Listeners run on the emitting thread, in registration order, before
//! [`EventBus::emit`] returns. The listener list is snapshotted first, so a
//! listener that subscribes or unsubscribes while an event is being delivered
//! only affects later emissions. A failing listener is logged and skipped; it
//! never blinds the listeners after it.

mod event;

pub use event::{
    DatasetLoaded, Event, EventKind, FilterApply, Highlight, SelectionBrush, SelectionChange,
    SelectionClear, StateChange,
};

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::CoreConfig;

/// Identifier of a registered listener or watcher
pub type SubscriptionId = Uuid;

/// Callback signature for bus listeners
pub type Listener = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Handle returned by every registration.
///
/// `unsubscribe` removes exactly the registration it was returned for and is
/// safe to call more than once. Dropping the handle leaves the registration in
/// place.
pub struct Subscription {
    id: SubscriptionId,
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            cancel: Mutex::new(Some(Box::new(cancel))),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.lock().take() {
            cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.lock().is_some()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// One entry of the emission history
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub name: String,
    pub event: Event,
    pub timestamp: DateTime<Utc>,
}

struct ListenerEntry {
    id: SubscriptionId,
    callback: Listener,
    once: bool,
    fired: AtomicBool,
}

type ListenerMap = AHashMap<EventKind, Vec<Arc<ListenerEntry>>>;

/// System-wide event bus
pub struct EventBus {
    listeners: Arc<Mutex<ListenerMap>>,
    history: Mutex<VecDeque<EventRecord>>,
    max_history: usize,
}

impl EventBus {
    /// Create a new event bus keeping the last 100 emissions
    pub fn new() -> Self {
        Self::with_history_limit(CoreConfig::default().max_event_history)
    }

    pub fn with_history_limit(max_history: usize) -> Self {
        Self {
            listeners: Arc::new(Mutex::new(AHashMap::new())),
            history: Mutex::new(VecDeque::with_capacity(max_history)),
            max_history,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::with_history_limit(config.max_event_history)
    }

    /// Register a listener for every event of `kind`
    pub fn on<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(callback), false)
    }

    /// Register a listener that removes itself after its first invocation
    pub fn once<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(kind, Arc::new(callback), true)
    }

    fn register(&self, kind: EventKind, callback: Listener, once: bool) -> Subscription {
        let id = Uuid::new_v4();
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push(Arc::new(ListenerEntry {
                id,
                callback,
                once,
                fired: AtomicBool::new(false),
            }));

        let listeners = Arc::downgrade(&self.listeners);
        Subscription::new(id, move || {
            if let Some(listeners) = listeners.upgrade() {
                remove_listener(&listeners, kind, id);
            }
        })
    }

    /// Deliver `event` to every listener registered for its kind
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        let name = event.name();

        self.record(&name, &event);

        let snapshot: Vec<Arc<ListenerEntry>> = self
            .listeners
            .lock()
            .get(&kind)
            .cloned()
            .unwrap_or_default();

        debug!(event = %name, listeners = snapshot.len(), "emit");

        for entry in snapshot {
            if entry.once {
                if entry.fired.swap(true, Ordering::SeqCst) {
                    continue;
                }
                remove_listener(&self.listeners, kind, entry.id);
            }

            isolate(&name, entry.id, || (entry.callback)(&event));
        }
    }

    /// Remove every listener of one kind
    pub fn off(&self, kind: EventKind) {
        self.listeners.lock().remove(&kind);
    }

    /// Remove every listener
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Emissions still held in the history ring, oldest first
    pub fn history(&self) -> Vec<EventRecord> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    fn record(&self, name: &str, event: &Event) {
        if self.max_history == 0 {
            return;
        }
        let mut history = self.history.lock();
        while history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(EventRecord {
            name: name.to_string(),
            event: event.clone(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn remove_listener(listeners: &Mutex<ListenerMap>, kind: EventKind, id: SubscriptionId) {
    let mut listeners = listeners.lock();
    if let Some(entries) = listeners.get_mut(&kind) {
        entries.retain(|entry| entry.id != id);
        if entries.is_empty() {
            listeners.remove(&kind);
        }
    }
}

/// Run one subscriber callback, logging instead of propagating its failure
pub(crate) fn isolate<F>(context: &str, id: SubscriptionId, callback: F)
where
    F: FnOnce() -> anyhow::Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            error!(context = %context, subscriber = %id, "subscriber failed: {err:#}");
        }
        Err(payload) => {
            error!(
                context = %context,
                subscriber = %id,
                "subscriber panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn clear_event(source: &str) -> Event {
        Event::SelectionClear(SelectionClear {
            id_space: None,
            source: source.to_string(),
        })
    }

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            bus.on(EventKind::SelectionClear, move |_| {
                order.lock().push(n);
                Ok(())
            });
        }

        bus.emit(clear_event("table"));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let sub = bus.on(EventKind::SelectionClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let other_calls = Arc::new(AtomicUsize::new(0));
        let counter = other_calls.clone();
        bus.on(EventKind::SelectionClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());

        bus.emit(clear_event("table"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(other_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(EventKind::SelectionClear), 1);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        bus.once(EventKind::SelectionClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(clear_event("a"));
        bus.emit(clear_event("b"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(EventKind::SelectionClear), 0);
    }

    #[test]
    fn test_once_unsubscribed_before_emit() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let sub = bus.once(EventKind::SelectionClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        sub.unsubscribe();

        bus.emit(clear_event("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failing_listeners_do_not_block_others() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));

        bus.on(EventKind::SelectionClear, |_| anyhow::bail!("heatmap exploded"));
        bus.on(EventKind::SelectionClear, |_| panic!("table exploded"));
        let counter = calls.clone();
        bus.on(EventKind::SelectionClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(clear_event("scatter"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscribing_during_emit_affects_next_pass_only() {
        let bus = Arc::new(EventBus::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let inner_bus = Arc::downgrade(&bus);
        let counter = late_calls.clone();
        bus.once(EventKind::SelectionClear, move |_| {
            if let Some(bus) = inner_bus.upgrade() {
                let counter = counter.clone();
                bus.on(EventKind::SelectionClear, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
            }
            Ok(())
        });

        bus.emit(clear_event("a"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        bus.emit(clear_event("b"));
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribing_during_emit_affects_next_pass_only() {
        let bus = EventBus::new();
        let second_calls = Arc::new(AtomicUsize::new(0));
        let second: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let target = second.clone();
        bus.on(EventKind::SelectionClear, move |_| {
            if let Some(subscription) = target.lock().as_ref() {
                subscription.unsubscribe();
            }
            Ok(())
        });
        let counter = second_calls.clone();
        *second.lock() = Some(bus.on(EventKind::SelectionClear, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        bus.emit(clear_event("a"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count(EventKind::SelectionClear), 1);

        bus.emit(clear_event("b"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let bus = EventBus::with_history_limit(3);
        for n in 0..5 {
            bus.emit(clear_event(&format!("view-{n}")));
        }

        let history = bus.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].event.source(), Some("view-2"));
        assert_eq!(history[2].name, "selection:clear");

        bus.clear_history();
        assert!(bus.history().is_empty());
    }

    #[test]
    fn test_off_and_clear() {
        let bus = EventBus::new();
        bus.on(EventKind::SelectionClear, |_| Ok(()));
        bus.on(EventKind::HighlightHide, |_| Ok(()));

        bus.off(EventKind::SelectionClear);
        assert_eq!(bus.listener_count(EventKind::SelectionClear), 0);
        assert_eq!(bus.listener_count(EventKind::HighlightHide), 1);

        bus.clear();
        assert_eq!(bus.listener_count(EventKind::HighlightHide), 0);
    }
}
