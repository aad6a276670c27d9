use std::sync::{Arc, Weak};

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::events::{
    Event, EventBus, EventKind, FilterApply, Highlight, SelectionBrush, SelectionChange,
    SelectionClear, Subscription,
};
use crate::store::{SetOptions, Store};
use crate::value::{Object, Value};

const FILTERS_KEY: &str = "filters";

/// A rendered panel (scatter, heatmap, table, track...) that mirrors shared state.
///
/// Handlers are only invoked for events the view did not originate itself.
pub trait ViewAdapter: Send + Sync {
    /// Identifier the view passes as `source` when it emits
    fn view_id(&self) -> &str;

    fn on_selection_change(&self, _change: &SelectionChange) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_selection_clear(&self, _clear: &SelectionClear) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_selection_brush(&self, _brush: &SelectionBrush) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_highlight_show(&self, _highlight: &Highlight) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_highlight_hide(&self, _highlight: &Highlight) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_filter_apply(&self, _filters: &FilterApply) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Synchronization settings for a specific view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewSyncSettings {
    /// Whether this view participates in selection sync
    pub sync_selection: bool,

    /// Whether this view participates in highlight sync
    pub sync_highlight: bool,

    /// Whether this view participates in filter sync
    pub sync_filters: bool,
}

impl Default for ViewSyncSettings {
    fn default() -> Self {
        Self {
            sync_selection: true,
            sync_highlight: true,
            sync_filters: true,
        }
    }
}

struct ConnectedView {
    view: Weak<dyn ViewAdapter>,
    settings: ViewSyncSettings,
    subscriptions: Vec<Subscription>,
}

type ViewRegistry = Arc<RwLock<AHashMap<String, ConnectedView>>>;

/// Connects views to the bus and routes shared events to them
pub struct SyncManager {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    views: ViewRegistry,
}

impl SyncManager {
    /// Create a new synchronization manager
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self {
            store,
            bus,
            views: Arc::new(RwLock::new(AHashMap::new())),
        }
    }

    /// Subscribe a view to selection, highlight and filter events.
    ///
    /// The view is held weakly; once it is dropped its handlers become no-ops
    /// and [`SyncManager::prune`] removes it. Events whose `source` is the
    /// view's own id are never delivered back to it. Connecting an id twice
    /// replaces the earlier registration.
    pub fn connect(&self, view: &Arc<dyn ViewAdapter>, settings: ViewSyncSettings) {
        self.prune();
        let view_id = view.view_id().to_string();
        self.disconnect(&view_id);

        let subscriptions = [
            EventKind::SelectionChange,
            EventKind::SelectionClear,
            EventKind::SelectionBrush,
            EventKind::HighlightShow,
            EventKind::HighlightHide,
            EventKind::FilterApply,
        ]
        .into_iter()
        .map(|kind| {
            let weak_view = Arc::downgrade(view);
            let views = Arc::downgrade(&self.views);
            let view_id = view_id.clone();
            self.bus.on(kind, move |event| {
                if event.is_echo_for(&view_id) {
                    return Ok(());
                }
                let Some(views) = views.upgrade() else {
                    return Ok(());
                };
                let Some(settings) = views.read().get(&view_id).map(|v| v.settings) else {
                    return Ok(());
                };
                match weak_view.upgrade() {
                    Some(view) => dispatch(view.as_ref(), settings, event),
                    None => Ok(()),
                }
            })
        })
        .collect();

        debug!(view = %view_id, "view connected");
        self.views.write().insert(
            view_id,
            ConnectedView {
                view: Arc::downgrade(view),
                settings,
                subscriptions,
            },
        );
    }

    /// Unregister a view
    pub fn disconnect(&self, view_id: &str) -> bool {
        let removed = self.views.write().remove(view_id);
        match removed {
            Some(connected) => {
                for subscription in &connected.subscriptions {
                    subscription.unsubscribe();
                }
                debug!(view = %view_id, "view disconnected");
                true
            }
            None => false,
        }
    }

    /// Drop registrations of views that no longer exist
    pub fn prune(&self) -> usize {
        let dead: Vec<String> = self
            .views
            .read()
            .iter()
            .filter(|(_, connected)| connected.view.strong_count() == 0)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &dead {
            self.disconnect(id);
        }
        dead.len()
    }

    pub fn view_count(&self) -> usize {
        self.views.read().len()
    }

    pub fn update_settings(&self, view_id: &str, settings: ViewSyncSettings) -> bool {
        match self.views.write().get_mut(view_id) {
            Some(connected) => {
                connected.settings = settings;
                true
            }
            None => false,
        }
    }

    /// Check if a view should sync selection
    pub fn should_sync_selection(&self, view_id: &str) -> bool {
        self.settings(view_id).sync_selection
    }

    /// Check if a view should sync highlight
    pub fn should_sync_highlight(&self, view_id: &str) -> bool {
        self.settings(view_id).sync_highlight
    }

    /// Check if a view should sync filters
    pub fn should_sync_filters(&self, view_id: &str) -> bool {
        self.settings(view_id).sync_filters
    }

    fn settings(&self, view_id: &str) -> ViewSyncSettings {
        self.views
            .read()
            .get(view_id)
            .map(|v| v.settings)
            .unwrap_or_default()
    }

    /// Merge `filters` into the `filters.*` keys as one undo step and announce
    /// them. Returns the number of filter keys that changed.
    pub fn apply_filters(&self, filters: Object, source: &str) -> Result<usize> {
        let updates: Vec<(String, Value)> = filters
            .iter()
            .map(|(name, value)| (format!("{FILTERS_KEY}.{name}"), value.clone()))
            .collect();

        let changed = self.store.batch(updates, SetOptions::default())?;
        if changed > 0 {
            self.bus.emit(Event::FilterApply(FilterApply {
                filters,
                source: source.to_string(),
            }));
        }
        Ok(changed)
    }

    /// Current filter values
    pub fn filters(&self) -> Object {
        self.store
            .get(FILTERS_KEY)
            .and_then(|value| value.as_object().cloned())
            .unwrap_or_default()
    }
}

fn dispatch(view: &dyn ViewAdapter, settings: ViewSyncSettings, event: &Event) -> anyhow::Result<()> {
    match event {
        Event::SelectionChange(change) if settings.sync_selection => view.on_selection_change(change),
        Event::SelectionClear(clear) if settings.sync_selection => view.on_selection_clear(clear),
        Event::SelectionBrush(brush) if settings.sync_selection => view.on_selection_brush(brush),
        Event::HighlightShow(highlight) if settings.sync_highlight => view.on_highlight_show(highlight),
        Event::HighlightHide(highlight) if settings.sync_highlight => view.on_highlight_hide(highlight),
        Event::FilterApply(filters) if settings.sync_filters => view.on_filter_apply(filters),
        _ => Ok(()),
    }
}
