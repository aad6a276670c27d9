//! Reactive state container
//!
//! The [`Store`] is the single owner of coordination state. Keys are dotted
//! paths into a tree of [`Value`]s. Every write goes through [`Store::set`] or
//! [`Store::batch`]:
//!
//! * writing a value deep-equal to the current one is a no-op,
//! * all writes of a call land before any watcher runs,
//! * watchers of a key and of each of its ancestors are notified,
//! * computed values depending on the key are invalidated (recomputed lazily),
//! * the change is recorded for undo unless asked otherwise.
//!
//! No lock is held while watchers run, so watchers may read or write the store.

mod computed;
mod history;

pub use history::{Change, HistoryEntry};

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::events::{isolate, Event, EventBus, StateChange, Subscription, SubscriptionId};
use crate::value::{self, Object, Value};

use computed::Computed;
use history::{History, Replay};

/// Per-write flags
#[derive(Debug, Clone, Copy)]
pub struct SetOptions {
    /// Skip watcher and bus notification
    pub silent: bool,
    /// Append an undo entry
    pub record_history: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            silent: false,
            record_history: true,
        }
    }
}

impl SetOptions {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn untracked() -> Self {
        Self {
            record_history: false,
            ..Self::default()
        }
    }
}

/// Watcher callback: `(new_value, old_value, changed_key)`
pub type Watcher = Arc<dyn Fn(Option<&Value>, Option<&Value>, &str) -> anyhow::Result<()> + Send + Sync>;

struct WatcherEntry {
    id: SubscriptionId,
    keys: Vec<String>,
    callback: Watcher,
}

impl WatcherEntry {
    /// A watcher on `a` fires for changes to `a` and to anything below it
    fn matches(&self, changed: &str) -> bool {
        self.keys.iter().any(|key| value::is_within(changed, key))
    }
}

pub struct Store {
    state: RwLock<Object>,
    history: Mutex<History>,
    watchers: Arc<Mutex<Vec<Arc<WatcherEntry>>>>,
    computed: Mutex<AHashMap<String, Computed>>,
    bus: Option<Arc<EventBus>>,
}

impl Store {
    /// Empty store with the default history depth and no bus
    pub fn new() -> Self {
        Self::with_max_history(CoreConfig::default().max_store_history)
    }

    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            state: RwLock::new(Object::new()),
            history: Mutex::new(History::new(max_history)),
            watchers: Arc::new(Mutex::new(Vec::new())),
            computed: Mutex::new(AHashMap::new()),
            bus: None,
        }
    }

    pub fn from_config(config: &CoreConfig, bus: Arc<EventBus>) -> Self {
        Self::with_max_history(config.max_store_history).with_bus(bus)
    }

    /// Also publish `state:<key>` and reset events on `bus`
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Seed initial state without notifications or history
    pub fn with_state(self, initial: Object) -> Self {
        *self.state.write() = initial;
        self
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        value::get_path(&self.state.read(), key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        value::get_path(&self.state.read(), key).is_some()
    }

    /// Borrow a value in place instead of cloning it
    pub fn with<R>(&self, key: &str, f: impl FnOnce(Option<&Value>) -> R) -> R {
        let state = self.state.read();
        f(value::get_path(&state, key))
    }

    /// Clone of the whole state tree
    pub fn snapshot(&self) -> Object {
        self.state.read().clone()
    }

    /// Write one key. Returns `Ok(false)` when the value was already equal.
    pub fn set(&self, key: &str, value: Value, options: SetOptions) -> Result<bool> {
        let change = {
            let mut state = self.state.write();
            let old = value::get_path(&state, key).cloned();
            if old.as_ref() == Some(&value) {
                return Ok(false);
            }
            let created = value::missing_ancestor(&state, key);
            value::set_path(&mut state, key, value.clone())?;
            Change::new(key, old, Some(value)).creating(created)
        };

        if options.record_history {
            self.history.lock().push(HistoryEntry::Single(change.clone()));
        }
        self.settle(vec![change], options.silent);
        Ok(true)
    }

    /// Write several keys as one undo step. Every write lands before any
    /// watcher runs. On an invalid path nothing is written. Returns the
    /// number of keys that actually changed.
    pub fn batch<K, I>(&self, updates: I, options: SetOptions) -> Result<usize>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let changes = {
            let mut state = self.state.write();
            let mut changes: Vec<Change> = Vec::new();
            for (key, value) in updates {
                let key = key.into();
                let old = value::get_path(&state, &key).cloned();
                if old.as_ref() == Some(&value) {
                    continue;
                }
                let created = value::missing_ancestor(&state, &key);
                if let Err(err) = value::set_path(&mut state, &key, value.clone()) {
                    for done in changes.iter().rev() {
                        restore(&mut state, done);
                    }
                    return Err(err);
                }
                changes.push(Change::new(key, old, Some(value)).creating(created));
            }
            changes
        };

        if changes.is_empty() {
            return Ok(0);
        }
        let count = changes.len();
        if options.record_history {
            self.history.lock().push(HistoryEntry::batch(changes.clone()));
        }
        self.settle(changes, options.silent);
        Ok(count)
    }

    /// Watch one or more keys. Watching a parent path also reports changes
    /// to its descendants.
    pub fn watch<K, I, F>(&self, keys: I, callback: F) -> Subscription
    where
        K: Into<String>,
        I: IntoIterator<Item = K>,
        F: Fn(Option<&Value>, Option<&Value>, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = Uuid::new_v4();
        self.watchers.lock().push(Arc::new(WatcherEntry {
            id,
            keys: keys.into_iter().map(Into::into).collect(),
            callback: Arc::new(callback),
        }));

        let watchers = Arc::downgrade(&self.watchers);
        Subscription::new(id, move || {
            if let Some(watchers) = watchers.upgrade() {
                watchers.lock().retain(|w| w.id != id);
            }
        })
    }

    /// Declare a derived value. It is computed on first read and cached until
    /// one of `deps` (or a path above or below one of them) changes.
    pub fn computed<F>(&self, name: &str, compute: F, deps: &[&str])
    where
        F: Fn(&Object) -> Value + Send + Sync + 'static,
    {
        let deps = deps.iter().map(|d| d.to_string()).collect();
        self.computed
            .lock()
            .insert(name.to_string(), Computed::new(Arc::new(compute), deps));
    }

    /// Current value of a computed property, recomputing only if invalidated
    pub fn get_computed(&self, name: &str) -> Option<Value> {
        let compute = {
            let computed = self.computed.lock();
            let entry = computed.get(name)?;
            if let Some(cached) = entry.cached() {
                return Some(cached.clone());
            }
            entry.function()
        };

        let value = compute(&*self.state.read());
        if let Some(entry) = self.computed.lock().get_mut(name) {
            entry.store(value.clone());
        }
        Some(value)
    }

    pub fn undo(&self) -> Result<bool> {
        let writes = match self.history.lock().peek_undo() {
            Some(entry) => entry.undo_writes(),
            None => return Ok(false),
        };
        self.apply_without_history(writes)?;
        self.history.lock().commit_undo();
        Ok(true)
    }

    pub fn redo(&self) -> Result<bool> {
        let writes = match self.history.lock().peek_redo() {
            Some(entry) => entry.redo_writes(),
            None => return Ok(false),
        };
        self.apply_without_history(writes)?;
        self.history.lock().commit_redo();
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().can_redo()
    }

    /// Entries currently held (undoable plus redoable)
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    /// Replace the whole state. History is dropped, every computed value is
    /// invalidated and a single reset event is published instead of per-key
    /// notifications.
    pub fn reset(&self, initial: Object) {
        *self.state.write() = initial;
        self.history.lock().clear();
        for entry in self.computed.lock().values_mut() {
            entry.invalidate();
        }
        debug!("store reset");
        if let Some(bus) = &self.bus {
            bus.emit(Event::StateReset);
        }
    }

    /// Serialize the state, tagging sets and maps
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&Value::Object(self.snapshot()))?)
    }

    /// Replace the state with a document produced by [`Store::to_json`].
    /// Parse errors are returned untouched and leave the store as it was.
    pub fn load_json(&self, json: &str) -> Result<()> {
        let parsed: Value = serde_json::from_str(json)?;
        match parsed {
            Value::Object(state) => {
                self.reset(state);
                Ok(())
            }
            other => Err(CoreError::Json(serde::de::Error::custom(format!(
                "expected a JSON object at the root, found {}",
                other.to_json()
            )))),
        }
    }

    /// Replays history writes. Never records history, always notifies.
    fn apply_without_history(&self, writes: Vec<Replay>) -> Result<()> {
        let changes = {
            let mut state = self.state.write();
            let mut changes: Vec<Change> = Vec::new();
            for Replay { key, value, created } in writes {
                let old = value::get_path(&state, &key).cloned();
                if old == value {
                    continue;
                }
                let missing = value::missing_ancestor(&state, &key);
                let applied = match value.clone() {
                    Some(value) => value::set_path(&mut state, &key, value).map(|_| ()),
                    None => {
                        value::remove_created(&mut state, &key, created.as_deref());
                        Ok(())
                    }
                };
                if let Err(err) = applied {
                    warn!(key = %key, "history replay failed: {err}");
                    for done in changes.iter().rev() {
                        restore(&mut state, done);
                    }
                    return Err(err);
                }
                changes.push(Change::new(key, old, value).creating(missing));
            }
            changes
        };
        self.settle(changes, false);
        Ok(())
    }

    /// Post-write bookkeeping shared by every mutation path
    fn settle(&self, changes: Vec<Change>, silent: bool) {
        {
            let mut computed = self.computed.lock();
            for change in &changes {
                for entry in computed.values_mut() {
                    if entry.depends_on(&change.key) {
                        entry.invalidate();
                    }
                }
            }
        }

        if silent {
            return;
        }
        for change in changes {
            self.notify(change);
        }
    }

    fn notify(&self, change: Change) {
        debug!(key = %change.key, "state changed");

        let watchers: Vec<Arc<WatcherEntry>> = self
            .watchers
            .lock()
            .iter()
            .filter(|w| w.matches(&change.key))
            .cloned()
            .collect();

        for watcher in watchers {
            isolate(&change.key, watcher.id, || {
                (watcher.callback)(
                    change.new_value.as_ref(),
                    change.old_value.as_ref(),
                    &change.key,
                )
            });
        }

        if let Some(bus) = &self.bus {
            bus.emit(Event::StateChange(StateChange {
                key: change.key,
                new_value: change.new_value,
                old_value: change.old_value,
            }));
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

/// Undo a partially applied write while the state lock is held
fn restore(state: &mut Object, change: &Change) {
    match &change.old_value {
        Some(old) => {
            // The path existed before this call, so it is writable again
            let _ = value::set_path(state, &change.key, old.clone());
        }
        None => {
            value::remove_created(state, &change.key, change.created.as_deref());
        }
    }
}
