//! Selection manager
//!
//! Turns view gestures into selection-set transitions according to the active
//! [`SelectionMode`], stores the result in the shared [`Store`] and announces it
//! on the [`EventBus`]. Keeps its own bounded undo stack, separate from the
//! store's history.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{url, BrushBounds, ClearTarget, Gesture, IdSpace, SelectOptions, SelectionMode};
use crate::config::CoreConfig;
use crate::error::Result;
use crate::events::{
    DatasetLoaded, Event, EventBus, SelectionBrush, SelectionChange, SelectionClear,
};
use crate::store::{SetOptions, Store};
use crate::value::Value;

const SOURCE_KEY: &str = "selection.source";
const GESTURE_KEY: &str = "selection.type";
const TIMESTAMP_KEY: &str = "selection.timestamp";

/// One undoable selection transition
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionHistoryEntry {
    pub id_space: IdSpace,
    pub previous: BTreeSet<String>,
    pub current: BTreeSet<String>,
    pub timestamp: DateTime<Utc>,
}

/// Read-only view of the whole selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    pub samples: BTreeSet<String>,
    pub genes: BTreeSet<String>,
    pub mutations: BTreeSet<String>,
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub gesture: Option<Gesture>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl SelectionState {
    pub fn ids(&self, space: IdSpace) -> &BTreeSet<String> {
        match space {
            IdSpace::Sample => &self.samples,
            IdSpace::Gene => &self.genes,
            IdSpace::Mutation => &self.mutations,
        }
    }
}

/// A pending transition of one space
struct Transition {
    space: IdSpace,
    previous: BTreeSet<String>,
    next: BTreeSet<String>,
}

pub struct SelectionManager {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    mode: RwLock<SelectionMode>,
    history: Mutex<VecDeque<SelectionHistoryEntry>>,
    max_history: usize,
    /// Ids present in the most recently loaded dataset, per space
    universes: RwLock<AHashMap<IdSpace, AHashSet<String>>>,
}

impl SelectionManager {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>) -> Self {
        Self::from_config(store, bus, &CoreConfig::default())
    }

    pub fn from_config(store: Arc<Store>, bus: Arc<EventBus>, config: &CoreConfig) -> Self {
        Self {
            store,
            bus,
            mode: RwLock::new(config.default_mode),
            history: Mutex::new(VecDeque::with_capacity(config.max_selection_history)),
            max_history: config.max_selection_history.max(1),
            universes: RwLock::new(AHashMap::new()),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        *self.mode.read()
    }

    pub fn set_mode(&self, mode: SelectionMode) {
        debug!(%mode, "selection mode");
        *self.mode.write() = mode;
    }

    /// Parse and apply a mode name; unknown names are an error
    pub fn set_mode_str(&self, mode: &str) -> Result<()> {
        self.set_mode(mode.parse()?);
        Ok(())
    }

    /// Select `ids` according to the active mode. Returns the resulting selection.
    pub fn select<I, S>(&self, space: IdSpace, ids: I, options: SelectOptions) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mode = self.mode();
        self.select_with_mode(space, collect_ids(ids), mode, options)
    }

    /// Remove `ids` from the selection
    pub fn deselect<I, S>(&self, space: IdSpace, ids: I, options: SelectOptions) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = self.current(space);
        let removed: AHashSet<String> = ids.into_iter().map(Into::into).collect();
        let next: BTreeSet<String> = previous
            .iter()
            .filter(|id| !removed.contains(*id))
            .cloned()
            .collect();

        let options = SelectOptions {
            additive: false,
            ..options
        };
        let mode = self.mode();
        self.commit(Transition { space, previous, next }, mode, &options)
    }

    /// Flip membership of one id
    pub fn toggle(&self, space: IdSpace, id: &str, options: SelectOptions) -> Result<Vec<String>> {
        if self.is_selected(space, id) {
            self.deselect(space, [id], options)
        } else {
            self.select(space, [id], options.additive(true))
        }
    }

    /// Empty one or every space. Returns `false` when there was nothing to clear.
    pub fn clear(&self, target: ClearTarget, options: SelectOptions) -> Result<bool> {
        let spaces: Vec<IdSpace> = match target {
            ClearTarget::Space(space) => vec![space],
            ClearTarget::All => IdSpace::ALL.to_vec(),
        };

        let transitions: Vec<Transition> = spaces
            .into_iter()
            .map(|space| Transition {
                space,
                previous: self.current(space),
                next: BTreeSet::new(),
            })
            .filter(|t| !t.previous.is_empty())
            .collect();

        if transitions.is_empty() {
            return Ok(false);
        }

        for transition in &transitions {
            self.push_history(transition);
        }
        self.write(&transitions, &options)?;

        if !options.silent {
            let id_space = match target {
                ClearTarget::Space(space) => Some(space),
                ClearTarget::All => None,
            };
            self.bus.emit(Event::SelectionClear(SelectionClear {
                id_space,
                source: options.source,
            }));
        }
        Ok(true)
    }

    /// Select every point of `data` inside `bounds`. `accessor` yields the id
    /// and data coordinates of a point. The selection always replaces the
    /// current one, and a `selection:brush` event carries the raw bounds.
    pub fn select_from_brush<T, F>(
        &self,
        space: IdSpace,
        bounds: BrushBounds,
        data: &[T],
        accessor: F,
        options: SelectOptions,
    ) -> Result<Vec<String>>
    where
        F: Fn(&T) -> (&str, f64, f64),
    {
        let hits: Vec<String> = data
            .iter()
            .map(&accessor)
            .filter(|(_, x, y)| bounds.contains(*x, *y))
            .map(|(id, _, _)| id.to_string())
            .collect();

        let options = options.gesture(Gesture::Brush);
        let selected = self.select_with_mode(space, hits, SelectionMode::Brush, options.clone())?;

        if !options.silent {
            self.bus.emit(Event::SelectionBrush(SelectionBrush {
                id_space: space,
                bounds,
                ids: selected.clone(),
                source: options.source,
            }));
        }
        Ok(selected)
    }

    /// Select the complement of the current selection within `all_ids`
    pub fn invert<I, S>(&self, space: IdSpace, all_ids: I, options: SelectOptions) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let previous = self.current(space);
        let next: BTreeSet<String> = all_ids
            .into_iter()
            .map(Into::into)
            .filter(|id| !previous.contains(id))
            .collect();

        let options = SelectOptions {
            additive: false,
            ..options
        };
        let mode = self.mode();
        self.commit(Transition { space, previous, next }, mode, &options)
    }

    /// Membership test for a single id. Renderers styling every element of a
    /// frame should take [`SelectionManager::selected_set`] once instead.
    pub fn is_selected(&self, space: IdSpace, id: &str) -> bool {
        let probe = Value::String(id.to_string());
        self.store.with(space.selection_key(), |value| {
            value
                .and_then(Value::as_set)
                .map_or(false, |ids| ids.contains(&probe))
        })
    }

    /// Selected ids of one space, sorted
    pub fn get_selected(&self, space: IdSpace) -> Vec<String> {
        self.current(space).into_iter().collect()
    }

    /// Hash-set copy of the selection for per-element styling lookups
    pub fn selected_set(&self, space: IdSpace) -> AHashSet<String> {
        self.current(space).into_iter().collect()
    }

    pub fn get_count(&self, space: IdSpace) -> usize {
        self.store.with(space.selection_key(), |value| {
            value.and_then(Value::as_set).map_or(0, |ids| ids.len())
        })
    }

    pub fn has_selection(&self, space: IdSpace) -> bool {
        self.get_count(space) > 0
    }

    pub fn state(&self) -> SelectionState {
        SelectionState {
            samples: self.current(IdSpace::Sample),
            genes: self.current(IdSpace::Gene),
            mutations: self.current(IdSpace::Mutation),
            source: self.store.get(SOURCE_KEY).and_then(|v| v.as_str().map(str::to_string)),
            gesture: self
                .store
                .get(GESTURE_KEY)
                .and_then(|v| v.as_str().and_then(parse_gesture)),
            timestamp: self
                .store
                .get(TIMESTAMP_KEY)
                .and_then(|v| v.as_str().and_then(|s| s.parse().ok())),
        }
    }

    /// Number of transitions that `undo` can still revert
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Revert the most recent transition. Returns `false` when there is none.
    pub fn undo(&self) -> Result<bool> {
        let Some(entry) = self.history.lock().pop_back() else {
            return Ok(false);
        };

        let transition = Transition {
            space: entry.id_space,
            previous: self.current(entry.id_space),
            next: entry.previous,
        };
        let options = SelectOptions::from_source("undo");
        self.write(std::slice::from_ref(&transition), &options)?;
        self.emit_change(&transition, self.mode(), &options);
        Ok(true)
    }

    /// Encode the selection as `samples=..&genes=..&mutations=..`
    pub fn to_url_params(&self) -> String {
        let state = self.state();
        url::encode(IdSpace::ALL.map(|space| (space, state.ids(space))))
    }

    /// Load all three spaces from a query string, then publish one combined
    /// change with source `url`.
    pub fn from_url_params(&self, search: &str) -> Result<()> {
        let transitions: Vec<Transition> = IdSpace::ALL
            .into_iter()
            .map(|space| Transition {
                space,
                previous: self.current(space),
                next: url::decode(search, space),
            })
            .collect();

        let options = SelectOptions::from_source("url");
        for transition in transitions.iter().filter(|t| t.previous != t.next) {
            self.push_history(transition);
        }
        self.write(&transitions, &options.clone().silent())?;

        let state = self.state();
        self.bus.emit(Event::SelectionChange(SelectionChange {
            id_space: None,
            ids: Vec::new(),
            previous_ids: Vec::new(),
            sample_ids: state.samples.into_iter().collect(),
            gene_ids: state.genes.into_iter().collect(),
            mutation_ids: state.mutations.into_iter().collect(),
            source: options.source,
            gesture: options.gesture,
            additive: false,
            mode: self.mode(),
            restored: true,
        }));
        Ok(())
    }

    /// Record the ids of a freshly loaded dataset and drop selected ids that
    /// no longer exist in it. Returns how many ids were pruned.
    pub fn load_dataset<I, S>(&self, space: IdSpace, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let universe: AHashSet<String> = ids.into_iter().map(Into::into).collect();
        let count = universe.len();

        let previous = self.current(space);
        let next: BTreeSet<String> = previous
            .iter()
            .filter(|id| universe.contains(*id))
            .cloned()
            .collect();
        let pruned = previous.len() - next.len();

        self.universes.write().insert(space, universe);

        let options = SelectOptions::from_source("dataset");
        if pruned > 0 {
            warn!(id_space = %space, pruned, "dropping selected ids missing from dataset");
            let transition = Transition { space, previous, next };
            self.write(std::slice::from_ref(&transition), &options)?;
            self.emit_change(&transition, self.mode(), &options);
        }

        self.bus.emit(Event::DatasetLoaded(DatasetLoaded {
            id_space: space,
            count,
            source: options.source,
        }));
        Ok(pruned)
    }

    /// Whether `id` exists in the most recently loaded dataset of `space`.
    /// Spaces without a loaded dataset accept every id.
    pub fn is_known(&self, space: IdSpace, id: &str) -> bool {
        self.universes
            .read()
            .get(&space)
            .map_or(true, |ids| ids.contains(id))
    }

    fn select_with_mode(
        &self,
        space: IdSpace,
        ids: Vec<String>,
        mode: SelectionMode,
        options: SelectOptions,
    ) -> Result<Vec<String>> {
        let previous = self.current(space);
        let additive = options.additive && mode == SelectionMode::Multi;

        let next: BTreeSet<String> = match mode {
            SelectionMode::Single => ids.last().cloned().into_iter().collect(),
            SelectionMode::Multi if additive => previous.iter().cloned().chain(ids).collect(),
            SelectionMode::Multi | SelectionMode::Range | SelectionMode::Brush => {
                ids.into_iter().collect()
            }
        };

        let options = SelectOptions { additive, ..options };
        self.commit(Transition { space, previous, next }, mode, &options)
    }

    /// Record, store and announce one transition. Unchanged sets are a no-op.
    fn commit(
        &self,
        mut transition: Transition,
        mode: SelectionMode,
        options: &SelectOptions,
    ) -> Result<Vec<String>> {
        // An empty id has no query-string form and would not survive a URL round trip
        if transition.next.remove("") {
            warn!(id_space = %transition.space, source = %options.source, "ignoring empty id");
        }
        if transition.previous == transition.next {
            return Ok(transition.next.into_iter().collect());
        }

        self.push_history(&transition);
        self.write(std::slice::from_ref(&transition), options)?;
        if !options.silent {
            self.emit_change(&transition, mode, options);
        }
        Ok(transition.next.into_iter().collect())
    }

    fn push_history(&self, transition: &Transition) {
        let mut history = self.history.lock();
        if history.len() >= self.max_history {
            history.pop_front();
        }
        history.push_back(SelectionHistoryEntry {
            id_space: transition.space,
            previous: transition.previous.clone(),
            current: transition.next.clone(),
            timestamp: Utc::now(),
        });
    }

    /// One store batch per call, outside the store's own undo history
    fn write(&self, transitions: &[Transition], options: &SelectOptions) -> Result<()> {
        let mut updates: Vec<(&str, Value)> = transitions
            .iter()
            .map(|t| (t.space.selection_key(), Value::id_set(t.next.iter().cloned())))
            .collect();
        updates.push((SOURCE_KEY, Value::from(options.source.as_str())));
        updates.push((GESTURE_KEY, Value::from(options.gesture.as_str())));
        updates.push((TIMESTAMP_KEY, Value::from(Utc::now().to_rfc3339())));

        self.store.batch(
            updates,
            SetOptions {
                silent: options.silent,
                record_history: false,
            },
        )?;
        debug!(
            spaces = transitions.len(),
            source = %options.source,
            "selection written"
        );
        Ok(())
    }

    fn emit_change(
        &self,
        transition: &Transition,
        mode: SelectionMode,
        options: &SelectOptions,
    ) {
        let state = self.state();
        self.bus.emit(Event::SelectionChange(SelectionChange {
            id_space: Some(transition.space),
            ids: transition.next.iter().cloned().collect(),
            previous_ids: transition.previous.iter().cloned().collect(),
            sample_ids: state.samples.into_iter().collect(),
            gene_ids: state.genes.into_iter().collect(),
            mutation_ids: state.mutations.into_iter().collect(),
            source: options.source.clone(),
            gesture: options.gesture,
            additive: options.additive,
            mode,
            restored: false,
        }));
    }

    fn current(&self, space: IdSpace) -> BTreeSet<String> {
        self.store.with(space.selection_key(), |value| {
            value
                .map(|v| v.string_items().into_iter().collect())
                .unwrap_or_default()
        })
    }
}

fn collect_ids<I, S>(ids: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    ids.into_iter().map(Into::into).collect()
}

fn parse_gesture(raw: &str) -> Option<Gesture> {
    match raw {
        "click" => Some(Gesture::Click),
        "brush" => Some(Gesture::Brush),
        "lasso" => Some(Gesture::Lasso),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    struct Fixture {
        store: Arc<Store>,
        manager: SelectionManager,
        events: Arc<Mutex<Vec<Event>>>,
    }

    fn fixture() -> Fixture {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(Store::new().with_bus(bus.clone()));
        let manager = SelectionManager::new(store.clone(), bus.clone());

        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventKind::SelectionChange,
            EventKind::SelectionClear,
            EventKind::SelectionBrush,
            EventKind::DatasetLoaded,
        ] {
            let log = events.clone();
            bus.on(kind, move |event| {
                log.lock().push(event.clone());
                Ok(())
            });
        }

        Fixture {
            store,
            manager,
            events,
        }
    }

    fn opts(source: &str) -> SelectOptions {
        SelectOptions::from_source(source)
    }

    fn last_change(f: &Fixture) -> SelectionChange {
        f.events
            .lock()
            .iter()
            .rev()
            .find_map(|e| match e {
                Event::SelectionChange(change) => Some(change.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_single_mode_keeps_last_id() {
        let f = fixture();
        f.manager.set_mode(SelectionMode::Single);
        let selected = f.manager.select(IdSpace::Sample, ["s1", "s2"], opts("scatter")).unwrap();
        assert_eq!(selected, vec!["s2"]);
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["s2"]);
    }

    #[test]
    fn test_multi_mode_additive_and_replace() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["s1"], opts("scatter")).unwrap();
        f.manager
            .select(IdSpace::Sample, ["s2"], opts("scatter").additive(true))
            .unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["s1", "s2"]);
        assert!(last_change(&f).additive);

        f.manager.select(IdSpace::Sample, ["s3"], opts("scatter")).unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["s3"]);
    }

    #[test]
    fn test_range_mode_ignores_additive() {
        let f = fixture();
        f.manager.set_mode(SelectionMode::Range);
        f.manager.select(IdSpace::Gene, ["g1", "g2"], opts("track")).unwrap();
        f.manager
            .select(IdSpace::Gene, ["g3"], opts("track").additive(true))
            .unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Gene), vec!["g3"]);
        assert!(!last_change(&f).additive);
        assert_eq!(last_change(&f).mode, SelectionMode::Range);
    }

    #[test]
    fn test_set_mode_str_rejects_unknown() {
        let f = fixture();
        assert!(f.manager.set_mode_str("brush").is_ok());
        assert_eq!(f.manager.mode(), SelectionMode::Brush);
        assert!(f.manager.set_mode_str("freeform").is_err());
        assert_eq!(f.manager.mode(), SelectionMode::Brush);
    }

    #[test]
    fn test_change_event_payload() {
        let f = fixture();
        f.manager.select(IdSpace::Mutation, ["m1"], opts("lollipop")).unwrap();
        f.manager.select(IdSpace::Sample, ["S1"], opts("table")).unwrap();

        let change = last_change(&f);
        assert_eq!(change.id_space, Some(IdSpace::Sample));
        assert_eq!(change.ids, vec!["S1"]);
        assert!(change.previous_ids.is_empty());
        assert_eq!(change.sample_ids, vec!["S1"]);
        assert_eq!(change.mutation_ids, vec!["m1"]);
        assert_eq!(change.source, "table");
        assert_eq!(change.gesture, Gesture::Click);

        let state = f.manager.state();
        assert_eq!(state.source.as_deref(), Some("table"));
        assert_eq!(state.gesture, Some(Gesture::Click));
        assert!(state.timestamp.is_some());
    }

    #[test]
    fn test_unchanged_selection_is_a_noop() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["S1"], opts("a")).unwrap();
        f.manager.select(IdSpace::Sample, ["S1"], opts("a")).unwrap();
        assert_eq!(f.events.lock().len(), 1);
        assert_eq!(f.manager.history_len(), 1);
    }

    #[test]
    fn test_silent_select_updates_state_only() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["S1"], opts("a").silent()).unwrap();
        assert!(f.manager.is_selected(IdSpace::Sample, "S1"));
        assert!(f.events.lock().is_empty());
    }

    #[test]
    fn test_deselect_and_toggle() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["a", "b", "c"], opts("table")).unwrap();
        f.manager.deselect(IdSpace::Sample, ["b", "zzz"], opts("table")).unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["a", "c"]);

        f.manager.toggle(IdSpace::Sample, "a", opts("table")).unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["c"]);

        f.manager.toggle(IdSpace::Sample, "d", opts("table")).unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["c", "d"]);
    }

    #[test]
    fn test_clear() {
        let f = fixture();
        assert!(!f.manager.clear(ClearTarget::All, opts("toolbar")).unwrap());
        assert!(f.events.lock().is_empty());

        f.manager.select(IdSpace::Sample, ["S1"], opts("a")).unwrap();
        f.manager.select(IdSpace::Gene, ["TP53"], opts("a")).unwrap();
        assert!(f.manager.clear(IdSpace::Gene.into(), opts("toolbar")).unwrap());
        assert!(f.manager.has_selection(IdSpace::Sample));
        assert!(!f.manager.has_selection(IdSpace::Gene));

        assert!(f.manager.clear(ClearTarget::All, opts("toolbar")).unwrap());
        assert_eq!(f.manager.get_count(IdSpace::Sample), 0);

        let events = f.events.lock();
        assert!(matches!(
            events.last(),
            Some(Event::SelectionClear(SelectionClear { id_space: None, source })) if source == "toolbar"
        ));
    }

    #[test]
    fn test_brush_selects_points_inside_bounds() {
        struct Point {
            id: String,
            x: f64,
            y: f64,
        }
        let data = vec![
            Point { id: "a".into(), x: 1.0, y: 1.0 },
            Point { id: "b".into(), x: 5.0, y: 5.0 },
        ];

        let f = fixture();
        f.manager.select(IdSpace::Sample, ["b"], opts("scatter")).unwrap();
        let bounds = BrushBounds::new(0.0, 0.0, 2.0, 2.0);
        let selected = f
            .manager
            .select_from_brush(
                IdSpace::Sample,
                bounds,
                &data,
                |p| (p.id.as_str(), p.x, p.y),
                opts("scatter").additive(true),
            )
            .unwrap();

        assert_eq!(selected, vec!["a"]);
        let events = f.events.lock();
        match &events[events.len() - 2] {
            Event::SelectionChange(change) => {
                assert_eq!(change.gesture, Gesture::Brush);
                assert_eq!(change.mode, SelectionMode::Brush);
            }
            other => panic!("unexpected event {other:?}"),
        }
        match events.last() {
            Some(Event::SelectionBrush(brush)) => {
                assert_eq!(brush.bounds, bounds);
                assert_eq!(brush.ids, vec!["a"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        // The manager's own mode is untouched
        assert_eq!(f.manager.mode(), SelectionMode::Multi);
    }

    #[test]
    fn test_invert() {
        let f = fixture();
        f.manager.select(IdSpace::Gene, ["g1"], opts("heatmap")).unwrap();
        f.manager
            .invert(IdSpace::Gene, ["g1", "g2", "g3"], opts("heatmap"))
            .unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Gene), vec!["g2", "g3"]);
    }

    #[test]
    fn test_undo_restores_previous_set() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["S1"], opts("a")).unwrap();
        f.manager.select(IdSpace::Sample, ["S2"], opts("a")).unwrap();

        assert!(f.manager.undo().unwrap());
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["S1"]);
        assert_eq!(last_change(&f).source, "undo");

        assert!(f.manager.undo().unwrap());
        assert!(!f.manager.has_selection(IdSpace::Sample));
        assert!(!f.manager.undo().unwrap());
    }

    #[test]
    fn test_history_ring_is_bounded() {
        let bus = Arc::new(EventBus::new());
        let store = Arc::new(Store::new());
        let config = CoreConfig {
            max_selection_history: 3,
            ..CoreConfig::default()
        };
        let manager = SelectionManager::from_config(store, bus, &config);
        for n in 0..10 {
            manager.select(IdSpace::Sample, [format!("S{n}")], opts("a")).unwrap();
        }
        assert_eq!(manager.history_len(), 3);
    }

    #[test]
    fn test_selection_stays_out_of_store_history() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["S1"], opts("a")).unwrap();
        assert!(!f.store.can_undo());
    }

    #[test]
    fn test_url_round_trip() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["S2", "S1"], opts("a")).unwrap();
        f.manager.select(IdSpace::Mutation, ["TP53:R175H"], opts("a")).unwrap();

        let query = f.manager.to_url_params();
        assert_eq!(query, "samples=S1,S2&mutations=TP53:R175H");

        let other = fixture();
        other.manager.from_url_params(&format!("?{query}")).unwrap();
        assert_eq!(other.manager.state().samples, f.manager.state().samples);
        assert_eq!(other.manager.state().genes, f.manager.state().genes);
        assert_eq!(other.manager.state().mutations, f.manager.state().mutations);

        let events = other.events.lock();
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::SelectionChange(change) => {
                assert!(change.restored);
                assert_eq!(change.source, "url");
                assert_eq!(change.sample_ids, vec!["S1", "S2"]);
                assert_eq!(change.mutation_ids, vec!["TP53:R175H"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_empty_ids_are_ignored() {
        let f = fixture();
        let selected = f.manager.select(IdSpace::Sample, ["", "S1"], opts("a")).unwrap();
        assert_eq!(selected, vec!["S1"]);

        f.manager.select(IdSpace::Sample, ["S1", ""], opts("a")).unwrap();
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["S1"]);
        assert_eq!(f.events.lock().len(), 1);

        let other = fixture();
        other.manager.from_url_params(&f.manager.to_url_params()).unwrap();
        assert_eq!(other.manager.state().samples, f.manager.state().samples);
    }

    #[test]
    fn test_url_restore_clears_absent_spaces() {
        let f = fixture();
        f.manager.select(IdSpace::Gene, ["BRCA1"], opts("a")).unwrap();
        f.manager.from_url_params("samples=S9").unwrap();
        assert!(!f.manager.has_selection(IdSpace::Gene));
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["S9"]);
    }

    #[test]
    fn test_load_dataset_prunes_stale_ids() {
        let f = fixture();
        f.manager.select(IdSpace::Sample, ["S1", "S2", "S3"], opts("a")).unwrap();

        let pruned = f.manager.load_dataset(IdSpace::Sample, ["S1", "S3", "S4"]).unwrap();
        assert_eq!(pruned, 1);
        assert_eq!(f.manager.get_selected(IdSpace::Sample), vec!["S1", "S3"]);
        assert!(f.manager.is_known(IdSpace::Sample, "S4"));
        assert!(!f.manager.is_known(IdSpace::Sample, "S2"));
        assert!(f.manager.is_known(IdSpace::Gene, "anything"));

        let events = f.events.lock();
        assert!(matches!(events.last(), Some(Event::DatasetLoaded(d)) if d.count == 3));
        assert!(matches!(
            &events[events.len() - 2],
            Event::SelectionChange(change) if change.source == "dataset"
        ));
    }

    #[test]
    fn test_stale_ids_do_not_break_lookups() {
        let f = fixture();
        f.store
            .set(IdSpace::Sample.selection_key(), Value::id_set(["ghost"]), SetOptions::default())
            .unwrap();
        assert!(f.manager.is_selected(IdSpace::Sample, "ghost"));
        assert!(!f.manager.is_selected(IdSpace::Sample, "S1"));
        assert!(f.manager.selected_set(IdSpace::Sample).contains("ghost"));
    }

    #[test]
    fn test_selected_set_matches_membership() {
        let f = fixture();
        f.manager.select(IdSpace::Mutation, ["m1", "m3"], opts("a")).unwrap();
        let selected = f.manager.selected_set(IdSpace::Mutation);
        for id in ["m1", "m2", "m3", "m4"] {
            assert_eq!(selected.contains(id), f.manager.is_selected(IdSpace::Mutation, id));
        }
    }
}
