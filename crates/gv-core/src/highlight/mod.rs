//! Hover highlighting
//!
//! Highlights are transient: they are never recorded in any undo history and
//! are cleared independently of the selection. Showing a highlight is
//! debounced by the configured delay; a hide, or a show for a different
//! target, aborts the pending timer so a stale hover never lands after the
//! pointer has moved on.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::error::Result;
use crate::events::{Event, EventBus, Highlight};
use crate::selection::IdSpace;
use crate::store::{SetOptions, Store};
use crate::value::Value;

/// Ids to emphasise, per space
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightTarget {
    pub samples: BTreeSet<String>,
    pub genes: BTreeSet<String>,
    pub mutations: BTreeSet<String>,
}

impl HighlightTarget {
    /// Target covering ids of a single space
    pub fn of<I, S>(space: IdSpace, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut target = Self::default();
        target.ids_mut(space).extend(ids.into_iter().map(Into::into));
        target
    }

    pub fn with<I, S>(mut self, space: IdSpace, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids_mut(space).extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn ids(&self, space: IdSpace) -> &BTreeSet<String> {
        match space {
            IdSpace::Sample => &self.samples,
            IdSpace::Gene => &self.genes,
            IdSpace::Mutation => &self.mutations,
        }
    }

    fn ids_mut(&mut self, space: IdSpace) -> &mut BTreeSet<String> {
        match space {
            IdSpace::Sample => &mut self.samples,
            IdSpace::Gene => &mut self.genes,
            IdSpace::Mutation => &mut self.mutations,
        }
    }

    pub fn is_empty(&self) -> bool {
        IdSpace::ALL.iter().all(|space| self.ids(*space).is_empty())
    }

    fn payload(&self, source: &str) -> Highlight {
        Highlight {
            sample_ids: self.samples.iter().cloned().collect(),
            gene_ids: self.genes.iter().cloned().collect(),
            mutation_ids: self.mutations.iter().cloned().collect(),
            source: source.to_string(),
        }
    }
}

struct Pending {
    generation: u64,
    target: HighlightTarget,
    handle: AbortHandle,
}

#[derive(Default)]
struct Timer {
    generation: u64,
    pending: Option<Pending>,
}

pub struct HighlightManager {
    store: Arc<Store>,
    bus: Arc<EventBus>,
    delay: Duration,
    timer: Mutex<Timer>,
    /// Serializes a deferred show against `hide`. Reentrant so watchers of
    /// the highlight keys may call back into the manager.
    apply_lock: ReentrantMutex<()>,
}

impl HighlightManager {
    pub fn new(store: Arc<Store>, bus: Arc<EventBus>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            store,
            bus,
            delay,
            timer: Mutex::new(Timer::default()),
            apply_lock: ReentrantMutex::new(()),
        })
    }

    pub fn from_config(store: Arc<Store>, bus: Arc<EventBus>, config: &CoreConfig) -> Arc<Self> {
        Self::new(store, bus, config.highlight_delay)
    }

    /// Schedule a highlight after the hover delay. Applied immediately when
    /// the delay is zero or no tokio runtime is available.
    pub fn show(self: &Arc<Self>, target: HighlightTarget, source: &str) -> Result<()> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) if !self.delay.is_zero() => runtime,
            _ => {
                let _guard = self.apply_lock.lock();
                self.cancel_pending();
                return self.apply(&target, source);
            }
        };

        let mut timer = self.timer.lock();
        if let Some(pending) = &timer.pending {
            if pending.target == target {
                return Ok(());
            }
            pending.handle.abort();
        }

        timer.generation += 1;
        let generation = timer.generation;
        let manager: Weak<Self> = Arc::downgrade(self);
        let delay = self.delay;
        let scheduled = target.clone();
        let source = source.to_string();

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(manager) = manager.upgrade() {
                manager.fire(generation, &scheduled, &source);
            }
        });

        timer.pending = Some(Pending {
            generation,
            target,
            handle: task.abort_handle(),
        });
        Ok(())
    }

    /// Cancel any pending highlight and clear the current one.
    /// Returns `false` when nothing was highlighted.
    pub fn hide(&self, source: &str) -> Result<bool> {
        let current = {
            let _guard = self.apply_lock.lock();
            self.cancel_pending();

            let current = self.current();
            if current.is_empty() {
                return Ok(false);
            }
            self.write(&HighlightTarget::default())?;
            current
        };
        debug!(source, "highlight hidden");
        self.bus.emit(Event::HighlightHide(current.payload(source)));
        Ok(true)
    }

    pub fn is_highlighted(&self, space: IdSpace, id: &str) -> bool {
        let probe = Value::String(id.to_string());
        self.store.with(space.highlight_key(), |value| {
            value
                .and_then(Value::as_set)
                .map_or(false, |ids| ids.contains(&probe))
        })
    }

    pub fn get_highlighted(&self, space: IdSpace) -> Vec<String> {
        self.current().ids(space).iter().cloned().collect()
    }

    pub fn has_pending(&self) -> bool {
        self.timer.lock().pending.is_some()
    }

    fn fire(&self, generation: u64, target: &HighlightTarget, source: &str) {
        let _guard = self.apply_lock.lock();
        {
            let mut timer = self.timer.lock();
            match &timer.pending {
                Some(pending) if pending.generation == generation => timer.pending = None,
                _ => return,
            }
        }
        if let Err(err) = self.apply(target, source) {
            warn!(source, "deferred highlight failed: {err}");
        }
    }

    /// Abort the pending show and invalidate any timer that already fired
    fn cancel_pending(&self) {
        let mut timer = self.timer.lock();
        timer.generation += 1;
        if let Some(pending) = timer.pending.take() {
            pending.handle.abort();
        }
    }

    fn apply(&self, target: &HighlightTarget, source: &str) -> Result<()> {
        if self.current() == *target {
            return Ok(());
        }
        self.write(target)?;
        debug!(source, "highlight shown");
        self.bus.emit(Event::HighlightShow(target.payload(source)));
        Ok(())
    }

    fn write(&self, target: &HighlightTarget) -> Result<()> {
        let updates = IdSpace::ALL.map(|space| {
            (
                space.highlight_key(),
                Value::id_set(target.ids(space).iter().cloned()),
            )
        });
        self.store.batch(updates, SetOptions::untracked())?;
        Ok(())
    }

    fn current(&self) -> HighlightTarget {
        let mut target = HighlightTarget::default();
        for space in IdSpace::ALL {
            let ids = self
                .store
                .with(space.highlight_key(), |value| value.map(Value::string_items))
                .unwrap_or_default();
            target.ids_mut(space).extend(ids);
        }
        target
    }
}
