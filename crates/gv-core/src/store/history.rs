//! Linear undo/redo history

use chrono::{DateTime, Utc};

use crate::value::Value;

/// A single key transition. `None` means the key was absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    /// Shallowest ancestor object this write had to create, if any
    pub created: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Change {
    pub fn new(key: impl Into<String>, old_value: Option<Value>, new_value: Option<Value>) -> Self {
        Self {
            key: key.into(),
            old_value,
            new_value,
            created: None,
            timestamp: Utc::now(),
        }
    }

    pub(crate) fn creating(mut self, created: Option<String>) -> Self {
        self.created = created;
        self
    }
}

/// One write replayed by undo or redo
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Replay {
    pub key: String,
    pub value: Option<Value>,
    /// Ancestor to prune once `key` is removed
    pub created: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryEntry {
    Single(Change),
    /// Undone and redone as one step
    Batch {
        changes: Vec<Change>,
        timestamp: DateTime<Utc>,
    },
}

impl HistoryEntry {
    pub fn batch(changes: Vec<Change>) -> Self {
        HistoryEntry::Batch {
            changes,
            timestamp: Utc::now(),
        }
    }

    fn changes(&self) -> &[Change] {
        match self {
            HistoryEntry::Single(change) => std::slice::from_ref(change),
            HistoryEntry::Batch { changes, .. } => changes,
        }
    }

    /// Writes that revert this entry, last change first
    pub(crate) fn undo_writes(&self) -> Vec<Replay> {
        self.changes()
            .iter()
            .rev()
            .map(|c| Replay {
                key: c.key.clone(),
                value: c.old_value.clone(),
                created: c.created.clone(),
            })
            .collect()
    }

    /// Writes that reapply this entry, in original order
    pub(crate) fn redo_writes(&self) -> Vec<Replay> {
        self.changes()
            .iter()
            .map(|c| Replay {
                key: c.key.clone(),
                value: c.new_value.clone(),
                created: None,
            })
            .collect()
    }
}

/// Bounded history with a cursor. Entries before the cursor are undoable,
/// entries from the cursor on are redoable.
#[derive(Debug)]
pub(crate) struct History {
    entries: Vec<HistoryEntry>,
    cursor: usize,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Record a new entry, discarding the redo tail and the oldest entry when full
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.cursor);
        self.entries.push(entry);
        if self.entries.len() > self.capacity {
            let overflow = self.entries.len() - self.capacity;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len();
    }

    pub fn peek_undo(&self) -> Option<&HistoryEntry> {
        self.cursor.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn peek_redo(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor)
    }

    pub fn commit_undo(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn commit_redo(&mut self) {
        self.cursor = (self.cursor + 1).min(self.entries.len());
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}
