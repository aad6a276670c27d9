//! Core state and coordination layer for the genomic visualization workbench
//!
//! This crate provides the shared event bus, the reactive state store and the
//! selection/highlight managers that keep linked views in sync.

pub mod config;
pub mod error;
pub mod events;
pub mod highlight;
pub mod selection;
pub mod store;
pub mod sync;
pub mod value;

// Re-export commonly used types
pub use config::CoreConfig;
pub use error::{CoreError, Result};
pub use events::{Event, EventBus, EventKind, EventRecord, Subscription};
pub use highlight::{HighlightManager, HighlightTarget};
pub use selection::{
    BrushBounds, ClearTarget, Gesture, IdSpace, SelectOptions, SelectionManager, SelectionMode,
    SelectionState,
};
pub use store::{SetOptions, Store};
pub use sync::{SyncManager, ViewAdapter, ViewSyncSettings};
pub use value::{Object, Value};
