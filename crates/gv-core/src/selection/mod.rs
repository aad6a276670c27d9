//! Selection vocabulary and the selection manager

mod manager;
mod url;

pub use manager::{SelectionHistoryEntry, SelectionManager, SelectionState};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// One of the disjoint identifier domains tracked by the workbench
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdSpace {
    Sample,
    Gene,
    Mutation,
}

impl IdSpace {
    pub const ALL: [IdSpace; 3] = [IdSpace::Sample, IdSpace::Gene, IdSpace::Mutation];

    pub fn as_str(self) -> &'static str {
        match self {
            IdSpace::Sample => "sample",
            IdSpace::Gene => "gene",
            IdSpace::Mutation => "mutation",
        }
    }

    /// Store key holding the selected ids
    pub fn selection_key(self) -> &'static str {
        match self {
            IdSpace::Sample => "selection.samples",
            IdSpace::Gene => "selection.genes",
            IdSpace::Mutation => "selection.mutations",
        }
    }

    /// Store key holding the highlighted ids
    pub fn highlight_key(self) -> &'static str {
        match self {
            IdSpace::Sample => "highlight.samples",
            IdSpace::Gene => "highlight.genes",
            IdSpace::Mutation => "highlight.mutations",
        }
    }

    /// Query parameter used for URL persistence
    pub fn url_param(self) -> &'static str {
        match self {
            IdSpace::Sample => "samples",
            IdSpace::Gene => "genes",
            IdSpace::Mutation => "mutations",
        }
    }
}

impl fmt::Display for IdSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdSpace {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sample" => Ok(IdSpace::Sample),
            "gene" => Ok(IdSpace::Gene),
            "mutation" => Ok(IdSpace::Mutation),
            other => Err(CoreError::InvalidIdSpace(other.to_string())),
        }
    }
}

/// How `select` combines new ids with the current selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Keep only the last id
    Single,
    /// Replace, or union when additive
    #[default]
    Multi,
    /// Always replace
    Range,
    /// Always replace
    Brush,
}

impl SelectionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SelectionMode::Single => "single",
            SelectionMode::Multi => "multi",
            SelectionMode::Range => "range",
            SelectionMode::Brush => "brush",
        }
    }
}

impl fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(SelectionMode::Single),
            "multi" => Ok(SelectionMode::Multi),
            "range" => Ok(SelectionMode::Range),
            "brush" => Ok(SelectionMode::Brush),
            other => Err(CoreError::InvalidMode(other.to_string())),
        }
    }
}

/// User gesture behind a selection change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gesture {
    #[default]
    Click,
    Brush,
    Lasso,
}

impl Gesture {
    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Click => "click",
            Gesture::Brush => "brush",
            Gesture::Lasso => "lasso",
        }
    }
}

/// Closed data-space rectangle `[x0, x1] x [y0, y1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrushBounds {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BrushBounds {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Inclusive on every edge; corners may be given in either order
    pub fn contains(&self, x: f64, y: f64) -> bool {
        let (left, right) = (self.x0.min(self.x1), self.x0.max(self.x1));
        let (bottom, top) = (self.y0.min(self.y1), self.y0.max(self.y1));
        (left..=right).contains(&x) && (bottom..=top).contains(&y)
    }
}

/// Per-call selection flags
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOptions {
    /// Union with the current selection (multi mode only)
    pub additive: bool,
    /// Update state without publishing an event
    pub silent: bool,
    /// View or actor performing the change
    pub source: String,
    pub gesture: Gesture,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            additive: false,
            silent: false,
            source: "unknown".to_string(),
            gesture: Gesture::Click,
        }
    }
}

impl SelectOptions {
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn additive(mut self, additive: bool) -> Self {
        self.additive = additive;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn gesture(mut self, gesture: Gesture) -> Self {
        self.gesture = gesture;
        self
    }
}

/// Target of [`SelectionManager::clear`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearTarget {
    Space(IdSpace),
    All,
}

impl From<IdSpace> for ClearTarget {
    fn from(space: IdSpace) -> Self {
        ClearTarget::Space(space)
    }
}

impl FromStr for ClearTarget {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ClearTarget::All),
            other => other.parse().map(ClearTarget::Space),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_space() {
        assert_eq!("gene".parse::<IdSpace>().unwrap(), IdSpace::Gene);
        let err = "protein".parse::<IdSpace>().unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdSpace(ref s) if s == "protein"));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("range".parse::<SelectionMode>().unwrap(), SelectionMode::Range);
        assert!(matches!(
            "lasso".parse::<SelectionMode>(),
            Err(CoreError::InvalidMode(_))
        ));
    }

    #[test]
    fn test_parse_clear_target() {
        assert_eq!("all".parse::<ClearTarget>().unwrap(), ClearTarget::All);
        assert_eq!(
            "mutation".parse::<ClearTarget>().unwrap(),
            ClearTarget::Space(IdSpace::Mutation)
        );
        assert!("everything".parse::<ClearTarget>().is_err());
    }

    #[test]
    fn test_brush_bounds_are_closed() {
        let bounds = BrushBounds::new(0.0, 0.0, 2.0, 2.0);
        assert!(bounds.contains(2.0, 0.0));
        assert!(bounds.contains(1.0, 1.0));
        assert!(!bounds.contains(2.0001, 1.0));

        let flipped = BrushBounds::new(2.0, 2.0, 0.0, 0.0);
        assert!(flipped.contains(1.0, 1.0));
    }
}
