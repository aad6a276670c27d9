//! Event vocabulary shared by the bus, the managers and the views

use serde::{Deserialize, Serialize};

use crate::selection::{BrushBounds, Gesture, IdSpace, SelectionMode};
use crate::value::{Object, Value};

/// Selection of one id space (or of all spaces, after a restore) changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChange {
    /// Space the operation targeted; `None` when several spaces changed at once
    pub id_space: Option<IdSpace>,
    pub ids: Vec<String>,
    pub previous_ids: Vec<String>,

    /// Full selection of every space after the change
    pub sample_ids: Vec<String>,
    pub gene_ids: Vec<String>,
    pub mutation_ids: Vec<String>,

    pub source: String,
    #[serde(rename = "type")]
    pub gesture: Gesture,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub additive: bool,
    pub mode: SelectionMode,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restored: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionClear {
    /// `None` when every space was cleared
    pub id_space: Option<IdSpace>,
    pub source: String,
}

/// Raw brush rectangle, so views can draw it themselves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionBrush {
    pub id_space: IdSpace,
    pub bounds: BrushBounds,
    pub ids: Vec<String>,
    pub source: String,
}

/// Payload of both `highlight:show` and `highlight:hide`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub sample_ids: Vec<String>,
    pub gene_ids: Vec<String>,
    pub mutation_ids: Vec<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterApply {
    pub filters: Object,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub key: String,
    pub new_value: Option<Value>,
    pub old_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetLoaded {
    pub id_space: IdSpace,
    pub count: usize,
    pub source: String,
}

/// Every event the bus can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload")]
pub enum Event {
    #[serde(rename = "selection:change")]
    SelectionChange(SelectionChange),
    #[serde(rename = "selection:clear")]
    SelectionClear(SelectionClear),
    #[serde(rename = "selection:brush")]
    SelectionBrush(SelectionBrush),
    #[serde(rename = "highlight:show")]
    HighlightShow(Highlight),
    #[serde(rename = "highlight:hide")]
    HighlightHide(Highlight),
    #[serde(rename = "filter:apply")]
    FilterApply(FilterApply),
    #[serde(rename = "state:change")]
    StateChange(StateChange),
    #[serde(rename = "state:reset")]
    StateReset,
    #[serde(rename = "dataset:loaded")]
    DatasetLoaded(DatasetLoaded),
}

/// Subscription key: one per [`Event`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SelectionChange,
    SelectionClear,
    SelectionBrush,
    HighlightShow,
    HighlightHide,
    FilterApply,
    StateChange,
    StateReset,
    DatasetLoaded,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            EventKind::SelectionChange => "selection:change",
            EventKind::SelectionClear => "selection:clear",
            EventKind::SelectionBrush => "selection:brush",
            EventKind::HighlightShow => "highlight:show",
            EventKind::HighlightHide => "highlight:hide",
            EventKind::FilterApply => "filter:apply",
            EventKind::StateChange => "state:change",
            EventKind::StateReset => "state:reset",
            EventKind::DatasetLoaded => "dataset:loaded",
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SelectionChange(_) => EventKind::SelectionChange,
            Event::SelectionClear(_) => EventKind::SelectionClear,
            Event::SelectionBrush(_) => EventKind::SelectionBrush,
            Event::HighlightShow(_) => EventKind::HighlightShow,
            Event::HighlightHide(_) => EventKind::HighlightHide,
            Event::FilterApply(_) => EventKind::FilterApply,
            Event::StateChange(_) => EventKind::StateChange,
            Event::StateReset => EventKind::StateReset,
            Event::DatasetLoaded(_) => EventKind::DatasetLoaded,
        }
    }

    /// Wire name; state changes are namespaced by key (`state:filters.minValue`)
    pub fn name(&self) -> String {
        match self {
            Event::StateChange(change) => format!("state:{}", change.key),
            other => other.kind().name().to_string(),
        }
    }

    /// View or actor that originated the event
    pub fn source(&self) -> Option<&str> {
        match self {
            Event::SelectionChange(e) => Some(&e.source),
            Event::SelectionClear(e) => Some(&e.source),
            Event::SelectionBrush(e) => Some(&e.source),
            Event::HighlightShow(e) | Event::HighlightHide(e) => Some(&e.source),
            Event::FilterApply(e) => Some(&e.source),
            Event::DatasetLoaded(e) => Some(&e.source),
            Event::StateChange(_) | Event::StateReset => None,
        }
    }

    /// True when `view_id` emitted this event and must not react to it
    pub fn is_echo_for(&self, view_id: &str) -> bool {
        self.source() == Some(view_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change() -> SelectionChange {
        SelectionChange {
            id_space: Some(IdSpace::Sample),
            ids: vec!["S1".into()],
            previous_ids: vec![],
            sample_ids: vec!["S1".into()],
            gene_ids: vec![],
            mutation_ids: vec![],
            source: "scatter".into(),
            gesture: Gesture::Click,
            additive: false,
            mode: SelectionMode::Multi,
            restored: false,
        }
    }

    #[test]
    fn test_selection_change_wire_shape() {
        let json = serde_json::to_value(Event::SelectionChange(change())).unwrap();
        assert_eq!(json["event"], "selection:change");
        let payload = &json["payload"];
        assert_eq!(payload["sampleIds"], serde_json::json!(["S1"]));
        assert_eq!(payload["mutationIds"], serde_json::json!([]));
        assert_eq!(payload["source"], "scatter");
        assert_eq!(payload["type"], "click");
        assert!(payload.get("additive").is_none());
    }

    #[test]
    fn test_names_and_echo() {
        let event = Event::StateChange(StateChange {
            key: "filters.minValue".into(),
            new_value: Some(Value::from(2)),
            old_value: None,
        });
        assert_eq!(event.name(), "state:filters.minValue");
        assert_eq!(event.kind(), EventKind::StateChange);
        assert!(event.source().is_none());

        let event = Event::SelectionChange(change());
        assert!(event.is_echo_for("scatter"));
        assert!(!event.is_echo_for("heatmap"));
    }
}
