//! Dynamic values held by the store
//!
//! A [`Value`] is what a store key maps to: primitives, arrays, sets, maps and
//! nested objects. Equality is structural and deep: sets, maps and objects
//! compare by content regardless of insertion order, so writing an equal value
//! can be detected and skipped.
//!
//! On the wire, sets and maps are tagged objects:
//! `{"__type":"Set","values":[...]}` and `{"__type":"Map","entries":[[k,v],...]}`.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

const TYPE_TAG: &str = "__type";

/// Nested object type used for the store root and object values
pub type Object = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<Value, Value>),
    Object(Object),
}

impl Value {
    /// Build a set of string ids
    pub fn id_set<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Set(ids.into_iter().map(|id| Value::String(id.into())).collect())
    }

    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Number of elements for collections, `None` for scalars
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(items.len()),
            Value::Set(items) => Some(items.len()),
            Value::Map(entries) => Some(entries.len()),
            Value::Object(fields) => Some(fields.len()),
            _ => None,
        }
    }

    /// String members of a set or array, in sorted/stored order.
    /// Non-string members are skipped.
    pub fn string_items(&self) -> Vec<String> {
        let items: Box<dyn Iterator<Item = &Value>> = match self {
            Value::Set(items) => Box::new(items.iter()),
            Value::Array(items) => Box::new(items.iter()),
            _ => return Vec::new(),
        };
        items.filter_map(|v| v.as_str().map(str::to_string)).collect()
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Set(_) => 5,
            Value::Map(_) => 6,
            Value::Object(_) => 7,
        }
    }

    /// Decode a JSON document, reversing the `__type` tagging of sets and maps
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(mut fields) => {
                let tag = fields.get(TYPE_TAG).and_then(|t| t.as_str()).map(str::to_owned);
                match tag.as_deref() {
                    Some("Set") if fields.get("values").map_or(false, |v| v.is_array()) => {
                        let values = fields.remove("values").unwrap_or_default();
                        Value::Set(json_array(values).map(Value::from_json).collect())
                    }
                    Some("Map") if fields.get("entries").map_or(false, |v| v.is_array()) => {
                        let entries = fields.remove("entries").unwrap_or_default();
                        Value::Map(
                            json_array(entries)
                                .filter_map(|pair| {
                                    let mut pair = json_array(pair);
                                    let key = pair.next()?;
                                    let value = pair.next().unwrap_or_default();
                                    Some((Value::from_json(key), Value::from_json(value)))
                                })
                                .collect(),
                        )
                    }
                    _ => Value::Object(
                        fields
                            .into_iter()
                            .map(|(k, v)| (k, Value::from_json(v)))
                            .collect(),
                    ),
                }
            }
        }
    }

    /// Encode as JSON, tagging sets and maps
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;

        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Set(items) => json!({
                TYPE_TAG: "Set",
                "values": items.iter().map(Value::to_json).collect::<Vec<_>>(),
            }),
            Value::Map(entries) => json!({
                TYPE_TAG: "Map",
                "entries": entries
                    .iter()
                    .map(|(k, v)| json!([k.to_json(), v.to_json()]))
                    .collect::<Vec<_>>(),
            }),
            Value::Object(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn json_array(value: serde_json::Value) -> impl Iterator<Item = serde_json::Value> {
    match value {
        serde_json::Value::Array(items) => items.into_iter(),
        _ => Vec::new().into_iter(),
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    // Integral values round-trip as JSON integers
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            // -0.0 and 0.0 are the same number
            (Value::Number(a), Value::Number(b)) if a == b => Ordering::Equal,
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::Object(a), Value::Object(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from_json)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Object> for Value {
    fn from(fields: Object) -> Self {
        Value::Object(fields)
    }
}

// Dotted-path helpers. `a.b.c` addresses nested objects below the root.

fn segments(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(CoreError::InvalidPath {
            path: path.to_string(),
            segment: String::new(),
        });
    }
    Ok(parts)
}

/// Every proper ancestor of a dotted path, nearest first (`a.b.c` -> `a.b`, `a`)
pub fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.char_indices()
        .rev()
        .filter(|(_, c)| *c == '.')
        .map(move |(i, _)| &path[..i])
}

/// True when `path` equals `other` or lies below it
pub fn is_within(path: &str, other: &str) -> bool {
    path == other
        || (path.len() > other.len()
            && path.starts_with(other)
            && path.as_bytes()[other.len()] == b'.')
}

/// Look up a dotted path. Missing keys and non-object intermediates yield `None`.
pub fn get_path<'a>(root: &'a Object, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = root.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Write a dotted path, creating missing intermediate objects.
/// Returns the previous value. A non-object intermediate is an error and
/// leaves `root` untouched.
pub fn set_path(root: &mut Object, path: &str, value: Value) -> Result<Option<Value>> {
    let parts = segments(path)?;
    let invalid = |segment: &str| CoreError::InvalidPath {
        path: path.to_string(),
        segment: segment.to_string(),
    };
    let Some((last, parents)) = parts.split_last() else {
        return Err(invalid(""));
    };

    // Validate before creating anything
    let mut probe = Some(&*root);
    for part in parents {
        match probe.and_then(|fields| fields.get(*part)) {
            Some(Value::Object(fields)) => probe = Some(fields),
            Some(_) => return Err(invalid(part)),
            None => probe = None,
        }
    }

    let mut current = root;
    for part in parents {
        let entry = current.entry(part.to_string()).or_insert_with(Value::object);
        let Value::Object(fields) = entry else {
            return Err(invalid(part));
        };
        current = fields;
    }
    Ok(current.insert(last.to_string(), value))
}

/// Shallowest ancestor of `path` that is missing from `root`: the first
/// object a `set_path` on `path` would have to create.
pub fn missing_ancestor(root: &Object, path: &str) -> Option<String> {
    ancestors(path)
        .filter(|ancestor| get_path(root, ancestor).is_none())
        .last()
        .map(str::to_string)
}

/// Remove `path`, then drop the ancestors a previous write created for it
/// (up to and including `created`) as long as they are left empty.
pub fn remove_created(root: &mut Object, path: &str, created: Option<&str>) -> Option<Value> {
    let removed = remove_path(root, path);
    let Some(created) = created else {
        return removed;
    };
    for ancestor in ancestors(path) {
        let empty = matches!(get_path(root, ancestor), Some(Value::Object(fields)) if fields.is_empty());
        if !empty {
            break;
        }
        remove_path(root, ancestor);
        if ancestor == created {
            break;
        }
    }
    removed
}

/// Remove a dotted path, returning the removed value
pub fn remove_path(root: &mut Object, path: &str) -> Option<Value> {
    let mut parts: Vec<&str> = path.split('.').collect();
    let last = parts.pop()?;
    let mut current = root;
    for part in parts {
        current = match current.get_mut(part)? {
            Value::Object(fields) => fields,
            _ => return None,
        };
    }
    current.remove(last)
}
