//! Field extraction over semi-structured records.
//!
//! Absence is a normal outcome here: a path that does not resolve yields
//! `None`, never an error. Only malformed path syntax is rejected, and that
//! happens once in [`FieldPath::parse`], before any record is read.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

use crate::data::{Record, ScalarValue};
use crate::errors::StatsError;

/// Parsed dotted path such as `details.appDetails.file.0.size`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, StatsError> {
        if raw.trim().is_empty() {
            return Err(StatsError::InvalidFieldPath {
                path: raw.to_string(),
                reason: "path is empty".to_string(),
            });
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if let Some(pos) = segments.iter().position(|segment| segment.trim().is_empty()) {
            return Err(StatsError::InvalidFieldPath {
                path: raw.to_string(),
                reason: format!("segment {pos} is empty"),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The path as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Path segments in traversal order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl FromStr for FieldPath {
    type Err = StatsError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Resolve `path` to the raw node it names.
///
/// Objects are indexed by key; arrays by numeric segment. Any missing, null, or
/// wrongly shaped intermediate node yields `None`.
pub fn lookup<'a>(record: &'a Record, path: &FieldPath) -> Option<&'a Value> {
    let mut node = record.as_value();
    for segment in path.segments() {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if node.is_null() { None } else { Some(node) }
}

/// Extract a scalar leaf. Numbers and strings resolve; everything else is absent.
pub fn extract(record: &Record, path: &FieldPath) -> Option<ScalarValue> {
    match lookup(record, path)? {
        Value::Number(number) => number.as_f64().map(ScalarValue::Number),
        Value::String(text) => Some(ScalarValue::Text(text.clone())),
        _ => None,
    }
}

/// Extract a numeric leaf, accepting numeric text.
pub fn extract_f64(record: &Record, path: &FieldPath) -> Option<f64> {
    extract(record, path)?.as_f64()
}

/// Extract a sequence of strings. Non-string items are skipped.
///
/// Returns `None` when the path is absent or does not name an array.
pub fn extract_strings<'a>(record: &'a Record, path: &FieldPath) -> Option<Vec<&'a str>> {
    match lookup(record, path)? {
        Value::Array(items) => Some(items.iter().filter_map(Value::as_str).collect()),
        _ => None,
    }
}

/// Copy only the requested paths out of `record`, keeping their nesting.
///
/// Array segments are kept as objects keyed by the index string, which is
/// enough for [`lookup`] to resolve the same paths on the projected record.
pub fn project(record: &Record, paths: &[FieldPath]) -> Record {
    let mut root = Map::new();
    for path in paths {
        let Some(value) = lookup(record, path) else {
            continue;
        };
        insert_path(&mut root, path.segments(), value.clone());
    }
    Record::new(Value::Object(root))
}

fn insert_path(map: &mut Map<String, Value>, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }
    let child = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(child_map) = child {
        insert_path(child_map, rest, value);
    }
}
