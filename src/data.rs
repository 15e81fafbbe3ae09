use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::source::ID_FIELD;

pub use crate::types::RecordId;

/// Semi-structured catalog document streamed from a record source.
///
/// Records carry no schema: any field may be missing or shaped unexpectedly.
/// They are read-only once produced by a source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Value);

impl Record {
    /// Wrap a raw JSON document.
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Package id stored in `docid`, when present and textual.
    pub fn id(&self) -> Option<&str> {
        self.0.get(ID_FIELD).and_then(Value::as_str)
    }

    /// Borrow the underlying document.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Consume the record and return the underlying document.
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Scalar extracted from a record. Only produced by a successful extraction.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    /// JSON number.
    Number(f64),
    /// JSON string.
    Text(String),
}

impl ScalarValue {
    /// Numeric view of the value.
    ///
    /// Text is accepted when it parses as a number after removing thousands
    /// separators (`"12,345"`), since catalog exports store some counters as text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Number(value) => Some(*value),
            ScalarValue::Text(text) => {
                let cleaned: String = text.trim().chars().filter(|ch| *ch != ',').collect();
                cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
            }
        }
    }

    /// Text view of the value (`None` for numbers).
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ScalarValue::Text(text) => Some(text),
            ScalarValue::Number(_) => None,
        }
    }

    /// True for values the catalog analyzer treats as "not provided" (`0`, `""`).
    pub fn is_blank(&self) -> bool {
        match self {
            ScalarValue::Number(value) => *value == 0.0,
            ScalarValue::Text(text) => text.trim().is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_id_reads_docid() {
        let record = Record::new(json!({"docid": "com.example.notes"}));
        assert_eq!(record.id(), Some("com.example.notes"));
        let missing = Record::new(json!({"docid": 7}));
        assert_eq!(missing.id(), None);
    }

    #[test]
    fn scalar_text_parses_grouped_numbers() {
        assert_eq!(ScalarValue::Text("12,345".into()).as_f64(), Some(12345.0));
        assert_eq!(ScalarValue::Text(" 4.5 ".into()).as_f64(), Some(4.5));
        assert_eq!(ScalarValue::Text("many".into()).as_f64(), None);
        assert_eq!(ScalarValue::Text("NaN".into()).as_f64(), None);
        assert_eq!(ScalarValue::Number(3.0).as_text(), None);
    }

    #[test]
    fn blank_values_match_falsy_inputs() {
        assert!(ScalarValue::Number(0.0).is_blank());
        assert!(ScalarValue::Text("  ".into()).is_blank());
        assert!(!ScalarValue::Number(4.1).is_blank());
    }
}
