//! Input records: one row of raw dimension, time and measure values

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A raw cell value as it arrives from the record source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

static NULL_VALUE: Value = Value::Null;

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used for grouping. Integral numbers print without a fraction so
    /// `1` and `1.0` land in the same group.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Text(s) => Some(s.clone()),
        }
    }

    /// Numeric form; text is trimmed and parsed, anything else is `None`
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
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

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One input row keyed by field name
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.values.insert(field.into(), value);
    }

    /// Value of a field; absent fields read as `Value::Null`
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&NULL_VALUE)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_text_forms() {
        assert_eq!(Value::Number(42.0).as_text(), Some("42".to_string()));
        assert_eq!(Value::Number(1.5).as_text(), Some("1.5".to_string()));
        assert_eq!(Value::Null.as_text(), None);
        assert_eq!(Value::text("u1").as_text(), Some("u1".to_string()));
    }

    #[test]
    fn test_value_numeric_forms() {
        assert_eq!(Value::text(" 2.5 ").as_f64(), Some(2.5));
        assert_eq!(Value::text("abc").as_f64(), None);
        assert_eq!(Value::Null.as_f64(), None);
    }

    #[test]
    fn test_record_from_json() {
        let json = r#"{"dim": "a", "uid": null, "cost": 1.25, "time_minute": "202512300125"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.get("dim"), &Value::text("a"));
        assert!(record.get("uid").is_null());
        assert!(record.get("missing").is_null());
        assert!(record.contains("uid"));
        assert!(!record.contains("missing"));
        assert_eq!(record.get("cost").as_f64(), Some(1.25));
    }
}
