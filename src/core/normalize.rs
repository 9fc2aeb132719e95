//! Dimension value normalization and distinct-key validity

use serde::{Deserialize, Serialize};

use super::record::Value;

/// Labels substituted for missing values, plus the label printed for rolled-up dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Replaces missing or empty values of ordinary dimensions
    pub unknown: String,
    /// Replaces missing values of the special dimension
    pub undefined_function: String,
    /// The dimension whose empty strings are kept as-is
    pub special_dimension: String,
    /// Printed in place of a rolled-up dimension
    pub all: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            unknown: "未知".to_string(),
            undefined_function: "未定义功能".to_string(),
            special_dimension: "func_name".to_string(),
            all: "整体".to_string(),
        }
    }
}

impl NormalizerConfig {
    pub fn with_all_label(mut self, label: impl Into<String>) -> Self {
        self.all = label.into();
        self
    }

    pub fn with_special_dimension(mut self, name: impl Into<String>) -> Self {
        self.special_dimension = name.into();
        self
    }

    pub fn is_special(&self, dimension: &str) -> bool {
        dimension == self.special_dimension
    }

    /// Canonical text for one dimension value.
    ///
    /// The special dimension only replaces missing values; its empty string
    /// stays empty so "no function" and "function unknown" remain separate.
    pub fn normalize(&self, dimension: &str, value: &Value) -> String {
        let text = value.as_text();
        if self.is_special(dimension) {
            return text.unwrap_or_else(|| self.undefined_function.clone());
        }
        match text {
            Some(s) if !s.is_empty() => s,
            _ => self.unknown.clone(),
        }
    }
}

/// Whether a value counts as a distinct key.
///
/// Missing values, blank text, `\N` and any casing of `null` are rejected.
/// Sources that write NULL as text would otherwise count those as one extra key.
pub fn is_valid_key(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Number(n) => n.is_finite(),
        Value::Bool(_) => true,
        Value::Text(s) => {
            let trimmed = s.trim();
            !(trimmed.is_empty() || trimmed == "\\N" || trimmed.eq_ignore_ascii_case("null"))
        }
    }
}

/// Key text for a valid key, `None` otherwise
pub fn key_text(value: &Value) -> Option<String> {
    if is_valid_key(value) {
        value.as_text()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_dimension_keeps_empty_and_unknown() {
        let config = NormalizerConfig::default();
        let values = [
            Value::Null,
            Value::text(""),
            Value::text("未知"),
            Value::text("图生视频"),
        ];
        let normalized: Vec<String> = values
            .iter()
            .map(|v| config.normalize("func_name", v))
            .collect();
        assert_eq!(normalized, vec!["未定义功能", "", "未知", "图生视频"]);
    }

    #[test]
    fn test_ordinary_dimension_folds_missing_and_empty() {
        let config = NormalizerConfig::default();
        let values = [
            Value::Null,
            Value::text("未知"),
            Value::text("x"),
            Value::text(""),
        ];
        let normalized: Vec<String> = values
            .iter()
            .map(|v| config.normalize("other_dim", v))
            .collect();
        assert_eq!(normalized, vec!["未知", "未知", "x", "未知"]);
    }

    #[test]
    fn test_numeric_dimension_text() {
        let config = NormalizerConfig::default();
        assert_eq!(config.normalize("channel", &Value::Number(3.0)), "3");
    }

    #[test]
    fn test_valid_keys() {
        assert!(is_valid_key(&Value::text("u1")));
        assert!(is_valid_key(&Value::Number(0.0)));
        assert!(!is_valid_key(&Value::Null));
        assert!(!is_valid_key(&Value::text("")));
        assert!(!is_valid_key(&Value::text("   ")));
        assert!(!is_valid_key(&Value::text("\\N")));
        assert!(!is_valid_key(&Value::text("NULL")));
        assert!(!is_valid_key(&Value::text(" null ")));
        assert_eq!(key_text(&Value::Number(7.0)), Some("7".to_string()));
        assert_eq!(key_text(&Value::text("Null")), None);
    }
}
