//! Column contract types: Field, FieldRole, Measure, Derivation

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::record::{Record, Value};
use crate::error::{CumError, Result};

/// Time-related columns. They are never grouped on or measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeField {
    /// `time_minute`: the source of the 10-minute bucket
    Minute,
    /// `date_p`: the partition
    Partition,
    /// `time_hour`
    Hour,
    /// `date_minute` or `time_minute_10`
    Bucketed,
}

impl TimeField {
    pub const MINUTE: &'static str = "time_minute";
    pub const PARTITION: &'static str = "date_p";

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "time_minute" => Some(TimeField::Minute),
            "date_p" => Some(TimeField::Partition),
            "time_hour" => Some(TimeField::Hour),
            "date_minute" | "time_minute_10" => Some(TimeField::Bucketed),
            _ => None,
        }
    }
}

/// A measure bound to its output column
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "agg", rename_all = "snake_case")]
pub enum Measure {
    /// Running total of a numeric field
    Sum { field: String, output: String },
    /// Running count of distinct non-null keys
    Distinct { field: String, output: String },
}

impl Measure {
    pub fn sum(field: impl Into<String>, output: impl Into<String>) -> Self {
        Measure::Sum {
            field: field.into(),
            output: output.into(),
        }
    }

    pub fn distinct(field: impl Into<String>, output: impl Into<String>) -> Self {
        Measure::Distinct {
            field: field.into(),
            output: output.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Measure::Sum { field, .. } | Measure::Distinct { field, .. } => field,
        }
    }

    pub fn output(&self) -> &str {
        match self {
            Measure::Sum { output, .. } | Measure::Distinct { output, .. } => output,
        }
    }

    pub fn is_distinct(&self) -> bool {
        matches!(self, Measure::Distinct { .. })
    }
}

/// How a computed column is derived from other input columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// `COALESCE(a, b, ...)`: first non-missing source value
    FirstNonNull(Vec<String>),
}

impl Derivation {
    pub fn sources(&self) -> &[String] {
        match self {
            Derivation::FirstNonNull(sources) => sources,
        }
    }

    pub fn apply(&self, record: &Record) -> Value {
        match self {
            Derivation::FirstNonNull(sources) => sources
                .iter()
                .map(|source| record.get(source))
                .find(|value| !value.is_null())
                .cloned()
                .unwrap_or(Value::Null),
        }
    }
}

/// What a column contributes to the aggregation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRole {
    Dimension,
    Measure(Measure),
    Time(TimeField),
}

/// One column of the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub role: FieldRole,
    #[serde(default)]
    pub derivation: Option<Derivation>,
}

impl Field {
    pub fn dimension(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Dimension,
            derivation: None,
        }
    }

    pub fn measure(measure: Measure) -> Self {
        Self {
            name: measure.field().to_string(),
            role: FieldRole::Measure(measure),
            derivation: None,
        }
    }

    pub fn time(name: impl Into<String>, time: TimeField) -> Self {
        Self {
            name: name.into(),
            role: FieldRole::Time(time),
            derivation: None,
        }
    }

    pub fn with_derivation(mut self, derivation: Derivation) -> Self {
        self.derivation = Some(derivation);
        self
    }
}

/// Ordered column list with dimension / measure / time roles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnContract {
    pub fields: Vec<Field>,
}

impl ColumnContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_dimension(self, name: impl Into<String>) -> Self {
        self.with_field(Field::dimension(name))
    }

    pub fn with_measure(self, measure: Measure) -> Self {
        self.with_field(Field::measure(measure))
    }

    /// Adds a time column; unknown names are rejected by `validate`
    pub fn with_time(self, name: impl Into<String>) -> Self {
        let name = name.into();
        let time = TimeField::from_name(&name).unwrap_or(TimeField::Bucketed);
        self.with_field(Field::time(name, time))
    }

    /// Rejects empty contracts and contracts without measures. Field names
    /// must be unique, and a measure output may not reuse a dimension,
    /// `date_minute`, `date_p` or another measure's output.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(CumError::configuration(
                "columns",
                "at least one column in the SELECT list",
            ));
        }

        let mut names = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name.as_str()) {
                return Err(CumError::configuration(
                    &field.name,
                    "each column to appear once in the SELECT list",
                ));
            }
            if let FieldRole::Time(_) = field.role {
                if TimeField::from_name(&field.name).is_none() {
                    return Err(CumError::configuration(
                        &field.name,
                        "a known time column (time_minute, date_p, time_hour, date_minute, time_minute_10)",
                    ));
                }
            }
        }

        if self.measures().is_empty() {
            return Err(CumError::configuration(
                "measures",
                "at least one `-- sum` or `-- distinct` directive",
            ));
        }

        let reserved: HashSet<&str> = self
            .dimensions()
            .into_iter()
            .chain(["date_minute", TimeField::PARTITION])
            .collect();
        let mut outputs = HashSet::new();
        for measure in self.measures() {
            if reserved.contains(measure.output()) {
                return Err(CumError::configuration(
                    measure.field(),
                    format!(
                        "an output name other than '{}', which is already an output column",
                        measure.output()
                    ),
                ));
            }
            if !outputs.insert(measure.output()) {
                return Err(CumError::configuration(
                    measure.field(),
                    format!("a unique output name, '{}' is used twice", measure.output()),
                ));
            }
        }
        Ok(())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Dimension names in contract order
    pub fn dimensions(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.role == FieldRole::Dimension)
            .map(|f| f.name.as_str())
            .collect()
    }

    /// Measures in contract order
    pub fn measures(&self) -> Vec<&Measure> {
        self.fields
            .iter()
            .filter_map(|f| match &f.role {
                FieldRole::Measure(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn sum_measures(&self) -> Vec<&Measure> {
        self.measures()
            .into_iter()
            .filter(|m| !m.is_distinct())
            .collect()
    }

    pub fn distinct_measures(&self) -> Vec<&Measure> {
        self.measures()
            .into_iter()
            .filter(|m| m.is_distinct())
            .collect()
    }

    /// Columns produced from other columns, with their derivation
    pub fn computed(&self) -> impl Iterator<Item = (&str, &Derivation)> {
        self.fields
            .iter()
            .filter_map(|f| f.derivation.as_ref().map(|d| (f.name.as_str(), d)))
    }

    pub fn has_time(&self, time: TimeField) -> bool {
        self.fields
            .iter()
            .any(|f| f.role == FieldRole::Time(time))
    }

    /// Output column order: dimensions, `date_minute`, measure outputs
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.dimensions().iter().map(|d| d.to_string()).collect();
        columns.push("date_minute".to_string());
        columns.extend(self.measures().iter().map(|m| m.output().to_string()));
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ColumnContract {
        ColumnContract::new()
            .with_dimension("cost_type")
            .with_time("time_minute")
            .with_time("date_p")
            .with_measure(Measure::distinct("uid", "user_num"))
            .with_measure(Measure::sum("cost", "cost"))
    }

    #[test]
    fn test_contract_roles() {
        let contract = sample();
        contract.validate().unwrap();
        assert_eq!(contract.dimensions(), vec!["cost_type"]);
        assert_eq!(contract.measures().len(), 2);
        assert_eq!(contract.distinct_measures()[0].output(), "user_num");
        assert_eq!(contract.sum_measures()[0].field(), "cost");
        assert!(contract.has_time(TimeField::Minute));
        assert!(!contract.has_time(TimeField::Hour));
        assert_eq!(
            contract.output_columns(),
            vec!["cost_type", "date_minute", "user_num", "cost"]
        );
    }

    #[test]
    fn test_contract_requires_measure() {
        let contract = ColumnContract::new().with_dimension("a");
        assert!(matches!(
            contract.validate(),
            Err(CumError::Configuration { .. })
        ));
    }

    #[test]
    fn test_contract_rejects_duplicate_field() {
        let contract = sample().with_dimension("cost_type");
        let err = contract.validate().unwrap_err();
        assert!(err.to_string().contains("cost_type"));
    }

    #[test]
    fn test_contract_rejects_shared_output() {
        let contract = sample().with_measure(Measure::distinct("device_id", "user_num"));
        let err = contract.validate().unwrap_err();
        assert!(err.to_string().contains("user_num"));
    }

    #[test]
    fn test_contract_rejects_output_colliding_with_dimension() {
        let contract = sample().with_measure(Measure::sum("amount", "cost_type"));
        let err = contract.validate().unwrap_err();
        assert!(matches!(err, CumError::Configuration { ref field, .. } if field == "amount"));
        assert!(err.to_string().contains("cost_type"));

        let contract = sample().with_measure(Measure::sum("amount", "date_minute"));
        let err = contract.validate().unwrap_err();
        assert!(matches!(err, CumError::Configuration { ref field, .. } if field == "amount"));
        assert!(err.to_string().contains("date_minute"));

        let contract = sample().with_measure(Measure::sum("amount", "date_p"));
        assert!(contract.validate().is_err());
    }

    #[test]
    fn test_first_non_null_derivation() {
        let derivation =
            Derivation::FirstNonNull(vec!["func_name".into(), "scene".into(), "raw".into()]);
        let record = Record::new()
            .with("func_name", Value::Null)
            .with("scene", Value::Null)
            .with("raw", "文生图");
        assert_eq!(derivation.apply(&record), Value::text("文生图"));
        let empty_first = Record::new().with("func_name", "").with("scene", "x");
        assert_eq!(derivation.apply(&empty_first), Value::text(""));
        assert_eq!(derivation.apply(&Record::new()), Value::Null);
    }
}
