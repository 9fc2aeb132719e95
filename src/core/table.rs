//! Dimension tuples, the cumulative table and its rendered output form

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use super::contract::Measure;
use super::spine::{Bucket, TimeSpine};

/// One coordinate of a dimension tuple
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DimValue {
    Value(String),
    /// Rolled up over every value of this dimension
    All,
}

impl DimValue {
    pub fn render<'a>(&'a self, all_label: &'a str) -> &'a str {
        match self {
            DimValue::Value(v) => v,
            DimValue::All => all_label,
        }
    }
}

impl From<&str> for DimValue {
    fn from(s: &str) -> Self {
        DimValue::Value(s.to_string())
    }
}

/// Values of every dimension in contract order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DimensionTuple(pub Vec<DimValue>);

impl DimensionTuple {
    pub fn leaf(values: Vec<String>) -> Self {
        DimensionTuple(values.into_iter().map(DimValue::Value).collect())
    }

    /// Same tuple with dimension `index` replaced by `All`
    pub fn rolled(&self, index: usize) -> Self {
        let mut values = self.0.clone();
        values[index] = DimValue::All;
        DimensionTuple(values)
    }

    pub fn is_leaf(&self) -> bool {
        self.0.iter().all(|v| matches!(v, DimValue::Value(_)))
    }

    pub fn values(&self) -> &[DimValue] {
        &self.0
    }
}

/// Cumulative series per tuple, aligned to the spine.
///
/// `series[tuple][i][t]` is measure `i` (contract order) at spine point `t`.
#[derive(Debug, Clone)]
pub struct CumulativeTable {
    pub dimensions: Vec<String>,
    pub measures: Vec<Measure>,
    pub spine: TimeSpine,
    pub series: BTreeMap<DimensionTuple, Vec<Vec<f64>>>,
}

/// One (tuple, bucket) cell with a value per measure
#[derive(Debug, Clone, PartialEq)]
pub struct CumulativeCell<'a> {
    pub tuple: &'a DimensionTuple,
    pub bucket: Bucket,
    pub values: Vec<f64>,
}

impl CumulativeTable {
    pub fn tuples(&self) -> impl Iterator<Item = &DimensionTuple> {
        self.series.keys()
    }

    /// Number of output rows: tuples x spine points
    pub fn row_count(&self) -> usize {
        self.series.len() * self.spine.len()
    }

    fn measure_index(&self, output: &str) -> Option<usize> {
        self.measures.iter().position(|m| m.output() == output)
    }

    /// Full series of one measure for one tuple
    pub fn series_for(&self, tuple: &DimensionTuple, output: &str) -> Option<&[f64]> {
        let index = self.measure_index(output)?;
        self.series.get(tuple).map(|s| s[index].as_slice())
    }

    pub fn value(&self, tuple: &DimensionTuple, bucket: Bucket, output: &str) -> Option<f64> {
        let position = self.spine.position(bucket)?;
        self.series_for(tuple, output).map(|s| s[position])
    }

    /// Cells ordered by tuple, then time
    pub fn cells(&self) -> impl Iterator<Item = CumulativeCell<'_>> {
        self.series.iter().flat_map(move |(tuple, series)| {
            self.spine
                .buckets()
                .iter()
                .enumerate()
                .map(move |(t, bucket)| CumulativeCell {
                    tuple,
                    bucket: *bucket,
                    values: series.iter().map(|s| s[t]).collect(),
                })
        })
    }

    /// Only the tuples without any rolled-up dimension
    pub fn leaf_slice(&self) -> BTreeMap<&DimensionTuple, &Vec<Vec<f64>>> {
        self.series.iter().filter(|(t, _)| t.is_leaf()).collect()
    }

    /// Renders the table with `all_label` for rolled-up dimensions
    pub fn to_output(&self, all_label: &str, date_p: i64) -> OutputTable {
        let rows = self
            .cells()
            .map(|cell| OutputRow {
                dimensions: cell
                    .tuple
                    .values()
                    .iter()
                    .map(|v| v.render(all_label).to_string())
                    .collect(),
                date_minute: cell.bucket.to_string(),
                measures: cell.values,
                date_p: date_p.to_string(),
            })
            .collect();

        OutputTable {
            dimension_columns: self.dimensions.clone(),
            measure_columns: self.measures.iter().map(|m| m.output().to_string()).collect(),
            rows,
        }
    }
}

/// A rendered output row
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub dimensions: Vec<String>,
    /// 12-digit `YYYYMMDDHHMM` text
    pub date_minute: String,
    pub measures: Vec<f64>,
    pub date_p: String,
}

/// Output table: dimension columns, `date_minute`, measure outputs, `date_p`
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    pub dimension_columns: Vec<String>,
    pub measure_columns: Vec<String>,
    pub rows: Vec<OutputRow>,
}

impl OutputTable {
    pub fn header(&self) -> Vec<String> {
        let mut header = self.dimension_columns.clone();
        header.push("date_minute".to_string());
        header.extend(self.measure_columns.iter().cloned());
        header.push("date_p".to_string());
        header
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as ordered column -> JSON value maps
    pub fn to_records(&self) -> Vec<IndexMap<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = IndexMap::new();
                for (name, value) in self.dimension_columns.iter().zip(&row.dimensions) {
                    record.insert(name.clone(), serde_json::Value::from(value.as_str()));
                }
                record.insert(
                    "date_minute".to_string(),
                    serde_json::Value::from(row.date_minute.as_str()),
                );
                for (name, value) in self.measure_columns.iter().zip(&row.measures) {
                    record.insert(name.clone(), serde_json::Value::from(*value));
                }
                record.insert(
                    "date_p".to_string(),
                    serde_json::Value::from(row.date_p.as_str()),
                );
                record
            })
            .collect()
    }

    /// Rows matching the given dimension values (rendered form)
    pub fn rows_for<'a>(&'a self, dimensions: &'a [&'a str]) -> impl Iterator<Item = &'a OutputRow> {
        self.rows.iter().filter(move |row| {
            row.dimensions.len() == dimensions.len()
                && row.dimensions.iter().zip(dimensions).all(|(a, b)| a == b)
        })
    }
}

impl Serialize for OutputTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_records().serialize(serializer)
    }
}
