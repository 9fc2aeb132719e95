//! Core aggregation types and engines

mod contract;
pub mod cube;
pub mod cumulative;
mod normalize;
mod record;
mod spine;
mod table;

pub use contract::{ColumnContract, Derivation, Field, FieldRole, Measure, TimeField};
pub use cumulative::{aggregate, fill_series, LeafAggregate, PreparedInput, PreparedRow};
pub use normalize::{is_valid_key, key_text, NormalizerConfig};
pub use record::{Record, Value};
pub use spine::{floor_10m, parse_minute_ts, Bucket, RunWindow, TimeSpine};
pub use table::{CumulativeCell, CumulativeTable, DimValue, DimensionTuple, OutputRow, OutputTable};
