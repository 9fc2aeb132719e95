//! cumcube: cumulative 10-minute aggregation with CUBE rollups
//!
//! The column list of a detail query is the contract: `-- sum` and
//! `-- distinct_<name>` comments mark measures, `time_minute`/`date_p` mark
//! time, and everything else is a dimension. From it the crate computes, for
//! every dimension combination (rolled-up dimensions included), a cumulative
//! series over the day's 10-minute spine, either in process or as a single
//! Hive/Spark statement.
//!
//! # Example
//!
//! ```
//! use cumcube::{pipeline, Record, RunConfig};
//!
//! let config = RunConfig::new(
//!     20251230,
//!     202512300110,
//!     202512300130,
//!     "select
//!        cost_type,
//!        uid, -- distinct
//!        cost, -- sum
//!        time_minute,
//!        date_p
//!      from dwd.cost_detail",
//! );
//!
//! let records = vec![
//!     Record::new()
//!         .with("cost_type", "video")
//!         .with("uid", "u1")
//!         .with("cost", 1.5)
//!         .with("time_minute", 202512300125i64)
//!         .with("date_p", 20251230i64),
//! ];
//!
//! let table = pipeline::run(&config, &records).unwrap();
//! // video and the rolled-up total, three spine points each
//! assert_eq!(table.len(), 6);
//! assert_eq!(
//!     table.header(),
//!     vec!["cost_type", "date_minute", "user_num", "cost", "date_p"]
//! );
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod sql;

// Re-export commonly used types
pub use config::{
    load_from_file, load_from_string, load_records_from_file, load_records_from_str,
    parse_columns, ParserConfig, RemoteConfig, RunConfig,
};
pub use core::{
    ColumnContract, CumulativeTable, DimValue, DimensionTuple, Measure, NormalizerConfig,
    OutputTable, Record, RunWindow, TimeSpine, Value,
};
pub use error::{CumError, Result};
pub use pipeline::{plan_remote, run};
pub use sql::{KeyFilter, PlanGenerator, PlanRequest, TargetSchema};
