//! Run configuration: the column contract parser and YAML/JSON loading
//!
//! The column list of a detail query doubles as the contract: its last
//! `SELECT ... FROM` block names the dimensions, measures and time fields.

mod column_parser;
mod loader;
mod schema;

pub(crate) use column_parser::{last_select_block, split_line_comment};
pub use column_parser::{parse_columns, ParserConfig};
pub use loader::{load_from_file, load_from_string, load_records_from_file, load_records_from_str};
pub use schema::{RemoteConfig, RunConfig};
