//! YAML schema for a run: the window, the detail query and optional remote settings

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::{ColumnContract, NormalizerConfig, RunWindow};
use crate::error::Result;
use crate::sql::{builtin_params, substitute_params, KeyFilter, TargetSchema};

use super::column_parser::{parse_columns, ParserConfig};

fn default_true() -> bool {
    true
}

/// One cumulative run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Partition day, `YYYYMMDD`
    pub date_p: i64,
    /// Window start, `YYYYMMDDHHMM`
    pub start_ts: i64,
    /// Window end, `YYYYMMDDHHMM`
    pub end_ts: i64,
    /// Detail query; its last select block is the column contract
    pub query: String,
    #[serde(default = "default_true")]
    pub rollup: bool,
    /// Overrides the `date_minute10` placeholder
    #[serde(default)]
    pub date_minute10: Option<i64>,
    /// Extra `${key}` values, taking precedence over the built-ins
    #[serde(default)]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub labels: NormalizerConfig,
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

/// Settings for the single-query remote plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub target_table: String,
    /// Partitioned table for the spine; inferred from the query when absent
    #[serde(default)]
    pub anchor_table: Option<String>,
    #[serde(default = "default_true")]
    pub preagg: bool,
    #[serde(default)]
    pub key_filter: KeyFilter,
    #[serde(default)]
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    /// `SHOW CREATE TABLE` output; wins over the column lists
    #[serde(default)]
    pub target_ddl: Option<String>,
}

impl RunConfig {
    pub fn new(date_p: i64, start_ts: i64, end_ts: i64, query: impl Into<String>) -> Self {
        Self {
            date_p,
            start_ts,
            end_ts,
            query: query.into(),
            rollup: true,
            date_minute10: None,
            params: IndexMap::new(),
            parser: ParserConfig::default(),
            labels: NormalizerConfig::default(),
            remote: None,
        }
    }

    pub fn with_rollup(mut self, rollup: bool) -> Self {
        self.rollup = rollup;
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn window(&self) -> RunWindow {
        RunWindow::new(self.date_p, self.start_ts, self.end_ts)
    }

    /// Built-in placeholders merged with the user's
    pub fn sql_params(&self) -> IndexMap<String, String> {
        let mut params = builtin_params(&self.window(), self.date_minute10);
        params.extend(self.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }

    /// The detail query with every placeholder substituted
    pub fn resolved_query(&self) -> Result<String> {
        substitute_params(&self.query, &self.sql_params())
    }

    pub fn contract(&self) -> Result<ColumnContract> {
        parse_columns(&self.resolved_query()?, &self.parser)
    }
}

impl RemoteConfig {
    pub fn new(target_table: impl Into<String>) -> Self {
        Self {
            target_table: target_table.into(),
            anchor_table: None,
            preagg: true,
            key_filter: KeyFilter::default(),
            target_columns: Vec::new(),
            partition_columns: Vec::new(),
            target_ddl: None,
        }
    }

    pub fn with_anchor_table(mut self, table: impl Into<String>) -> Self {
        self.anchor_table = Some(table.into());
        self
    }

    pub fn with_target_ddl(mut self, ddl: impl Into<String>) -> Self {
        self.target_ddl = Some(ddl.into());
        self
    }

    /// Target schema from the DDL, else from the column lists, else none
    pub fn target_schema(&self) -> Result<Option<TargetSchema>> {
        if let Some(ddl) = &self.target_ddl {
            return TargetSchema::from_ddl(ddl).map(Some);
        }
        if self.target_columns.is_empty() && self.partition_columns.is_empty() {
            return Ok(None);
        }
        Ok(Some(TargetSchema::new(
            self.target_columns.clone(),
            self.partition_columns.clone(),
        )))
    }
}
