//! Target table schema, given directly or parsed from `SHOW CREATE TABLE` output

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{CumError, Result};

lazy_static! {
    static ref CREATE_TABLE: Regex = Regex::new(
        r"(?is)CREATE\s+(?:EXTERNAL\s+)?TABLE\s+`?[\w.]+`?\s*\((.*?)\)\s*(?:COMMENT\s+'[^']*'\s*)?PARTITIONED\s+BY\s*\((.*?)\)"
    )
    .unwrap();
    static ref COLUMN_LINE: Regex =
        Regex::new(r"^`?([A-Za-z_][A-Za-z0-9_]*)`?\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    static ref LOCATION: Regex = Regex::new(r"(?is)\bLOCATION\b\s*'([^']+)'").unwrap();
}

/// Column layout of the target table
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetSchema {
    /// Non-partition columns in table order
    pub columns: Vec<String>,
    #[serde(default)]
    pub partition_columns: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl TargetSchema {
    pub fn new(columns: Vec<String>, partition_columns: Vec<String>) -> Self {
        Self {
            columns,
            partition_columns,
            location: None,
        }
    }

    /// Parse a partitioned `CREATE TABLE` statement. Text copied out of a JSON
    /// log may carry escaped `\n`, `\t` and `\r`; they are unescaped first.
    pub fn from_ddl(ddl: &str) -> Result<Self> {
        let text = ddl
            .replace("\\r", "")
            .replace("\\n", "\n")
            .replace("\\t", "\t");

        let caps = CREATE_TABLE.captures(&text).ok_or_else(|| {
            CumError::plan(
                "target_ddl",
                "a CREATE TABLE statement with a PARTITIONED BY clause",
            )
        })?;

        let columns = column_names(caps.get(1).map_or("", |m| m.as_str()));
        if columns.is_empty() {
            return Err(CumError::plan("target_ddl", "at least one table column"));
        }
        let partition_columns = column_names(caps.get(2).map_or("", |m| m.as_str()));
        let location = LOCATION
            .captures(&text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string());

        Ok(Self {
            columns,
            partition_columns,
            location,
        })
    }
}

fn column_names(block: &str) -> Vec<String> {
    block
        .lines()
        .filter_map(|line| {
            COLUMN_LINE
                .captures(line.trim())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_show_create_table() {
        let ddl = r#"CREATE EXTERNAL TABLE `dws.cum_cost_10m`(
  `cost_type` string COMMENT '类型',
  `date_minute` string,
  `user_num` bigint,
  `cost` double)
COMMENT '累计'
PARTITIONED BY (
  `date_p` bigint)
STORED AS ORC
LOCATION
  'hdfs://ns/warehouse/dws.db/cum_cost_10m'"#;
        let schema = TargetSchema::from_ddl(ddl).unwrap();
        assert_eq!(
            schema.columns,
            vec!["cost_type", "date_minute", "user_num", "cost"]
        );
        assert_eq!(schema.partition_columns, vec!["date_p"]);
        assert_eq!(
            schema.location.as_deref(),
            Some("hdfs://ns/warehouse/dws.db/cum_cost_10m")
        );
    }

    #[test]
    fn test_parse_json_escaped_ddl() {
        let ddl = r"CREATE TABLE t (\n  a string,\n  b decimal(10,2)\n)\nPARTITIONED BY (\n  date_p bigint\n)";
        let schema = TargetSchema::from_ddl(ddl).unwrap();
        assert_eq!(schema.columns, vec!["a", "b"]);
        assert_eq!(schema.partition_columns, vec!["date_p"]);
        assert_eq!(schema.location, None);
    }

    #[test]
    fn test_unpartitioned_ddl_is_rejected() {
        let err = TargetSchema::from_ddl("CREATE TABLE t (a string)").unwrap_err();
        assert!(matches!(err, CumError::Plan { .. }));
    }
}
