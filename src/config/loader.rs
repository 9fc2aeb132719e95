//! Loaders: run configuration from YAML, input records from a JSON array

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::core::Record;
use crate::error::Result;

use super::schema::RunConfig;

/// Load a run configuration from a YAML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<RunConfig> {
    let content = fs::read_to_string(path.as_ref())?;
    load_from_string(&content)
}

/// Load a run configuration from a YAML string
pub fn load_from_string(content: &str) -> Result<RunConfig> {
    let config: RunConfig = serde_yaml::from_str(content)?;
    debug!(date_p = config.date_p, rollup = config.rollup, "loaded run configuration");
    Ok(config)
}

/// Load records from a JSON array of objects
pub fn load_records_from_str(content: &str) -> Result<Vec<Record>> {
    let records: Vec<Record> = serde_json::from_str(content)?;
    debug!(records = records.len(), "loaded records");
    Ok(records)
}

pub fn load_records_from_file(path: impl AsRef<Path>) -> Result<Vec<Record>> {
    let content = fs::read_to_string(path.as_ref())?;
    load_records_from_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::error::CumError;
    use crate::sql::KeyFilter;

    #[test]
    fn test_load_run_config() {
        let yaml = r#"
date_p: 20251230
start_ts: 202512300000
end_ts: 202512300127
query: |
  select
    cost_type,
    uid, -- distinct
    time_minute,
    date_p
  from dwd.cost_detail
  where date_p = ${date_p}
labels:
  all: ALL
params:
  app: video
remote:
  target_table: dws.cum_cost_10m
  key_filter: null_like
"#;
        let config = load_from_string(yaml).unwrap();
        assert!(config.rollup);
        assert_eq!(config.labels.all, "ALL");
        assert_eq!(config.labels.unknown, "未知");
        assert_eq!(config.params["app"], "video");
        assert_eq!(config.parser.distinct_defaults["uid"], "user_num");

        let remote = config.remote.unwrap();
        assert_eq!(remote.target_table, "dws.cum_cost_10m");
        assert!(remote.preagg);
        assert_eq!(remote.key_filter, KeyFilter::NullLike);
        assert_eq!(remote.anchor_table, None);
    }

    #[test]
    fn test_load_run_config_missing_window() {
        let err = load_from_string("query: select 1").unwrap_err();
        assert!(matches!(err, CumError::Yaml(_)));
    }

    #[test]
    fn test_load_records() {
        let json = r#"[
            {"cost_type": "a", "uid": "u1", "cost": 1.5, "time_minute": 202512300001, "date_p": 20251230},
            {"cost_type": null, "uid": 7, "cost": "2", "time_minute": "202512300125.0", "date_p": "20251230"}
        ]"#;
        let records = load_records_from_str(json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("cost"), &Value::Number(1.5));
        assert!(records[1].get("cost_type").is_null());
        assert_eq!(records[1].get("uid").as_text().as_deref(), Some("7"));
        assert!(records[1].get("missing").is_null());
    }

    #[test]
    fn test_load_records_rejects_non_array() {
        assert!(matches!(
            load_records_from_str(r#"{"a": 1}"#),
            Err(CumError::Json(_))
        ));
    }
}
