//! Query text utilities: placeholder substitution, comment stripping and
//! anchor table inference

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::config::{last_select_block, split_line_comment};
use crate::core::{floor_10m, RunWindow};
use crate::error::{CumError, Result};

lazy_static! {
    /// `${key}` or `\${key}`; the backslash keeps shells from expanding it
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\\?\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    static ref LEADING_TABLE: Regex =
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)").unwrap();
}

/// Placeholders every run provides.
///
/// `date_minute10` defaults to the window end bucket.
pub fn builtin_params(window: &RunWindow, date_minute10: Option<i64>) -> IndexMap<String, String> {
    let mut params = IndexMap::new();
    params.insert("date_p".to_string(), window.date_p.to_string());
    params.insert("start_ts".to_string(), window.start_ts.to_string());
    params.insert("end_ts".to_string(), window.end_ts.to_string());
    params.insert(
        "start_ts_10".to_string(),
        floor_10m(window.start_ts).to_string(),
    );
    params.insert("end_ts_10".to_string(), floor_10m(window.end_ts).to_string());
    params.insert(
        "date_minute10".to_string(),
        date_minute10
            .unwrap_or_else(|| floor_10m(window.end_ts))
            .to_string(),
    );
    params
}

/// Replace every `${key}` with its value. An unknown key is an error rather
/// than being left in the query.
pub fn substitute_params(sql: &str, params: &IndexMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(sql) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = params.get(key.as_str()).ok_or_else(|| {
            CumError::configuration(key.as_str(), "a value for this query placeholder")
        })?;
        out.push_str(&sql[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// Drop `--` comments, keeping `--` inside quoted text
pub fn strip_line_comments(sql: &str) -> String {
    sql.lines()
        .map(|line| split_line_comment(line).0)
        .collect::<Vec<_>>()
        .join("\n")
}

/// First table named after the last `FROM`; `None` when it is a sub-query
pub fn extract_from_table(sql: &str) -> Option<String> {
    let block = last_select_block(sql)?;
    let tail = &sql[block.get(0)?.end()..];
    LEADING_TABLE
        .captures(tail)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> RunWindow {
        RunWindow::new(20251230, 202512300000, 202512301127)
    }

    #[test]
    fn test_builtin_params() {
        let params = builtin_params(&window(), None);
        assert_eq!(params["end_ts_10"], "202512301120");
        assert_eq!(params["date_minute10"], "202512301120");
        assert_eq!(params["date_p"], "20251230");
        let params = builtin_params(&window(), Some(202512300500));
        assert_eq!(params["date_minute10"], "202512300500");
    }

    #[test]
    fn test_substitute_params() {
        let mut params = builtin_params(&window(), None);
        params.insert("app".into(), "'video'".into());
        let sql = "where date_p = ${date_p} and app = \\${app} and t <= ${end_ts}";
        assert_eq!(
            substitute_params(sql, &params).unwrap(),
            "where date_p = 20251230 and app = 'video' and t <= 202512301127"
        );
    }

    #[test]
    fn test_substitute_unknown_param() {
        let err = substitute_params("select ${missing}", &IndexMap::new()).unwrap_err();
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_strip_line_comments() {
        let sql = "select a, -- dim\n  uid -- distinct\nfrom t where x = '--'";
        assert_eq!(
            strip_line_comments(sql),
            "select a, \n  uid \nfrom t where x = '--'"
        );
    }

    #[test]
    fn test_extract_from_table() {
        assert_eq!(
            extract_from_table("select a, b from dwd.events where x = 1"),
            Some("dwd.events".to_string())
        );
        assert_eq!(
            extract_from_table(
                "with x as (select a from ods.raw) select a from dwd.final_t t"
            ),
            Some("dwd.final_t".to_string())
        );
        assert_eq!(extract_from_table("select a from (select 1) s"), None);
        assert_eq!(extract_from_table("no query"), None);
    }
}
