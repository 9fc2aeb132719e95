//! 10-minute pre-aggregation of the detail query.
//!
//! Buckets `time_minute` as text (`substr(...,1,11)` + `'0'`), sums the sum
//! measures and keeps distinct keys in the grouping, so the cumulative logic
//! downstream sees the same keys with far fewer rows.

use crate::core::{ColumnContract, FieldRole, Measure, RunWindow, TimeField};

use super::generator::render_select;
use super::plan::{GroupBy, Select, Source};

/// `time_minute` truncated to its 10-minute bucket, as text
pub const BUCKET_TEXT: &str = "concat(substr(cast(time_minute as string),1,11),'0')";

/// Bucket of `time_minute` as a number
pub fn bucket_expr() -> String {
    format!("cast({BUCKET_TEXT} as bigint)")
}

/// Pre-aggregation over `raw`, or `None` when the contract has no `time_minute`.
///
/// With a window the partition and the window end are filtered too.
pub fn preagg_select(
    raw: &str,
    contract: &ColumnContract,
    window: Option<&RunWindow>,
) -> Option<Select> {
    if !contract.has_time(TimeField::Minute) {
        return None;
    }

    let projections = contract.fields.iter().map(|field| {
        let name = field.name.as_str();
        match &field.role {
            FieldRole::Time(TimeField::Minute) => format!("{BUCKET_TEXT} as {name}"),
            FieldRole::Time(TimeField::Partition) => name.to_string(),
            FieldRole::Time(_) => format!("max({name}) as {name}"),
            FieldRole::Measure(Measure::Sum { field, .. }) => format!("sum({field}) as {field}"),
            FieldRole::Measure(Measure::Distinct { .. }) | FieldRole::Dimension => name.to_string(),
        }
    });

    let mut group: Vec<String> = contract.dimensions().iter().map(|d| d.to_string()).collect();
    group.extend(
        contract
            .distinct_measures()
            .iter()
            .map(|m| m.field().to_string()),
    );
    group.push(BUCKET_TEXT.to_string());
    let has_partition = contract.has_time(TimeField::Partition);
    if has_partition {
        group.push(TimeField::PARTITION.to_string());
    }

    let inner = raw.trim().trim_end_matches(';').trim();
    let mut select = Select::new(Source::detail(inner, "raw"))
        .columns(projections)
        .group_by(GroupBy::Columns(group));

    if let Some(window) = window {
        if has_partition {
            select = select.filter(format!("cast(date_p as bigint) = {}", window.date_p));
        }
        select = select.filter(format!(
            "{} <= {}",
            bucket_expr(),
            window.end_bucket().value()
        ));
    }
    Some(select)
}

/// Stand-alone pre-aggregated fetch query for the local path. Falls back to
/// the detail query when it cannot be bucketed.
pub fn build_preagg_query(raw: &str, contract: &ColumnContract) -> String {
    match preagg_select(raw, contract, None) {
        Some(select) => render_select(&select),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Measure;

    fn contract() -> ColumnContract {
        ColumnContract::new()
            .with_dimension("cost_type")
            .with_measure(Measure::distinct("uid", "user_num"))
            .with_measure(Measure::sum("cost", "total_cost"))
            .with_time("time_minute")
            .with_time("time_hour")
            .with_time("date_p")
    }

    #[test]
    fn test_preagg_query_shape() {
        let sql = build_preagg_query("select * from dwd.events;", &contract());
        assert!(sql.starts_with(
            "select cost_type, uid, sum(cost) as cost, concat(substr(cast(time_minute as string),1,11),'0') as time_minute, max(time_hour) as time_hour, date_p"
        ));
        assert!(sql.contains("from (\nselect * from dwd.events\n) raw"));
        assert!(sql.ends_with(
            "group by cost_type, uid, concat(substr(cast(time_minute as string),1,11),'0'), date_p"
        ));
        assert!(!sql.contains("where"));
    }

    #[test]
    fn test_preagg_with_window_filters() {
        let window = RunWindow::new(20251230, 202512300000, 202512300137);
        let select = preagg_select("select * from t", &contract(), Some(&window)).unwrap();
        assert_eq!(
            select.filters,
            vec![
                "cast(date_p as bigint) = 20251230".to_string(),
                format!("{} <= 202512300130", bucket_expr()),
            ]
        );
    }

    #[test]
    fn test_no_time_minute_keeps_raw_query() {
        let contract = ColumnContract::new()
            .with_dimension("d")
            .with_measure(Measure::sum("cost", "cost"));
        assert_eq!(build_preagg_query("select 1", &contract), "select 1");
    }
}
