//! End-to-end runs.
//!
//! `run` takes records to the cumulative output table in process: derive
//! computed columns, validate the input against the contract, prepare rows,
//! aggregate at the leaf and expand the CUBE. `plan_remote` turns the same
//! configuration into one insert statement for the warehouse instead.

use std::borrow::Cow;

use tracing::{debug, info, info_span, warn};

use crate::config::{parse_columns, RunConfig};
use crate::core::{
    aggregate, cube, key_text, parse_minute_ts, Bucket, ColumnContract, DimensionTuple,
    Measure, NormalizerConfig, OutputTable, PreparedInput, PreparedRow, Record, RunWindow,
    TimeField, TimeSpine, Value,
};
use crate::error::{CumError, Result};
use crate::sql::{
    build_preagg_query, extract_from_table, strip_line_comments, PlanGenerator, PlanRequest,
};

// ============================================================================
// Local path
// ============================================================================

/// Parse the contract from the configured query and compute the output table
pub fn run(config: &RunConfig, records: &[Record]) -> Result<OutputTable> {
    let contract = config.contract()?;
    compute(&contract, config, records)
}

/// Compute the output table for an already parsed contract
pub fn compute(
    contract: &ColumnContract,
    config: &RunConfig,
    records: &[Record],
) -> Result<OutputTable> {
    let window = config.window();
    let _span = info_span!(
        "cumulative_run",
        date_p = window.date_p,
        records = records.len(),
        rollup = config.rollup
    )
    .entered();

    let spine = TimeSpine::for_window(&window)?;
    let records = derive_computed(contract, records)?;
    validate_input(contract, &records)?;

    let input = prepare(contract, &config.labels, &window, &records);
    let leaf = aggregate(&input, &spine);
    let table = if config.rollup {
        cube::expand(leaf)
    } else {
        leaf.into_table()
    };

    info!(
        tuples = table.tuples().count(),
        rows = table.row_count(),
        spine = spine.len(),
        "cumulative table built"
    );
    Ok(table.to_output(&config.labels.all, window.date_p))
}

fn column_present(records: &[Record], column: &str) -> bool {
    records.iter().any(|r| r.contains(column))
}

/// Fill computed columns the input does not already carry
fn derive_computed<'a>(contract: &ColumnContract, records: &'a [Record]) -> Result<Cow<'a, [Record]>> {
    let pending: Vec<_> = contract
        .computed()
        .filter(|(name, _)| !records.iter().all(|r| r.contains(name)))
        .collect();
    if pending.is_empty() {
        return Ok(Cow::Borrowed(records));
    }

    for (name, derivation) in &pending {
        if let Some(source) = derivation
            .sources()
            .iter()
            .find(|s| !column_present(records, s))
        {
            return Err(CumError::data_shape(
                source,
                format!("a source column for computed column '{name}'"),
            ));
        }
    }

    let derived = records
        .iter()
        .map(|record| {
            let mut record = record.clone();
            for (name, derivation) in &pending {
                if !record.contains(name) {
                    let value = derivation.apply(&record);
                    record.insert(*name, value);
                }
            }
            record
        })
        .collect();
    debug!(columns = pending.len(), "derived computed columns");
    Ok(Cow::Owned(derived))
}

/// Every dimension and measure column plus `time_minute` must be present
fn validate_input(contract: &ColumnContract, records: &[Record]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }

    let missing: Vec<&str> = contract
        .measures()
        .into_iter()
        .map(|m| m.field())
        .chain(contract.dimensions())
        .filter(|c| !column_present(records, c))
        .collect();
    if !missing.is_empty() {
        return Err(CumError::data_shape(
            missing.join(", "),
            "every dimension and measure column in the input",
        ));
    }

    if !column_present(records, TimeField::MINUTE) {
        return Err(CumError::data_shape(
            TimeField::MINUTE,
            "a time_minute column in the input",
        ));
    }
    Ok(())
}

fn minute_of(value: &Value) -> Option<i64> {
    parse_minute_ts(&value.as_text()?)
}

fn partition_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        Value::Text(s) => parse_minute_ts(s),
        _ => None,
    }
}

/// Turn records into bucketed, normalized rows.
///
/// Rows outside the partition, after the window end or with an unparseable
/// `time_minute` are dropped. Rows before the window start are kept; they
/// count toward the first spine point.
pub fn prepare(
    contract: &ColumnContract,
    labels: &NormalizerConfig,
    window: &RunWindow,
    records: &[Record],
) -> PreparedInput {
    let dimensions: Vec<String> = contract
        .dimensions()
        .into_iter()
        .map(str::to_string)
        .collect();
    let measures: Vec<Measure> = contract.measures().into_iter().cloned().collect();
    let sum_fields: Vec<&str> = contract.sum_measures().into_iter().map(|m| m.field()).collect();
    let key_fields: Vec<&str> = contract
        .distinct_measures()
        .into_iter()
        .map(|m| m.field())
        .collect();
    let end = window.end_bucket();

    let mut bad_time = 0usize;
    let mut other_partition = 0usize;
    let mut after_window = 0usize;
    let mut invalid_keys = 0usize;
    let mut rows = Vec::with_capacity(records.len());

    for record in records {
        let Some(minute) = minute_of(record.get(TimeField::MINUTE)) else {
            bad_time += 1;
            continue;
        };
        let partition = record.get(TimeField::PARTITION);
        if !partition.is_null() && partition_of(partition) != Some(window.date_p) {
            other_partition += 1;
            continue;
        }
        let bucket = Bucket::containing(minute);
        if bucket > end {
            after_window += 1;
            continue;
        }

        let tuple = DimensionTuple::leaf(
            dimensions
                .iter()
                .map(|d| labels.normalize(d, record.get(d)))
                .collect(),
        );
        let sums = sum_fields
            .iter()
            .map(|f| record.get(f).as_f64().unwrap_or(0.0))
            .collect();
        let keys: Vec<Option<String>> = key_fields.iter().map(|f| key_text(record.get(f))).collect();
        invalid_keys += keys.iter().filter(|k| k.is_none()).count();

        rows.push(PreparedRow {
            tuple,
            bucket,
            sums,
            keys,
        });
    }

    if bad_time > 0 {
        warn!(rows = bad_time, "dropped rows with unparseable time_minute");
    }
    debug!(
        kept = rows.len(),
        other_partition, after_window, invalid_keys, "prepared records"
    );

    PreparedInput {
        dimensions,
        measures,
        rows,
    }
}

// ============================================================================
// Remote path
// ============================================================================

/// Render the single insert statement for the configured remote target
pub fn plan_remote(config: &RunConfig) -> Result<String> {
    let remote = config
        .remote
        .as_ref()
        .ok_or_else(|| CumError::configuration("remote", "a remote section with a target table"))?;
    let _span = info_span!("plan_remote", target = %remote.target_table).entered();

    let resolved = config.resolved_query()?;
    let contract = parse_columns(&resolved, &config.parser)?;
    let raw = strip_line_comments(&resolved);

    let anchor = match &remote.anchor_table {
        Some(table) => table.clone(),
        None => extract_from_table(&raw).ok_or_else(|| {
            CumError::plan(
                "anchor_table",
                "an anchor table, or a query whose last FROM names a table",
            )
        })?,
    };
    debug!(anchor = %anchor, "resolved anchor table");

    let mut request = PlanRequest::new(raw, config.window(), remote.target_table.as_str(), anchor)
        .with_rollup(config.rollup)
        .with_preagg(remote.preagg)
        .with_key_filter(remote.key_filter)
        .with_labels(config.labels.clone());
    if let Some(schema) = remote.target_schema()? {
        request = request.with_target_schema(schema);
    }

    PlanGenerator::new(&contract, &request).generate()
}

/// Pre-aggregated query for fetching rows to the local path
pub fn fetch_query(config: &RunConfig) -> Result<String> {
    let resolved = config.resolved_query()?;
    let contract = parse_columns(&resolved, &config.parser)?;
    Ok(build_preagg_query(&strip_line_comments(&resolved), &contract))
}
