//! Remote plan generator: builds the cumulative CUBE plan and renders it to
//! Hive/Spark SQL.
//!
//! The plan is assembled bottom-up from inline sub-selects:
//!
//! - `base`: normalized dimensions, string keys, double sums and the
//!   10-minute `date_minute`, clamped up to the window start
//! - `spine`: the window's buckets, generated from the anchor table
//! - `dims`: every (rolled) dimension tuple
//! - `sum_bucket`: per-bucket sums per tuple
//! - `first`/`new`: first bucket per key and tuple, then new keys per bucket
//! - `grid`: tuples x spine, left-joined to the buckets and the new counts
//! - `final`: running sums over each tuple's series
//!
//! and inserted into the target partition.

use tracing::{debug, info_span};

use crate::core::{ColumnContract, Measure, TimeField, TimeSpine};
use crate::error::{CumError, Result};

use super::plan::{GroupBy, JoinKind, PlanRequest, Relation, RemotePlan, Select, Source};
use super::preagg::{bucket_expr, preagg_select};

/// Quote a string literal for Hive/Spark SQL
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

// ============================================================================
// Rendering
// ============================================================================

fn render_source(source: &Source) -> String {
    let alias = source
        .alias
        .as_deref()
        .map(|a| format!(" {a}"))
        .unwrap_or_default();
    match &source.relation {
        Relation::Table(name) => format!("{name}{alias}"),
        Relation::Detail(sql) => format!("(\n{sql}\n){alias}"),
        Relation::Select(select) => format!("(\n{}\n){alias}", render_select(select)),
    }
}

/// Render one select and its sub-selects
pub fn render_select(select: &Select) -> String {
    let mut sql = String::new();
    sql.push_str(&format!("select {}\n", select.projections.join(", ")));
    sql.push_str(&format!("from {}\n", render_source(&select.from)));

    for join in &select.joins {
        let keyword = match join.kind {
            JoinKind::Inner => "join",
            JoinKind::Left => "left join",
            JoinKind::Cross => "cross join",
        };
        sql.push_str(&format!("{keyword} {}\n", render_source(&join.source)));
        if !join.on.is_empty() {
            sql.push_str(&format!("on {}\n", join.on.join(" and ")));
        }
    }

    if !select.filters.is_empty() {
        sql.push_str(&format!("where {}\n", select.filters.join(" and ")));
    }

    match &select.group_by {
        GroupBy::None => {}
        GroupBy::Columns(columns) => sql.push_str(&format!("group by {}\n", columns.join(", "))),
        GroupBy::Cube(columns) => {
            sql.push_str(&format!("group by {} with cube\n", columns.join(", ")))
        }
    }

    if let Some(limit) = select.limit {
        sql.push_str(&format!("limit {limit}\n"));
    }

    sql.trim_end().to_string()
}

/// Render the insert statement
pub fn render_plan(plan: &RemotePlan) -> String {
    format!(
        "insert overwrite table {} partition({}={})\n{}",
        plan.target_table,
        plan.partition_column,
        plan.partition_value,
        render_select(&plan.query)
    )
}

// ============================================================================
// Plan building
// ============================================================================

pub struct PlanGenerator<'a> {
    contract: &'a ColumnContract,
    request: &'a PlanRequest,
}

impl<'a> PlanGenerator<'a> {
    pub fn new(contract: &'a ColumnContract, request: &'a PlanRequest) -> Self {
        Self { contract, request }
    }

    /// Build, validate and render the plan as one SQL statement
    pub fn generate(&self) -> Result<String> {
        let plan = self.build()?;
        plan.validate()?;
        let sql = render_plan(&plan);
        debug!(bytes = sql.len(), "rendered remote plan");
        Ok(sql)
    }

    /// Build the typed plan without rendering it
    pub fn build(&self) -> Result<RemotePlan> {
        let _span = info_span!(
            "build_remote_plan",
            target = %self.request.target_table,
            rollup = self.request.rollup
        )
        .entered();

        self.check_request()?;
        let columns = self.target_columns()?;
        let spine = TimeSpine::for_window(&self.request.window)?;
        let dims = self.contract.dimensions();
        let base = self.base();

        let spine_select = self.spine(spine.len());
        let grid = if dims.is_empty() {
            Select::new(Source::select(spine_select, "s")).column("s.date_minute")
        } else {
            Select::new(Source::select(self.dims(&base), "d"))
                .columns(dims.iter().map(|c| format!("d.{c}")))
                .column("s.date_minute")
                .join(JoinKind::Cross, Source::select(spine_select, "s"), vec![])
        };

        let mut joined = Select::new(Source::select(grid, "g"))
            .columns(dims.iter().map(|c| format!("g.{c}")))
            .column("g.date_minute");
        if !self.contract.sum_measures().is_empty() {
            joined = joined.join(
                JoinKind::Left,
                Source::select(self.sum_bucket(&base), "b"),
                self.grid_join("b"),
            );
        }
        for measure in self.contract.measures() {
            let output = measure.output();
            joined = match measure {
                Measure::Sum { .. } => {
                    joined.column(format!("coalesce(b.{output}_bucket, 0) as {output}_bucket"))
                }
                Measure::Distinct { field, .. } => {
                    let alias = format!("n_{output}");
                    joined
                        .column(format!("coalesce({alias}.{output}_new, 0) as {output}_new"))
                        .join(
                            JoinKind::Left,
                            Source::select(self.new_keys(&base, field, output), alias.as_str()),
                            self.grid_join(&alias),
                        )
                }
            };
        }

        let over = if dims.is_empty() {
            "order by date_minute rows between unbounded preceding and current row".to_string()
        } else {
            format!(
                "partition by {} order by date_minute rows between unbounded preceding and current row",
                dims.join(", ")
            )
        };
        let running = Select::new(Source::select(joined, "joined"))
            .columns(dims.iter().copied())
            .column("date_minute")
            .columns(self.contract.measures().into_iter().map(|measure| {
                let output = measure.output();
                let delta = match measure {
                    Measure::Sum { .. } => format!("{output}_bucket"),
                    Measure::Distinct { .. } => format!("{output}_new"),
                };
                format!("sum({delta}) over({over}) as {output}")
            }));

        let anchor = self.anchor_rows().column("1").limit(1);
        let query = Select::new(Source::select(running, "final"))
            .columns(columns)
            .join(
                JoinKind::Inner,
                Source::select(anchor, "anchor"),
                vec!["1=1".to_string()],
            );

        Ok(RemotePlan {
            target_table: self.request.target_table.clone(),
            partition_column: TimeField::PARTITION.to_string(),
            partition_value: self.request.window.date_p,
            query,
        })
    }

    fn check_request(&self) -> Result<()> {
        if !self.contract.has_time(TimeField::Minute) {
            return Err(CumError::plan(
                TimeField::MINUTE,
                "a time_minute column in the column list",
            ));
        }
        if !self.contract.has_time(TimeField::Partition) {
            return Err(CumError::plan(
                TimeField::PARTITION,
                "a date_p column in the column list",
            ));
        }
        if self.request.raw_query.trim().is_empty() {
            return Err(CumError::plan("raw_query", "a non-empty detail query"));
        }
        if self.request.anchor_table.trim().is_empty() {
            return Err(CumError::plan("anchor_table", "an anchor table name"));
        }
        if let Some(schema) = &self.request.target_schema {
            if !schema.partition_columns.is_empty()
                && !schema.partition_columns.iter().any(|c| c == TimeField::PARTITION)
            {
                return Err(CumError::plan(
                    TimeField::PARTITION,
                    format!(
                        "a date_p partition on {}, found ({})",
                        self.request.target_table,
                        schema.partition_columns.join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }

    fn target_columns(&self) -> Result<Vec<String>> {
        let available = self.contract.output_columns();
        let columns = self.request.target_columns(self.contract);
        for column in &columns {
            if !available.contains(column) {
                return Err(CumError::plan(
                    column,
                    format!(
                        "a column the plan produces ({})",
                        available.join(", ")
                    ),
                ));
            }
        }
        Ok(columns)
    }

    fn labels(&self) -> (String, String, String) {
        let labels = &self.request.labels;
        (
            sql_literal(&labels.unknown),
            sql_literal(&labels.undefined_function),
            sql_literal(&labels.all),
        )
    }

    fn anchor_rows(&self) -> Select {
        Select::new(Source::table(self.request.anchor_table.as_str())).filter(format!(
            "{} = {}",
            TimeField::PARTITION,
            self.request.window.date_p
        ))
    }

    fn base(&self) -> Select {
        let window = &self.request.window;
        let preagg = self
            .request
            .preagg
            .then(|| preagg_select(&self.request.raw_query, self.contract, Some(window)))
            .flatten();
        let source = match preagg {
            Some(select) => Source::select(select, "raw"),
            None => Source::detail(self.request.raw_query.trim(), "raw"),
        };

        let (unknown, undefined, _) = self.labels();
        let special = &self.request.labels.special_dimension;
        let mut select = Select::new(source);
        for dim in self.contract.dimensions() {
            select = select.column(if dim == special {
                format!("case when {dim} is null then {undefined} else cast({dim} as string) end as {dim}")
            } else {
                format!(
                    "case when {dim} is null or cast({dim} as string) = '' then {unknown} else cast({dim} as string) end as {dim}"
                )
            });
        }
        for measure in self.contract.measures() {
            let field = measure.field();
            select = select.column(match measure {
                Measure::Distinct { .. } => format!("cast({field} as string) as {field}"),
                Measure::Sum { .. } => format!("cast({field} as double) as {field}"),
            });
        }

        let bucket = bucket_expr();
        select
            .column(format!(
                "greatest({bucket}, {}) as date_minute",
                window.start_bucket().value()
            ))
            .filter(format!("cast(date_p as bigint) = {}", window.date_p))
            .filter(format!("{bucket} <= {}", window.end_bucket().value()))
    }

    fn spine(&self, buckets: usize) -> Select {
        let start = self.request.window.start_bucket();
        let origin = self
            .anchor_rows()
            .column(format!("unix_timestamp('{start}', 'yyyyMMddHHmm') as start_u"))
            .limit(1);
        let index = self
            .anchor_rows()
            .column("cast(row_number() over(order by 1) - 1 as int) as idx")
            .limit(buckets);
        Select::new(Source::select(origin, "p"))
            .column("cast(from_unixtime(p.start_u + n.idx * 600, 'yyyyMMddHHmm') as bigint) as date_minute")
            .join(
                JoinKind::Inner,
                Source::select(index, "n"),
                vec!["1=1".to_string()],
            )
    }

    /// Dimension projections, coalesced to the ALL label under rollup
    fn rolled_dims(&self) -> Vec<String> {
        let (_, _, all) = self.labels();
        self.contract
            .dimensions()
            .iter()
            .map(|c| {
                if self.request.rollup {
                    format!("coalesce({c}, {all}) as {c}")
                } else {
                    c.to_string()
                }
            })
            .collect()
    }

    /// `leading` plus every dimension, cubed under rollup
    fn dim_grouping(&self, leading: &[&str]) -> GroupBy {
        let dims = self.contract.dimensions();
        let columns: Vec<String> = leading
            .iter()
            .chain(dims.iter())
            .map(|c| c.to_string())
            .collect();
        if self.request.rollup && !dims.is_empty() {
            GroupBy::Cube(columns)
        } else {
            GroupBy::Columns(columns)
        }
    }

    fn dims(&self, base: &Select) -> Select {
        Select::new(Source::select(base.clone(), "base"))
            .columns(self.rolled_dims())
            .group_by(self.dim_grouping(&[]))
    }

    fn sum_bucket(&self, base: &Select) -> Select {
        Select::new(Source::select(base.clone(), "base"))
            .column("date_minute")
            .columns(self.rolled_dims())
            .columns(
                self.contract
                    .sum_measures()
                    .into_iter()
                    .map(|m| format!("sum({}) as {}_bucket", m.field(), m.output())),
            )
            .group_by(self.dim_grouping(&["date_minute"]))
    }

    /// New keys per bucket: the cube over (key, dims) gives each key's first
    /// bucket per tuple; the rolled-key row is dropped before counting.
    fn new_keys(&self, base: &Select, key: &str, output: &str) -> Select {
        let first = Select::new(Source::select(base.clone(), "base"))
            .column("min(date_minute) as first_minute")
            .columns(self.rolled_dims())
            .column(key)
            .filter(self.request.key_filter.predicate(key))
            .group_by(self.dim_grouping(&[key]));
        let first = Select::new(Source::select(first, "t"))
            .column("*")
            .filter(format!("t.{key} is not null"));

        let dims = self.contract.dimensions();
        let mut group = vec!["first_minute".to_string()];
        group.extend(dims.iter().map(|c| c.to_string()));
        Select::new(Source::select(first, "first"))
            .column("first_minute as date_minute")
            .columns(dims.iter().copied())
            .column(format!("count(1) as {output}_new"))
            .group_by(GroupBy::Columns(group))
    }

    fn grid_join(&self, alias: &str) -> Vec<String> {
        let mut on = vec![format!("g.date_minute = {alias}.date_minute")];
        on.extend(
            self.contract
                .dimensions()
                .iter()
                .map(|c| format!("g.{c} = {alias}.{c}")),
        );
        on
    }
}
