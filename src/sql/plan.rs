//! Typed relational plan for the remote cumulative query.
//!
//! Every intermediate relation is an inline sub-select; there are no named
//! bindings. A `Select` always has a `from`, so every relation traces back to
//! the detail query or a physical table. `RemotePlan::validate` checks the
//! remaining structural rules before rendering.

use serde::{Deserialize, Serialize};

use crate::core::{ColumnContract, NormalizerConfig, RunWindow, TimeField};
use crate::error::{CumError, Result};

use super::schema::TargetSchema;

/// Which distinct keys the remote query discards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFilter {
    /// Engine NULL only
    #[default]
    NullOnly,
    /// NULL, blank, `\N` and textual `null`, matching the local path
    NullLike,
}

impl KeyFilter {
    /// Predicate keeping valid keys of `column`
    pub fn predicate(&self, column: &str) -> String {
        match self {
            KeyFilter::NullOnly => format!("{column} is not null"),
            KeyFilter::NullLike => format!(
                "{column} is not null and trim({column}) <> '' and trim({column}) <> '\\\\N' and lower(trim({column})) <> 'null'"
            ),
        }
    }
}

/// Everything the plan generator needs besides the contract
#[derive(Debug, Clone)]
pub struct PlanRequest {
    /// Detail query, placeholders already substituted
    pub raw_query: String,
    pub window: RunWindow,
    pub rollup: bool,
    /// Wrap the detail query in a 10-minute pre-aggregation first
    pub preagg: bool,
    pub target_table: String,
    /// Partitioned table used to build the spine and pin the target partition
    pub anchor_table: String,
    pub target_schema: Option<TargetSchema>,
    pub key_filter: KeyFilter,
    pub labels: NormalizerConfig,
}

impl PlanRequest {
    pub fn new(
        raw_query: impl Into<String>,
        window: RunWindow,
        target_table: impl Into<String>,
        anchor_table: impl Into<String>,
    ) -> Self {
        Self {
            raw_query: raw_query.into(),
            window,
            rollup: true,
            preagg: true,
            target_table: target_table.into(),
            anchor_table: anchor_table.into(),
            target_schema: None,
            key_filter: KeyFilter::default(),
            labels: NormalizerConfig::default(),
        }
    }

    pub fn with_rollup(mut self, rollup: bool) -> Self {
        self.rollup = rollup;
        self
    }

    pub fn with_preagg(mut self, preagg: bool) -> Self {
        self.preagg = preagg;
        self
    }

    pub fn with_target_schema(mut self, schema: TargetSchema) -> Self {
        self.target_schema = Some(schema);
        self
    }

    pub fn with_key_filter(mut self, key_filter: KeyFilter) -> Self {
        self.key_filter = key_filter;
        self
    }

    pub fn with_labels(mut self, labels: NormalizerConfig) -> Self {
        self.labels = labels;
        self
    }

    /// Target column order: the schema's non-partition columns, or
    /// dimensions, `date_minute`, measures
    pub fn target_columns(&self, contract: &ColumnContract) -> Vec<String> {
        match &self.target_schema {
            Some(schema) if !schema.columns.is_empty() => schema
                .columns
                .iter()
                .filter(|c| {
                    c.as_str() != TimeField::PARTITION && !schema.partition_columns.contains(*c)
                })
                .cloned()
                .collect(),
            _ => contract.output_columns(),
        }
    }
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// The caller's detail query
    Detail(String),
    /// A physical table
    Table(String),
    Select(Box<Select>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub relation: Relation,
    pub alias: Option<String>,
}

impl Source {
    pub fn detail(sql: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            relation: Relation::Detail(sql.into()),
            alias: Some(alias.into()),
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self {
            relation: Relation::Table(name.into()),
            alias: None,
        }
    }

    pub fn select(select: Select, alias: impl Into<String>) -> Self {
        Self {
            relation: Relation::Select(Box::new(select)),
            alias: Some(alias.into()),
        }
    }

    fn validate(&self) -> Result<()> {
        match &self.relation {
            Relation::Table(_) => Ok(()),
            Relation::Detail(sql) if sql.trim().is_empty() => {
                Err(CumError::plan("raw_query", "a non-empty detail query"))
            }
            Relation::Detail(_) | Relation::Select(_) if self.alias.is_none() => {
                Err(CumError::plan("alias", "an alias on every sub-select"))
            }
            Relation::Detail(_) => Ok(()),
            Relation::Select(select) => select.validate(),
        }
    }

    fn reads_detail(&self) -> bool {
        match &self.relation {
            Relation::Detail(_) => true,
            Relation::Table(_) => false,
            Relation::Select(select) => select.reads_detail(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: Source,
    /// Conditions joined with `and`; empty for cross joins
    pub on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum GroupBy {
    #[default]
    None,
    Columns(Vec<String>),
    /// `group by ... with cube`
    Cube(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub projections: Vec<String>,
    pub from: Source,
    pub joins: Vec<Join>,
    /// Conditions joined with `and`
    pub filters: Vec<String>,
    pub group_by: GroupBy,
    pub limit: Option<usize>,
}

impl Select {
    pub fn new(source: Source) -> Self {
        Self {
            projections: Vec::new(),
            from: source,
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: GroupBy::None,
            limit: None,
        }
    }

    pub fn column(mut self, projection: impl Into<String>) -> Self {
        self.projections.push(projection.into());
        self
    }

    pub fn columns<I, S>(mut self, projections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections.extend(projections.into_iter().map(Into::into));
        self
    }

    pub fn join(mut self, kind: JoinKind, source: Source, on: Vec<String>) -> Self {
        self.joins.push(Join { kind, source, on });
        self
    }

    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.filters.push(condition.into());
        self
    }

    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = group_by;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.projections.is_empty() {
            return Err(CumError::plan("select", "at least one projection"));
        }
        self.from.validate()?;
        for join in &self.joins {
            if !matches!(join.source.relation, Relation::Select(_)) {
                return Err(CumError::plan("join", "a sub-select as every join operand"));
            }
            join.source.validate()?;
            match join.kind {
                JoinKind::Cross if !join.on.is_empty() => {
                    return Err(CumError::plan("join", "no condition on a cross join"));
                }
                JoinKind::Inner | JoinKind::Left if join.on.is_empty() => {
                    return Err(CumError::plan("join", "a join condition"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn reads_detail(&self) -> bool {
        self.from.reads_detail() || self.joins.iter().any(|j| j.source.reads_detail())
    }
}

/// `insert overwrite table <target> partition(<column>=<value>) <query>`
#[derive(Debug, Clone, PartialEq)]
pub struct RemotePlan {
    pub target_table: String,
    pub partition_column: String,
    pub partition_value: i64,
    pub query: Select,
}

impl RemotePlan {
    pub fn validate(&self) -> Result<()> {
        if self.target_table.trim().is_empty() {
            return Err(CumError::plan("target_table", "a target table name"));
        }
        if !self.query.reads_detail() {
            return Err(CumError::plan(
                "raw_query",
                "the plan to read from the detail query",
            ));
        }
        self.query.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_select() -> Select {
        Select::new(Source::detail("select * from t", "raw")).column("a")
    }

    #[test]
    fn test_valid_plan() {
        let query = Select::new(Source::select(detail_select(), "x"))
            .column("x.a")
            .join(
                JoinKind::Left,
                Source::select(detail_select(), "y"),
                vec!["x.a = y.a".into()],
            );
        let plan = RemotePlan {
            target_table: "dws.out".into(),
            partition_column: "date_p".into(),
            partition_value: 20251230,
            query,
        };
        plan.validate().unwrap();
    }

    #[test]
    fn test_join_operand_must_be_subselect() {
        let query = detail_select().join(JoinKind::Inner, Source::table("dim.t"), vec!["1=1".into()]);
        let err = query.validate().unwrap_err();
        assert!(err.to_string().contains("sub-select"));
    }

    #[test]
    fn test_cross_join_rejects_condition() {
        let query = detail_select().join(
            JoinKind::Cross,
            Source::select(detail_select(), "s"),
            vec!["1=1".into()],
        );
        assert!(matches!(query.validate(), Err(CumError::Plan { .. })));
    }

    #[test]
    fn test_plan_must_read_detail() {
        let plan = RemotePlan {
            target_table: "dws.out".into(),
            partition_column: "date_p".into(),
            partition_value: 1,
            query: Select::new(Source::table("dim.t")).column("1"),
        };
        let err = plan.validate().unwrap_err();
        assert!(err.to_string().contains("raw_query"));
    }

    #[test]
    fn test_key_filter_predicates() {
        assert_eq!(KeyFilter::NullOnly.predicate("uid"), "uid is not null");
        let strict = KeyFilter::NullLike.predicate("uid");
        assert!(strict.contains("trim(uid) <> ''"));
        assert!(strict.contains("lower(trim(uid)) <> 'null'"));
    }
}
