//! Remote plan generation and query text handling

pub mod generator;
pub mod params;
pub mod plan;
pub mod preagg;
pub mod schema;

pub use generator::{render_plan, render_select, sql_literal, PlanGenerator};
pub use params::{builtin_params, extract_from_table, strip_line_comments, substitute_params};
pub use plan::{GroupBy, Join, JoinKind, KeyFilter, PlanRequest, Relation, RemotePlan, Select, Source};
pub use preagg::{build_preagg_query, preagg_select};
pub use schema::TargetSchema;
