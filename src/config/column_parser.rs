//! Column contract parser using sqlparser and nom
//!
//! Reads the column list of the last `SELECT ... FROM` block in a query and the
//! `--` comment directives attached to it:
//! ```sql
//! SELECT
//!     cost_type,
//!     coalesce(func_name, scene) AS func_name,
//!     order_id,          -- distinct_req_num
//!     uid,               -- distinct: user_num
//!     cost,              -- sum
//!     time_minute, date_p
//! FROM dwd.cost_detail
//! ```
//!
//! A comment applies to the last column on its line. `distinct` wins over `sum`
//! when both appear.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::{all_consuming, opt, recognize},
    sequence::{pair, preceded, tuple},
    IResult,
};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sqlparser::ast::{
    Expr, FunctionArg, FunctionArgExpr, FunctionArguments, SelectItem, SetExpr, Statement,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::core::{ColumnContract, Derivation, Field, FieldRole, Measure, TimeField};
use crate::error::{CumError, Result};

lazy_static! {
    static ref SELECT_BLOCK: Regex = Regex::new(r"(?is)\bselect\b(.*?)\bfrom\b").unwrap();
    static ref TRAILING_AS: Regex =
        Regex::new(r#"(?i)\bas\b\s+(`?"?[A-Za-z_][A-Za-z0-9_]*`?"?)\s*$"#).unwrap();
    static ref TRAILING_ALIAS: Regex =
        Regex::new(r#"(?s)^(.*\S)\s+(`?"?[A-Za-z_][A-Za-z0-9_]*`?"?)\s*$"#).unwrap();
    static ref COALESCE_CALL: Regex = Regex::new(r"(?is)^coalesce\s*\((.*)\)\s*$").unwrap();
}

/// Parser settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Output names for distinct fields whose directive carries no name
    pub distinct_defaults: IndexMap<String, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        let mut distinct_defaults = IndexMap::new();
        distinct_defaults.insert("order_id".to_string(), "req_num".to_string());
        distinct_defaults.insert("uid".to_string(), "user_num".to_string());
        Self { distinct_defaults }
    }
}

impl ParserConfig {
    pub fn with_distinct_default(
        mut self,
        field: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        self.distinct_defaults.insert(field.into(), output.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DirectiveKind {
    Sum,
    Distinct,
}

/// A `-- sum` / `-- distinct` comment directive
#[derive(Debug, Clone, PartialEq, Eq)]
struct Directive {
    kind: DirectiveKind,
    output: Option<String>,
}

/// A SELECT-list entry reduced to its output column
#[derive(Debug, Clone, PartialEq, Eq)]
struct SelectColumn {
    name: String,
    derivation: Option<Derivation>,
}

// ============================================================================
// Nom Parsers
// ============================================================================

/// Parse identifier: [a-zA-Z_][a-zA-Z0-9_]*
fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)
}

/// Parse column reference: col or table.col, returns the column part
fn column_ref(input: &str) -> IResult<&str, &str> {
    let (input, (first, rest)) = tuple((identifier, opt(preceded(char('.'), identifier))))(input)?;
    Ok((input, rest.unwrap_or(first)))
}

/// Parse a directive output token: separators (`_`, `:`, whitespace) then a word
fn output_token(input: &str) -> IResult<&str, &str> {
    preceded(
        take_while1(|c: char| c == '_' || c == ':' || c.is_whitespace()),
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
    )(input)
}

fn plain_column(text: &str) -> Option<&str> {
    all_consuming(column_ref)(text.trim()).ok().map(|(_, col)| col)
}

fn parse_directive(comment: &str) -> Option<Directive> {
    let lower = comment.to_lowercase();
    let (kind, keyword) = if lower.contains("distinct") {
        (DirectiveKind::Distinct, "distinct")
    } else if lower.contains("sum") {
        (DirectiveKind::Sum, "sum")
    } else {
        return None;
    };

    let output = lower.match_indices(keyword).find_map(|(i, _)| {
        output_token(&lower[i + keyword.len()..])
            .ok()
            .map(|(_, token)| token.to_string())
    });
    Some(Directive { kind, output })
}

// ============================================================================
// Line scanning
// ============================================================================

/// Split a line into code and `--` comment, ignoring `--` inside quotes
pub(crate) fn split_line_comment(line: &str) -> (&str, &str) {
    let mut quote: Option<char> = None;
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') if chars.peek().map(|(_, n)| *n) == Some('\'') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '-') if chars.peek().map(|(_, n)| *n) == Some('-') => {
                return (&line[..i], &line[i + 2..]);
            }
            _ => {}
        }
    }
    (line, "")
}

/// Split on commas outside quotes and parentheses; parts are trimmed, empties dropped
pub(crate) fn split_top_level_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') if chars.peek().map(|(_, n)| *n) == Some('\'') => {
                chars.next();
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn strip_identifier_quotes(s: &str) -> &str {
    let s = s.trim();
    let bytes = s.as_bytes();
    if s.len() >= 2 && bytes[0] == bytes[s.len() - 1] && (bytes[0] == b'`' || bytes[0] == b'"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

// ============================================================================
// Expression parsing
// ============================================================================

/// Column names of a `COALESCE(...)` call, when at least two arguments are columns
fn coalesce_columns(expr: &Expr) -> Option<Derivation> {
    let Expr::Function(func) = expr else {
        return None;
    };
    if !func.name.to_string().eq_ignore_ascii_case("coalesce") {
        return None;
    }
    let FunctionArguments::List(arg_list) = &func.args else {
        return None;
    };
    let columns: Vec<String> = arg_list
        .args
        .iter()
        .filter_map(|arg| match arg {
            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => expr_column(e),
            _ => None,
        })
        .collect();
    (columns.len() >= 2).then_some(Derivation::FirstNonNull(columns))
}

fn expr_column(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(idents) => idents.last().map(|i| i.value.clone()),
        _ => None,
    }
}

/// Parse one SELECT-list entry with sqlparser, falling back to the textual
/// alias rules for dialect syntax sqlparser rejects. `None` means the entry
/// has no usable output name.
fn parse_select_expr(expr: &str) -> Option<SelectColumn> {
    let sql = format!("SELECT {expr}");
    let dialect = GenericDialect {};

    if let Ok(statements) = Parser::parse_sql(&dialect, &sql) {
        if let Some(Statement::Query(query)) = statements.into_iter().next() {
            if let SetExpr::Select(select) = *query.body {
                if select.projection.len() == 1 {
                    if let Some(item) = select.projection.into_iter().next() {
                        return column_from_item(item, TRAILING_AS.is_match(expr));
                    }
                }
            }
        }
    }

    parse_select_expr_text(expr)
}

fn column_from_item(item: SelectItem, has_as: bool) -> Option<SelectColumn> {
    match item {
        SelectItem::UnnamedExpr(expr) => expr_column(&expr).map(|name| SelectColumn {
            name,
            derivation: None,
        }),
        // `a b` is a typo, not an alias, unless written `a AS b`
        SelectItem::ExprWithAlias { expr, .. } if !has_as && expr_column(&expr).is_some() => None,
        SelectItem::ExprWithAlias { expr, alias } => Some(SelectColumn {
            name: alias.value,
            derivation: coalesce_columns(&expr),
        }),
        _ => None,
    }
}

/// Textual fallback: `expr AS alias`, `expr alias` (expr not a plain column),
/// bare columns and `COALESCE(cols) AS alias`
fn parse_select_expr_text(expr: &str) -> Option<SelectColumn> {
    let expr = expr.trim().trim_end_matches(',');
    let mut alias = None;
    let mut body = expr;

    if let Some(caps) = TRAILING_AS.captures(expr) {
        alias = caps.get(1).map(|m| strip_identifier_quotes(m.as_str()));
        body = caps.get(0).map_or(expr, |m| expr[..m.start()].trim());
    } else if let Some(caps) = TRAILING_ALIAS.captures(expr) {
        let left = caps.get(1).map_or("", |m| m.as_str().trim());
        if plain_column(left).is_none() {
            alias = caps.get(2).map(|m| strip_identifier_quotes(m.as_str()));
            body = left;
        }
    }

    if let Some(column) = plain_column(body) {
        return Some(SelectColumn {
            name: alias.unwrap_or(column).to_string(),
            derivation: None,
        });
    }

    let alias = alias?;
    let derivation = COALESCE_CALL.captures(body).and_then(|caps| {
        let inside = caps.get(1)?.as_str();
        let columns: Vec<String> = split_top_level_commas(inside)
            .into_iter()
            .filter_map(plain_column)
            .map(str::to_string)
            .collect();
        (columns.len() >= 2).then_some(Derivation::FirstNonNull(columns))
    });
    Some(SelectColumn {
        name: alias.to_string(),
        derivation,
    })
}

// ============================================================================
// Contract assembly
// ============================================================================

/// The last `SELECT ... FROM` match; group 1 is the column list
pub(crate) fn last_select_block(sql: &str) -> Option<Captures<'_>> {
    SELECT_BLOCK.captures_iter(sql).last()
}

fn resolve_role(
    column: &SelectColumn,
    directive: Option<Directive>,
    config: &ParserConfig,
) -> Result<FieldRole> {
    let name = column.name.as_str();
    let Some(directive) = directive else {
        return Ok(match TimeField::from_name(name) {
            Some(time) => FieldRole::Time(time),
            None => FieldRole::Dimension,
        });
    };

    let measure = match directive.kind {
        DirectiveKind::Sum => Measure::sum(name, directive.output.as_deref().unwrap_or(name)),
        DirectiveKind::Distinct => {
            let output = match directive.output {
                Some(token) if token != name => token,
                token => match config.distinct_defaults.get(name) {
                    Some(default) => default.clone(),
                    None => token.ok_or_else(|| {
                        CumError::configuration(
                            name,
                            "a distinct output name (e.g. `-- distinct_user_num`)",
                        )
                    })?,
                },
            };
            Measure::distinct(name, output)
        }
    };
    Ok(FieldRole::Measure(measure))
}

/// Parse the column contract from query text
pub fn parse_columns(sql: &str, config: &ParserConfig) -> Result<ColumnContract> {
    let block = last_select_block(sql)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| CumError::configuration("SELECT", "a SELECT ... FROM block"))?;

    let mut contract = ColumnContract::new();
    for raw_line in block.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        let (code, comment) = split_line_comment(raw_line);
        let parts = split_top_level_commas(code.trim());
        let last = parts.len().saturating_sub(1);
        for (idx, expr) in parts.iter().enumerate() {
            let column = parse_select_expr(expr).ok_or_else(|| {
                CumError::configuration(*expr, "a column reference or an aliased expression")
            })?;
            let directive = if idx == last {
                parse_directive(comment)
            } else {
                None
            };
            let role = resolve_role(&column, directive, config)?;
            contract.fields.push(Field {
                name: column.name,
                role,
                derivation: column.derivation,
            });
        }
    }

    contract.validate()?;
    debug!(
        fields = contract.fields.len(),
        dimensions = contract.dimensions().len(),
        measures = contract.measures().len(),
        "parsed column contract"
    );
    Ok(contract)
}
