//! Conjunctive row filtering. Every condition must hold (AND). A comparison
//! between incompatible types is an execution error, never a silent false.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{column_index, rows_json, QueryEngine, QueryError};
use crate::store::sheet::Cell;

#[derive(Debug, Deserialize)]
pub(crate) struct FilterParams {
    pub file_id: String,
    pub sheet_name: Option<String>,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Condition {
    pub column: String,
    pub operator: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl Op {
    fn parse(name: &str) -> Result<Self, QueryError> {
        match name {
            "eq" | "==" => Ok(Op::Eq),
            "ne" | "!=" => Ok(Op::Ne),
            "gt" | ">" => Ok(Op::Gt),
            "gte" | ">=" => Ok(Op::Gte),
            "lt" | "<" => Ok(Op::Lt),
            "lte" | "<=" => Ok(Op::Lte),
            "contains" => Ok(Op::Contains),
            other => Err(QueryError::UnsupportedOperator(other.to_string())),
        }
    }
}

/// The condition's JSON value as a comparable cell.
fn condition_cell(column: &str, value: &Value) -> Result<Cell, QueryError> {
    match value {
        Value::Null => Err(QueryError::TypeMismatch {
            column: column.to_string(),
            detail: "cannot compare against null".to_string(),
        }),
        Value::Bool(b) => Ok(Cell::Bool(*b)),
        Value::Number(n) => n.as_f64().map(Cell::Number).ok_or_else(|| {
            QueryError::TypeMismatch {
                column: column.to_string(),
                detail: "non-finite number".to_string(),
            }
        }),
        Value::String(s) => Ok(crate::store::sheet::parse_token(s)),
        other => Err(QueryError::TypeMismatch {
            column: column.to_string(),
            detail: format!("unsupported comparison value: {}", other),
        }),
    }
}

pub(crate) fn filter(engine: &QueryEngine, params: FilterParams) -> Result<Value, QueryError> {
    let (file, sheet_idx) = engine.resolve(&params.file_id, params.sheet_name.as_deref())?;
    let sheet = &file.sheets[sheet_idx];

    let compiled: Vec<(usize, Op, Cell, String)> = params
        .conditions
        .iter()
        .map(|c| {
            Ok((
                column_index(sheet, &c.column)?,
                Op::parse(&c.operator)?,
                condition_cell(&c.column, &c.value)?,
                c.column.clone(),
            ))
        })
        .collect::<Result<_, QueryError>>()?;

    let mut kept: Vec<&Vec<Cell>> = Vec::new();
    'rows: for row in &sheet.rows {
        for (col_idx, op, rhs, col_name) in &compiled {
            if !matches(&row[*col_idx], *op, rhs, col_name)? {
                continue 'rows;
            }
        }
        kept.push(row);
    }

    let total = sheet.rows.len();
    let matched = kept.len();
    let cap = engine.limits().max_window_rows;
    let rows = rows_json(sheet, kept.into_iter().take(cap));

    Ok(json!({
        "sheet": sheet.name,
        "columns": sheet.columns,
        "rows": rows,
        "matched": matched,
        "total_rows": total,
        "returned": matched.min(cap),
    }))
}

fn matches(cell: &Cell, op: Op, rhs: &Cell, column: &str) -> Result<bool, QueryError> {
    // Null cells never match; they are absent values, not comparison errors.
    if cell.is_null() {
        return Ok(false);
    }
    if op == Op::Contains {
        return match (cell, rhs) {
            (Cell::Text(haystack), Cell::Text(needle)) => Ok(haystack.contains(needle.as_str())),
            (Cell::Text(haystack), other) => Ok(haystack.contains(&other.display())),
            _ => Err(QueryError::TypeMismatch {
                column: column.to_string(),
                detail: "'contains' requires a text column".to_string(),
            }),
        };
    }
    let ordering = cell.same_kind_cmp(rhs).ok_or_else(|| QueryError::TypeMismatch {
        column: column.to_string(),
        detail: format!(
            "cannot compare cell '{}' with condition value '{}'",
            cell.display(),
            rhs.display()
        ),
    })?;
    Ok(match op {
        Op::Eq => ordering.is_eq(),
        Op::Ne => !ordering.is_eq(),
        Op::Gt => ordering.is_gt(),
        Op::Gte => ordering.is_ge(),
        Op::Lt => ordering.is_lt(),
        Op::Lte => ordering.is_le(),
        Op::Contains => unreachable!(),
    })
}
