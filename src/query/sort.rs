//! Stable multi-column sort. Ties keep their input order, so repeated sorts
//! on the same key are reproducible. Null cells always sort last.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{column_index, rows_json, QueryEngine, QueryError};
use crate::registry::ValidationError;
use crate::store::sheet::Cell;

#[derive(Debug, Deserialize)]
pub(crate) struct SortParams {
    pub file_id: String,
    pub sheet_name: Option<String>,
    pub by: Vec<String>,
    pub ascending: Option<AscendingSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum AscendingSpec {
    Global(bool),
    PerColumn(Vec<bool>),
}

pub(crate) fn sort(engine: &QueryEngine, params: SortParams) -> Result<Value, QueryError> {
    if params.by.is_empty() {
        return Err(ValidationError::InvalidValue {
            param: "by".to_string(),
            detail: "at least one sort column is required".to_string(),
        }
        .into());
    }
    let ascending: Vec<bool> = match &params.ascending {
        None => vec![true; params.by.len()],
        Some(AscendingSpec::Global(flag)) => vec![*flag; params.by.len()],
        Some(AscendingSpec::PerColumn(flags)) => {
            if flags.len() != params.by.len() {
                return Err(ValidationError::InvalidValue {
                    param: "ascending".to_string(),
                    detail: format!(
                        "expected {} flags (one per sort column), got {}",
                        params.by.len(),
                        flags.len()
                    ),
                }
                .into());
            }
            flags.clone()
        }
    };

    let (file, sheet_idx) = engine.resolve(&params.file_id, params.sheet_name.as_deref())?;
    let sheet = &file.sheets[sheet_idx];
    let key_cols: Vec<usize> = params
        .by
        .iter()
        .map(|n| column_index(sheet, n))
        .collect::<Result<_, _>>()?;

    let mut order: Vec<usize> = (0..sheet.rows.len()).collect();
    // sort_by is stable; equal keys retain input order.
    order.sort_by(|&a, &b| {
        for (&col, &asc) in key_cols.iter().zip(ascending.iter()) {
            let ord = cell_cmp(&sheet.rows[a][col], &sheet.rows[b][col], asc);
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    let cap = engine.limits().max_window_rows;
    let rows = rows_json(sheet, order.iter().take(cap).map(|&i| &sheet.rows[i]));

    Ok(json!({
        "sheet": sheet.name,
        "columns": sheet.columns,
        "by": params.by,
        "rows": rows,
        "total_rows": sheet.rows.len(),
        "returned": order.len().min(cap),
    }))
}

/// Direction-aware comparison with nulls pinned to the end. Cross-kind cells
/// (possible in an all-text column holding re-typed values) compare by their
/// display form so the order is still total and deterministic.
fn cell_cmp(a: &Cell, b: &Cell, ascending: bool) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let ord = match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => a
            .same_kind_cmp(b)
            .unwrap_or_else(|| a.display().cmp(&b.display())),
    };
    if ascending {
        ord
    } else {
        ord.reverse()
    }
}
