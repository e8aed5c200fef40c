//! Frequency table for one column. Counts descend; values with equal counts
//! keep the order they first appeared in. Nulls are excluded from the table
//! and reported as a separate missing count.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{column_index, QueryEngine, QueryError};

#[derive(Debug, Deserialize)]
pub(crate) struct ValueCountsParams {
    pub file_id: String,
    pub sheet_name: Option<String>,
    pub column: String,
}

pub(crate) fn value_counts(
    engine: &QueryEngine,
    params: ValueCountsParams,
) -> Result<Value, QueryError> {
    let (file, sheet_idx) = engine.resolve(&params.file_id, params.sheet_name.as_deref())?;
    let sheet = &file.sheets[sheet_idx];
    let idx = column_index(sheet, &params.column)?;

    let mut counts: Vec<(String, Value, usize)> = Vec::new();
    let mut missing = 0usize;
    for row in &sheet.rows {
        let cell = &row[idx];
        if cell.is_null() {
            missing += 1;
            continue;
        }
        let key = cell.display();
        match counts.iter_mut().find(|(k, _, _)| *k == key) {
            Some((_, _, c)) => *c += 1,
            None => counts.push((
                key,
                serde_json::to_value(cell).unwrap_or(Value::Null),
                1,
            )),
        }
    }
    // Stable sort: equal counts preserve first-seen order.
    counts.sort_by(|a, b| b.2.cmp(&a.2));

    let total_non_null: usize = counts.iter().map(|(_, _, c)| *c).sum();
    let cap = engine.limits().max_window_rows;
    let entries: Vec<Value> = counts
        .iter()
        .take(cap)
        .map(|(_, value, count)| json!({"value": value, "count": count}))
        .collect();

    Ok(json!({
        "sheet": sheet.name,
        "column": params.column,
        "counts": entries,
        "unique": counts.len(),
        "total": total_non_null,
        "missing": missing,
    }))
}
