//! Bounded row windows: read_file, head, tail. Out-of-range `n` clamps to the
//! available rows — these operations never fail on size.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{rows_json, QueryEngine, QueryError};

#[derive(Debug, Deserialize)]
pub(crate) struct WindowParams {
    pub file_id: String,
    pub sheet_name: Option<String>,
    pub n: Option<i64>,
}

pub(crate) fn read_file(engine: &QueryEngine, params: WindowParams) -> Result<Value, QueryError> {
    let cap = engine.limits().max_window_rows;
    window(engine, &params, |total| total.min(cap), false)
}

pub(crate) fn head(engine: &QueryEngine, params: WindowParams) -> Result<Value, QueryError> {
    let n = effective_n(engine, params.n);
    window(engine, &params, |total| total.min(n), false)
}

pub(crate) fn tail(engine: &QueryEngine, params: WindowParams) -> Result<Value, QueryError> {
    let n = effective_n(engine, params.n);
    window(engine, &params, |total| total.min(n), true)
}

/// Negative n clamps to zero; any n above the hard cap clamps to the cap.
fn effective_n(engine: &QueryEngine, n: Option<i64>) -> usize {
    let requested = n.unwrap_or(engine.limits().default_window_rows as i64);
    (requested.max(0) as usize).min(engine.limits().max_window_rows)
}

fn window(
    engine: &QueryEngine,
    params: &WindowParams,
    take: impl Fn(usize) -> usize,
    from_end: bool,
) -> Result<Value, QueryError> {
    let (file, sheet_idx) = engine.resolve(&params.file_id, params.sheet_name.as_deref())?;
    let sheet = &file.sheets[sheet_idx];
    let total = sheet.rows.len();
    let count = take(total);
    let start = if from_end { total - count } else { 0 };
    let rows = rows_json(sheet, sheet.rows[start..start + count].iter());

    Ok(json!({
        "sheet": sheet.name,
        "columns": sheet.columns,
        "rows": rows,
        "total_rows": total,
        "returned": count,
    }))
}

#[cfg(test)]
mod tests {
    use crate::query::test_support::*;
    use serde_json::json;

    #[test]
    fn test_head_default_n() {
        let (engine, id) = engine_with_sales();
        let result = engine.execute("head", &args(json!({"file_id": id}))).unwrap();
        // Only 3 rows exist; default n=5 clamps.
        assert_eq!(result["returned"], json!(3));
        assert_eq!(result["rows"][0]["region"], json!("east"));
        assert_eq!(result["rows"][0]["amount"], json!(10.0));
    }

    #[test]
    fn test_head_n_zero_is_empty_not_error() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute("head", &args(json!({"file_id": id, "n": 0})))
            .unwrap();
        assert_eq!(result["returned"], json!(0));
        assert_eq!(result["rows"].as_array().unwrap().len(), 0);
        assert_eq!(result["total_rows"], json!(3));
    }

    #[test]
    fn test_head_n_larger_than_sheet_clamps() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute("head", &args(json!({"file_id": id, "n": 1000})))
            .unwrap();
        assert_eq!(result["returned"], json!(3));
    }

    #[test]
    fn test_negative_n_clamps_to_zero() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute("head", &args(json!({"file_id": id, "n": -4})))
            .unwrap();
        assert_eq!(result["returned"], json!(0));
    }

    #[test]
    fn test_tail_returns_last_rows() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute("tail", &args(json!({"file_id": id, "n": 2})))
            .unwrap();
        let rows = result["rows"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["region"], json!("west"));
        assert_eq!(rows[1]["amount"], json!(30.0));
    }

    #[test]
    fn test_read_file_capped_at_max_window() {
        let mut csv = String::from("x\n");
        for i in 0..250 {
            csv.push_str(&format!("{}\n", i));
        }
        let (engine, id) = engine_with_csv(csv.as_bytes());
        let result = engine
            .execute("read_file", &args(json!({"file_id": id})))
            .unwrap();
        assert_eq!(result["returned"], json!(100));
        assert_eq!(result["total_rows"], json!(250));
    }
}
