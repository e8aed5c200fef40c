//! Per-column summary statistics. Numeric columns get count/mean/std/min/
//! quartiles/max; everything else gets count/unique/top. Missing values are
//! reported per column, never silently dropped.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{column_index, QueryEngine, QueryError};
use crate::store::sheet::{Cell, ColumnKind, Sheet};

#[derive(Debug, Deserialize)]
pub(crate) struct DescribeParams {
    pub file_id: String,
    pub sheet_name: Option<String>,
    pub columns: Option<Vec<String>>,
}

pub(crate) fn describe(engine: &QueryEngine, params: DescribeParams) -> Result<Value, QueryError> {
    let (file, sheet_idx) = engine.resolve(&params.file_id, params.sheet_name.as_deref())?;
    let sheet = &file.sheets[sheet_idx];

    let indices: Vec<usize> = match &params.columns {
        Some(names) => names
            .iter()
            .map(|n| column_index(sheet, n))
            .collect::<Result<_, _>>()?,
        None => (0..sheet.columns.len()).collect(),
    };

    let mut stats = Map::new();
    for idx in indices {
        let column = &sheet.columns[idx];
        let summary = match column.kind {
            ColumnKind::Number => numeric_summary(sheet, idx),
            _ => categorical_summary(sheet, idx),
        };
        stats.insert(column.name.clone(), summary);
    }

    Ok(json!({
        "sheet": sheet.name,
        "total_rows": sheet.rows.len(),
        "stats": stats,
    }))
}

fn numeric_summary(sheet: &Sheet, idx: usize) -> Value {
    let mut values: Vec<f64> = Vec::new();
    let mut missing = 0usize;
    for row in &sheet.rows {
        match row[idx].as_number() {
            Some(n) => values.push(n),
            None => missing += 1,
        }
    }
    if values.is_empty() {
        return json!({"kind": "number", "count": 0, "missing": missing});
    }

    values.sort_by(|a, b| a.total_cmp(b));
    let count = values.len();
    let mean = values.iter().sum::<f64>() / count as f64;
    // Sample standard deviation (n-1); undefined for a single value.
    let std = if count > 1 {
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };

    json!({
        "kind": "number",
        "count": count,
        "missing": missing,
        "mean": mean,
        "std": std,
        "min": values[0],
        "q25": quantile(&values, 0.25),
        "q50": quantile(&values, 0.5),
        "q75": quantile(&values, 0.75),
        "max": values[count - 1],
    })
}

/// Linear-interpolation quantile over a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

fn categorical_summary(sheet: &Sheet, idx: usize) -> Value {
    let mut seen: Vec<(String, usize)> = Vec::new();
    let mut missing = 0usize;
    let mut count = 0usize;
    for row in &sheet.rows {
        let cell = &row[idx];
        if cell.is_null() {
            missing += 1;
            continue;
        }
        count += 1;
        let key = cell.display();
        match seen.iter_mut().find(|(k, _)| *k == key) {
            Some((_, c)) => *c += 1,
            None => seen.push((key, 1)),
        }
    }
    // Most frequent value; first-seen wins ties, so only a strictly greater
    // count displaces the current best.
    let top = seen
        .iter()
        .reduce(|best, cur| if cur.1 > best.1 { cur } else { best });

    json!({
        "kind": "categorical",
        "count": count,
        "missing": missing,
        "unique": seen.len(),
        "top": top.map(|(k, _)| k.clone()),
        "top_count": top.map(|(_, c)| *c),
    })
}

#[cfg(test)]
mod tests {
    use crate::query::test_support::*;
    use serde_json::json;

    #[test]
    fn test_describe_numeric_column() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute("describe", &args(json!({"file_id": id})))
            .unwrap();
        let amount = &result["stats"]["amount"];
        assert_eq!(amount["count"], json!(3));
        assert_eq!(amount["missing"], json!(0));
        assert_eq!(amount["mean"], json!(20.0));
        assert_eq!(amount["min"], json!(10.0));
        assert_eq!(amount["max"], json!(30.0));
        assert_eq!(amount["q50"], json!(20.0));
        assert_eq!(amount["std"], json!(10.0));
    }

    #[test]
    fn test_describe_categorical_column() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute("describe", &args(json!({"file_id": id})))
            .unwrap();
        let region = &result["stats"]["region"];
        assert_eq!(region["count"], json!(3));
        assert_eq!(region["unique"], json!(2));
        assert_eq!(region["top"], json!("east"));
        assert_eq!(region["top_count"], json!(2));
    }

    #[test]
    fn test_describe_counts_missing_separately() {
        let (engine, id) = engine_with_csv(b"a,b\n1,x\n,y\n3,\n");
        let result = engine
            .execute("describe", &args(json!({"file_id": id})))
            .unwrap();
        assert_eq!(result["stats"]["a"]["count"], json!(2));
        assert_eq!(result["stats"]["a"]["missing"], json!(1));
        assert_eq!(result["stats"]["b"]["missing"], json!(1));
    }

    #[test]
    fn test_describe_top_tie_keeps_first_seen() {
        let (engine, id) = engine_with_csv(b"x\na\nb\nb\na\n");
        let result = engine
            .execute("describe", &args(json!({"file_id": id})))
            .unwrap();
        // a and b both appear twice; a appeared first.
        assert_eq!(result["stats"]["x"]["top"], json!("a"));
        assert_eq!(result["stats"]["x"]["top_count"], json!(2));
    }

    #[test]
    fn test_describe_column_subset() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute(
                "describe",
                &args(json!({"file_id": id, "columns": ["amount"]})),
            )
            .unwrap();
        let stats = result["stats"].as_object().unwrap();
        assert_eq!(stats.len(), 1);
        assert!(stats.contains_key("amount"));
    }

    #[test]
    fn test_describe_unknown_column_errors() {
        let (engine, id) = engine_with_sales();
        let err = engine
            .execute(
                "describe",
                &args(json!({"file_id": id, "columns": ["ghost"]})),
            )
            .unwrap_err();
        assert!(matches!(err, crate::query::QueryError::ColumnNotFound(_)));
    }

    #[test]
    fn test_describe_single_value_has_no_std() {
        let (engine, id) = engine_with_csv(b"a\n5\n");
        let result = engine
            .execute("describe", &args(json!({"file_id": id})))
            .unwrap();
        assert!(result["stats"]["a"]["std"].is_null());
    }
}
