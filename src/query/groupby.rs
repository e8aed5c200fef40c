//! Grouped aggregation. Groups form in first-seen order of the composite key;
//! each output row carries the key columns plus one `{column}_{agg}` value per
//! aggregation. Group counts always sum to the input row count.

use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{column_index, QueryEngine, QueryError};
use crate::registry::ValidationError;
use crate::store::sheet::Cell;

#[derive(Debug, Deserialize)]
pub(crate) struct GroupbyParams {
    pub file_id: String,
    pub sheet_name: Option<String>,
    pub by: Vec<String>,
    /// Column -> aggregation name. BTreeMap keeps output column order stable.
    pub agg: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agg {
    Sum,
    Mean,
    Count,
    Min,
    Max,
}

impl Agg {
    fn parse(name: &str) -> Result<Self, QueryError> {
        match name {
            "sum" => Ok(Agg::Sum),
            "mean" | "avg" => Ok(Agg::Mean),
            "count" => Ok(Agg::Count),
            "min" => Ok(Agg::Min),
            "max" => Ok(Agg::Max),
            other => Err(ValidationError::InvalidValue {
                param: "agg".to_string(),
                detail: format!(
                    "unknown aggregation '{}' (expected sum, mean, count, min or max)",
                    other
                ),
            }
            .into()),
        }
    }

    fn needs_numeric(&self) -> bool {
        matches!(self, Agg::Sum | Agg::Mean)
    }
}

pub(crate) fn groupby(engine: &QueryEngine, params: GroupbyParams) -> Result<Value, QueryError> {
    if params.by.is_empty() {
        return Err(ValidationError::InvalidValue {
            param: "by".to_string(),
            detail: "at least one group column is required".to_string(),
        }
        .into());
    }
    let (file, sheet_idx) = engine.resolve(&params.file_id, params.sheet_name.as_deref())?;
    let sheet = &file.sheets[sheet_idx];

    let key_cols: Vec<usize> = params
        .by
        .iter()
        .map(|n| column_index(sheet, n))
        .collect::<Result<_, _>>()?;
    let aggs: Vec<(String, usize, Agg)> = params
        .agg
        .iter()
        .map(|(col, name)| Ok((col.clone(), column_index(sheet, col)?, Agg::parse(name)?)))
        .collect::<Result<_, QueryError>>()?;

    // First-seen group order: a vec of groups plus a key -> slot lookup.
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(Vec<Cell>, Vec<usize>)> = Vec::new();
    for (row_idx, row) in sheet.rows.iter().enumerate() {
        let key_cells: Vec<Cell> = key_cols.iter().map(|&c| row[c].clone()).collect();
        let key = serde_json::to_string(&key_cells).unwrap_or_default();
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push((key_cells, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(row_idx);
    }

    let mut out_rows: Vec<Value> = Vec::with_capacity(groups.len());
    for (key_cells, row_indices) in &groups {
        let mut obj = Map::new();
        for (name, cell) in params.by.iter().zip(key_cells.iter()) {
            obj.insert(name.clone(), serde_json::to_value(cell).unwrap_or(Value::Null));
        }
        for (col_name, col_idx, agg) in &aggs {
            let out_name = format!("{}_{}", col_name, agg_name(*agg));
            let value = aggregate(sheet, *col_idx, col_name, *agg, row_indices)?;
            obj.insert(out_name, value);
        }
        obj.insert("count".to_string(), json!(row_indices.len()));
        out_rows.push(Value::Object(obj));
    }

    Ok(json!({
        "sheet": sheet.name,
        "by": params.by,
        "groups": out_rows,
        "total_rows": sheet.rows.len(),
    }))
}

fn agg_name(agg: Agg) -> &'static str {
    match agg {
        Agg::Sum => "sum",
        Agg::Mean => "mean",
        Agg::Count => "count",
        Agg::Min => "min",
        Agg::Max => "max",
    }
}

fn aggregate(
    sheet: &crate::store::sheet::Sheet,
    col_idx: usize,
    col_name: &str,
    agg: Agg,
    rows: &[usize],
) -> Result<Value, QueryError> {
    let cells = || rows.iter().map(|&r| &sheet.rows[r][col_idx]);

    if agg.needs_numeric() {
        let mut values: Vec<f64> = Vec::new();
        for cell in cells() {
            match cell {
                Cell::Null => {} // missing values are skipped, not zeroed
                Cell::Number(n) => values.push(*n),
                other => {
                    return Err(QueryError::TypeMismatch {
                        column: col_name.to_string(),
                        detail: format!(
                            "cannot {} non-numeric value '{}'",
                            agg_name(agg),
                            other.display()
                        ),
                    })
                }
            }
        }
        let sum: f64 = values.iter().sum();
        return Ok(match agg {
            Agg::Sum => json!(sum),
            Agg::Mean if values.is_empty() => Value::Null,
            Agg::Mean => json!(sum / values.len() as f64),
            _ => unreachable!(),
        });
    }

    match agg {
        Agg::Count => Ok(json!(cells().filter(|c| !c.is_null()).count())),
        Agg::Min | Agg::Max => {
            let mut best: Option<&Cell> = None;
            for cell in cells() {
                if cell.is_null() {
                    continue;
                }
                best = Some(match best {
                    None => cell,
                    Some(current) => match current.same_kind_cmp(cell) {
                        Some(std::cmp::Ordering::Less) if agg == Agg::Max => cell,
                        Some(std::cmp::Ordering::Greater) if agg == Agg::Min => cell,
                        Some(_) => current,
                        None => {
                            return Err(QueryError::TypeMismatch {
                                column: col_name.to_string(),
                                detail: "mixed value kinds in group".to_string(),
                            })
                        }
                    },
                });
            }
            Ok(best
                .map(|c| serde_json::to_value(c).unwrap_or(Value::Null))
                .unwrap_or(Value::Null))
        }
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use crate::query::test_support::*;
    use crate::query::QueryError;
    use serde_json::json;

    #[test]
    fn test_groupby_sum_first_seen_order() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute(
                "groupby",
                &args(json!({"file_id": id, "by": ["region"], "agg": {"amount": "sum"}})),
            )
            .unwrap();
        let groups = result["groups"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["region"], json!("east"));
        assert_eq!(groups[0]["amount_sum"], json!(40.0));
        assert_eq!(groups[1]["region"], json!("west"));
        assert_eq!(groups[1]["amount_sum"], json!(20.0));
    }

    #[test]
    fn test_group_counts_conserve_row_count() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute(
                "groupby",
                &args(json!({"file_id": id, "by": ["region"], "agg": {"amount": "count"}})),
            )
            .unwrap();
        let total: u64 = result["groups"]
            .as_array()
            .unwrap()
            .iter()
            .map(|g| g["count"].as_u64().unwrap())
            .sum();
        assert_eq!(total, result["total_rows"].as_u64().unwrap());
    }

    #[test]
    fn test_groupby_multi_key() {
        let (engine, id) =
            engine_with_csv(b"region,year,amount\neast,2023,1\neast,2024,2\neast,2023,3\n");
        let result = engine
            .execute(
                "groupby",
                &args(json!({
                    "file_id": id, "by": ["region", "year"], "agg": {"amount": "sum"}
                })),
            )
            .unwrap();
        let groups = result["groups"].as_array().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0]["year"], json!(2023.0));
        assert_eq!(groups[0]["amount_sum"], json!(4.0));
    }

    #[test]
    fn test_groupby_mean_and_minmax() {
        let (engine, id) = engine_with_sales();
        let result = engine
            .execute(
                "groupby",
                &args(json!({
                    "file_id": id, "by": ["region"],
                    "agg": {"amount": "mean"}
                })),
            )
            .unwrap();
        assert_eq!(result["groups"][0]["amount_mean"], json!(20.0));

        let result = engine
            .execute(
                "groupby",
                &args(json!({"file_id": id, "by": ["region"], "agg": {"amount": "max"}})),
            )
            .unwrap();
        assert_eq!(result["groups"][0]["amount_max"], json!(30.0));
    }

    #[test]
    fn test_unknown_aggregation_is_validation_error() {
        let (engine, id) = engine_with_sales();
        let err = engine
            .execute(
                "groupby",
                &args(json!({"file_id": id, "by": ["region"], "agg": {"amount": "median"}})),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn test_sum_of_text_column_is_type_mismatch() {
        let (engine, id) = engine_with_sales();
        let err = engine
            .execute(
                "groupby",
                &args(json!({"file_id": id, "by": ["amount"], "agg": {"region": "sum"}})),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { .. }));
    }

    #[test]
    fn test_empty_by_rejected() {
        let (engine, id) = engine_with_sales();
        let err = engine
            .execute(
                "groupby",
                &args(json!({"file_id": id, "by": [], "agg": {"amount": "sum"}})),
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }
}
