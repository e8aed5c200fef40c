use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::ser::{Serialize, Serializer};

/// A single cell value. `Number` covers both integers and floats — spreadsheet
/// sources do not distinguish them reliably.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cell::Null => serializer.serialize_unit(),
            Cell::Bool(b) => serializer.serialize_bool(*b),
            Cell::Number(n) => serializer.serialize_f64(*n),
            Cell::Date(d) => serializer.serialize_str(&d.format("%Y-%m-%d").to_string()),
            Cell::Text(t) => serializer.serialize_str(t),
        }
    }
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Compare two cells of the same kind. Returns None for mixed kinds —
    /// callers decide whether that is an error or a skip.
    pub fn same_kind_cmp(&self, other: &Cell) -> Option<Ordering> {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.partial_cmp(b),
            (Cell::Text(a), Cell::Text(b)) => Some(a.cmp(b)),
            (Cell::Bool(a), Cell::Bool(b)) => Some(a.cmp(b)),
            (Cell::Date(a), Cell::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Stable textual form used for group keys and frequency tables.
    pub fn display(&self) -> String {
        match self {
            Cell::Null => "null".to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            Cell::Text(t) => t.clone(),
        }
    }
}

/// Inferred column type. Inference is per-column over all non-null cells;
/// any disagreement falls back to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Number,
    Boolean,
    Date,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// One sheet of an uploaded file: ordered columns, ordered rows.
/// Rows are dense — every row has exactly `columns.len()` cells.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Build a sheet from raw string-ish cells, inferring column types.
    /// `raw` rows shorter than the header are padded with nulls.
    pub fn from_cells(name: &str, header: Vec<String>, mut raw: Vec<Vec<Cell>>) -> Sheet {
        let width = header.len();
        for row in raw.iter_mut() {
            row.resize(width, Cell::Null);
        }
        let columns = header
            .into_iter()
            .enumerate()
            .map(|(i, col_name)| {
                let kind = infer_kind(raw.iter().map(|r| &r[i]));
                Column {
                    name: col_name,
                    kind,
                }
            })
            .collect::<Vec<_>>();

        // Re-type text cells that the whole column agrees on (e.g. "10" in a
        // numeric column parsed from CSV).
        let mut rows = raw;
        for (i, col) in columns.iter().enumerate() {
            for row in rows.iter_mut() {
                row[i] = coerce(std::mem::replace(&mut row[i], Cell::Null), col.kind);
            }
        }
        Sheet {
            name: name.to_string(),
            columns,
            rows,
        }
    }
}

/// Parse a raw text token into its most specific cell kind.
pub fn parse_token(token: &str) -> Cell {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return Cell::Null;
    }
    match trimmed {
        "true" | "TRUE" | "True" => return Cell::Bool(true),
        "false" | "FALSE" | "False" => return Cell::Bool(false),
        _ => {}
    }
    if let Ok(n) = trimmed.parse::<f64>() {
        if n.is_finite() {
            return Cell::Number(n);
        }
    }
    if let Some(d) = parse_date(trimmed) {
        return Cell::Date(d);
    }
    Cell::Text(trimmed.to_string())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

fn infer_kind<'a>(cells: impl Iterator<Item = &'a Cell>) -> ColumnKind {
    let mut kind: Option<ColumnKind> = None;
    for cell in cells {
        let this = match cell {
            Cell::Null => continue,
            Cell::Bool(_) => ColumnKind::Boolean,
            Cell::Number(_) => ColumnKind::Number,
            Cell::Date(_) => ColumnKind::Date,
            Cell::Text(_) => ColumnKind::Text,
        };
        match kind {
            None => kind = Some(this),
            Some(k) if k == this => {}
            Some(_) => return ColumnKind::Text,
        }
    }
    kind.unwrap_or(ColumnKind::Text)
}

/// Demote a cell to text when the column's agreed kind disagrees with it.
fn coerce(cell: Cell, kind: ColumnKind) -> Cell {
    match (&cell, kind) {
        (Cell::Null, _) => cell,
        (Cell::Bool(_), ColumnKind::Boolean)
        | (Cell::Number(_), ColumnKind::Number)
        | (Cell::Date(_), ColumnKind::Date)
        | (Cell::Text(_), ColumnKind::Text) => cell,
        _ => Cell::Text(cell.display()),
    }
}
