//! Upload parsing: raw bytes -> typed sheets.
//!
//! CSV produces a single sheet named "Sheet1"; XLSX workbooks keep their
//! sheet names and order. Format detection is by filename extension with a
//! CSV fallback, since browsers lie about MIME types more often than users
//! rename files.

use std::io::Cursor;

use anyhow::Context;
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::NaiveDate;

use super::sheet::{parse_token, Cell, Sheet};

pub fn parse_upload(bytes: &[u8], filename: &str) -> anyhow::Result<Vec<Sheet>> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".xlsx") || lower.ends_with(".xls") || lower.ends_with(".ods") {
        parse_workbook(bytes)
    } else {
        parse_csv(bytes)
    }
}

fn parse_csv(bytes: &[u8]) -> anyhow::Result<Vec<Sheet>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let header: Vec<String> = reader
        .headers()
        .context("CSV has no header row")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if header.is_empty() {
        anyhow::bail!("CSV header row is empty");
    }

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for record in reader.records() {
        let record = record.context("Malformed CSV record")?;
        rows.push(record.iter().map(parse_token).collect());
    }

    Ok(vec![Sheet::from_cells("Sheet1", header, rows)])
}

fn parse_workbook(bytes: &[u8]) -> anyhow::Result<Vec<Sheet>> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook =
        open_workbook_auto_from_rs(cursor).context("Cannot open spreadsheet workbook")?;

    let mut sheets = Vec::new();
    for (name, range) in workbook.worksheets() {
        let mut rows_iter = range.rows();
        let header: Vec<String> = match rows_iter.next() {
            Some(row) => row.iter().map(|c| cell_to_string(c).trim().to_string()).collect(),
            None => continue, // empty sheet — skip
        };
        let raw: Vec<Vec<Cell>> = rows_iter
            .map(|row| row.iter().map(workbook_cell).collect())
            .collect();
        sheets.push(Sheet::from_cells(&name, header, raw));
    }

    if sheets.is_empty() {
        anyhow::bail!("Workbook contains no non-empty sheets");
    }
    Ok(sheets)
}

fn workbook_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Null,
        Data::Bool(b) => Cell::Bool(*b),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::Date(naive.date()),
            None => Cell::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d")
            .map(Cell::Date)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(e) => Cell::Text(format!("#ERR:{:?}", e)),
        Data::String(s) => parse_token(s),
    }
}

fn cell_to_string(data: &Data) -> String {
    match data {
        Data::String(s) => s.clone(),
        other => format!("{}", other),
    }
}
