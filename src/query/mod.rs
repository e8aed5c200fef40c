//! Tabular Query Engine: executes one validated operation against the file
//! store. Every operation is read-only and CPU-bound; results are value
//! copies, never live references into the store.
//!
//! The registry's schema validation is shallow (shape of the JSON); here the
//! loosely-typed argument map becomes a strongly-typed parameter struct per
//! operation. A typed-parse failure is still a validation error — the model
//! gets it back as a tool result, same as a schema mismatch.

mod describe;
mod filter;
mod groupby;
mod sort;
mod value_counts;
mod window;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::FilesConfig;
use crate::registry::ValidationError;
use crate::store::sheet::Sheet;
use crate::store::{FileStore, StoredFile};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("sheet not found: {0}")]
    SheetNotFound(String),
    #[error("column not found: {0}")]
    ColumnNotFound(String),
    #[error("unsupported operator '{0}' (expected eq, ne, gt, gte, lt, lte, contains)")]
    UnsupportedOperator(String),
    #[error("type mismatch on column '{column}': {detail}")]
    TypeMismatch { column: String, detail: String },
}

pub struct QueryEngine {
    store: Arc<FileStore>,
    limits: FilesConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<FileStore>, limits: FilesConfig) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> &FilesConfig {
        &self.limits
    }

    /// Execute a named operation with registry-validated arguments.
    pub fn execute(&self, name: &str, args: &Map<String, Value>) -> Result<Value, QueryError> {
        match name {
            "read_file" => window::read_file(self, parse::<window::WindowParams>(args)?),
            "head" => window::head(self, parse::<window::WindowParams>(args)?),
            "tail" => window::tail(self, parse::<window::WindowParams>(args)?),
            "describe" => describe::describe(self, parse::<describe::DescribeParams>(args)?),
            "groupby" => groupby::groupby(self, parse::<groupby::GroupbyParams>(args)?),
            "filter" => filter::filter(self, parse::<filter::FilterParams>(args)?),
            "sort" => sort::sort(self, parse::<sort::SortParams>(args)?),
            "value_counts" => {
                value_counts::value_counts(self, parse::<value_counts::ValueCountsParams>(args)?)
            }
            other => Err(ValidationError::UnknownFunction(other.to_string()).into()),
        }
    }

    /// Resolve file and sheet; the returned snapshot stays valid for the whole
    /// operation even if the file is deleted concurrently.
    pub(crate) fn resolve(
        &self,
        file_id: &str,
        sheet_name: Option<&str>,
    ) -> Result<(Arc<StoredFile>, usize), QueryError> {
        let file = self
            .store
            .get(file_id)
            .ok_or_else(|| QueryError::FileNotFound(file_id.to_string()))?;
        let index = match sheet_name {
            Some(name) => file
                .sheets
                .iter()
                .position(|s| s.name == name)
                .ok_or_else(|| QueryError::SheetNotFound(name.to_string()))?,
            None => 0,
        };
        Ok((file, index))
    }
}

fn parse<T: DeserializeOwned>(args: &Map<String, Value>) -> Result<T, QueryError> {
    serde_json::from_value(Value::Object(args.clone())).map_err(|e| {
        QueryError::Validation(ValidationError::MalformedArguments(e.to_string()))
    })
}

pub(crate) fn column_index(sheet: &Sheet, name: &str) -> Result<usize, QueryError> {
    sheet
        .column_index(name)
        .ok_or_else(|| QueryError::ColumnNotFound(name.to_string()))
}

/// Serialize rows as objects keyed by column name.
pub(crate) fn rows_json<'a>(
    sheet: &Sheet,
    rows: impl Iterator<Item = &'a Vec<crate::store::sheet::Cell>>,
) -> Vec<Value> {
    rows.map(|row| {
        let mut obj = Map::new();
        for (col, cell) in sheet.columns.iter().zip(row.iter()) {
            obj.insert(
                col.name.clone(),
                serde_json::to_value(cell).unwrap_or(Value::Null),
            );
        }
        Value::Object(obj)
    })
    .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const SALES: &[u8] = b"region,amount\neast,10\nwest,20\neast,30\n";

    /// Engine over a fresh store with sales.csv uploaded. Returns its file id.
    pub fn engine_with_sales() -> (QueryEngine, String) {
        let store = Arc::new(FileStore::new());
        let record = store.upload(SALES, "sales.csv").unwrap();
        (
            QueryEngine::new(store, FilesConfig::default()),
            record.id,
        )
    }

    pub fn engine_with_csv(bytes: &[u8]) -> (QueryEngine, String) {
        let store = Arc::new(FileStore::new());
        let record = store.upload(bytes, "data.csv").unwrap();
        (
            QueryEngine::new(store, FilesConfig::default()),
            record.id,
        )
    }

    pub fn args(raw: Value) -> Map<String, Value> {
        match raw {
            Value::Object(map) => map,
            _ => panic!("test args must be an object"),
        }
    }
}
