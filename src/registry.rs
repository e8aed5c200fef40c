//! Plugin Function Registry: the fixed catalog of tabular operations exposed
//! to the model as tools. Immutable after construction; shared read-only by
//! every turn. Validation fails closed — unknown parameters are rejected, not
//! dropped, so the model's view of a call and what executes never diverge.

use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("malformed arguments: {0}")]
    MalformedArguments(String),
    #[error("function '{function}' is missing required parameter '{param}'")]
    MissingParameter { function: String, param: String },
    #[error("function '{function}' does not accept parameter '{param}'")]
    UnknownParameter { function: String, param: String },
    #[error("parameter '{param}' must be {expected}")]
    InvalidType { param: String, expected: String },
    #[error("parameter '{param}' is invalid: {detail}")]
    InvalidValue { param: String, detail: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    StringArray,
    /// Array of `{column, operator, value}` objects.
    ObjectArray,
    /// Mapping of column name to aggregation name.
    Object,
    /// A single boolean, or one boolean per sort column.
    BoolOrBoolArray,
}

impl ParamKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::StringArray => value
                .as_array()
                .is_some_and(|a| a.iter().all(|v| v.is_string())),
            ParamKind::ObjectArray => value
                .as_array()
                .is_some_and(|a| a.iter().all(|v| v.is_object())),
            ParamKind::Object => value.is_object(),
            ParamKind::BoolOrBoolArray => {
                value.is_boolean()
                    || value
                        .as_array()
                        .is_some_and(|a| a.iter().all(|v| v.is_boolean()))
            }
        }
    }

    fn expectation(&self) -> &'static str {
        match self {
            ParamKind::String => "a string",
            ParamKind::Integer => "an integer",
            ParamKind::StringArray => "an array of strings",
            ParamKind::ObjectArray => "an array of objects",
            ParamKind::Object => "an object",
            ParamKind::BoolOrBoolArray => "a boolean or an array of booleans",
        }
    }

    fn json_schema(&self, description: &str) -> Value {
        match self {
            ParamKind::String => json!({"type": "string", "description": description}),
            ParamKind::Integer => json!({"type": "integer", "description": description}),
            ParamKind::StringArray => json!({
                "type": "array", "items": {"type": "string"}, "description": description
            }),
            ParamKind::ObjectArray => json!({
                "type": "array", "items": {"type": "object"}, "description": description
            }),
            ParamKind::Object => json!({"type": "object", "description": description}),
            ParamKind::BoolOrBoolArray => json!({
                "type": ["boolean", "array"],
                "items": {"type": "boolean"},
                "description": description
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// One registry entry, exposed verbatim to the model as a tool definition.
#[derive(Debug, Clone)]
pub struct PluginFunction {
    pub name: &'static str,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
}

impl PluginFunction {
    fn new(name: &'static str, description: &'static str, extra: Vec<ParamSpec>) -> Self {
        // Every function resolves against the data store, so file_id is
        // unconditionally required; sheet_name is unconditionally optional.
        let mut params = vec![
            ParamSpec {
                name: "file_id",
                kind: ParamKind::String,
                required: true,
                description: "Id of the uploaded file to query",
            },
            ParamSpec {
                name: "sheet_name",
                kind: ParamKind::String,
                required: false,
                description: "Sheet to query; defaults to the first sheet",
            },
        ];
        params.extend(extra);
        Self {
            name,
            description,
            params,
        }
    }

    /// OpenAI-format function schema.
    pub fn schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            properties.insert(p.name.to_string(), p.kind.json_schema(p.description));
            if p.required {
                required.push(json!(p.name));
            }
        }
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
                "additionalProperties": false
            }
        })
    }
}

pub struct FunctionRegistry {
    functions: Vec<PluginFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let n = ParamSpec {
            name: "n",
            kind: ParamKind::Integer,
            required: false,
            description: "Number of rows to return (default 5, capped)",
        };
        let functions = vec![
            PluginFunction::new(
                "read_file",
                "Read rows from an uploaded spreadsheet or CSV file.",
                vec![],
            ),
            PluginFunction::new("head", "Return the first n rows of a sheet.", vec![n.clone()]),
            PluginFunction::new("tail", "Return the last n rows of a sheet.", vec![n]),
            PluginFunction::new(
                "describe",
                "Summary statistics per column: count/mean/std/min/max/quartiles for numeric columns, count/unique/top otherwise. Missing values are counted separately.",
                vec![ParamSpec {
                    name: "columns",
                    kind: ParamKind::StringArray,
                    required: false,
                    description: "Columns to describe; defaults to all columns",
                }],
            ),
            PluginFunction::new(
                "groupby",
                "Group rows by one or more columns and aggregate. Group order is first-seen.",
                vec![
                    ParamSpec {
                        name: "by",
                        kind: ParamKind::StringArray,
                        required: true,
                        description: "Columns forming the group key",
                    },
                    ParamSpec {
                        name: "agg",
                        kind: ParamKind::Object,
                        required: true,
                        description: "Mapping of column name to aggregation: sum, mean, count, min or max",
                    },
                ],
            ),
            PluginFunction::new(
                "filter",
                "Return rows matching ALL conditions (logical AND).",
                vec![ParamSpec {
                    name: "conditions",
                    kind: ParamKind::ObjectArray,
                    required: true,
                    description: "List of {column, operator, value}; operators: eq, ne, gt, gte, lt, lte, contains",
                }],
            ),
            PluginFunction::new(
                "sort",
                "Stable sort by one or more columns.",
                vec![
                    ParamSpec {
                        name: "by",
                        kind: ParamKind::StringArray,
                        required: true,
                        description: "Columns to sort by, in priority order",
                    },
                    ParamSpec {
                        name: "ascending",
                        kind: ParamKind::BoolOrBoolArray,
                        required: false,
                        description: "Global flag or one flag per sort column (default true)",
                    },
                ],
            ),
            PluginFunction::new(
                "value_counts",
                "Frequency table for one column, descending by count; ties keep first-seen order.",
                vec![ParamSpec {
                    name: "column",
                    kind: ParamKind::String,
                    required: true,
                    description: "Column to count values of",
                }],
            ),
        ];
        Self { functions }
    }

    /// Ordered catalog, exposed to the model verbatim.
    pub fn describe(&self) -> &[PluginFunction] {
        &self.functions
    }

    /// OpenAI-format tool definitions for a chat request.
    pub fn tool_definitions(&self) -> Vec<Value> {
        self.functions
            .iter()
            .map(|f| json!({"type": "function", "function": f.schema()}))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&PluginFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Validate a raw argument payload against the catalog. Any single
    /// invalid, unknown or missing field invalidates the whole call.
    pub fn validate(&self, name: &str, raw_args: &str) -> Result<Map<String, Value>, ValidationError> {
        let function = self
            .get(name)
            .ok_or_else(|| ValidationError::UnknownFunction(name.to_string()))?;

        let args: Value = serde_json::from_str(raw_args)
            .map_err(|e| ValidationError::MalformedArguments(e.to_string()))?;
        let args = match args {
            Value::Object(map) => map,
            other => {
                return Err(ValidationError::MalformedArguments(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        for key in args.keys() {
            if !function.params.iter().any(|p| p.name == key) {
                return Err(ValidationError::UnknownParameter {
                    function: name.to_string(),
                    param: key.clone(),
                });
            }
        }
        for param in &function.params {
            match args.get(param.name) {
                Some(value) => {
                    if !param.kind.matches(value) {
                        return Err(ValidationError::InvalidType {
                            param: param.name.to_string(),
                            expected: param.kind.expectation().to_string(),
                        });
                    }
                }
                None if param.required => {
                    return Err(ValidationError::MissingParameter {
                        function: name.to_string(),
                        param: param.name.to_string(),
                    });
                }
                None => {}
            }
        }
        Ok(args)
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
