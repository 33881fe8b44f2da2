//! Inbound batch payload shapes
//!
//! Two shapes are accepted for either series:
//! - a single user's parallel lists, where `timestamp` and the value field
//!   (`bpm` or `steps`) hold newline-delimited entries
//! - a JSON array of `{ username, timestamp, bpm|steps }` objects
//!
//! Values may be JSON numbers or numeric strings.

use crate::types::SeriesKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Separator between entries of a parallel list
pub const LIST_SEPARATOR: char = '\n';

/// A reading as submitted by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl NumericField {
    /// Split a parallel-list field into its entries, dropping blank lines
    pub fn entries(&self) -> Vec<NumericField> {
        match self {
            NumericField::Text(text) => text
                .split(LIST_SEPARATOR)
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| NumericField::Text(line.to_string()))
                .collect(),
            other => vec![other.clone()],
        }
    }

    /// Original text of the reading, for error messages
    pub fn display(&self) -> String {
        match self {
            NumericField::Integer(i) => i.to_string(),
            NumericField::Float(f) => f.to_string(),
            NumericField::Text(s) => s.clone(),
        }
    }
}

/// Single-user payload with newline-delimited parallel lists
#[derive(Debug, Clone, PartialEq)]
pub struct ParallelPayload {
    pub username: String,
    pub timestamps: String,
    pub values: NumericField,
}

/// One object of the array payload
#[derive(Debug, Clone, PartialEq)]
pub struct SampleItem {
    pub username: String,
    pub timestamp: String,
    pub value: NumericField,
}

/// A structurally decoded inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingPayload {
    Parallel(ParallelPayload),
    Items(Vec<SampleItem>),
}

impl IncomingPayload {
    /// Decode the payload shape from parsed JSON
    pub fn from_value(value: &Value, kind: SeriesKind) -> Result<Self, ValidationError> {
        match value {
            Value::Object(object) => Ok(IncomingPayload::Parallel(ParallelPayload {
                username: required_string(object, "username", None)?,
                timestamps: required_string(object, "timestamp", None)?,
                values: required_numeric(object, kind.value_field(), None)?,
            })),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| SampleItem::from_value(item, kind, index))
                .collect::<Result<Vec<_>, _>>()
                .map(IncomingPayload::Items),
            other => Err(ValidationError::UnexpectedShape(json_type_name(other).to_string())),
        }
    }
}

impl SampleItem {
    /// Decode one array entry
    pub fn from_value(value: &Value, kind: SeriesKind, index: usize) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::WrongType {
            index: Some(index),
            field: "entry".to_string(),
            expected: "object",
        })?;

        Ok(SampleItem {
            username: required_string(object, "username", Some(index))?,
            timestamp: required_string(object, "timestamp", Some(index))?,
            value: required_numeric(object, kind.value_field(), Some(index))?,
        })
    }
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    index: Option<usize>,
) -> Result<String, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField {
            index,
            field: field.to_string(),
        }),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ValidationError::WrongType {
            index,
            field: field.to_string(),
            expected: "string",
        }),
    }
}

fn required_numeric(
    object: &Map<String, Value>,
    field: &str,
    index: Option<usize>,
) -> Result<NumericField, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField {
            index,
            field: field.to_string(),
        }),
        Some(value @ (Value::Number(_) | Value::String(_))) => {
            serde_json::from_value(value.clone()).map_err(|_| ValidationError::WrongType {
                index,
                field: field.to_string(),
                expected: "number or numeric string",
            })
        }
        Some(_) => Err(ValidationError::WrongType {
            index,
            field: field.to_string(),
            expected: "number or numeric string",
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn at(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!("entry {i}: "),
        None => String::new(),
    }
}

/// Schema and type violations in an inbound batch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{}missing required field `{field}`", at(.index))]
    MissingField { index: Option<usize>, field: String },

    #[error("{}field `{field}` must be a {expected}", at(.index))]
    WrongType {
        index: Option<usize>,
        field: String,
        expected: &'static str,
    },

    #[error("{}field `username` must not be empty", at(.index))]
    EmptyUsername { index: Option<usize> },

    #[error("Timestamp and {label} arrays must have the same length after parsing. ({timestamps} timestamps, {values} values)")]
    LengthMismatch {
        label: String,
        timestamps: usize,
        values: usize,
    },

    #[error("invalid timestamp `{value}` at position {position}: {reason}")]
    InvalidTimestamp {
        position: usize,
        value: String,
        reason: String,
    },

    #[error("One or more {field} values are not valid numbers: `{value}` at position {position}")]
    NonNumericValue {
        position: usize,
        field: String,
        value: String,
    },

    #[error("{field} value `{value}` at position {position} is not an integer")]
    NotAnInteger {
        position: usize,
        field: String,
        value: String,
    },

    #[error("steps value {value} at position {position} must not be negative")]
    NegativeSteps { position: usize, value: i64 },

    #[error("expected a JSON object or an array of objects, got {0}")]
    UnexpectedShape(String),
}
