//! Decoding of the REST `tabledata` row format (`{"f": [{"v": ...}]}`) into
//! plain JSON objects keyed by column name.
//!
//! Every scalar arrives as a string; the schema decides what it becomes.

use base64::Engine;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default = "nullable")]
    pub mode: String,
    /// Sub-fields of a RECORD column. Not part of the reported schema.
    #[serde(default, skip_serializing)]
    pub fields: Vec<SchemaField>,
}

fn nullable() -> String {
    "NULLABLE".to_string()
}

impl SchemaField {
    fn is_repeated(&self) -> bool {
        self.mode.eq_ignore_ascii_case("REPEATED")
    }
}

/// Decode a page of rows against its schema.
pub fn decode_rows(schema: &[SchemaField], rows: &[Value]) -> Vec<Map<String, Value>> {
    rows.iter().map(|row| decode_record(schema, row)).collect()
}

fn decode_record(fields: &[SchemaField], row: &Value) -> Map<String, Value> {
    let cells = row.get("f").and_then(Value::as_array);
    fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let raw = cells
                .and_then(|c| c.get(i))
                .and_then(|cell| cell.get("v"))
                .unwrap_or(&Value::Null);
            (field.name.clone(), decode_field(field, raw))
        })
        .collect()
}

fn decode_field(field: &SchemaField, raw: &Value) -> Value {
    if field.is_repeated() {
        return match raw.as_array() {
            Some(items) => items
                .iter()
                .map(|item| decode_value(field, item.get("v").unwrap_or(&Value::Null)))
                .collect(),
            None => Value::Array(Vec::new()),
        };
    }
    decode_value(field, raw)
}

fn decode_value(field: &SchemaField, raw: &Value) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    match field.field_type.to_ascii_uppercase().as_str() {
        "RECORD" | "STRUCT" => Value::Object(decode_record(&field.fields, raw)),
        _ => match raw.as_str() {
            Some(s) => decode_scalar(&field.field_type, s),
            None => raw.clone(),
        },
    }
}

/// Convert one scalar cell. Values that do not parse as their declared type
/// are passed through as strings.
pub fn decode_scalar(field_type: &str, s: &str) -> Value {
    let text = || Value::String(s.to_string());
    match field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => s.parse::<i64>().map(Value::from).unwrap_or_else(|_| text()),
        "FLOAT" | "FLOAT64" => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(text),
        "BOOLEAN" | "BOOL" => match s {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => text(),
        },
        "TIMESTAMP" => timestamp(s).map(Value::String).unwrap_or_else(text),
        "BYTES" => base64::engine::general_purpose::STANDARD
            .decode(s)
            .map(|bytes| Value::String(hex::encode(bytes)))
            .unwrap_or_else(|_| text()),
        // NUMERIC and BIGNUMERIC stay strings to keep their precision.
        _ => text(),
    }
}

/// TIMESTAMP cells are integer epoch microseconds (`useInt64Timestamp`).
fn timestamp(s: &str) -> Option<String> {
    let micros: i64 = s.parse().ok()?;
    let dt = DateTime::from_timestamp_micros(micros)?;
    Some(dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
}
