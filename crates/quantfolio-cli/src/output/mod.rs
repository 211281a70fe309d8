pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The payload of an output envelope, or the value itself when there is none.
pub(crate) fn payload(value: &Value) -> &Value {
    value
        .as_object()
        .and_then(|m| m.get("result").or_else(|| m.get("results")))
        .unwrap_or(value)
}

/// Render a scalar cell. Ratio objects collapse to their value, or to
/// `undefined` when the denominator was zero.
pub(crate) fn render_cell(value: &Value, null: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => null.to_string(),
        Value::Object(map) => match map.get("status").and_then(Value::as_str) {
            Some("defined") => map
                .get("value")
                .map(|v| render_cell(v, null))
                .unwrap_or_default(),
            Some("undefined") => "undefined".to_string(),
            _ => serde_json::to_string(value).unwrap_or_default(),
        },
        Value::Array(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
