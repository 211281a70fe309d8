use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{payload, render_cell};

/// Format the payload as a table, followed by warnings and methodology when
/// the value is a computation envelope.
pub fn print_table(value: &Value) {
    match payload(value) {
        Value::Object(map) => print_fields(map),
        Value::Array(arr) => print_rows(arr),
        other => println!("{}", render_cell(other, "null")),
    }

    let Value::Object(envelope) = value else {
        return;
    };
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}

fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.clone(), cell(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        if arr.is_empty() {
            println!("(empty)");
        }
        for item in arr {
            println!("{}", cell(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.clone());
    for map in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(h.as_str()).map(cell).unwrap_or_default())
            .collect();
        builder.push_record(row);
    }
    println!("{}", Table::from(builder));
}

/// Numeric arrays (weights, curves) are shortened to keep rows readable.
fn cell(value: &Value) -> String {
    match value {
        Value::Array(items) if items.len() > 8 => {
            let head: Vec<String> = items[..4].iter().map(|v| render_cell(v, "null")).collect();
            format!("{}, ... ({} values)", head.join(", "), items.len())
        }
        Value::Array(items) => items
            .iter()
            .map(|v| render_cell(v, "null"))
            .collect::<Vec<_>>()
            .join(", "),
        other => render_cell(other, "null"),
    }
}
