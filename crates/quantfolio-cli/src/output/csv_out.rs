use serde_json::{Map, Value};
use std::io;

use super::{payload, render_cell};

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write the payload as CSV to stdout. Objects become `field,value` rows and
/// arrays of objects become one row per element.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match payload(value) {
        Value::Object(map) => write_fields(&mut wtr, map),
        Value::Array(arr) => write_rows(&mut wtr, arr),
        other => {
            let _ = wtr.write_record([render_cell(other, "")]);
        }
    }

    let _ = wtr.flush();
}

fn write_fields(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &render_cell(val, "")]);
    }
}

fn write_rows(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            let _ = wtr.write_record([render_cell(item, "")]);
        }
        return;
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    let _ = wtr.write_record(&headers);
    for map in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(*h).map(|v| render_cell(v, "")).unwrap_or_default())
            .collect();
        let _ = wtr.write_record(&row);
    }
}
