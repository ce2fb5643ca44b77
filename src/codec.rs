use crate::page::{InputKind, RowContainer, row_id};
use serde_json::{Map, Number, Value};

/// Writes every key of `record` into the row `<prefix>-<key>` of `container`.
/// Keys without a matching row, or rows without an input, are skipped.
/// Returns how many rows were written.
pub fn decode(prefix: &str, record: &Map<String, Value>, container: &mut RowContainer) -> usize {
    let mut written = 0;
    for (key, value) in record {
        let id = row_id(prefix, key);
        let Some(row) = container.find_mut(&id) else {
            tracing::debug!("No row for config key {id}, skipping");
            continue;
        };
        let Some(input) = row.input.as_mut() else {
            tracing::debug!("Row {id} has no input, skipping");
            continue;
        };
        match input.kind() {
            InputKind::Toggle => input.set_checked(truthy(value)),
            InputKind::Number | InputKind::Text => input.set_value(display_text(value)),
        }
        written += 1;
    }
    written
}

/// Reads every well-formed row of `container` into a record keyed by the
/// second identifier segment. Toggles become booleans, numeric inputs a number
/// (or `null` when empty), everything else the raw text.
pub fn collect(container: &RowContainer) -> Map<String, Value> {
    let mut record = Map::new();
    for row in container.rows() {
        let Some((_, key)) = row.binding() else {
            tracing::debug!("Row id '{}' is not <prefix>-<key>, skipping", row.id);
            continue;
        };
        let Some(input) = row.input.as_ref() else {
            continue;
        };
        let value = match input.kind() {
            InputKind::Toggle => Value::Bool(input.checked()),
            InputKind::Number => parse_number(input.value()),
            InputKind::Text => Value::String(input.value().to_string()),
        };
        record.insert(key.to_string(), value);
    }
    record
}

pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "on" | "1" | "yes"
        ),
        Value::Null | Value::Array(_) | Value::Object(_) => false,
    }
}

fn parse_number(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Value::Number(int.into());
    }
    match raw.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(number) => Value::Number(number),
        None => {
            tracing::debug!("Numeric field holds '{raw}', collecting as null");
            Value::Null
        }
    }
}
