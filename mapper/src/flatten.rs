use serde_json::{Map, Value};

/// Flattens nested objects into a single level.
///
/// Object keys are joined with `.` and array items are addressed as
/// `key[index]`. Empty nested containers are kept as-is under their key.
/// A scalar at the top level flattens to an empty map.
pub fn flatten_json(value: &Value) -> Map<String, Value> {
    let mut out = Map::new();
    flatten_into(value, None, &mut out);
    out
}

fn flatten_into(value: &Value, prefix: Option<&str>, out: &mut Map<String, Value>) {
    match value {
        Value::Object(map) if map.is_empty() => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), Value::Object(Map::new()));
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                let key = match prefix {
                    Some(prefix) => format!("{prefix}.{key}"),
                    None => key.clone(),
                };
                flatten_into(nested, Some(&key), out);
            }
        }
        Value::Array(items) if items.is_empty() => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), Value::Array(Vec::new()));
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                let key = format!("{}[{index}]", prefix.unwrap_or_default());
                flatten_into(nested, Some(&key), out);
            }
        }
        scalar => {
            if let Some(prefix) = prefix {
                out.insert(prefix.to_string(), scalar.clone());
            }
        }
    }
}
