//! Schema checks applied to tool input before a handler runs.

use serde_json::Value;

/// Validate `args` against a flat JSON object schema.
///
/// Covers the object type, required fields, property types, string enums and
/// array item types. Returns the first violation as a message.
pub fn validate_arguments(args: &Value, schema: &Value) -> Result<(), String> {
    if schema.get("type").and_then(Value::as_str) == Some("object") && !args.is_object() {
        return Err(format!("expected object arguments, got {}", json_type_name(args)));
    }
    let Some(obj) = args.as_object() else {
        return Ok(());
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        if let Some(missing) = required
            .iter()
            .filter_map(Value::as_str)
            .find(|name| !obj.contains_key(*name))
        {
            return Err(format!("missing required field '{missing}'"));
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in obj {
        let Some(prop_schema) = properties.get(key) else {
            continue;
        };
        check_property(key, value, prop_schema)?;
    }
    Ok(())
}

fn check_property(key: &str, value: &Value, schema: &Value) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !value_matches_type(value, expected) {
            return Err(format!(
                "field '{key}' expected type '{expected}', got {}",
                json_type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("field '{key}' must be one of {}", Value::Array(allowed.clone())));
        }
    }

    if let (Some(items), Some(item_type)) = (
        value.as_array(),
        schema
            .get("items")
            .and_then(|s| s.get("type"))
            .and_then(Value::as_str),
    ) {
        if let Some((index, bad)) = items
            .iter()
            .enumerate()
            .find(|(_, item)| !value_matches_type(item, item_type))
        {
            return Err(format!(
                "field '{key}[{index}]' expected type '{item_type}', got {}",
                json_type_name(bad)
            ));
        }
    }
    Ok(())
}

fn value_matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
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
