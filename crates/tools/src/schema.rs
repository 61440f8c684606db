//! Argument coercion and JSON Schema checks.
//!
//! Markup delivers every parameter as raw text. Before validation each value
//! is coerced by the type its schema property declares: `string` properties
//! keep the text, everything else is parsed as JSON. If the text is not valid
//! JSON it stays a string so the validator reports the type mismatch.

use serde_json::Value;
use std::collections::HashMap;

/// Compile a schema document.
pub fn compile(schema: &Value) -> Result<jsonschema::Validator, String> {
    jsonschema::validator_for(schema).map_err(|e| format!("invalid JSON Schema document: {e}"))
}

/// Every violation of `validator` by `instance`, joined into one line.
pub fn violations(validator: &jsonschema::Validator, instance: &Value) -> Option<String> {
    let messages: Vec<String> = validator
        .iter_errors(instance)
        .map(|error| {
            let path = error.instance_path.to_string();
            if path.is_empty() {
                error.to_string()
            } else {
                format!("{path}: {error}")
            }
        })
        .collect();
    (!messages.is_empty()).then(|| messages.join("; "))
}

/// Compile `schema` and check `instance` against it in one go.
pub fn check(schema: &Value, instance: &Value) -> Result<(), String> {
    let validator = compile(schema)?;
    match violations(&validator, instance) {
        Some(reason) => Err(reason),
        None => Ok(()),
    }
}

/// Parameter names a tool accepts in markup: the keys of `properties`.
pub fn param_names(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default()
}

/// Turn a raw markup parameter map into a typed JSON object.
pub fn coerce_params(schema: &Value, params: HashMap<String, String>) -> Value {
    let properties = schema.get("properties");
    let object = params
        .into_iter()
        .map(|(name, raw)| {
            let property = properties.and_then(|p| p.get(&name));
            let value = match property {
                Some(property) if !accepts_string(property) => {
                    serde_json::from_str(raw.trim()).unwrap_or(Value::String(raw))
                }
                _ => Value::String(raw),
            };
            (name, value)
        })
        .collect();
    Value::Object(object)
}

fn accepts_string(property: &Value) -> bool {
    match property.get("type") {
        Some(Value::String(t)) => t == "string",
        Some(Value::Array(types)) => types.iter().any(|t| t == "string"),
        // Untyped properties take JSON when the text parses as JSON.
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "paths": {"type": "array", "items": {"type": "string"}},
                "count": {"type": "integer"},
                "payload": {}
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn string_properties_keep_text() {
        let args = coerce_params(&schema(), raw(&[("path", "42")]));
        assert_eq!(args, json!({"path": "42"}));
    }

    #[test]
    fn typed_properties_parse_json() {
        let args = coerce_params(
            &schema(),
            raw(&[("path", "a"), ("paths", " [\"x\", \"y\"]\n"), ("count", "3"), ("payload", "{\"k\": 1}")]),
        );
        assert_eq!(args["paths"], json!(["x", "y"]));
        assert_eq!(args["count"], json!(3));
        assert_eq!(args["payload"], json!({"k": 1}));
    }

    #[test]
    fn unparsable_text_stays_string_and_fails_validation() {
        let args = coerce_params(&schema(), raw(&[("path", "a"), ("count", "three")]));
        assert_eq!(args["count"], json!("three"));
        let err = check(&schema(), &args).unwrap_err();
        assert!(err.contains("/count"), "{err}");
    }

    #[test]
    fn missing_and_extra_fields_are_violations() {
        assert!(check(&schema(), &json!({})).is_err());
        assert!(check(&schema(), &json!({"path": "a", "bogus": 1})).is_err());
        assert!(check(&schema(), &json!({"path": "a"})).is_ok());
    }

    #[test]
    fn param_names_come_from_properties() {
        let mut names = param_names(&schema());
        names.sort();
        assert_eq!(names, vec!["count", "path", "paths", "payload"]);
    }
}
