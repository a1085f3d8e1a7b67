//! Init config validation against an optional plugin-supplied JSON Schema.

use crate::error::PluginError;
use serde_json::Value;

/// Validate `config` (raw JSON text, empty treated as `{}`) against
/// `schema_json` (raw JSON Schema text). Returns the first validation error
/// as `path: message`.
pub fn validate_config(plugin_name: &str, config: &str, schema_json: Option<&str>) -> Result<(), PluginError> {
    let Some(schema_json) = schema_json.filter(|s| !s.trim().is_empty()) else {
        return Ok(());
    };

    let schema: Value = serde_json::from_str(schema_json)
        .map_err(|e| PluginError::schema(plugin_name, format!("init schema is not valid JSON: {e}")))?;

    let config_text = if config.trim().is_empty() { "{}" } else { config };
    let instance: Value = serde_json::from_str(config_text)
        .map_err(|e| PluginError::schema(plugin_name, format!("config is not valid JSON: {e}")))?;

    let validator = jsonschema::validator_for(&schema)
        .map_err(|e| PluginError::schema(plugin_name, format!("init schema itself is invalid: {e}")))?;

    if let Some(first) = validator.iter_errors(&instance).next() {
        return Err(PluginError::schema(
            plugin_name,
            format!("{}: {}", first.instance_path, first),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_schema_always_passes() {
        assert!(validate_config("p", "{}", None).is_ok());
        assert!(validate_config("p", "", Some("")).is_ok());
    }

    #[test]
    fn empty_config_treated_as_empty_object() {
        let schema = r#"{"type":"object"}"#;
        assert!(validate_config("p", "", Some(schema)).is_ok());
    }

    #[test]
    fn missing_required_property_reports_first_error() {
        let schema = r#"{"type":"object","required":["k"]}"#;
        let err = validate_config("p", "{}", Some(schema)).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains('k'), "expected missing-property name in {msg:?}");
    }

    #[test]
    fn valid_config_passes() {
        let schema = r#"{"type":"object","required":["k"],"properties":{"k":{"type":"string"}}}"#;
        assert!(validate_config("p", r#"{"k":"v"}"#, Some(schema)).is_ok());
    }
}
