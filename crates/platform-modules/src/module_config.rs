//! Module config payload validation
//!
//! Module configs are opaque to this crate: each module owns its schema.
//! The only check performed here is that the payload is a well-formed JSON
//! object.

use crate::error::{ModuleError, ModuleResult};

/// Parse a raw config payload.
///
/// An empty or whitespace-only payload means "no config" and yields `{}`.
///
/// # Examples
///
/// ```
/// use platform_modules::module_config::parse_config;
///
/// let config = parse_config(r#"{"currency": "EUR"}"#).unwrap();
/// assert_eq!(config["currency"], "EUR");
///
/// assert!(parse_config("{not json").is_err());
/// assert!(parse_config("[1, 2]").is_err());
/// ```
pub fn parse_config(raw: &str) -> ModuleResult<serde_json::Value> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| ModuleError::InvalidConfig(e.to_string()))?;
    validate_config(&value)?;
    Ok(value)
}

/// Check that an already-parsed payload is a JSON object.
pub fn validate_config(value: &serde_json::Value) -> ModuleResult<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(ModuleError::InvalidConfig(format!(
            "expected a JSON object, got {}",
            json_kind(value)
        )))
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_is_empty_object() {
        assert_eq!(parse_config("").unwrap(), serde_json::json!({}));
        assert_eq!(parse_config("  \n").unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_nested_object_accepted() {
        let config = parse_config(r#"{"tax": {"rate": 0.2, "inclusive": true}}"#).unwrap();
        assert_eq!(config["tax"]["rate"], 0.2);
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            parse_config("{\"a\": }"),
            Err(ModuleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_config("42").unwrap_err();
        assert_eq!(
            err,
            ModuleError::InvalidConfig("expected a JSON object, got a number".to_string())
        );
        assert!(validate_config(&serde_json::Value::Null).is_err());
    }
}
