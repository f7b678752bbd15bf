//! Recursive redaction of sensitive fields in caller-facing values
//!
//! Anything returned to the calling layer (conversational tools, CLIs)
//! passes through here first so credentials and device keys never leak
//! into transcripts or logs.

use serde_json::Value;

/// Key names whose values are always masked, at any nesting depth
const REDACT_KEYS: &[&str] = &["client_secret", "access_token", "localKey", "local_key"];

/// Replace the values of sensitive keys with `"***"` through nested
/// objects and arrays, leaving everything else untouched
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if REDACT_KEYS.contains(&k.as_str()) {
                        (k.clone(), Value::String("***".to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
