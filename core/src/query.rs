//! Query-string construction for GET calls that carry a payload.

use serde_json::Value;

use crate::error::{Error, Result};

/// Turns a payload into a URL query fragment (without the leading `?`).
///
/// The payload arrives as a `serde_json::Value` so implementations stay
/// object safe and can be swapped on a live client.
pub trait QueryStringBuilder: Send + Sync {
    fn build(&self, payload: &Value) -> Result<String>;
}

/// Encodes the top-level fields of an object as `key=value` pairs.
///
/// Nulls are skipped, arrays of scalars repeat the key, and fields keep the
/// order in which the payload type declares them. Nested objects are
/// rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatQueryStringBuilder;

impl QueryStringBuilder for FlatQueryStringBuilder {
    fn build(&self, payload: &Value) -> Result<String> {
        let fields = match payload {
            Value::Object(fields) => fields,
            Value::Null => return Ok(String::new()),
            other => {
                return Err(Error::Serialization(format!(
                    "query payload must be an object, got {}",
                    kind(other)
                )))
            }
        };

        let mut pairs = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if !item.is_null() {
                            pairs.push(pair(key, scalar(key, item)?));
                        }
                    }
                }
                _ => pairs.push(pair(key, scalar(key, value)?)),
            }
        }
        Ok(pairs.join("&"))
    }
}

fn pair(key: &str, value: String) -> String {
    format!("{}={}", urlencoding::encode(key), urlencoding::encode(&value))
}

fn scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::Serialization(format!(
            "query field `{key}` cannot be encoded from {}",
            kind(other)
        ))),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
