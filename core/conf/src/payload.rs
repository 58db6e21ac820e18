//! The flat key/value invocation payload.
use std::collections::BTreeMap;

use anyhow::Result;

use super::Error;

/// Invocation payload: environment variables or a dispatcher event map.
pub type Payload = BTreeMap<String, String>;

/// Build a payload from the process environment.
pub fn payload_from_env() -> Payload {
    std::env::vars().collect()
}

/// Build a payload from a JSON event object.
///
/// Values may be strings, numbers or booleans; anything else is rejected.
pub fn payload_from_event(event: &serde_json::Value) -> Result<Payload> {
    let object = event.as_object().ok_or(Error::PayloadShape)?;
    let mut payload = Payload::new();
    for (key, value) in object {
        let value = match value {
            serde_json::Value::String(value) => value.clone(),
            serde_json::Value::Number(value) => value.to_string(),
            serde_json::Value::Bool(value) => value.to_string(),
            _ => return Err(Error::PayloadShape.into()),
        };
        payload.insert(key.clone(), value);
    }
    Ok(payload)
}

/// Look up an option, treating empty values as unset.
pub(crate) fn option(payload: &Payload, key: &str) -> Option<String> {
    match payload.get(key) {
        Some(value) if !value.is_empty() => Some(value.clone()),
        _ => None,
    }
}

/// Look up a required option.
pub(crate) fn required(payload: &Payload, key: &str) -> Result<String> {
    option(payload, key).ok_or_else(|| Error::MissingOption(key.to_string()).into())
}
