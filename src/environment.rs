//! Normalization of environment variables, parameters and container overrides
//! given on the command line.

use crate::error::{BatchError, Result};
use crate::model::KeyValuePair;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Environment variables in any of the accepted input shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentInput {
    /// Already in `{name, value}` form; passed through untouched.
    List(Vec<KeyValuePair>),
    Map(BTreeMap<String, String>),
    /// Comma-separated `key=value` pairs.
    Text(String),
}

impl EnvironmentInput {
    /// Resolve a raw command-line value into one of the input shapes.
    ///
    /// `[...]` is read as a JSON list of `{name, value}` records, `{...}` as a
    /// JSON object of strings, anything else as `key=value` text.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim_start();
        if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)
                .map(EnvironmentInput::List)
                .map_err(|e| invalid_environment(&e))
        } else if trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
                .map(EnvironmentInput::Map)
                .map_err(|e| invalid_environment(&e))
        } else {
            Ok(EnvironmentInput::Text(raw.to_string()))
        }
    }

    /// Normalize into `{name, value}` records.
    ///
    /// Maps and text come out sorted by key; text keeps the last value of a
    /// repeated key and drops entries without `=` or with an empty key.
    pub fn normalize(self) -> Vec<KeyValuePair> {
        match self {
            EnvironmentInput::List(list) => list,
            EnvironmentInput::Map(map) => map_to_pairs(map),
            EnvironmentInput::Text(text) => map_to_pairs(parse_key_values(&text)),
        }
    }
}

fn invalid_environment(err: &serde_json::Error) -> BatchError {
    BatchError::Configuration(format!(
        "environment must be a list of name/value records, a mapping or comma sep list of key=val ({})",
        err
    ))
}

fn map_to_pairs(map: BTreeMap<String, String>) -> Vec<KeyValuePair> {
    map.into_iter()
        .map(|(name, value)| KeyValuePair::new(name, value))
        .collect()
}

/// Parse `a=1,b=2` into a sorted mapping, splitting each entry on its first `=`.
pub fn parse_key_values(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for entry in text.split(',') {
        if let Some((key, value)) = entry.split_once('=') {
            if !key.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }
    map
}

/// Parse a container-overrides value, which must be a JSON object.
pub fn parse_overrides(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(BatchError::Configuration(
            "--overrides must be a JSON object".to_string(),
        )),
        Err(e) => Err(BatchError::Configuration(format!(
            "--overrides is not valid JSON: {}",
            e
        ))),
    }
}

/// Write the environment into the overrides, creating them if needed.
pub fn merge_environment(
    overrides: Option<Map<String, Value>>,
    environment: Vec<KeyValuePair>,
) -> Result<Map<String, Value>> {
    let mut overrides = overrides.unwrap_or_default();
    let records = serde_json::to_value(environment).map_err(|e| {
        BatchError::Configuration(format!("environment cannot be encoded: {}", e))
    })?;
    overrides.insert("environment".to_string(), records);
    Ok(overrides)
}
