//! Per-site request options.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Option key that turns duplicate collapsing on or off.
pub const REMOVE_DUPLICATES: &str = "remove_duplicates";

/// Free-form options attached to a request.
///
/// Each site reads the keys it understands and ignores the rest. Boolean
/// checks use loose truthiness: `null`, `false`, `0`, `""`, `[]` and `{}`
/// are all false.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteOptions(Map<String, Value>);

impl SiteOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value. Anything but an object yields empty options.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    /// Sets a key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the key holds a truthy value.
    #[must_use]
    pub fn is_truthy(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(is_truthy)
    }

    /// Returns a string value, rendering numbers and booleans.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Returns an integer value, parsing numeric strings.
    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Returns a nested object deserialized into `T`.
    #[must_use]
    pub fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .filter(|v| !v.is_null())
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Whether duplicate results should be collapsed. Defaults to true.
    #[must_use]
    pub fn remove_duplicates(&self) -> bool {
        match self.0.get(REMOVE_DUPLICATES) {
            None | Some(Value::Null) => true,
            Some(value) => is_truthy(value),
        }
    }

    /// Iterates over entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Returns the options as a JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Whether no options are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Loose truthiness of a JSON value.
#[must_use]
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
