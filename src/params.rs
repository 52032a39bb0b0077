//! Multi-source request parameters: path, query, and body maps.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// The wire shape every front-end hands to the engine. Values are scalars or
/// lists of scalars; nested objects are passed through untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StandardParams {
    #[serde(default)]
    pub path: HashMap<String, Value>,
    #[serde(default)]
    pub query: HashMap<String, Value>,
    #[serde(default)]
    pub body: HashMap<String, Value>,
}

impl StandardParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.path.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Probe order: path, then body, then query.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.path
            .get(key)
            .or_else(|| self.body.get(key))
            .or_else(|| self.query.get(key))
    }

    /// Flatten all three sources into one map. Later sources win on key
    /// collision (path < query < body), matching the merged view used for
    /// signature checks and script contexts.
    pub fn merged(&self) -> HashMap<String, Value> {
        let mut merged = HashMap::with_capacity(self.path.len() + self.query.len() + self.body.len());
        merged.extend(self.path.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(self.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// Render a parameter value the way it would appear on the wire: strings
/// unquoted, everything else as compact JSON.
pub fn plain_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
