//! Parameter resolver: multi-source lookup, rule chains, type coercion.

pub mod rules;

use crate::config::{DataType, EndpointDef, ParamSource};
use crate::error::EngineError;
use crate::params::{plain_text, StandardParams};
use serde_json::Value;
use std::collections::HashMap;

pub struct ParamResolver<'a> {
    endpoint: &'a EndpointDef,
}

impl<'a> ParamResolver<'a> {
    pub fn new(endpoint: &'a EndpointDef) -> Self {
        ParamResolver { endpoint }
    }

    /// Produce the map the SQL builder consumes. Preset params seed the map,
    /// each mapping validates and coerces its value (absent values land as
    /// null), then the primary key and the computed action are supplemented.
    pub fn resolve(&self, params: &StandardParams) -> Result<HashMap<String, Value>, EngineError> {
        let mut resolved: HashMap<String, Value> = self
            .endpoint
            .preset_params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for mapping in &self.endpoint.params_mapping {
            let key = mapping.resolved_key();
            let raw = fetch(params, &mapping.field, mapping.source);
            for rule in &mapping.validators {
                rules::check(rule, raw, key)?;
            }
            let value = match raw {
                Some(v) if !v.is_null() => coerce(v, mapping.data_type, key)?,
                _ => Value::Null,
            };
            // An unresolved mapping must not clobber a preset for the same key.
            if !value.is_null() || !resolved.contains_key(key) {
                resolved.insert(key.to_string(), value);
            }
        }

        if let Some(pk_value) = params.param(&self.endpoint.pk) {
            if !pk_value.is_null() {
                resolved.insert(self.endpoint.pk.clone(), pk_value.clone());
            }
        }
        if let Some(action_field) = &self.endpoint.action {
            let action = params.param(action_field).cloned().unwrap_or(Value::Null);
            resolved.insert("action".to_string(), action);
        }
        Ok(resolved)
    }
}

fn fetch<'p>(params: &'p StandardParams, field: &str, source: ParamSource) -> Option<&'p Value> {
    match source {
        ParamSource::Path => params.path.get(field),
        ParamSource::Query => params.query.get(field),
        ParamSource::Body => params.body.get(field),
        ParamSource::All => params.param(field),
    }
}

fn coerce(value: &Value, target: DataType, key: &str) -> Result<Value, EngineError> {
    let text = plain_text(value);
    let coerced = match target {
        DataType::String => Some(Value::String(text)),
        DataType::Int | DataType::Long => text.parse::<i64>().ok().map(Value::from),
        DataType::Double => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        DataType::Boolean => match value {
            Value::Bool(b) => Some(Value::Bool(*b)),
            _ => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
        },
    };
    coerced.ok_or_else(|| {
        EngineError::Validation(format!("{} cannot be converted to {:?}", key, target))
    })
}
