//! Script execution plug point. The engine ships no interpreter; adapters
//! own their compile caches and sandboxing policy.

use crate::error::EngineError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// One script language adapter. `bindings` is a read-write snapshot of the
/// job's step context.
pub trait ScriptExecutor: Send + Sync {
    fn execute(
        &self,
        source: &str,
        bindings: &mut HashMap<String, Value>,
    ) -> Result<Value, EngineError>;

    /// Lowercase language tag, e.g. `js`, `groovy`, `python`.
    fn script_type(&self) -> &str;
}

impl std::fmt::Debug for dyn ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ScriptExecutor")
    }
}

/// Case-insensitive executor lookup by script type.
#[derive(Default)]
pub struct ScriptRegistry {
    executors: HashMap<String, Arc<dyn ScriptExecutor>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, executor: Arc<dyn ScriptExecutor>) {
        self.executors
            .insert(executor.script_type().to_ascii_lowercase(), executor);
    }

    pub fn get(&self, script_type: &str) -> Result<Arc<dyn ScriptExecutor>, EngineError> {
        self.executors
            .get(&script_type.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| {
                let mut known: Vec<&str> = self.executors.keys().map(String::as_str).collect();
                known.sort_unstable();
                EngineError::Script(format!(
                    "unsupported script type: {} (registered: {})",
                    script_type,
                    known.join(", ")
                ))
            })
    }
}
