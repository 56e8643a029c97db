// src/config.rs
//! Runtime configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid runtime config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings applied to every runtime a manager creates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Runtime threads are named `<prefix>-<runtime name>`
    pub thread_name_prefix: String,

    /// Stack size for runtime threads; platform default when unset
    pub thread_stack_size: Option<usize>,

    /// Keep a runtime serving after a worklet panics. Either way the panic
    /// is reported and returned as an execution error. When off, the
    /// runtime is then disposed and commands still queued are dropped.
    pub catch_panics: bool,

    /// Forward console calls to the output sink
    pub forward_console: bool,

    /// Nesting limit for worklet-to-worklet calls within one runtime
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "worklet".to_string(),
            thread_stack_size: None,
            catch_panics: true,
            forward_console: true,
            max_call_depth: 256,
        }
    }
}

impl RuntimeConfig {
    /// Parse from JSON; missing fields take their defaults
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
