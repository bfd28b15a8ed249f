//! Engine Configuration
//!
//! Controls where output computation runs. Configuration can be built in
//! code or parsed from JSON:
//!
//! ```json
//! { "execution": "background", "queue_capacity": 64 }
//! ```
//!
//! Missing fields fall back to their defaults.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Where scheduled output computation and completion propagation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// On the thread that called `refresh`, before it returns.
    #[default]
    Inline,

    /// On a tokio worker; `refresh` returns before output exists.
    Background,
}

impl FromStr for ExecutionMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(ExecutionMode::Inline),
            "background" => Ok(ExecutionMode::Background),
            other => Err(EngineError::Config(format!(
                "invalid execution mode: {other} (expected \"inline\" or \"background\")"
            ))),
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub execution: ExecutionMode,

    /// Capacity of the background worker's job channel. Ignored inline.
    ///
    /// The worker waits for room before queueing the jobs it produces. A
    /// caller whose refresh finds the channel full is not blocked; the jobs
    /// that did not fit are queued in order by one task spawned for that call.
    pub queue_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            execution: ExecutionMode::Inline,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn inline() -> Self {
        Self::default()
    }

    pub fn background() -> Self {
        Self {
            execution: ExecutionMode::Background,
            ..Self::default()
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Parse configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Channel capacity actually used. A zero-capacity channel cannot carry
    /// jobs, so this is clamped to at least 1.
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_inline() {
        let config = EngineConfig::default();
        assert_eq!(config.execution, ExecutionMode::Inline);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn parses_json_with_defaults() {
        let config = EngineConfig::from_json(r#"{ "execution": "background" }"#).unwrap();
        assert_eq!(config, EngineConfig::background());

        let config = EngineConfig::from_json(r#"{ "queue_capacity": 0 }"#).unwrap();
        assert_eq!(config.execution, ExecutionMode::Inline);
        assert_eq!(config.effective_queue_capacity(), 1);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = EngineConfig::from_json(r#"{ "threads": 4 }"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn execution_mode_from_str() {
        assert_eq!(" Background ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Background);
        assert_eq!("inline".parse::<ExecutionMode>().unwrap(), ExecutionMode::Inline);
        assert!("eager".parse::<ExecutionMode>().is_err());
    }
}
