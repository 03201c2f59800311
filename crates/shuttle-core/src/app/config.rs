//! CoordinatorConfig - node-level settings of the coordinator.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use super::interrupt::InterruptPolicy;
use crate::domain::NodeId;

pub const ENV_NODE_ID: &str = "SHUTTLE_NODE_ID";
pub const ENV_CHECK_CONCURRENT_EXECUTION: &str = "SHUTTLE_CHECK_CONCURRENT_EXECUTION";
pub const ENV_INTERRUPT_POLICY: &str = "SHUTTLE_INTERRUPT_POLICY";
pub const ENV_GROUP_RETRY_AFTER_SECS: &str = "SHUTTLE_GROUP_RETRY_AFTER_SECS";
pub const ENV_REGULAR_BACKOFF: &str = "SHUTTLE_REGULAR_BACKOFF";

const DEFAULT_NODE_ID: &str = "node-1";
const DEFAULT_GROUP_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("malformed configuration: {0}")]
    Malformed(String),
}

/// Settings passed explicitly into the `Coordinator`.
///
/// # Example
/// ```
/// use shuttle_core::app::{CoordinatorConfig, InterruptPolicy};
///
/// let config: CoordinatorConfig = serde_json::from_str(r#"{
///     "node_id": "node-a",
///     "interrupt_policy": "maybe",
///     "group_limits": { "import": 2 }
/// }"#).unwrap();
///
/// assert_eq!(config.interrupt_policy, InterruptPolicy::Maybe);
/// assert!(config.check_concurrent_execution);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Identity of the local node.
    pub node_id: NodeId,
    /// Re-read the task before going RUNNING and refuse if another node holds it.
    pub check_concurrent_execution: bool,
    pub interrupt_policy: InterruptPolicy,
    /// Cluster-wide group limits. An entry here wins over the task's own limit.
    pub group_limits: HashMap<String, u32>,
    /// Delay before a refused task is retried, unless its constraints say otherwise.
    #[serde(with = "duration_secs")]
    pub group_retry_after: Duration,
    /// Allow relying on a loose recurring task's next natural firing instead of
    /// an explicit reschedule.
    pub regular_backoff: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new(DEFAULT_NODE_ID),
            check_concurrent_execution: true,
            interrupt_policy: InterruptPolicy::default(),
            group_limits: HashMap::new(),
            group_retry_after: DEFAULT_GROUP_RETRY_AFTER,
            regular_backoff: true,
        }
    }
}

impl CoordinatorConfig {
    /// Reads the configuration from `SHUTTLE_*` environment variables, falling
    /// back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Like `from_env`, with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(node) = lookup(ENV_NODE_ID) {
            if node.trim().is_empty() {
                return Err(invalid(ENV_NODE_ID, node, "must not be empty"));
            }
            config.node_id = NodeId::new(node.trim());
        }
        if let Some(raw) = lookup(ENV_CHECK_CONCURRENT_EXECUTION) {
            config.check_concurrent_execution = parse_bool(ENV_CHECK_CONCURRENT_EXECUTION, raw)?;
        }
        if let Some(raw) = lookup(ENV_INTERRUPT_POLICY) {
            config.interrupt_policy = raw.parse().map_err(|_| {
                invalid(ENV_INTERRUPT_POLICY, raw, "expected always, maybe or never")
            })?;
        }
        if let Some(raw) = lookup(ENV_GROUP_RETRY_AFTER_SECS) {
            let secs: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                invalid(ENV_GROUP_RETRY_AFTER_SECS, raw.clone(), &e.to_string())
            })?;
            config.group_retry_after = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_REGULAR_BACKOFF) {
            config.regular_backoff = parse_bool(ENV_REGULAR_BACKOFF, raw)?;
        }

        Ok(config)
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = NodeId::new(node_id);
        self
    }

    pub fn with_group_limit(mut self, group: impl Into<String>, limit: u32) -> Self {
        self.group_limits.insert(group.into(), limit);
        self
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }
}

fn invalid(key: &'static str, value: String, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value,
        reason: reason.to_string(),
    }
}

fn parse_bool(key: &'static str, raw: String) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "expected a boolean")),
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
