use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, VccError};
use crate::types::{NodeId, PositionContext};

/// Complete configuration of a call-taking position's VCC core
///
/// # Configuration Sections
///
/// - [`position`](VccConfig::position): identity of this position
/// - [`nodes`](VccConfig::nodes): cluster nodes to connect to
/// - [`timeouts`](VccConfig::timeouts): per-request and grace timers
/// - [`reconnect`](VccConfig::reconnect): node reconnect backoff
/// - [`logging`](VccConfig::logging): tracing output
///
/// # Examples
///
/// ```
/// use rvoip_vcc_core::config::VccConfig;
///
/// let config = VccConfig::default();
/// assert_eq!(config.timeouts.request_ms, 2000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VccConfig {
    pub position: PositionConfig,
    pub nodes: Vec<NodeEndpoint>,
    pub timeouts: TimeoutConfig,
    pub reconnect: ReconnectConfig,
    pub logging: LoggingConfig,
}

/// Identity of the position and the agent working it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionConfig {
    pub position_id: String,
    pub agent_id: String,
    pub device_id: String,
}

/// One cluster node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub id: NodeId,
    /// WebSocket URL of the node's VCC interface
    pub url: String,
}

/// Timer settings, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default per-request timeout
    pub request_ms: u64,

    /// Timeout for conference invite and other heavier conference requests
    pub conference_ms: u64,

    /// Listen & Join subscribe accept/fail race window
    pub listen_join_subscribe_ms: u64,

    /// How long a call released for park waits for the matching park event
    pub park_grace_ms: u64,
}

/// Exponential reconnect backoff
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            position_id: "position-1".to_string(),
            agent_id: "agent-1".to_string(),
            device_id: "device-1".to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 2000,
            conference_ms: 3000,
            listen_join_subscribe_ms: 3000,
            park_grace_ms: 2000,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }

    pub fn conference(&self) -> Duration {
        Duration::from_millis(self.conference_ms)
    }

    pub fn listen_join_subscribe(&self) -> Duration {
        Duration::from_millis(self.listen_join_subscribe_ms)
    }

    pub fn park_grace(&self) -> Duration {
        Duration::from_millis(self.park_grace_ms)
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl PositionConfig {
    pub fn context(&self) -> PositionContext {
        PositionContext::new(&self.position_id, &self.agent_id, &self.device_id)
    }
}

impl VccConfig {
    /// Parse a JSON configuration document and validate it
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: VccConfig = serde_json::from_str(text)
            .map_err(|e| VccError::configuration(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.position.position_id.is_empty() {
            return Err(VccError::configuration("position_id must not be empty"));
        }
        if self.position.device_id.is_empty() {
            return Err(VccError::configuration("device_id must not be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id) {
                return Err(VccError::configuration(format!(
                    "node {} configured more than once",
                    node.id
                )));
            }
            if node.url.is_empty() {
                return Err(VccError::configuration(format!("node {} has no url", node.id)));
            }
        }

        let t = &self.timeouts;
        if t.request_ms == 0 || t.conference_ms == 0 || t.listen_join_subscribe_ms == 0 {
            return Err(VccError::configuration("request timeouts must be positive"));
        }

        if self.reconnect.initial_delay_ms == 0
            || self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms
        {
            return Err(VccError::configuration(
                "reconnect delays must be positive and max_delay_ms >= initial_delay_ms",
            ));
        }

        Ok(())
    }
}
