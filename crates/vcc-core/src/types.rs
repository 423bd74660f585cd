//! Core identifiers and small value types shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one node (telephony switch) in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node liveness as reported by out-of-band node-state events
///
/// Liveness is never inferred from request failures; only `nodeStateChange`
/// and `nodeStates` notifications move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NodeLiveness {
    #[default]
    Unknown,
    Up,
    Down,
}

impl std::str::FromStr for NodeLiveness {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Up" | "up" | "UP" => Ok(NodeLiveness::Up),
            "Down" | "down" | "DOWN" => Ok(NodeLiveness::Down),
            "Unknown" | "unknown" | "UNKNOWN" => Ok(NodeLiveness::Unknown),
            _ => Err(format!("Unknown node state: {}", s)),
        }
    }
}

impl fmt::Display for NodeLiveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeLiveness::Unknown => write!(f, "unknown"),
            NodeLiveness::Up => write!(f, "up"),
            NodeLiveness::Down => write!(f, "down"),
        }
    }
}

/// Transport-level health of a node connection, driven by keep-alive checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum KeepAlive {
    Up,
    #[default]
    Down,
}

/// Identity of this call-taking position, passed explicitly into operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionContext {
    /// Position (workstation) name known to the cluster
    pub position_id: String,
    /// Agent logged in at this position
    pub agent_id: String,
    /// Device id used for exclusion and park re-offer matching
    pub device_id: String,
}

impl PositionContext {
    pub fn new(
        position_id: impl Into<String>,
        agent_id: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            position_id: position_id.into(),
            agent_id: agent_id.into(),
            device_id: device_id.into(),
        }
    }
}
