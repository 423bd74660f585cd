use thiserror::Error;

use crate::types::NodeId;
use crate::wire::WireError;

/// Rejections reported by a node for an otherwise well-formed request
///
/// The vocabulary is closed: every non-success response is folded into one of
/// these kinds so callers can make a user-facing decision without parsing
/// status strings. Domain rejections are never retried automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("agent is busy")]
    AgentBusy,

    #[error("device is busy")]
    DeviceBusy,

    #[error("requested resource does not exist")]
    NotExist,

    #[error("unknown queue")]
    UnknownQueue,

    #[error("agent is not a member of the queue")]
    AgentNotInQueue,

    #[error("queue is not dynamic")]
    QueueNotDynamic,

    #[error("position is already monitored by another position")]
    PositionMonitoredByAnotherPosition,

    #[error("bad monitoring target")]
    BadTarget,

    #[error("agent is not logged in")]
    NotLoggedIn,

    #[error("operation forbidden")]
    Forbidden,

    #[error("invalid parameter")]
    InvalidParameter,

    #[error("rejected with status {status}: {reason}")]
    Other { status: u16, reason: String },
}

impl DomainError {
    /// Map a node response status and reason phrase into the closed vocabulary
    ///
    /// The reason phrase wins when it names a known rejection; otherwise the
    /// status code decides, and anything unrecognised becomes [`DomainError::Other`].
    pub fn from_status(status: u16, reason: &str) -> Self {
        match reason {
            "AgentBusy" => return Self::AgentBusy,
            "DeviceBusy" => return Self::DeviceBusy,
            "NotExist" | "NotFound" => return Self::NotExist,
            "UnknownQueue" => return Self::UnknownQueue,
            "AgentNotInQueue" => return Self::AgentNotInQueue,
            "QueueNotDynamic" => return Self::QueueNotDynamic,
            "PositionMonitoredByAnotherPosition" => {
                return Self::PositionMonitoredByAnotherPosition
            }
            "BadTarget" => return Self::BadTarget,
            "NotLoggedIn" => return Self::NotLoggedIn,
            "Forbidden" => return Self::Forbidden,
            "InvalidParameter" => return Self::InvalidParameter,
            _ => {}
        }

        match status {
            400 => Self::InvalidParameter,
            403 => Self::Forbidden,
            404 => Self::NotExist,
            406 => Self::PositionMonitoredByAnotherPosition,
            409 => Self::BadTarget,
            486 => Self::DeviceBusy,
            _ => Self::Other {
                status,
                reason: reason.to_string(),
            },
        }
    }
}

/// Error type for all VCC core operations
///
/// Variants fall into three families: connectivity failures (`Timeout`,
/// `SendFailed`, `ConnectionLost`, `NodeUnavailable`), domain rejections
/// (`Domain`), and protocol or local failures. Connectivity failures are
/// always recoverable and reset the affected node-scoped state.
#[derive(Error, Debug, Clone)]
pub enum VccError {
    #[error("request {path} to node {node} timed out after {timeout_ms}ms")]
    Timeout {
        node: NodeId,
        path: String,
        timeout_ms: u64,
    },

    #[error("send to node {node} failed: {reason}")]
    SendFailed { node: NodeId, reason: String },

    #[error("connection to node {0} lost")]
    ConnectionLost(NodeId),

    #[error("node {0} is not available")]
    NodeUnavailable(NodeId),

    #[error("rejected by node: {0}")]
    Domain(#[from] DomainError),

    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VccError {
    pub fn invalid_response<S: Into<String>>(msg: S) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// True for transport-level failures that say nothing about the node's
    /// opinion of the request
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::SendFailed { .. }
                | Self::ConnectionLost(_)
                | Self::NodeUnavailable(_)
        )
    }

    /// The domain rejection carried by this error, if any
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, VccError>;
