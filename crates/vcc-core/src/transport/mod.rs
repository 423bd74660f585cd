//! # Node Transports
//!
//! A transport carries envelope text frames over one persistent bidirectional
//! connection to one node. Outbound frames go through [`Transport::send`];
//! inbound frames and the close notification arrive on the
//! [`TransportEvent`] channel handed out when the connection is made.
//!
//! - [`ws::WsTransport`]: WebSocket client used against real nodes
//! - [`memory::MemoryTransport`]: in-process pair for tests and embedding

pub mod memory;
pub mod ws;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::NodeEndpoint;

pub use memory::{MemoryPeer, MemoryTransport};
pub use ws::{WsConnector, WsTransport};

/// Capacity of the inbound frame channel of every transport
pub const INBOUND_CHANNEL_CAPACITY: usize = 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("transport closed")]
    Closed,
}

/// Inbound traffic from a node connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One envelope text frame
    Message(String),
    /// The connection closed; carries the close reason when known
    Closed(Option<String>),
}

/// Outbound half of a node connection
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, text: String) -> Result<(), TransportError>;

    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// A freshly established node connection
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens connections to nodes; the registry reconnects through this seam
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Connection, TransportError>;
}
