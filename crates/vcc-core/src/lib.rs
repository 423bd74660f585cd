//! # RVOIP VCC Core
//!
//! Signaling core of an emergency call-taking position that works against a
//! cluster of telephony nodes at the same time. The position keeps one
//! persistent connection per node, speaks a small REST-over-socket protocol
//! on each, and folds the per-node answers into one view for the agent.
//!
//! ## Overview
//!
//! - **Wire protocol**: positional JSON envelope with requests, responses,
//!   events and control frames ([`wire`])
//! - **Multiplexing**: request/response correlation with per-request
//!   timeouts and event fan-out per connection ([`multiplexer`])
//! - **Node verbs**: ACD, ring group, call, conference, NENA and Listen &
//!   Join operations against one node ([`node`])
//! - **Event routing**: node events turned into call-state transitions and
//!   cluster notifications ([`router`])
//! - **Consolidation**: per-node login state merged into one effective state
//!   ([`consolidate`])
//! - **Listen & Join**: supervisor monitoring subscriptions across every node
//!   ([`listen_join`])
//! - **Registry**: composition root wiring it all together ([`registry`])
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────┐
//!                     │   NodeRegistry   │──── NotificationBus
//!                     └──────────────────┘
//!                      │        │       │
//!           ┌──────────┘        │       └───────────┐
//!  ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//!  │   EventRouter   │ │   NodeClient    │ │ListenJoinMonitor│
//!  └─────────────────┘ │   (per node)    │ └─────────────────┘
//!                      └─────────────────┘
//!                               │
//!                  ┌────────────────────────┐
//!                  │ ConnectionMultiplexer  │
//!                  └────────────────────────┘
//!                               │
//!                      Transport (WebSocket)
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use rvoip_vcc_core::prelude::*;
//! use std::sync::Arc;
//!
//! # struct NoSessions;
//! # #[async_trait::async_trait]
//! # impl SessionLayer for NoSessions {
//! #     async fn hangup(&self, _: &str, _: NodeId) -> Result<()> { Ok(()) }
//! #     async fn answer(&self, _: &str, _: NodeId) -> Result<()> { Ok(()) }
//! #     async fn hold(&self, _: &str, _: NodeId) -> Result<()> { Ok(()) }
//! #     async fn send_info(&self, _: &str, _: NodeId, _: &str, _: &str) -> Result<()> { Ok(()) }
//! # }
//! # async fn example() -> Result<()> {
//! let config = VccConfig::from_json_str(r#"{
//!     "position": {"position_id": "p1", "agent_id": "1001", "device_id": "SIP/3001"},
//!     "nodes": [{"id": 1, "url": "ws://node-a:8080/vcc"}]
//! }"#)?;
//!
//! let registry = NodeRegistry::new(
//!     config,
//!     Arc::new(InMemoryCallRegistry::new()),
//!     Arc::new(NoSessions),
//! )?;
//! let mut acd = registry.bus().subscribe(NotificationKind::AcdStateChanged);
//! registry.start(Arc::new(WsConnector));
//!
//! let report = registry.acd_login(&[AcdQueue::new("fire", 1, QueueType::Static)]).await;
//! println!("login: {:?}", report.status);
//! # let _ = acd.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod call_registry;
pub mod config;
pub mod consolidate;
pub mod error;
pub mod events;
pub mod listen_join;
pub mod logging;
pub mod multiplexer;
pub mod node;
pub mod registry;
pub mod router;
pub mod state;
pub mod transport;
pub mod types;
pub mod wire;

pub use config::VccConfig;
pub use error::{DomainError, Result, VccError};
pub use registry::NodeRegistry;
pub use types::{KeepAlive, NodeId, NodeLiveness, PositionContext};

/// Everything an embedding application usually needs
pub mod prelude {
    pub use crate::call_registry::{
        CallId, CallKey, CallRecord, CallRegistry, CallState, InMemoryCallRegistry, NewCall,
        SessionLayer,
    };
    pub use crate::config::{NodeEndpoint, VccConfig};
    pub use crate::consolidate::OpStatus;
    pub use crate::error::{DomainError, Result, VccError};
    pub use crate::events::{Notification, NotificationBus, NotificationKind};
    pub use crate::listen_join::{ListenJoinMode, ListenJoinResult, MonitorOutcome};
    pub use crate::logging::init_tracing;
    pub use crate::node::NodeClient;
    pub use crate::registry::{ConsolidatedState, FanOutReport, NodeRegistry, PreferredState};
    pub use crate::state::{AcdLoginState, AcdQueue, LoginStatus, QueueType, RgLoginState};
    pub use crate::transport::{NodeConnector, WsConnector};
    pub use crate::types::{KeepAlive, NodeId, NodeLiveness, PositionContext};
}
