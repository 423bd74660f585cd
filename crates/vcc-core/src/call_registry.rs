//! # Call Registry and Session Layer Contracts
//!
//! The physical call state machine lives outside this crate. The router and
//! registry talk to it through two seams:
//!
//! - [`CallRegistry`]: lookup by correlation key plus create, transition and
//!   finish of call records
//! - [`SessionLayer`]: media-session actions keyed by `(session id, node)`
//!
//! [`InMemoryCallRegistry`] implements the registry contract with one index
//! per correlation key so the core can run standalone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, VccError};
use crate::types::NodeId;

/// Local identifier of a call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub Uuid);

impl CallId {
    pub fn new() -> Self {
        CallId(Uuid::new_v4())
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Keys a node event can use to point at a call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    UniqueCallId(String),
    RemoteChannel(String),
    LocalChannel(String),
    CssId(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    Ringing,
    Connected,
    OnHold,
    Parked,
    /// Another position holds the call
    Busy,
    Finished,
}

impl std::str::FromStr for CallState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ringing" | "Ringing" | "alerting" => Ok(CallState::Ringing),
            "connected" | "Connected" => Ok(CallState::Connected),
            "hold" | "onHold" | "OnHold" => Ok(CallState::OnHold),
            "parked" | "Parked" => Ok(CallState::Parked),
            "busy" | "Busy" => Ok(CallState::Busy),
            "finished" | "Finished" | "idle" => Ok(CallState::Finished),
            _ => Err(format!("Unknown call state: {}", s)),
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Ringing => write!(f, "ringing"),
            CallState::Connected => write!(f, "connected"),
            CallState::OnHold => write!(f, "hold"),
            CallState::Parked => write!(f, "parked"),
            CallState::Busy => write!(f, "busy"),
            CallState::Finished => write!(f, "finished"),
        }
    }
}

/// Correlation data for a call about to be created
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCall {
    pub ucid: Option<String>,
    pub remote_channel: Option<String>,
    pub local_channel: Option<String>,
    pub css_id: Option<String>,
    pub session_id: Option<String>,
    pub node: Option<NodeId>,
    pub state: Option<CallState>,
    /// Delivered through an ACD queue rather than a shared line
    pub acd_routed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: CallId,
    pub ucid: Option<String>,
    pub remote_channel: Option<String>,
    pub local_channel: Option<String>,
    pub css_id: Option<String>,
    pub session_id: Option<String>,
    /// Node the call is bound to
    pub node: Option<NodeId>,
    pub state: CallState,
    pub acd_routed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    /// All correlation keys this record can be found by
    pub fn keys(&self) -> Vec<CallKey> {
        let mut keys = Vec::new();
        if let Some(k) = &self.ucid {
            keys.push(CallKey::UniqueCallId(k.clone()));
        }
        if let Some(k) = &self.remote_channel {
            keys.push(CallKey::RemoteChannel(k.clone()));
        }
        if let Some(k) = &self.local_channel {
            keys.push(CallKey::LocalChannel(k.clone()));
        }
        if let Some(k) = &self.css_id {
            keys.push(CallKey::CssId(k.clone()));
        }
        keys
    }
}

/// Call registry collaborator
#[async_trait]
pub trait CallRegistry: Send + Sync {
    async fn find(&self, key: &CallKey) -> Option<CallRecord>;

    async fn get(&self, id: &CallId) -> Option<CallRecord>;

    async fn create(&self, call: NewCall) -> CallRecord;

    async fn transition(&self, id: &CallId, state: CallState) -> Result<CallRecord>;

    /// Finish the call; returns `false` if it was already finished or unknown
    async fn finish(&self, id: &CallId) -> bool;

    async fn calls_on_node(&self, node: NodeId) -> Vec<CallRecord>;
}

/// Session layer collaborator
#[async_trait]
pub trait SessionLayer: Send + Sync {
    async fn hangup(&self, session_id: &str, node: NodeId) -> Result<()>;

    async fn answer(&self, session_id: &str, node: NodeId) -> Result<()>;

    async fn hold(&self, session_id: &str, node: NodeId) -> Result<()>;

    async fn send_info(
        &self,
        session_id: &str,
        node: NodeId,
        content_type: &str,
        body: &str,
    ) -> Result<()>;
}

/// DashMap-backed [`CallRegistry`]
#[derive(Default)]
pub struct InMemoryCallRegistry {
    calls: DashMap<CallId, CallRecord>,
    index: DashMap<CallKey, CallId>,
}

impl InMemoryCallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls not yet finished
    pub fn active_count(&self) -> usize {
        self.calls.len()
    }
}

#[async_trait]
impl CallRegistry for InMemoryCallRegistry {
    async fn find(&self, key: &CallKey) -> Option<CallRecord> {
        let id = *self.index.get(key)?;
        self.calls.get(&id).map(|c| c.clone())
    }

    async fn get(&self, id: &CallId) -> Option<CallRecord> {
        self.calls.get(id).map(|c| c.clone())
    }

    async fn create(&self, call: NewCall) -> CallRecord {
        let now = Utc::now();
        let record = CallRecord {
            id: CallId::new(),
            ucid: call.ucid,
            remote_channel: call.remote_channel,
            local_channel: call.local_channel,
            css_id: call.css_id,
            session_id: call.session_id,
            node: call.node,
            state: call.state.unwrap_or(CallState::Ringing),
            acd_routed: call.acd_routed,
            created_at: now,
            updated_at: now,
        };
        for key in record.keys() {
            self.index.insert(key, record.id);
        }
        self.calls.insert(record.id, record.clone());
        debug!("Created call {} in state {}", record.id, record.state);
        record
    }

    async fn transition(&self, id: &CallId, state: CallState) -> Result<CallRecord> {
        let mut call = self
            .calls
            .get_mut(id)
            .ok_or_else(|| VccError::not_found(format!("call {}", id)))?;
        if call.state != state {
            debug!("Call {} {} -> {}", id, call.state, state);
            call.state = state;
            call.updated_at = Utc::now();
        }
        Ok(call.clone())
    }

    async fn finish(&self, id: &CallId) -> bool {
        let Some((_, record)) = self.calls.remove(id) else {
            return false;
        };
        for key in record.keys() {
            self.index.remove_if(&key, |_, v| v == id);
        }
        info!("Call {} finished", id);
        true
    }

    async fn calls_on_node(&self, node: NodeId) -> Vec<CallRecord> {
        self.calls
            .iter()
            .filter(|c| c.node == Some(node))
            .map(|c| c.clone())
            .collect()
    }
}
