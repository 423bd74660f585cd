//! # Node Client
//!
//! One [`NodeClient`] per cluster node. It wraps that node's
//! [`ConnectionMultiplexer`] with the resource verbs the position needs and
//! owns the node-scoped snapshots of ACD login, ring-group login and dynamic
//! ACD membership.
//!
//! ## Verb families
//!
//! | Module        | Verbs                                                    |
//! |---------------|----------------------------------------------------------|
//! | [`acd`]       | login, logout, ready, not ready, queue log on/off, dynamic ACD subscribe |
//! | [`rg`]        | ring-group login, logout, state                          |
//! | [`call`]      | answer, hold, park, transfer, mute, deafen, conferences  |
//! | [`nena`]      | NENA queue and service state get, override, clear        |
//! | [`monitor`]   | Listen & Join subscribe and unsubscribe                  |
//!
//! Every verb issues exactly one request. A success maps to a typed payload,
//! a non-success status maps into [`DomainError`], and transport failures stay
//! connectivity errors. Login and queue verbs reset the matching snapshot to
//! unknown on any failure so nobody keeps trusting stale data.
//!
//! ## Liveness
//!
//! Liveness only moves on node-state events and is tracked separately from
//! keep-alive, which follows the transport connection.

pub mod acd;
pub mod call;
pub mod monitor;
pub mod nena;
pub mod rg;

use futures_util::future::join;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::call_registry::CallState;
use crate::config::TimeoutConfig;
use crate::error::{DomainError, Result, VccError};
use crate::multiplexer::{ConnectionMultiplexer, RequestSpec};
use crate::state::{AcdLoginState, DynamicAcdEntry, RgLoginState};
use crate::types::{KeepAlive, NodeId, NodeLiveness, PositionContext};
use crate::wire::paths;

/// Snapshot fetched when a node comes up
#[derive(Debug, Clone, PartialEq)]
pub struct InitialStates {
    pub acd: Arc<AcdLoginState>,
    pub rg: Arc<RgLoginState>,
}

/// One call as reported by a node's call list
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeCall {
    pub ucid: Option<String>,
    pub remote_channel: Option<String>,
    pub local_channel: Option<String>,
    pub css_id: Option<String>,
    pub session_id: Option<String>,
    pub state: Option<CallState>,
}

impl NodeCall {
    /// Parse the `calls` list of a call-state body, skipping entries with no
    /// correlation key at all
    pub fn list_from_body(body: &Value) -> Vec<NodeCall> {
        let Some(calls) = body.get("calls").and_then(Value::as_array) else {
            return Vec::new();
        };
        calls
            .iter()
            .map(|c| {
                let text = |key: &str| c.get(key).and_then(Value::as_str).map(str::to_string);
                NodeCall {
                    ucid: text("ucid"),
                    remote_channel: text("remoteChannel"),
                    local_channel: text("localChannel"),
                    css_id: text("cssId"),
                    session_id: text("sessionId"),
                    state: c
                        .get("state")
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse().ok()),
                }
            })
            .filter(|c| {
                c.ucid.is_some()
                    || c.remote_channel.is_some()
                    || c.local_channel.is_some()
                    || c.css_id.is_some()
            })
            .collect()
    }
}

pub struct NodeClient {
    node_id: NodeId,
    timeouts: TimeoutConfig,
    connection: RwLock<Option<Arc<ConnectionMultiplexer>>>,
    liveness: RwLock<NodeLiveness>,
    keep_alive: RwLock<KeepAlive>,
    acd: RwLock<Arc<AcdLoginState>>,
    rg: RwLock<Arc<RgLoginState>>,
    dynamic_acd: RwLock<Arc<Vec<DynamicAcdEntry>>>,
}

impl NodeClient {
    pub fn new(node_id: NodeId, timeouts: TimeoutConfig) -> Self {
        Self {
            node_id,
            timeouts,
            connection: RwLock::new(None),
            liveness: RwLock::new(NodeLiveness::Unknown),
            keep_alive: RwLock::new(KeepAlive::Down),
            acd: RwLock::new(Arc::new(AcdLoginState::unknown())),
            rg: RwLock::new(Arc::new(RgLoginState::unknown())),
            dynamic_acd: RwLock::new(Arc::new(Vec::new())),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// Bind a fresh connection, replacing any previous one
    pub async fn attach(&self, mux: Arc<ConnectionMultiplexer>) {
        info!("Node {} connection attached", self.node_id);
        *self.connection.write().await = Some(mux);
    }

    /// Drop `mux` if it is still the bound connection
    ///
    /// A reconnect may already have attached a newer connection, which stays.
    pub async fn detach_if(&self, mux: &Arc<ConnectionMultiplexer>) -> bool {
        let mut slot = self.connection.write().await;
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, mux) => {
                *slot = None;
                info!("Node {} connection detached", self.node_id);
                true
            }
            _ => false,
        }
    }

    /// The live connection, if any
    pub async fn connection(&self) -> Option<Arc<ConnectionMultiplexer>> {
        self.connection
            .read()
            .await
            .as_ref()
            .filter(|mux| !mux.is_closed())
            .cloned()
    }

    pub async fn liveness(&self) -> NodeLiveness {
        *self.liveness.read().await
    }

    /// Store the new liveness and return the previous one
    pub async fn set_liveness(&self, liveness: NodeLiveness) -> NodeLiveness {
        let mut slot = self.liveness.write().await;
        std::mem::replace(&mut *slot, liveness)
    }

    pub async fn keep_alive(&self) -> KeepAlive {
        *self.keep_alive.read().await
    }

    pub async fn set_keep_alive(&self, keep_alive: KeepAlive) -> KeepAlive {
        let mut slot = self.keep_alive.write().await;
        std::mem::replace(&mut *slot, keep_alive)
    }

    /// Up by node-state events and by keep-alive
    pub async fn is_reachable(&self) -> bool {
        self.liveness().await == NodeLiveness::Up && self.keep_alive().await == KeepAlive::Up
    }

    pub async fn acd_state(&self) -> Arc<AcdLoginState> {
        Arc::clone(&*self.acd.read().await)
    }

    pub async fn set_acd_state(&self, state: AcdLoginState) -> Arc<AcdLoginState> {
        let state = Arc::new(state);
        *self.acd.write().await = Arc::clone(&state);
        state
    }

    pub async fn reset_acd_state(&self) {
        debug!("Node {} ACD state reset to unknown", self.node_id);
        self.set_acd_state(AcdLoginState::unknown()).await;
    }

    pub async fn rg_state(&self) -> Arc<RgLoginState> {
        Arc::clone(&*self.rg.read().await)
    }

    pub async fn set_rg_state(&self, state: RgLoginState) -> Arc<RgLoginState> {
        let state = Arc::new(state);
        *self.rg.write().await = Arc::clone(&state);
        state
    }

    pub async fn reset_rg_state(&self) {
        debug!("Node {} ring group state reset to unknown", self.node_id);
        self.set_rg_state(RgLoginState::unknown()).await;
    }

    pub async fn dynamic_acd(&self) -> Arc<Vec<DynamicAcdEntry>> {
        Arc::clone(&*self.dynamic_acd.read().await)
    }

    pub async fn set_dynamic_acd(&self, entries: Vec<DynamicAcdEntry>) -> Arc<Vec<DynamicAcdEntry>> {
        let entries = Arc::new(entries);
        *self.dynamic_acd.write().await = Arc::clone(&entries);
        entries
    }

    /// Replace the entries of the agents named in `update`, keeping the rest
    ///
    /// Node data is authoritative for that node, so agents are replaced
    /// wholesale rather than merged.
    pub async fn apply_dynamic_acd_update(
        &self,
        update: Vec<DynamicAcdEntry>,
    ) -> Arc<Vec<DynamicAcdEntry>> {
        let mut slot = self.dynamic_acd.write().await;
        let mut next: Vec<DynamicAcdEntry> = slot
            .iter()
            .filter(|e| !update.iter().any(|u| u.agent == e.agent))
            .cloned()
            .collect();
        next.extend(update);
        let next = Arc::new(next);
        *slot = Arc::clone(&next);
        next
    }

    pub async fn reset_dynamic_acd(&self) {
        self.set_dynamic_acd(Vec::new()).await;
    }

    /// Forget everything node-scoped, used when the node goes down
    pub async fn reset_all_state(&self) {
        self.reset_acd_state().await;
        self.reset_rg_state().await;
        self.reset_dynamic_acd().await;
    }

    /// Send one request and fold a non-success status into [`DomainError`]
    pub(crate) async fn exchange(&self, spec: RequestSpec, timeout: Duration) -> Result<Option<Value>> {
        let mux = self
            .connection()
            .await
            .ok_or(VccError::NodeUnavailable(self.node_id))?;
        let path = spec.path.clone();
        let response = mux.request(spec, timeout).await?;

        if response.is_success() {
            Ok(response.body)
        } else {
            let err = DomainError::from_status(response.status, &response.reason);
            debug!(
                "Node {} rejected {}: {} {} ({})",
                self.node_id, path, response.status, response.reason, err
            );
            Err(err.into())
        }
    }

    pub(crate) async fn call(&self, spec: RequestSpec) -> Result<Option<Value>> {
        self.exchange(spec, self.timeouts.request()).await
    }

    /// Fetch ACD and ring-group state together
    pub async fn get_initial_states(&self, ctx: &PositionContext) -> Result<InitialStates> {
        let (acd, rg) = join(self.get_acd_state(ctx), self.get_rg_state(ctx)).await;
        Ok(InitialStates { acd: acd?, rg: rg? })
    }

    /// Fetch the node's current call list for this device
    pub async fn get_initial_call_state(&self, ctx: &PositionContext) -> Result<Vec<NodeCall>> {
        let spec = RequestSpec::get(paths::CALLS).with_query(json!({ "device": ctx.device_id }));
        let body = self.call(spec).await?.unwrap_or(Value::Null);
        Ok(NodeCall::list_from_body(&body))
    }
}

/// Identity fields carried by most request bodies
pub(crate) fn position_body(ctx: &PositionContext) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("position".into(), json!(ctx.position_id));
    body.insert("agent".into(), json!(ctx.agent_id));
    body.insert("device".into(), json!(ctx.device_id));
    body
}
