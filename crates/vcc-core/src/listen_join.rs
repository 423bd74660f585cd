//! # Listen & Join Monitor
//!
//! Supervisor monitoring requires a subscription on every node of the
//! cluster. The monitor fans a subscribe out to every reachable node, tracks
//! each node's subscription separately, and keeps them alive as nodes come and
//! go.
//!
//! ## State
//!
//! - Global: mode (`Off`, `Listen`, `Join`, `Whisper`), target, and the
//!   active monitor call once the media leg exists
//! - Per node: `Unsubscribed`, `UnsubscribeInProgress`, `Subscribed`
//!
//! ## Fan-out outcome
//!
//! Every node settles before the result is computed:
//!
//! | Accepted | Other nodes                          | Result                     |
//! |----------|--------------------------------------|----------------------------|
//! | all      |                                      | `Success`                  |
//! | some     | skipped, rejected or timed out       | `SuccessLimitedNodes`      |
//! | none     | one rejected as already monitored    | `ErrorPositionIsBeingMonitoredByAnotherPosition` |
//! | none     | one rejected as bad target           | `ErrorBadTarget`           |
//! | none     | anything else                        | `ErrorAllNodesFailed`      |
//!
//! The two specific errors cancel the whole attempt and reset the mode to
//! `Off`. After `ErrorAllNodesFailed` the mode and target stay in place so a
//! node coming up later gets subscribed.
//!
//! ## Per-node lifecycle
//!
//! Keep-alive and liveness transitions subscribe or drop one node at a time
//! without touching the others. A subscription the node drops on its own
//! while still recorded as `Subscribed` is treated as involuntary: any monitor
//! call on that node is torn down, the node is unsubscribed and then
//! subscribed again, all without a user-visible notification.

use dashmap::DashMap;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::call_registry::SessionLayer;
use crate::error::{DomainError, Result, VccError};
use crate::events::{Notification, NotificationBus};
use crate::node::NodeClient;
use crate::types::{KeepAlive, NodeId, NodeLiveness, PositionContext};

/// Content type of the in-call message that switches monitoring mode
pub const MODE_SWITCH_CONTENT_TYPE: &str = "application/vnd.vcc.listen-join+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ListenJoinMode {
    #[default]
    Off,
    Listen,
    Join,
    Whisper,
}

impl std::str::FromStr for ListenJoinMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "off" | "Off" | "OFF" => Ok(ListenJoinMode::Off),
            "listen" | "Listen" | "LISTEN" => Ok(ListenJoinMode::Listen),
            "join" | "Join" | "JOIN" => Ok(ListenJoinMode::Join),
            "whisper" | "Whisper" | "WHISPER" => Ok(ListenJoinMode::Whisper),
            _ => Err(format!("Unknown listen & join mode: {}", s)),
        }
    }
}

impl fmt::Display for ListenJoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenJoinMode::Off => write!(f, "off"),
            ListenJoinMode::Listen => write!(f, "listen"),
            ListenJoinMode::Join => write!(f, "join"),
            ListenJoinMode::Whisper => write!(f, "whisper"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SubscriptionState {
    #[default]
    Unsubscribed,
    UnsubscribeInProgress,
    Subscribed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenJoinResult {
    Success,
    SuccessLimitedNodes,
    ErrorPositionIsBeingMonitoredByAnotherPosition,
    ErrorBadTarget,
    ErrorAllNodesFailed,
}

impl ListenJoinResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::SuccessLimitedNodes)
    }

    /// Errors that cancel the whole monitoring attempt
    pub fn cancels_attempt(&self) -> bool {
        matches!(
            self,
            Self::ErrorPositionIsBeingMonitoredByAnotherPosition | Self::ErrorBadTarget
        )
    }
}

/// How one node's subscribe ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSubscribeOutcome {
    Subscribed,
    SkipNodeIsDown,
    Rejected(DomainError),
    Timeout,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenJoinReport {
    pub result: ListenJoinResult,
    pub nodes: BTreeMap<NodeId, NodeSubscribeOutcome>,
}

/// What a [`ListenJoinMonitor::monitor`] call did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutcome {
    /// A new target was subscribed across the cluster
    Started(ListenJoinReport),
    /// Only the mode changed; `in_call` tells whether a message went out on
    /// the active monitor call
    ModeSwitched { in_call: bool },
    Unchanged,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveMonitorCall {
    pub node: NodeId,
    pub session_id: String,
}

#[derive(Debug, Default)]
struct Session {
    mode: ListenJoinMode,
    target: Option<String>,
    active_call: Option<ActiveMonitorCall>,
}

/// Fold per-node outcomes into the overall result
pub fn aggregate(outcomes: &BTreeMap<NodeId, NodeSubscribeOutcome>) -> ListenJoinResult {
    let accepted = outcomes
        .values()
        .filter(|o| matches!(o, NodeSubscribeOutcome::Subscribed))
        .count();

    if accepted > 0 {
        return if accepted == outcomes.len() {
            ListenJoinResult::Success
        } else {
            ListenJoinResult::SuccessLimitedNodes
        };
    }

    outcomes
        .values()
        .find_map(|o| match o {
            NodeSubscribeOutcome::Rejected(DomainError::PositionMonitoredByAnotherPosition) => {
                Some(ListenJoinResult::ErrorPositionIsBeingMonitoredByAnotherPosition)
            }
            NodeSubscribeOutcome::Rejected(DomainError::BadTarget) => {
                Some(ListenJoinResult::ErrorBadTarget)
            }
            _ => None,
        })
        .unwrap_or(ListenJoinResult::ErrorAllNodesFailed)
}

pub struct ListenJoinMonitor {
    ctx: PositionContext,
    nodes: BTreeMap<NodeId, Arc<NodeClient>>,
    sessions: Arc<dyn SessionLayer>,
    bus: Arc<NotificationBus>,
    session: RwLock<Session>,
    subscriptions: DashMap<NodeId, SubscriptionState>,
    /// Bumped on every teardown; results of an older fan-out are discarded
    generation: AtomicU64,
    op_lock: Mutex<()>,
}

impl ListenJoinMonitor {
    pub fn new(
        ctx: PositionContext,
        nodes: BTreeMap<NodeId, Arc<NodeClient>>,
        sessions: Arc<dyn SessionLayer>,
        bus: Arc<NotificationBus>,
    ) -> Self {
        let subscriptions = nodes
            .keys()
            .map(|id| (*id, SubscriptionState::Unsubscribed))
            .collect();
        Self {
            ctx,
            nodes,
            sessions,
            bus,
            session: RwLock::new(Session::default()),
            subscriptions,
            generation: AtomicU64::new(0),
            op_lock: Mutex::new(()),
        }
    }

    pub async fn mode(&self) -> ListenJoinMode {
        self.session.read().await.mode
    }

    pub async fn target(&self) -> Option<String> {
        self.session.read().await.target.clone()
    }

    pub async fn active_call(&self) -> Option<ActiveMonitorCall> {
        self.session.read().await.active_call.clone()
    }

    /// Record the monitor call once its media session is up
    pub async fn set_active_call(&self, node: NodeId, session_id: impl Into<String>) {
        self.session.write().await.active_call = Some(ActiveMonitorCall {
            node,
            session_id: session_id.into(),
        });
    }

    pub async fn clear_active_call(&self) {
        self.session.write().await.active_call = None;
    }

    pub fn subscription_state(&self, node: NodeId) -> SubscriptionState {
        self.subscriptions
            .get(&node)
            .map(|s| *s)
            .unwrap_or_default()
    }

    pub fn subscription_states(&self) -> BTreeMap<NodeId, SubscriptionState> {
        self.nodes
            .keys()
            .map(|id| (*id, self.subscription_state(*id)))
            .collect()
    }

    fn set_subscription(&self, node: NodeId, state: SubscriptionState) {
        self.subscriptions.insert(node, state);
    }

    /// Start, retarget, switch mode of, or stop monitoring
    pub async fn monitor(&self, mode: ListenJoinMode, target: &str) -> Result<MonitorOutcome> {
        if mode == ListenJoinMode::Off {
            self.cancel().await;
            return Ok(MonitorOutcome::Stopped);
        }

        let _op = self.op_lock.lock().await;
        let (current_mode, current_target, active_call) = {
            let s = self.session.read().await;
            (s.mode, s.target.clone(), s.active_call.clone())
        };

        if current_mode != ListenJoinMode::Off && current_target.as_deref() == Some(target) {
            if current_mode == mode {
                return Ok(MonitorOutcome::Unchanged);
            }

            let in_call = match active_call {
                Some(call) => {
                    let body = json!({ "mode": mode.to_string() }).to_string();
                    self.sessions
                        .send_info(&call.session_id, call.node, MODE_SWITCH_CONTENT_TYPE, &body)
                        .await?;
                    true
                }
                None => false,
            };
            self.session.write().await.mode = mode;
            info!("Listen & Join mode {} -> {} (in call: {})", current_mode, mode, in_call);
            self.publish(mode, Some(target.to_string()), None);
            return Ok(MonitorOutcome::ModeSwitched { in_call });
        }

        if current_mode != ListenJoinMode::Off {
            info!(
                "Listen & Join target change {:?} -> {}, cancelling previous session",
                current_target, target
            );
            self.teardown().await;
        }

        {
            let mut s = self.session.write().await;
            s.mode = mode;
            s.target = Some(target.to_string());
            s.active_call = None;
        }

        let report = self.subscribe_all_nodes().await;
        info!("Listen & Join {} {}: {:?}", mode, target, report.result);

        if report.result.cancels_attempt() {
            self.teardown().await;
            self.publish(ListenJoinMode::Off, None, Some(report.result));
        } else {
            self.publish(mode, Some(target.to_string()), Some(report.result));
        }
        Ok(MonitorOutcome::Started(report))
    }

    /// Stop monitoring, hang up the monitor call, and unsubscribe everywhere
    pub async fn cancel(&self) {
        let _op = self.op_lock.lock().await;
        if self.session.read().await.mode == ListenJoinMode::Off {
            return;
        }
        self.teardown().await;
        self.publish(ListenJoinMode::Off, None, None);
    }

    /// Silent cancel: no notification
    async fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);

        let call = self.session.write().await.active_call.take();
        if let Some(call) = call {
            if let Err(e) = self.sessions.hangup(&call.session_id, call.node).await {
                warn!("Failed to hang up monitor call on node {}: {}", call.node, e);
            }
        }

        self.unsubscribe_all().await;

        let mut s = self.session.write().await;
        s.mode = ListenJoinMode::Off;
        s.target = None;
    }

    /// Subscribe every reachable node for the current target and settle all
    pub async fn subscribe_all_nodes(&self) -> ListenJoinReport {
        let (mode, target) = {
            let s = self.session.read().await;
            (s.mode, s.target.clone())
        };
        let Some(target) = target.filter(|_| mode != ListenJoinMode::Off) else {
            return ListenJoinReport {
                result: ListenJoinResult::ErrorAllNodesFailed,
                nodes: BTreeMap::new(),
            };
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let outcomes = join_all(
            self.nodes
                .values()
                .map(|node| self.subscribe_node(node, &target, mode, generation)),
        )
        .await;

        let nodes: BTreeMap<NodeId, NodeSubscribeOutcome> = outcomes.into_iter().collect();
        ListenJoinReport {
            result: aggregate(&nodes),
            nodes,
        }
    }

    async fn subscribe_node(
        &self,
        node: &Arc<NodeClient>,
        target: &str,
        mode: ListenJoinMode,
        generation: u64,
    ) -> (NodeId, NodeSubscribeOutcome) {
        let id = node.node_id();
        if !node.is_reachable().await {
            debug!("Listen & Join skipping node {}: down", id);
            self.set_subscription(id, SubscriptionState::Unsubscribed);
            return (id, NodeSubscribeOutcome::SkipNodeIsDown);
        }

        let result = node.listen_join_subscribe(&self.ctx, target, mode).await;

        if self.generation.load(Ordering::SeqCst) != generation {
            if result.is_ok() {
                debug!("Node {} accepted a superseded subscribe, withdrawing it", id);
                self.spawn_unsubscribe(node, target);
            }
            return (id, NodeSubscribeOutcome::Failed("superseded".to_string()));
        }

        match result {
            Ok(()) => {
                debug!("Listen & Join subscribed on node {}", id);
                self.set_subscription(id, SubscriptionState::Subscribed);
                (id, NodeSubscribeOutcome::Subscribed)
            }
            Err(VccError::Domain(e)) => {
                info!("Listen & Join rejected by node {}: {}", id, e);
                self.set_subscription(id, SubscriptionState::Unsubscribed);
                (id, NodeSubscribeOutcome::Rejected(e))
            }
            Err(VccError::Timeout { .. }) => {
                warn!("Listen & Join subscribe timed out on node {}", id);
                self.set_subscription(id, SubscriptionState::Unsubscribed);
                // A late accept must not leave a stray subscription behind
                self.spawn_unsubscribe(node, target);
                (id, NodeSubscribeOutcome::Timeout)
            }
            Err(e) => {
                warn!("Listen & Join subscribe failed on node {}: {}", id, e);
                self.set_subscription(id, SubscriptionState::Unsubscribed);
                (id, NodeSubscribeOutcome::Failed(e.to_string()))
            }
        }
    }

    fn spawn_unsubscribe(&self, node: &Arc<NodeClient>, target: &str) {
        let node = Arc::clone(node);
        let ctx = self.ctx.clone();
        let target = target.to_string();
        tokio::spawn(async move {
            if let Err(e) = node.listen_join_unsubscribe(&ctx, &target).await {
                debug!("Best-effort unsubscribe on node {} failed: {}", node.node_id(), e);
            }
        });
    }

    /// Unsubscribe every node currently recorded as subscribed
    pub async fn unsubscribe_all(&self) {
        let target = self.session.read().await.target.clone();
        let target = target.as_deref();
        let subscribed: Vec<Arc<NodeClient>> = self
            .nodes
            .values()
            .filter(|n| self.subscription_state(n.node_id()) == SubscriptionState::Subscribed)
            .cloned()
            .collect();

        join_all(subscribed.iter().map(|node| async move {
            let id = node.node_id();
            self.set_subscription(id, SubscriptionState::UnsubscribeInProgress);
            if let Some(target) = target {
                if let Err(e) = node.listen_join_unsubscribe(&self.ctx, target).await {
                    debug!("Unsubscribe on node {} failed: {}", id, e);
                }
            }
            self.set_subscription(id, SubscriptionState::Unsubscribed);
        }))
        .await;
    }

    /// Subscribe one node again if monitoring is on and it is not subscribed
    pub async fn resubscribe_node(&self, node_id: NodeId) -> Option<NodeSubscribeOutcome> {
        let node = self.nodes.get(&node_id)?;
        let (mode, target) = {
            let s = self.session.read().await;
            (s.mode, s.target.clone())
        };
        let target = target.filter(|_| mode != ListenJoinMode::Off)?;
        if self.subscription_state(node_id) != SubscriptionState::Unsubscribed {
            return None;
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let (_, outcome) = self.subscribe_node(node, &target, mode, generation).await;
        Some(outcome)
    }

    /// Local-only drop of one node's subscription
    fn drop_node(&self, node_id: NodeId) {
        if self.subscription_state(node_id) != SubscriptionState::Unsubscribed {
            debug!("Listen & Join subscription on node {} dropped", node_id);
        }
        self.set_subscription(node_id, SubscriptionState::Unsubscribed);
    }

    pub async fn on_keep_alive(&self, node_id: NodeId, keep_alive: KeepAlive) {
        match keep_alive {
            KeepAlive::Up => {
                self.resubscribe_node(node_id).await;
            }
            KeepAlive::Down => self.drop_node(node_id),
        }
    }

    pub async fn on_node_liveness(&self, node_id: NodeId, liveness: NodeLiveness) {
        match liveness {
            NodeLiveness::Up => {
                self.resubscribe_node(node_id).await;
            }
            NodeLiveness::Down => {
                self.drop_node(node_id);
                let mut s = self.session.write().await;
                if s.active_call.as_ref().map(|c| c.node) == Some(node_id) {
                    s.active_call = None;
                }
            }
            NodeLiveness::Unknown => {}
        }
    }

    /// The node dropped its subscription without being asked
    pub async fn on_subscription_terminated(&self, node_id: NodeId) -> Option<NodeSubscribeOutcome> {
        if self.subscription_state(node_id) != SubscriptionState::Subscribed {
            debug!("Expected subscription termination on node {}", node_id);
            self.set_subscription(node_id, SubscriptionState::Unsubscribed);
            return None;
        }
        warn!("Involuntary Listen & Join termination on node {}, resubscribing", node_id);

        let (call, target) = {
            let mut s = self.session.write().await;
            let on_node = s.active_call.as_ref().map(|c| c.node) == Some(node_id);
            let call = if on_node { s.active_call.take() } else { None };
            (call, s.target.clone())
        };
        if let Some(call) = call {
            if let Err(e) = self.sessions.hangup(&call.session_id, call.node).await {
                warn!("Failed to tear down monitor call on node {}: {}", node_id, e);
            }
        }

        self.set_subscription(node_id, SubscriptionState::UnsubscribeInProgress);
        if let (Some(node), Some(target)) = (self.nodes.get(&node_id), target) {
            if let Err(e) = node.listen_join_unsubscribe(&self.ctx, &target).await {
                debug!("Silent unsubscribe on node {} failed: {}", node_id, e);
            }
        }
        self.set_subscription(node_id, SubscriptionState::Unsubscribed);

        self.resubscribe_node(node_id).await
    }

    fn publish(&self, mode: ListenJoinMode, target: Option<String>, result: Option<ListenJoinResult>) {
        self.bus.publish(Notification::ListenJoinChanged {
            mode,
            target,
            result,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(list: &[(u32, NodeSubscribeOutcome)]) -> BTreeMap<NodeId, NodeSubscribeOutcome> {
        list.iter()
            .map(|(id, o)| (NodeId(*id), o.clone()))
            .collect()
    }

    #[test]
    fn test_aggregate_limited_nodes() {
        let result = aggregate(&outcomes(&[
            (1, NodeSubscribeOutcome::Subscribed),
            (2, NodeSubscribeOutcome::SkipNodeIsDown),
            (3, NodeSubscribeOutcome::Timeout),
        ]));
        assert_eq!(result, ListenJoinResult::SuccessLimitedNodes);
    }

    #[test]
    fn test_aggregate_all_accepted() {
        let result = aggregate(&outcomes(&[
            (1, NodeSubscribeOutcome::Subscribed),
            (2, NodeSubscribeOutcome::Subscribed),
        ]));
        assert_eq!(result, ListenJoinResult::Success);
    }

    #[test]
    fn test_aggregate_specific_errors_only_without_accepts() {
        let monitored =
            NodeSubscribeOutcome::Rejected(DomainError::PositionMonitoredByAnotherPosition);
        assert_eq!(
            aggregate(&outcomes(&[
                (1, NodeSubscribeOutcome::Timeout),
                (2, monitored.clone()),
            ])),
            ListenJoinResult::ErrorPositionIsBeingMonitoredByAnotherPosition
        );
        assert_eq!(
            aggregate(&outcomes(&[
                (1, NodeSubscribeOutcome::Subscribed),
                (2, monitored),
            ])),
            ListenJoinResult::SuccessLimitedNodes
        );
        assert_eq!(
            aggregate(&outcomes(&[(1, NodeSubscribeOutcome::Rejected(DomainError::BadTarget))])),
            ListenJoinResult::ErrorBadTarget
        );
        assert_eq!(
            aggregate(&outcomes(&[
                (1, NodeSubscribeOutcome::Rejected(DomainError::Forbidden)),
                (2, NodeSubscribeOutcome::SkipNodeIsDown),
            ])),
            ListenJoinResult::ErrorAllNodesFailed
        );
        assert_eq!(aggregate(&BTreeMap::new()), ListenJoinResult::ErrorAllNodesFailed);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("whisper".parse::<ListenJoinMode>(), Ok(ListenJoinMode::Whisper));
        assert!("shout".parse::<ListenJoinMode>().is_err());
        assert_eq!(ListenJoinMode::Join.to_string(), "join");
    }
}
