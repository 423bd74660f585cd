//! # Event Router
//!
//! Reconciles unsolicited node events into call-state transitions and cluster
//! state updates. A fixed table maps each event path to an [`EventKind`];
//! dispatch is a single `match` over the kind.
//!
//! Handlers are idempotent. Missing or malformed body fields are logged and
//! the event is dropped, never propagated as an error.
//!
//! ## Reconciliation rules
//!
//! - **Device exclusion**: an event whose `excludedDevices` list contains this
//!   position's device is ignored entirely
//! - **Shared-line connect/hold**: find the call by correlation key or
//!   synthesize it, except for ACD-routed calls not answered here
//! - **Release for park**: start a grace timer; a `park` event in time keeps
//!   the call, otherwise the timer finishes it
//! - **Park timeout sub-events**: only act on calls in the parked state
//! - **Node state, ACD/RG/dynamic ACD status, Listen & Join termination**:
//!   handed to the [`ClusterControl`] the caller passes in

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::call_registry::{CallId, CallKey, CallRecord, CallRegistry, CallState, NewCall};
use crate::events::{Notification, NotificationBus};
use crate::node::nena::{NenaQueueStatus, NenaServiceStatus};
use crate::state::{AcdLoginState, DynamicAcdEntry, RgLoginState};
use crate::types::{NodeId, NodeLiveness, PositionContext};
use crate::wire::{paths, Event};

/// Cluster-level reactions the router triggers but does not own
#[async_trait]
pub trait ClusterControl: Send + Sync {
    async fn node_liveness_changed(&self, node: NodeId, liveness: NodeLiveness);

    /// `forced_not_ready` is set when the node took the agent out of ready
    /// on its own, e.g. after a ring timeout
    async fn acd_state_reported(&self, node: NodeId, state: AcdLoginState, forced_not_ready: bool);

    async fn rg_state_reported(&self, node: NodeId, state: RgLoginState);

    async fn dynamic_acd_reported(&self, node: NodeId, entries: Vec<DynamicAcdEntry>);

    async fn listen_join_terminated(&self, node: NodeId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SharedLineConnect,
    SharedLineDisconnect,
    SharedLineHold,
    SharedLineRelease,
    Park,
    Unpark,
    ParkTimeout,
    Abandoned,
    NodeStateChange,
    NodeStates,
    AcdStatus,
    RgStatus,
    DynamicAcdStatus,
    ListenJoinTerminated,
    NenaQueueState,
    NenaServiceState,
}

impl EventKind {
    pub const ALL: [EventKind; 16] = [
        EventKind::SharedLineConnect,
        EventKind::SharedLineDisconnect,
        EventKind::SharedLineHold,
        EventKind::SharedLineRelease,
        EventKind::Park,
        EventKind::Unpark,
        EventKind::ParkTimeout,
        EventKind::Abandoned,
        EventKind::NodeStateChange,
        EventKind::NodeStates,
        EventKind::AcdStatus,
        EventKind::RgStatus,
        EventKind::DynamicAcdStatus,
        EventKind::ListenJoinTerminated,
        EventKind::NenaQueueState,
        EventKind::NenaServiceState,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            EventKind::SharedLineConnect => paths::EV_SHARED_LINE_CONNECT,
            EventKind::SharedLineDisconnect => paths::EV_SHARED_LINE_DISCONNECT,
            EventKind::SharedLineHold => paths::EV_SHARED_LINE_HOLD,
            EventKind::SharedLineRelease => paths::EV_SHARED_LINE_RELEASE,
            EventKind::Park => paths::EV_PARK,
            EventKind::Unpark => paths::EV_UNPARK,
            EventKind::ParkTimeout => paths::EV_PARK_TIMEOUT,
            EventKind::Abandoned => paths::EV_ABANDONED,
            EventKind::NodeStateChange => paths::EV_NODE_STATE_CHANGE,
            EventKind::NodeStates => paths::EV_NODE_STATES,
            EventKind::AcdStatus => paths::EV_ACD_STATUS,
            EventKind::RgStatus => paths::EV_RG_STATUS,
            EventKind::DynamicAcdStatus => paths::EV_DYNAMIC_ACD_STATUS,
            EventKind::ListenJoinTerminated => paths::EV_LISTEN_JOIN_TERMINATED,
            EventKind::NenaQueueState => paths::EV_NENA_QUEUE_STATE,
            EventKind::NenaServiceState => paths::EV_NENA_SERVICE_STATE,
        }
    }
}

/// Park timeout sub-events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkTimeoutKind {
    ReofferDevice,
    ReofferRoute,
    TimeoutWarning,
    TimeoutReached,
}

impl std::str::FromStr for ParkTimeoutKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ReofferDevice" => Ok(ParkTimeoutKind::ReofferDevice),
            "ReofferRoute" => Ok(ParkTimeoutKind::ReofferRoute),
            "TimeoutWarning" => Ok(ParkTimeoutKind::TimeoutWarning),
            "TimeoutReached" => Ok(ParkTimeoutKind::TimeoutReached),
            _ => Err(format!("Unknown park timeout event: {}", s)),
        }
    }
}

/// What the router did with one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Handled,
    Ignored(&'static str),
    /// No handler for this path
    Unrouted,
}

pub struct EventRouter {
    ctx: PositionContext,
    calls: Arc<dyn CallRegistry>,
    bus: Arc<NotificationBus>,
    park_grace: Duration,
    table: HashMap<&'static str, EventKind>,
    /// Calls released for park, keyed to the token of their grace timer
    park_graces: Arc<DashMap<CallId, u64>>,
    next_grace_token: AtomicU64,
}

impl EventRouter {
    pub fn new(
        ctx: PositionContext,
        calls: Arc<dyn CallRegistry>,
        bus: Arc<NotificationBus>,
        park_grace: Duration,
    ) -> Self {
        let table = EventKind::ALL.iter().map(|k| (k.path(), *k)).collect();
        Self {
            ctx,
            calls,
            bus,
            park_grace,
            table,
            park_graces: Arc::new(DashMap::new()),
            next_grace_token: AtomicU64::new(1),
        }
    }

    pub fn kind_for(&self, path: &str) -> Option<EventKind> {
        self.table.get(path).copied()
    }

    /// Calls waiting for a park event after a release
    pub fn pending_park_graces(&self) -> usize {
        self.park_graces.len()
    }

    /// Dispatch one event received from `node`
    pub async fn route(&self, node: NodeId, event: &Event, cluster: &dyn ClusterControl) -> RouteOutcome {
        let Some(kind) = self.kind_for(&event.path) else {
            debug!("No route for event {} from node {}", event.path, node);
            return RouteOutcome::Unrouted;
        };
        let body = event.body.clone().unwrap_or(Value::Null);

        if self.is_excluded(&body) {
            debug!("Event {} from node {} excludes this device", event.path, node);
            return RouteOutcome::Ignored("device excluded");
        }

        let outcome = match kind {
            EventKind::SharedLineConnect => self.on_shared_line_active(node, &body, false).await,
            EventKind::SharedLineHold => self.on_shared_line_active(node, &body, true).await,
            EventKind::SharedLineDisconnect => self.on_shared_line_disconnect(node, &body).await,
            EventKind::SharedLineRelease => self.on_shared_line_release(node, &body).await,
            EventKind::Park => self.on_park(node, &body).await,
            EventKind::Unpark => self.on_unpark(&body).await,
            EventKind::ParkTimeout => self.on_park_timeout(&body).await,
            EventKind::Abandoned => self.on_abandoned(&body).await,
            EventKind::NodeStateChange => self.on_node_state_change(node, &body, cluster).await,
            EventKind::NodeStates => self.on_node_states(&body, cluster).await,
            EventKind::AcdStatus => self.on_acd_status(node, &body, cluster).await,
            EventKind::RgStatus => self.on_rg_status(node, &body, cluster).await,
            EventKind::DynamicAcdStatus => self.on_dynamic_acd_status(node, &body, cluster).await,
            EventKind::ListenJoinTerminated => {
                cluster.listen_join_terminated(node).await;
                RouteOutcome::Handled
            }
            EventKind::NenaQueueState => self.on_nena_queue_state(node, &body),
            EventKind::NenaServiceState => self.on_nena_service_state(node, &body),
        };

        if let RouteOutcome::Ignored(why) = &outcome {
            debug!("Event {} from node {} ignored: {}", event.path, node, why);
        }
        outcome
    }

    fn is_excluded(&self, body: &Value) -> bool {
        body.get("excludedDevices")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .any(|d| d.as_str() == Some(self.ctx.device_id.as_str()))
            })
            .unwrap_or(false)
    }

    fn is_this_device(&self, body: &Value) -> bool {
        match text(body, "device") {
            Some(device) => device == self.ctx.device_id,
            None => true,
        }
    }

    /// ACD-routed call that this position has not answered
    fn is_foreign_acd_call(&self, body: &Value) -> bool {
        let acd_routed = body
            .get("route")
            .and_then(|r| r.get("type"))
            .and_then(Value::as_str)
            == Some("acd")
            || body.get("acd").and_then(Value::as_bool).unwrap_or(false);
        if !acd_routed {
            return false;
        }
        let answered_by = text(body, "answeredBy").or_else(|| text(body, "device"));
        answered_by.as_deref() != Some(self.ctx.device_id.as_str())
    }

    async fn find_call(&self, body: &Value) -> Option<CallRecord> {
        for key in call_keys(body) {
            if let Some(call) = self.calls.find(&key).await {
                return Some(call);
            }
        }
        None
    }

    async fn synthesize(&self, node: NodeId, body: &Value, state: CallState) -> Option<CallRecord> {
        if call_keys(body).is_empty() {
            warn!("Event from node {} has no call correlation key", node);
            return None;
        }
        if self.is_foreign_acd_call(body) {
            return None;
        }
        let call = self
            .calls
            .create(NewCall {
                ucid: text(body, "ucid"),
                remote_channel: text(body, "remoteChannel"),
                local_channel: text(body, "localChannel"),
                css_id: text(body, "cssId"),
                session_id: text(body, "sessionId"),
                node: Some(node),
                state: Some(state),
                acd_routed: body.get("route").and_then(|r| r.get("type")).and_then(Value::as_str)
                    == Some("acd"),
            })
            .await;
        info!("Synthesized call {} from node {} in state {}", call.id, node, state);
        Some(call)
    }

    async fn transition(&self, call: &CallRecord, state: CallState) {
        if let Err(e) = self.calls.transition(&call.id, state).await {
            warn!("Call {} transition to {} failed: {}", call.id, state, e);
        }
    }

    async fn finish(&self, call: &CallRecord, why: &str) {
        self.cancel_park_grace(&call.id);
        if self.calls.finish(&call.id).await {
            debug!("Call {} finished: {}", call.id, why);
        }
    }

    /// Connect or hold on a shared line
    async fn on_shared_line_active(&self, node: NodeId, body: &Value, hold: bool) -> RouteOutcome {
        let state = if !self.is_this_device(body) {
            CallState::Busy
        } else if hold {
            CallState::OnHold
        } else {
            CallState::Connected
        };

        match self.find_call(body).await {
            Some(call) => {
                self.cancel_park_grace(&call.id);
                self.transition(&call, state).await;
                RouteOutcome::Handled
            }
            None => match self.synthesize(node, body, state).await {
                Some(_) => RouteOutcome::Handled,
                None => RouteOutcome::Ignored("ACD call not answered here or no call key"),
            },
        }
    }

    async fn on_shared_line_disconnect(&self, node: NodeId, body: &Value) -> RouteOutcome {
        match self.find_call(body).await {
            Some(call) => {
                self.finish(&call, &format!("disconnect on node {}", node)).await;
                RouteOutcome::Handled
            }
            None => RouteOutcome::Ignored("unknown call"),
        }
    }

    async fn on_shared_line_release(&self, node: NodeId, body: &Value) -> RouteOutcome {
        let Some(call) = self.find_call(body).await else {
            return RouteOutcome::Ignored("unknown call");
        };
        if call.state == CallState::Parked {
            return RouteOutcome::Ignored("call already parked");
        }

        let for_park = body
            .get("releasedForPark")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if for_park {
            debug!("Call {} released for park on node {}, waiting for park event", call.id, node);
            self.start_park_grace(call.id);
        } else {
            self.finish(&call, "released").await;
        }
        RouteOutcome::Handled
    }

    fn start_park_grace(&self, call: CallId) {
        let token = self.next_grace_token.fetch_add(1, Ordering::Relaxed);
        self.park_graces.insert(call, token);

        let calls = Arc::clone(&self.calls);
        let graces = Arc::clone(&self.park_graces);
        let grace = self.park_grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if graces.remove_if(&call, |_, t| *t == token).is_some() {
                info!("No park event for call {} within {:?}, finishing", call, grace);
                calls.finish(&call).await;
            }
        });
    }

    fn cancel_park_grace(&self, call: &CallId) -> bool {
        self.park_graces.remove(call).is_some()
    }

    async fn on_park(&self, node: NodeId, body: &Value) -> RouteOutcome {
        match self.find_call(body).await {
            Some(call) => {
                self.cancel_park_grace(&call.id);
                self.transition(&call, CallState::Parked).await;
                RouteOutcome::Handled
            }
            None => match self.synthesize(node, body, CallState::Parked).await {
                Some(_) => RouteOutcome::Handled,
                None => RouteOutcome::Ignored("ACD call not answered here or no call key"),
            },
        }
    }

    async fn on_unpark(&self, body: &Value) -> RouteOutcome {
        let Some(call) = self.find_call(body).await else {
            return RouteOutcome::Ignored("unknown call");
        };
        if call.state != CallState::Parked {
            return RouteOutcome::Ignored("call not parked");
        }
        let state = if self.is_this_device(body) {
            CallState::Connected
        } else {
            CallState::Busy
        };
        self.transition(&call, state).await;
        RouteOutcome::Handled
    }

    async fn on_park_timeout(&self, body: &Value) -> RouteOutcome {
        let Some(kind) = text(body, "type").and_then(|t| t.parse::<ParkTimeoutKind>().ok()) else {
            warn!("Park timeout event without a known type: {}", body);
            return RouteOutcome::Ignored("unknown park timeout type");
        };
        let Some(call) = self.find_call(body).await else {
            return RouteOutcome::Ignored("unknown call");
        };
        if call.state != CallState::Parked {
            return RouteOutcome::Ignored("call not parked");
        }

        match kind {
            ParkTimeoutKind::ReofferDevice => {
                if text(body, "device").as_deref() == Some(self.ctx.device_id.as_str()) {
                    self.bus.publish(Notification::ParkReoffer {
                        call: call.id,
                        route: None,
                    });
                } else {
                    self.transition(&call, CallState::Busy).await;
                }
            }
            ParkTimeoutKind::ReofferRoute => {
                self.bus.publish(Notification::ParkReoffer {
                    call: call.id,
                    route: text(body, "route"),
                });
            }
            ParkTimeoutKind::TimeoutWarning => {
                self.bus.publish(Notification::ParkTimeoutWarning { call: call.id });
            }
            ParkTimeoutKind::TimeoutReached => {
                self.bus.publish(Notification::ParkTimeoutReached { call: call.id });
            }
        }
        RouteOutcome::Handled
    }

    /// The caller hung up; this wins over any pending park grace
    async fn on_abandoned(&self, body: &Value) -> RouteOutcome {
        match self.find_call(body).await {
            Some(call) => {
                self.finish(&call, "abandoned").await;
                RouteOutcome::Handled
            }
            None => RouteOutcome::Ignored("unknown call"),
        }
    }

    async fn on_node_state_change(
        &self,
        from: NodeId,
        body: &Value,
        cluster: &dyn ClusterControl,
    ) -> RouteOutcome {
        let node = body.get("node").and_then(node_id).unwrap_or(from);
        match liveness(body) {
            Some(l) => {
                cluster.node_liveness_changed(node, l).await;
                RouteOutcome::Handled
            }
            None => RouteOutcome::Ignored("bad node state"),
        }
    }

    async fn on_node_states(&self, body: &Value, cluster: &dyn ClusterControl) -> RouteOutcome {
        let Some(list) = body.get("nodes").and_then(Value::as_array) else {
            return RouteOutcome::Ignored("no node list");
        };

        let mut handled = 0;
        for entry in list {
            match (entry.get("node").and_then(node_id), liveness(entry)) {
                (Some(node), Some(l)) => {
                    cluster.node_liveness_changed(node, l).await;
                    handled += 1;
                }
                _ => warn!("Skipping bad node state entry {}", entry),
            }
        }

        if handled > 0 {
            RouteOutcome::Handled
        } else {
            RouteOutcome::Ignored("no valid node state")
        }
    }

    fn is_other_agent(&self, body: &Value) -> bool {
        matches!(text(body, "agent"), Some(agent) if agent != self.ctx.agent_id)
    }

    async fn on_acd_status(&self, node: NodeId, body: &Value, cluster: &dyn ClusterControl) -> RouteOutcome {
        if self.is_other_agent(body) {
            return RouteOutcome::Ignored("other agent");
        }
        let state = match AcdLoginState::from_body(body) {
            Ok(state) => state,
            Err(e) => {
                warn!("Bad ACD status from node {}: {}", node, e);
                return RouteOutcome::Ignored("bad ACD status");
            }
        };
        let forced = body.get("forced").and_then(Value::as_bool).unwrap_or(false) && !state.ready;
        if forced {
            info!(
                "Node {} forced agent {} to not ready ({:?})",
                node, self.ctx.agent_id, state.reason_code
            );
        }
        cluster.acd_state_reported(node, state, forced).await;
        RouteOutcome::Handled
    }

    async fn on_rg_status(&self, node: NodeId, body: &Value, cluster: &dyn ClusterControl) -> RouteOutcome {
        if self.is_other_agent(body) {
            return RouteOutcome::Ignored("other agent");
        }
        match RgLoginState::from_body(body) {
            Ok(state) => {
                cluster.rg_state_reported(node, state).await;
                RouteOutcome::Handled
            }
            Err(e) => {
                warn!("Bad ring group status from node {}: {}", node, e);
                RouteOutcome::Ignored("bad ring group status")
            }
        }
    }

    async fn on_dynamic_acd_status(
        &self,
        node: NodeId,
        body: &Value,
        cluster: &dyn ClusterControl,
    ) -> RouteOutcome {
        if body.get("agents").and_then(Value::as_array).is_none() {
            return RouteOutcome::Ignored("no agent list");
        }
        let entries = DynamicAcdEntry::list_from_body(body);
        cluster.dynamic_acd_reported(node, entries).await;
        RouteOutcome::Handled
    }

    fn on_nena_queue_state(&self, node: NodeId, body: &Value) -> RouteOutcome {
        match NenaQueueStatus::from_body(body) {
            Some(status) => {
                self.bus
                    .publish(Notification::NenaQueueStateChanged { node, status });
                RouteOutcome::Handled
            }
            None => RouteOutcome::Ignored("bad NENA queue state"),
        }
    }

    fn on_nena_service_state(&self, node: NodeId, body: &Value) -> RouteOutcome {
        match NenaServiceStatus::from_body(body) {
            Some(status) => {
                self.bus
                    .publish(Notification::NenaServiceStateChanged { node, status });
                RouteOutcome::Handled
            }
            None => RouteOutcome::Ignored("bad NENA service state"),
        }
    }
}

fn text(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Correlation keys in lookup priority order
fn call_keys(body: &Value) -> Vec<CallKey> {
    let mut keys = Vec::new();
    if let Some(k) = text(body, "ucid") {
        keys.push(CallKey::UniqueCallId(k));
    }
    if let Some(k) = text(body, "remoteChannel") {
        keys.push(CallKey::RemoteChannel(k));
    }
    if let Some(k) = text(body, "localChannel") {
        keys.push(CallKey::LocalChannel(k));
    }
    if let Some(k) = text(body, "cssId") {
        keys.push(CallKey::CssId(k));
    }
    keys
}

fn node_id(v: &Value) -> Option<NodeId> {
    match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()).map(NodeId),
        Value::String(s) => s.parse::<u32>().ok().map(NodeId),
        _ => None,
    }
}

fn liveness(v: &Value) -> Option<NodeLiveness> {
    v.get("state").and_then(Value::as_str)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_registry::InMemoryCallRegistry;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingCluster {
        liveness: Mutex<Vec<(NodeId, NodeLiveness)>>,
        acd: Mutex<Vec<(NodeId, AcdLoginState, bool)>>,
        terminated: Mutex<Vec<NodeId>>,
    }

    #[async_trait]
    impl ClusterControl for RecordingCluster {
        async fn node_liveness_changed(&self, node: NodeId, liveness: NodeLiveness) {
            self.liveness.lock().await.push((node, liveness));
        }
        async fn acd_state_reported(&self, node: NodeId, state: AcdLoginState, forced: bool) {
            self.acd.lock().await.push((node, state, forced));
        }
        async fn rg_state_reported(&self, _node: NodeId, _state: RgLoginState) {}
        async fn dynamic_acd_reported(&self, _node: NodeId, _entries: Vec<DynamicAcdEntry>) {}
        async fn listen_join_terminated(&self, node: NodeId) {
            self.terminated.lock().await.push(node);
        }
    }

    fn setup() -> (EventRouter, Arc<InMemoryCallRegistry>, Arc<NotificationBus>) {
        let calls = Arc::new(InMemoryCallRegistry::new());
        let bus = Arc::new(NotificationBus::new());
        let router = EventRouter::new(
            PositionContext::new("p1", "1001", "SIP/3001"),
            calls.clone(),
            bus.clone(),
            Duration::from_millis(2000),
        );
        (router, calls, bus)
    }

    fn event(path: &str, body: Value) -> Event {
        Event {
            path: path.to_string(),
            query: None,
            body: Some(body),
        }
    }

    #[test]
    fn test_table_covers_every_kind() {
        let (router, _, _) = setup();
        for kind in EventKind::ALL {
            assert_eq!(router.kind_for(kind.path()), Some(kind));
        }
        assert_eq!(router.kind_for("bogus"), None);
    }

    #[tokio::test]
    async fn test_excluded_device_is_ignored() {
        let (router, calls, _) = setup();
        let cluster = RecordingCluster::default();
        let outcome = router
            .route(
                NodeId(1),
                &event(
                    paths::EV_SHARED_LINE_CONNECT,
                    json!({"ucid": "u1", "excludedDevices": ["SIP/3001"]}),
                ),
                &cluster,
            )
            .await;
        assert_eq!(outcome, RouteOutcome::Ignored("device excluded"));
        assert_eq!(calls.active_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_synthesizes_unknown_call() {
        let (router, calls, _) = setup();
        let cluster = RecordingCluster::default();
        router
            .route(
                NodeId(2),
                &event(paths::EV_SHARED_LINE_CONNECT, json!({"ucid": "u1", "device": "SIP/3001"})),
                &cluster,
            )
            .await;
        let call = calls.find(&CallKey::UniqueCallId("u1".into())).await.unwrap();
        assert_eq!(call.state, CallState::Connected);
        assert_eq!(call.node, Some(NodeId(2)));
    }

    #[tokio::test]
    async fn test_foreign_acd_call_is_not_synthesized() {
        let (router, calls, _) = setup();
        let cluster = RecordingCluster::default();
        let outcome = router
            .route(
                NodeId(1),
                &event(
                    paths::EV_SHARED_LINE_CONNECT,
                    json!({"ucid": "u1", "device": "SIP/3002", "route": {"type": "acd"}}),
                ),
                &cluster,
            )
            .await;
        assert!(matches!(outcome, RouteOutcome::Ignored(_)));
        assert_eq!(calls.active_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_does_not_synthesize() {
        let (router, calls, _) = setup();
        let cluster = RecordingCluster::default();
        let outcome = router
            .route(
                NodeId(1),
                &event(paths::EV_SHARED_LINE_DISCONNECT, json!({"ucid": "u9"})),
                &cluster,
            )
            .await;
        assert_eq!(outcome, RouteOutcome::Ignored("unknown call"));
        assert_eq!(calls.active_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_body_is_dropped() {
        let (router, _, _) = setup();
        let cluster = RecordingCluster::default();
        let outcome = router
            .route(
                NodeId(1),
                &Event {
                    path: paths::EV_ACD_STATUS.to_string(),
                    query: None,
                    body: None,
                },
                &cluster,
            )
            .await;
        assert!(matches!(outcome, RouteOutcome::Ignored(_)));
        assert!(cluster.acd.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_node_states_fan_out() {
        let (router, _, _) = setup();
        let cluster = RecordingCluster::default();
        router
            .route(
                NodeId(1),
                &event(
                    paths::EV_NODE_STATES,
                    json!({"nodes": [{"node": 1, "state": "Up"}, {"node": "2", "state": "Down"}, {"node": 3}]}),
                ),
                &cluster,
            )
            .await;
        assert_eq!(
            *cluster.liveness.lock().await,
            vec![(NodeId(1), NodeLiveness::Up), (NodeId(2), NodeLiveness::Down)]
        );
    }

    #[tokio::test]
    async fn test_forced_not_ready_is_flagged() {
        let (router, _, _) = setup();
        let cluster = RecordingCluster::default();
        router
            .route(
                NodeId(1),
                &event(
                    paths::EV_ACD_STATUS,
                    json!({"agent": "1001", "status": "LoggedOn", "paused": true, "forced": true, "reasonCode": "ringTimeout"}),
                ),
                &cluster,
            )
            .await;
        let reported = cluster.acd.lock().await;
        assert_eq!(reported.len(), 1);
        assert!(reported[0].2);
        assert!(!reported[0].1.ready);
    }

    #[tokio::test]
    async fn test_acd_status_for_other_agent_is_ignored() {
        let (router, _, _) = setup();
        let cluster = RecordingCluster::default();
        let outcome = router
            .route(
                NodeId(1),
                &event(paths::EV_ACD_STATUS, json!({"agent": "2002", "status": "LoggedOn"})),
                &cluster,
            )
            .await;
        assert_eq!(outcome, RouteOutcome::Ignored("other agent"));
    }

    #[tokio::test]
    async fn test_listen_join_termination_is_forwarded() {
        let (router, _, _) = setup();
        let cluster = RecordingCluster::default();
        router
            .route(NodeId(3), &event(paths::EV_LISTEN_JOIN_TERMINATED, json!({})), &cluster)
            .await;
        assert_eq!(*cluster.terminated.lock().await, vec![NodeId(3)]);
    }
}
