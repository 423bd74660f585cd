//! # Node Registry
//!
//! Composition root of the VCC core. The registry owns one [`NodeClient`] per
//! configured node, the position's preferred (agent-intended) state, and the
//! consolidated view built from every node's snapshot.
//!
//! ## Responsibilities
//!
//! - Fan user operations out to every node and settle all outcomes
//! - Rebuild the consolidated state after any node-scoped change and publish
//!   it as one atomic replace
//! - React to node liveness: resync login state on Up, terminate bound calls
//!   on Down
//! - Run one connect, pump, back off loop per node
//!
//! ## Preferred state
//!
//! Preferred state is what the agent asked for. When a node comes up with a
//! different opinion the registry re-issues the matching verb on that node
//! only. On first start, while preferred state is still unknown, the node's
//! report is adopted instead.

use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::call_registry::{CallKey, CallRegistry, NewCall, SessionLayer};
use crate::config::{NodeEndpoint, VccConfig};
use crate::consolidate::{
    consolidate_acd, consolidate_dynamic_acd, consolidate_op_status, consolidate_rg, OpStatus,
};
use crate::error::{Result, VccError};
use crate::events::{Notification, NotificationBus};
use crate::listen_join::ListenJoinMonitor;
use crate::multiplexer::{ConnectionMultiplexer, ALL_EVENTS};
use crate::node::{InitialStates, NodeCall, NodeClient};
use crate::router::{ClusterControl, EventRouter, RouteOutcome};
use crate::state::{AcdLoginState, AcdQueue, DynamicAcdEntry, LoginStatus, RgLoginState};
use crate::transport::{Connection, NodeConnector};
use crate::types::{KeepAlive, NodeId, NodeLiveness, PositionContext};
use crate::wire::Event;

/// Effective state across all nodes, replaced whole on every change
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConsolidatedState {
    pub acd: Arc<AcdLoginState>,
    pub rg: Arc<RgLoginState>,
    pub dynamic_acd: Arc<Vec<DynamicAcdEntry>>,
}

/// What the agent asked for, used to resync nodes that come up
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreferredState {
    pub acd_login: LoginStatus,
    /// `None` until the agent expresses a readiness preference
    pub ready: Option<bool>,
    pub reason_code: Option<String>,
    pub reason_desc: Option<String>,
    pub queues: Vec<AcdQueue>,
    pub rg_login: LoginStatus,
    pub ring_groups: Vec<String>,
}

/// Outcome of an operation fanned out to every node
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutReport {
    pub status: OpStatus,
    pub nodes: BTreeMap<NodeId, OpStatus>,
}

pub struct NodeRegistry {
    config: VccConfig,
    ctx: PositionContext,
    nodes: BTreeMap<NodeId, Arc<NodeClient>>,
    calls: Arc<dyn CallRegistry>,
    sessions: Arc<dyn SessionLayer>,
    bus: Arc<NotificationBus>,
    router: EventRouter,
    monitor: Arc<ListenJoinMonitor>,
    preferred: RwLock<PreferredState>,
    consolidated: RwLock<Arc<ConsolidatedState>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl NodeRegistry {
    pub fn new(
        config: VccConfig,
        calls: Arc<dyn CallRegistry>,
        sessions: Arc<dyn SessionLayer>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let ctx = config.position.context();
        let bus = Arc::new(NotificationBus::new());
        let nodes: BTreeMap<NodeId, Arc<NodeClient>> = config
            .nodes
            .iter()
            .map(|n| (n.id, Arc::new(NodeClient::new(n.id, config.timeouts.clone()))))
            .collect();

        let router = EventRouter::new(
            ctx.clone(),
            Arc::clone(&calls),
            Arc::clone(&bus),
            config.timeouts.park_grace(),
        );
        let monitor = Arc::new(ListenJoinMonitor::new(
            ctx.clone(),
            nodes.clone(),
            Arc::clone(&sessions),
            Arc::clone(&bus),
        ));

        info!(
            "VCC registry for position {} with {} nodes",
            ctx.position_id,
            nodes.len()
        );

        Ok(Arc::new(Self {
            config,
            ctx,
            nodes,
            calls,
            sessions,
            bus,
            router,
            monitor,
            preferred: RwLock::new(PreferredState::default()),
            consolidated: RwLock::new(Arc::new(ConsolidatedState::default())),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn context(&self) -> &PositionContext {
        &self.ctx
    }

    pub fn node(&self, id: NodeId) -> Option<Arc<NodeClient>> {
        self.nodes.get(&id).cloned()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.keys().copied().collect()
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn monitor(&self) -> &Arc<ListenJoinMonitor> {
        &self.monitor
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    pub async fn preferred(&self) -> PreferredState {
        self.preferred.read().await.clone()
    }

    pub async fn consolidated(&self) -> Arc<ConsolidatedState> {
        Arc::clone(&*self.consolidated.read().await)
    }

    /// Route one node event through the event router
    pub async fn handle_event(&self, node: NodeId, event: Event) -> RouteOutcome {
        self.router.route(node, &event, self).await
    }

    /// Run `op` on every node not known to be down and settle all outcomes
    async fn fan_out<F, Fut, T>(&self, op: F) -> FanOutReport
    where
        F: Fn(Arc<NodeClient>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcomes = join_all(self.nodes.values().map(|node| {
            let node = Arc::clone(node);
            let fut = op(Arc::clone(&node));
            async move {
                if node.liveness().await == NodeLiveness::Down {
                    return (node.node_id(), OpStatus::NotConnected);
                }
                (node.node_id(), OpStatus::from_result(&fut.await))
            }
        }))
        .await;

        let nodes: BTreeMap<NodeId, OpStatus> = outcomes.into_iter().collect();
        let statuses: Vec<OpStatus> = nodes.values().cloned().collect();
        FanOutReport {
            status: consolidate_op_status(&statuses),
            nodes,
        }
    }

    pub async fn acd_login(&self, queues: &[AcdQueue]) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.acd_login(ctx, queues).await })
            .await;
        if report.status.is_ok() {
            let mut p = self.preferred.write().await;
            p.acd_login = LoginStatus::LoggedIn;
            p.queues = queues.to_vec();
            p.ready = None;
        }
        self.reconsolidate().await;
        report
    }

    pub async fn acd_logout(&self, reason_code: Option<&str>) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.acd_logout(ctx, reason_code).await })
            .await;
        if report.status.is_ok() {
            let mut p = self.preferred.write().await;
            p.acd_login = LoginStatus::LoggedOut;
            p.queues.clear();
            p.ready = None;
        }
        self.reconsolidate().await;
        report
    }

    pub async fn acd_ready(&self) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.acd_ready(ctx).await })
            .await;
        if report.status.is_ok() {
            let mut p = self.preferred.write().await;
            p.ready = Some(true);
            p.reason_code = None;
            p.reason_desc = None;
        }
        self.reconsolidate().await;
        report
    }

    pub async fn acd_not_ready(
        &self,
        reason_code: Option<&str>,
        reason_desc: Option<&str>,
    ) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.acd_not_ready(ctx, reason_code, reason_desc).await })
            .await;
        if report.status.is_ok() {
            let mut p = self.preferred.write().await;
            p.ready = Some(false);
            p.reason_code = reason_code.map(str::to_string);
            p.reason_desc = reason_desc.map(str::to_string);
        }
        self.reconsolidate().await;
        report
    }

    pub async fn rg_login(&self, ring_groups: &[String]) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.rg_login(ctx, ring_groups).await })
            .await;
        if report.status.is_ok() {
            let mut p = self.preferred.write().await;
            p.rg_login = LoginStatus::LoggedIn;
            for group in ring_groups {
                if !p.ring_groups.contains(group) {
                    p.ring_groups.push(group.clone());
                }
            }
        }
        self.reconsolidate().await;
        report
    }

    /// Leave the given ring groups, or all of them when the list is empty
    pub async fn rg_logout(&self, ring_groups: &[String]) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.rg_logout(ctx, ring_groups).await })
            .await;
        if report.status.is_ok() {
            let mut p = self.preferred.write().await;
            if ring_groups.is_empty() {
                p.ring_groups.clear();
            } else {
                p.ring_groups.retain(|g| !ring_groups.contains(g));
            }
            p.rg_login = if p.ring_groups.is_empty() {
                LoginStatus::LoggedOut
            } else {
                LoginStatus::LoggedIn
            };
        }
        self.reconsolidate().await;
        report
    }

    pub async fn queue_acd_log_on(&self, agent: &str, queue: &str) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.queue_acd_log_on(ctx, agent, queue).await })
            .await;
        self.reconsolidate().await;
        report
    }

    pub async fn queue_acd_log_off(&self, agent: &str, queue: &str) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.queue_acd_log_off(ctx, agent, queue).await })
            .await;
        self.reconsolidate().await;
        report
    }

    pub async fn subscribe_dynamic_acd(&self) -> FanOutReport {
        let ctx = &self.ctx;
        let report = self
            .fan_out(|node| async move { node.subscribe_dynamic_acd(ctx).await })
            .await;
        self.reconsolidate().await;
        report
    }

    /// Fold every node's snapshot into a new consolidated state and publish
    /// the parts that changed
    ///
    /// The write lock is held while gathering so two rebuilds can never
    /// publish out of order.
    pub async fn reconsolidate(&self) -> Arc<ConsolidatedState> {
        let mut slot = self.consolidated.write().await;

        let mut acd = Vec::with_capacity(self.nodes.len());
        let mut rg = Vec::with_capacity(self.nodes.len());
        let mut dynamic = Vec::with_capacity(self.nodes.len());
        for node in self.nodes.values() {
            acd.push((*node.acd_state().await).clone());
            rg.push((*node.rg_state().await).clone());
            dynamic.push((*node.dynamic_acd().await).clone());
        }

        let next = Arc::new(ConsolidatedState {
            acd: Arc::new(consolidate_acd(&acd)),
            rg: Arc::new(consolidate_rg(&rg)),
            dynamic_acd: Arc::new(consolidate_dynamic_acd(&dynamic)),
        });
        let previous = std::mem::replace(&mut *slot, Arc::clone(&next));
        drop(slot);

        if previous.acd != next.acd {
            debug!("Consolidated ACD state now {:?}", next.acd.login_status);
            self.bus
                .publish(Notification::AcdStateChanged(Arc::clone(&next.acd)));
        }
        if previous.rg != next.rg {
            self.bus
                .publish(Notification::RgStateChanged(Arc::clone(&next.rg)));
        }
        if previous.dynamic_acd != next.dynamic_acd {
            self.bus
                .publish(Notification::DynamicAcdChanged(Arc::clone(&next.dynamic_acd)));
        }
        next
    }

    /// Record a keep-alive transition reported by the transport health check
    pub async fn set_keep_alive(&self, node: NodeId, keep_alive: KeepAlive) {
        let Some(client) = self.nodes.get(&node) else {
            warn!("Keep-alive for unknown node {}", node);
            return;
        };
        if client.set_keep_alive(keep_alive).await == keep_alive {
            return;
        }
        info!("Node {} keep-alive {:?}", node, keep_alive);
        self.bus
            .publish(Notification::KeepAliveChanged { node, keep_alive });
        self.monitor.on_keep_alive(node, keep_alive).await;
    }

    async fn on_node_up(&self, client: &Arc<NodeClient>) {
        self.refresh_node(client).await;
        self.monitor
            .on_node_liveness(client.node_id(), NodeLiveness::Up)
            .await;
    }

    /// Fetch the node's state and calls, then resync and reconsolidate
    async fn refresh_node(&self, client: &Arc<NodeClient>) {
        let node = client.node_id();
        if client.connection().await.is_none() {
            debug!("Node {} not connected yet, refresh deferred to attach", node);
            return;
        }
        match client.get_initial_states(&self.ctx).await {
            Ok(initial) => self.resync_node(client, &initial).await,
            Err(e) => warn!("Initial state fetch from node {} failed: {}", node, e),
        }
        match client.get_initial_call_state(&self.ctx).await {
            Ok(calls) => self.adopt_calls(node, calls).await,
            Err(e) => warn!("Initial call state fetch from node {} failed: {}", node, e),
        }
        self.reconsolidate().await;
    }

    /// Bring a node in line with the preferred state, or adopt its state on
    /// first start
    async fn resync_node(&self, client: &Arc<NodeClient>, initial: &InitialStates) {
        let node = client.node_id();
        let preferred = self.preferred().await;

        if preferred.acd_login == LoginStatus::Unknown {
            if initial.acd.login_status != LoginStatus::Unknown {
                let mut p = self.preferred.write().await;
                if p.acd_login == LoginStatus::Unknown {
                    info!("Adopting ACD state {:?} from node {}", initial.acd.login_status, node);
                    p.acd_login = initial.acd.login_status;
                    p.queues = initial.acd.queue_list.clone();
                    if initial.acd.is_logged_in() {
                        p.ready = Some(initial.acd.ready);
                        p.reason_code = initial.acd.reason_code.clone();
                        p.reason_desc = initial.acd.reason_desc.clone();
                    }
                }
            }
        } else {
            self.resync_acd(client, &preferred, &initial.acd).await;
        }

        if preferred.rg_login == LoginStatus::Unknown {
            if initial.rg.login_status != LoginStatus::Unknown {
                let mut p = self.preferred.write().await;
                if p.rg_login == LoginStatus::Unknown {
                    p.rg_login = initial.rg.login_status;
                    p.ring_groups = initial.rg.ring_groups.iter().cloned().collect();
                }
            }
        } else {
            let result = match (preferred.rg_login, initial.rg.login_status) {
                (LoginStatus::LoggedIn, s) if s != LoginStatus::LoggedIn => {
                    info!("Resync ring group login on node {}", node);
                    Some(client.rg_login(&self.ctx, &preferred.ring_groups).await)
                }
                (LoginStatus::LoggedOut, LoginStatus::LoggedIn) => {
                    info!("Resync ring group logout on node {}", node);
                    Some(client.rg_logout(&self.ctx, &[]).await)
                }
                _ => None,
            };
            if let Some(Err(e)) = result {
                warn!("Ring group resync on node {} failed: {}", node, e);
            }
        }
    }

    async fn resync_acd(
        &self,
        client: &Arc<NodeClient>,
        preferred: &PreferredState,
        reported: &AcdLoginState,
    ) {
        let node = client.node_id();
        let login = match (preferred.acd_login, reported.login_status) {
            (LoginStatus::LoggedIn, s) if s != LoginStatus::LoggedIn => {
                info!("Resync ACD login on node {}", node);
                Some(client.acd_login(&self.ctx, &preferred.queues).await)
            }
            (LoginStatus::LoggedOut, LoginStatus::LoggedIn) => {
                info!("Resync ACD logout on node {}", node);
                Some(client.acd_logout(&self.ctx, None).await)
            }
            _ => None,
        };
        let current = match login {
            Some(Ok(state)) => state,
            Some(Err(e)) => {
                warn!("ACD login resync on node {} failed: {}", node, e);
                return;
            }
            None => client.acd_state().await,
        };

        if preferred.acd_login != LoginStatus::LoggedIn || !current.is_logged_in() {
            return;
        }
        let result = match preferred.ready {
            Some(true) if !current.ready => {
                info!("Resync ready on node {}", node);
                Some(client.acd_ready(&self.ctx).await)
            }
            Some(false) if current.ready => {
                info!("Resync not ready on node {}", node);
                Some(
                    client
                        .acd_not_ready(
                            &self.ctx,
                            preferred.reason_code.as_deref(),
                            preferred.reason_desc.as_deref(),
                        )
                        .await,
                )
            }
            _ => None,
        };
        if let Some(Err(e)) = result {
            warn!("Readiness resync on node {} failed: {}", node, e);
        }
    }

    /// Create call records for node calls the call registry does not know
    async fn adopt_calls(&self, node: NodeId, calls: Vec<NodeCall>) {
        for call in calls {
            let keys: Vec<CallKey> = [
                call.ucid.clone().map(CallKey::UniqueCallId),
                call.remote_channel.clone().map(CallKey::RemoteChannel),
                call.local_channel.clone().map(CallKey::LocalChannel),
                call.css_id.clone().map(CallKey::CssId),
            ]
            .into_iter()
            .flatten()
            .collect();

            let mut known = false;
            for key in &keys {
                if self.calls.find(key).await.is_some() {
                    known = true;
                    break;
                }
            }
            if known {
                continue;
            }

            let record = self
                .calls
                .create(NewCall {
                    ucid: call.ucid,
                    remote_channel: call.remote_channel,
                    local_channel: call.local_channel,
                    css_id: call.css_id,
                    session_id: call.session_id,
                    node: Some(node),
                    state: call.state,
                    acd_routed: false,
                })
                .await;
            debug!("Adopted call {} from node {}", record.id, node);
        }
    }

    async fn on_node_down(&self, client: &Arc<NodeClient>) {
        let node = client.node_id();
        self.terminate_calls_on(node).await;
        client.reset_all_state().await;
        self.monitor.on_node_liveness(node, NodeLiveness::Down).await;
        self.reconsolidate().await;
    }

    /// Hang up and finish every call bound to `node`, each exactly once
    async fn terminate_calls_on(&self, node: NodeId) {
        let calls = self.calls.calls_on_node(node).await;
        if !calls.is_empty() {
            warn!("Node {} down, terminating {} calls", node, calls.len());
        }
        for call in calls {
            if let Some(session) = &call.session_id {
                if let Err(e) = self.sessions.hangup(session, node).await {
                    debug!("Graceful hangup of call {} failed: {}", call.id, e);
                }
            }
            if self.calls.finish(&call.id).await {
                self.bus
                    .publish(Notification::CallTerminatedByNodeDown { node, call: call.id });
            }
        }
    }

    /// Bind a fresh connection to `node` and start pumping its events
    ///
    /// The returned task ends when the connection closes.
    pub async fn attach_connection(
        self: &Arc<Self>,
        node: NodeId,
        connection: Connection,
    ) -> Result<JoinHandle<()>> {
        let client = self
            .node(node)
            .ok_or_else(|| VccError::not_found(format!("node {}", node)))?;

        let mux = ConnectionMultiplexer::new(node, connection.transport);
        let mut events = mux.subscribe_events(ALL_EVENTS);
        let (close_tx, mut close_rx) = mpsc::unbounded_channel();
        mux.set_close_sink(close_tx);
        mux.spawn(connection.inbound);
        client.attach(Arc::clone(&mux)).await;
        // A node already up has a stale or empty snapshot
        if client.liveness().await == NodeLiveness::Up {
            info!("Node {} connected while up, refreshing", node);
            self.refresh_node(&client).await;
        }
        self.set_keep_alive(node, KeepAlive::Up).await;

        let registry = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(event) = events.recv() => {
                        registry.handle_event(node, event).await;
                    }
                    notice = close_rx.recv() => {
                        let reason = notice.and_then(|n| n.reason);
                        info!("Node {} connection closed: {:?}", node, reason);
                        break;
                    }
                }
            }
            while let Ok(event) = events.try_recv() {
                registry.handle_event(node, event).await;
            }
            client.detach_if(&mux).await;
            registry.set_keep_alive(node, KeepAlive::Down).await;
        }))
    }

    /// Keep `endpoint` connected, backing off exponentially between attempts
    pub fn spawn_connection(
        self: &Arc<Self>,
        endpoint: NodeEndpoint,
        connector: Arc<dyn NodeConnector>,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let reconnect = self.config.reconnect.clone();
        tokio::spawn(async move {
            let mut delay = reconnect.initial_delay();
            loop {
                match connector.connect(&endpoint).await {
                    Ok(connection) => {
                        delay = reconnect.initial_delay();
                        match registry.attach_connection(endpoint.id, connection).await {
                            Ok(pump) => {
                                if let Err(e) = pump.await {
                                    error!("Event pump for node {} failed: {}", endpoint.id, e);
                                }
                            }
                            Err(e) => {
                                error!("Cannot attach node {}: {}", endpoint.id, e);
                                return;
                            }
                        }
                    }
                    Err(e) => warn!(
                        "Connect to node {} at {} failed: {}",
                        endpoint.id, endpoint.url, e
                    ),
                }
                debug!("Reconnecting to node {} in {:?}", endpoint.id, delay);
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(reconnect.max_delay());
            }
        })
    }

    /// Start a connection loop for every configured node
    pub fn start(self: &Arc<Self>, connector: Arc<dyn NodeConnector>) {
        for endpoint in &self.config.nodes {
            let handle = self.spawn_connection(endpoint.clone(), Arc::clone(&connector));
            if let Ok(mut tasks) = self.tasks.lock() {
                tasks.push(handle);
            }
        }
    }

    /// Stop reconnecting and close every node connection
    pub async fn shutdown(&self) {
        let handles = self
            .tasks
            .lock()
            .map(|mut t| std::mem::take(&mut *t))
            .unwrap_or_default();
        for handle in handles {
            handle.abort();
        }
        self.monitor.cancel().await;
        for node in self.nodes.values() {
            if let Some(mux) = node.connection().await {
                mux.close().await;
            }
        }
        info!("VCC registry for position {} shut down", self.ctx.position_id);
    }
}

#[async_trait::async_trait]
impl ClusterControl for NodeRegistry {
    async fn node_liveness_changed(&self, node: NodeId, liveness: NodeLiveness) {
        let Some(client) = self.nodes.get(&node) else {
            debug!("Liveness for unknown node {}", node);
            return;
        };
        // Only a real transition acts, so repeated reports never double-finish calls
        if client.set_liveness(liveness).await == liveness {
            return;
        }
        info!("Node {} is {}", node, liveness);
        self.bus
            .publish(Notification::NodeLivenessChanged { node, liveness });

        match liveness {
            NodeLiveness::Up => self.on_node_up(client).await,
            NodeLiveness::Down => self.on_node_down(client).await,
            NodeLiveness::Unknown => {}
        }
    }

    async fn acd_state_reported(&self, node: NodeId, state: AcdLoginState, forced_not_ready: bool) {
        let Some(client) = self.nodes.get(&node) else {
            return;
        };
        let reason_code = state.reason_code.clone();
        let reason_desc = state.reason_desc.clone();
        client.set_acd_state(state).await;

        if forced_not_ready {
            {
                let mut p = self.preferred.write().await;
                p.ready = Some(false);
                p.reason_code = reason_code.clone();
                p.reason_desc = reason_desc.clone();
            }

            let others: Vec<&Arc<NodeClient>> = self
                .nodes
                .values()
                .filter(|n| n.node_id() != node)
                .collect();
            let ctx = &self.ctx;
            let (code, desc) = (reason_code.as_deref(), reason_desc.as_deref());
            let results = join_all(others.iter().map(|other| async move {
                if other.liveness().await == NodeLiveness::Down {
                    return Ok(());
                }
                other.acd_not_ready(ctx, code, desc).await.map(drop)
            }))
            .await;
            for (other, result) in others.iter().zip(results) {
                if let Err(e) = result {
                    debug!("Propagating not ready to node {} failed: {}", other.node_id(), e);
                }
            }
        }

        self.reconsolidate().await;
    }

    async fn rg_state_reported(&self, node: NodeId, state: RgLoginState) {
        if let Some(client) = self.nodes.get(&node) {
            client.set_rg_state(state).await;
            self.reconsolidate().await;
        }
    }

    async fn dynamic_acd_reported(&self, node: NodeId, entries: Vec<DynamicAcdEntry>) {
        if let Some(client) = self.nodes.get(&node) {
            client.apply_dynamic_acd_update(entries).await;
            self.reconsolidate().await;
        }
    }

    async fn listen_join_terminated(&self, node: NodeId) {
        self.monitor.on_subscription_terminated(node).await;
    }
}
