//! Shared helpers for the integration tests
//!
//! A [`FakeNode`] plays one cluster node on the far side of an in-memory
//! transport. It answers requests from a script and can push events.

#![allow(dead_code)]

use async_trait::async_trait;
use rvoip_vcc_core::call_registry::{InMemoryCallRegistry, SessionLayer};
use rvoip_vcc_core::config::{NodeEndpoint, TimeoutConfig, VccConfig};
use rvoip_vcc_core::multiplexer::ConnectionMultiplexer;
use rvoip_vcc_core::node::NodeClient;
use rvoip_vcc_core::registry::NodeRegistry;
use rvoip_vcc_core::router::ClusterControl;
use rvoip_vcc_core::transport::{Connection, MemoryPeer, MemoryTransport};
use rvoip_vcc_core::wire::{paths, Event, Payload, Request, Response, WireMessage};
use rvoip_vcc_core::{NodeId, NodeLiveness, PositionContext, Result};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const POSITION: &str = "p1";
pub const AGENT: &str = "1001";
pub const DEVICE: &str = "SIP/3001";

/// How a fake node answers one request
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Option<Value>),
    Status(u16, &'static str),
    Silent,
}

pub type Script = Arc<dyn Fn(&Request) -> Reply + Send + Sync>;

/// Answers state queries with a logged-out agent and an empty call list
pub fn default_reply(request: &Request) -> Reply {
    match request.path.as_str() {
        paths::ACD_STATE => Reply::Ok(Some(json!({"status": "LoggedOff"}))),
        paths::RG_STATE => Reply::Ok(Some(json!({"status": "LoggedOff"}))),
        paths::CALLS => Reply::Ok(Some(json!({"calls": []}))),
        _ => Reply::Ok(None),
    }
}

/// Script that overrides one path and falls back to [`default_reply`]
pub fn reply_on(path: &'static str, reply: Reply) -> Script {
    Arc::new(move |request: &Request| {
        if request.path == path {
            reply.clone()
        } else {
            default_reply(request)
        }
    })
}

pub fn default_script() -> Script {
    Arc::new(default_reply)
}

pub struct FakeNode {
    pub id: NodeId,
    peer: Arc<MemoryPeer>,
    requests: Arc<Mutex<Vec<Request>>>,
    task: JoinHandle<()>,
}

impl FakeNode {
    /// Start a node answering per `script`; the returned connection is the
    /// position side
    pub fn start(id: NodeId, script: Script) -> (FakeNode, Connection) {
        let (transport, peer, inbound) = MemoryTransport::pair();
        let peer = Arc::new(peer);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let peer = Arc::clone(&peer);
            let requests = Arc::clone(&requests);
            tokio::spawn(async move {
                while let Some(text) = peer.recv_sent().await {
                    let Ok(message) = WireMessage::decode(&text) else {
                        continue;
                    };
                    let Payload::Request(request) = message.payload else {
                        continue;
                    };
                    requests.lock().unwrap().push(request.clone());

                    let (status, reason, body) = match script(&request) {
                        Reply::Ok(body) => (200, "OK", body),
                        Reply::Status(status, reason) => (status, reason, None),
                        Reply::Silent => continue,
                    };
                    let response = WireMessage::response(
                        Some(id),
                        Response {
                            id: request.id,
                            status,
                            reason: reason.to_string(),
                            body,
                        },
                    );
                    let _ = peer.inject(response.encode().unwrap()).await;
                }
            })
        };

        let connection = Connection {
            transport,
            inbound,
        };
        (
            FakeNode {
                id,
                peer,
                requests,
                task,
            },
            connection,
        )
    }

    /// Push an event frame to the position
    pub async fn emit(&self, path: &str, body: Value) {
        let event = WireMessage::event(
            Some(self.id),
            Event {
                path: path.to_string(),
                query: None,
                body: Some(body),
            },
        );
        self.peer.inject(event.encode().unwrap()).await.unwrap();
    }

    pub async fn close(&self, reason: &str) {
        self.peer.close(Some(reason.to_string())).await;
    }

    /// Paths of every request received so far
    pub fn paths(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.path.clone())
            .collect()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Request> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Session layer that only records what it was asked to do
#[derive(Default)]
pub struct RecordingSessions {
    pub hangups: Mutex<Vec<(String, NodeId)>>,
    pub infos: Mutex<Vec<(String, NodeId, String, String)>>,
}

impl RecordingSessions {
    pub fn hangups(&self) -> Vec<(String, NodeId)> {
        self.hangups.lock().unwrap().clone()
    }

    pub fn infos(&self) -> Vec<(String, NodeId, String, String)> {
        self.infos.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionLayer for RecordingSessions {
    async fn hangup(&self, session_id: &str, node: NodeId) -> Result<()> {
        self.hangups
            .lock()
            .unwrap()
            .push((session_id.to_string(), node));
        Ok(())
    }

    async fn answer(&self, _session_id: &str, _node: NodeId) -> Result<()> {
        Ok(())
    }

    async fn hold(&self, _session_id: &str, _node: NodeId) -> Result<()> {
        Ok(())
    }

    async fn send_info(
        &self,
        session_id: &str,
        node: NodeId,
        content_type: &str,
        body: &str,
    ) -> Result<()> {
        self.infos.lock().unwrap().push((
            session_id.to_string(),
            node,
            content_type.to_string(),
            body.to_string(),
        ));
        Ok(())
    }
}

pub fn context() -> PositionContext {
    PositionContext::new(POSITION, AGENT, DEVICE)
}

pub fn short_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        request_ms: 500,
        conference_ms: 500,
        listen_join_subscribe_ms: 200,
        park_grace_ms: 2000,
    }
}

pub fn config(node_ids: &[u32]) -> VccConfig {
    let mut config = VccConfig::default();
    config.position.position_id = POSITION.to_string();
    config.position.agent_id = AGENT.to_string();
    config.position.device_id = DEVICE.to_string();
    config.timeouts = short_timeouts();
    config.nodes = node_ids
        .iter()
        .map(|id| NodeEndpoint {
            id: NodeId(*id),
            url: format!("ws://node-{}.test/vcc", id),
        })
        .collect();
    config
}

/// Bind a standalone node client to a fake node
pub async fn connected_client(id: u32, script: Script) -> (Arc<NodeClient>, FakeNode) {
    let node_id = NodeId(id);
    let (fake, connection) = FakeNode::start(node_id, script);
    let client = Arc::new(NodeClient::new(node_id, short_timeouts()));
    let mux = ConnectionMultiplexer::new(node_id, connection.transport);
    mux.spawn(connection.inbound);
    client.attach(mux).await;
    (client, fake)
}

/// Poll `check` until it holds or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// A registry plus its collaborators and the fake nodes behind it
pub struct Harness {
    pub registry: Arc<NodeRegistry>,
    pub calls: Arc<InMemoryCallRegistry>,
    pub sessions: Arc<RecordingSessions>,
    pub fakes: Vec<FakeNode>,
}

impl Harness {
    /// Build a registry over `node_ids` without connecting anything
    pub fn new(node_ids: &[u32]) -> Harness {
        let calls = Arc::new(InMemoryCallRegistry::new());
        let sessions = Arc::new(RecordingSessions::default());
        let registry =
            NodeRegistry::new(config(node_ids), calls.clone(), sessions.clone()).unwrap();
        Harness {
            registry,
            calls,
            sessions,
            fakes: Vec::new(),
        }
    }

    /// Connect a fake node and report it up
    pub async fn bring_up(&mut self, id: u32, script: Script) {
        self.connect(id, script).await;
        self.report_up(id).await;
    }

    /// Attach a fresh fake node, replacing any earlier one with the same id
    pub async fn connect(&mut self, id: u32, script: Script) {
        let (fake, connection) = FakeNode::start(NodeId(id), script);
        self.registry
            .attach_connection(NodeId(id), connection)
            .await
            .unwrap();
        self.fakes.retain(|f| f.id != NodeId(id));
        self.fakes.push(fake);
    }

    pub async fn report_up(&self, id: u32) {
        self.registry
            .node_liveness_changed(NodeId(id), NodeLiveness::Up)
            .await;
    }

    pub async fn bring_down(&self, id: u32) {
        self.registry
            .node_liveness_changed(NodeId(id), NodeLiveness::Down)
            .await;
    }

    pub fn fake(&self, id: u32) -> &FakeNode {
        self.fakes
            .iter()
            .find(|f| f.id == NodeId(id))
            .unwrap()
    }
}
