//! # Connection Multiplexer
//!
//! Owns one transport connection to one node. Outbound requests get a
//! monotonic id and a pending entry with a timer; inbound responses are
//! matched to pending entries by id, events fan out to listeners by path, and
//! control traffic goes to a single control sink.
//!
//! ## Delivery guarantees
//!
//! For every [`ConnectionMultiplexer::request`] exactly one of response,
//! timeout error, or send/connection error reaches the caller, and the pending
//! table never keeps the entry afterwards. A response whose id is no longer
//! pending (late or duplicate) is dropped without any visible effect.
//!
//! The multiplexer never reconnects; the close notification is forwarded and
//! the owner decides what to do.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, VccError};
use crate::transport::{Transport, TransportEvent};
use crate::types::NodeId;
use crate::wire::paths::{CTRL_PING, CTRL_PONG};
use crate::wire::{Control, Event, Method, Payload, Request, Response, WireMessage};

/// Listener key that receives every event regardless of path
pub const ALL_EVENTS: &str = "*";

const RESPONSE_OBSERVER_CAPACITY: usize = 256;

/// An outbound request before it has been assigned an id
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    /// Caller-supplied id; `None` takes the next id from the connection counter
    pub id: Option<u64>,
    pub method: Method,
    pub path: String,
    pub query: Option<Value>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: None,
            method,
            path: path.into(),
            query: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Forwarded when the underlying transport closes
#[derive(Debug, Clone, PartialEq)]
pub struct CloseNotice {
    pub node: NodeId,
    pub reason: Option<String>,
}

struct PendingRequest {
    token: u64,
    path: String,
    tx: oneshot::Sender<Response>,
}

/// Removes the pending entry when the awaiting request future ends for any
/// reason, including being dropped mid-flight
struct PendingGuard<'a> {
    pending: &'a DashMap<u64, PendingRequest>,
    id: u64,
    token: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let token = self.token;
        self.pending.remove_if(&self.id, |_, p| p.token == token);
    }
}

pub struct ConnectionMultiplexer {
    node_id: NodeId,
    transport: Arc<dyn Transport>,
    next_id: AtomicU64,
    next_token: AtomicU64,
    pending: DashMap<u64, PendingRequest>,
    event_listeners: DashMap<String, Vec<mpsc::UnboundedSender<Event>>>,
    control_sink: RwLock<Option<mpsc::UnboundedSender<Control>>>,
    close_sink: RwLock<Option<mpsc::UnboundedSender<CloseNotice>>>,
    responses: broadcast::Sender<Response>,
    malformed: AtomicU64,
    closed: AtomicBool,
}

impl ConnectionMultiplexer {
    pub fn new(node_id: NodeId, transport: Arc<dyn Transport>) -> Arc<Self> {
        let (responses, _) = broadcast::channel(RESPONSE_OBSERVER_CAPACITY);
        Arc::new(Self {
            node_id,
            transport,
            next_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            pending: DashMap::new(),
            event_listeners: DashMap::new(),
            control_sink: RwLock::new(None),
            close_sink: RwLock::new(None),
            responses,
            malformed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Start the reader task that classifies inbound frames
    pub fn spawn(self: &Arc<Self>, mut inbound: mpsc::Receiver<TransportEvent>) -> JoinHandle<()> {
        let mux = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                match event {
                    TransportEvent::Message(text) => mux.handle_incoming(&text).await,
                    TransportEvent::Closed(reason) => {
                        mux.handle_closed(reason);
                        return;
                    }
                }
            }
            mux.handle_closed(Some("inbound stream ended".to_string()));
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of inbound frames dropped as malformed
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Register a listener for one event path, or [`ALL_EVENTS`]
    pub fn subscribe_events(&self, path: &str) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.event_listeners
            .entry(path.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Replace the control sink
    pub fn set_control_sink(&self, sink: mpsc::UnboundedSender<Control>) {
        if let Ok(mut slot) = self.control_sink.write() {
            *slot = Some(sink);
        }
    }

    /// Replace the close sink
    pub fn set_close_sink(&self, sink: mpsc::UnboundedSender<CloseNotice>) {
        if let Ok(mut slot) = self.close_sink.write() {
            *slot = Some(sink);
        }
    }

    /// Observe every response that matched a pending request
    pub fn subscribe_responses(&self) -> broadcast::Receiver<Response> {
        self.responses.subscribe()
    }

    /// Encode and transmit one message
    pub async fn send(&self, message: WireMessage) -> Result<()> {
        let text = message.encode()?;
        self.transport
            .send(text)
            .await
            .map_err(|e| VccError::SendFailed {
                node: self.node_id,
                reason: e.to_string(),
            })
    }

    pub async fn send_control(&self, control: Control) -> Result<()> {
        self.send(WireMessage::control(Some(self.node_id), control))
            .await
    }

    /// Issue a request and wait for its response, its timeout, or a failure
    pub async fn request(&self, spec: RequestSpec, timeout: Duration) -> Result<Response> {
        if self.is_closed() {
            return Err(VccError::ConnectionLost(self.node_id));
        }

        let id = spec.id.unwrap_or_else(|| self.next_request_id());
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        match self.pending.entry(id) {
            Entry::Occupied(_) => {
                return Err(VccError::internal(format!(
                    "request id {} already pending on node {}",
                    id, self.node_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    token,
                    path: spec.path.clone(),
                    tx,
                });
            }
        }
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
            token,
        };

        let path = spec.path.clone();
        let request = Request {
            id,
            method: spec.method,
            path: spec.path,
            query: spec.query,
            body: spec.body,
        };
        trace!("Node {} -> {} {} (id {})", self.node_id, request.method, request.path, id);
        self.send(WireMessage::request(Some(self.node_id), request))
            .await?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(VccError::ConnectionLost(self.node_id)),
            Err(_) => {
                warn!("Request {} {} to node {} timed out", id, path, self.node_id);
                Err(VccError::Timeout {
                    node: self.node_id,
                    path,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Classify and dispatch one inbound frame; malformed frames are dropped
    pub async fn handle_incoming(&self, text: &str) {
        let message = match WireMessage::decode(text) {
            Ok(m) => m,
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping malformed message from node {}: {}", self.node_id, e);
                return;
            }
        };

        match message.payload {
            Payload::Response(response) => self.complete(response),
            Payload::Event(event) => self.dispatch_event(event),
            Payload::Control(control) => self.dispatch_control(control).await,
            Payload::Request(request) => {
                debug!(
                    "Ignoring request {} {} sent by node {}",
                    request.method, request.path, self.node_id
                );
            }
        }
    }

    fn complete(&self, response: Response) {
        match self.pending.remove(&response.id) {
            Some((_, pending)) => {
                trace!(
                    "Node {} <- {} {} for {}",
                    self.node_id,
                    response.status,
                    response.reason,
                    pending.path
                );
                let _ = self.responses.send(response.clone());
                let _ = pending.tx.send(response);
            }
            None => {
                debug!(
                    "Discarding response {} from node {} with no pending request",
                    response.id, self.node_id
                );
            }
        }
    }

    fn dispatch_event(&self, event: Event) {
        let mut delivered = 0usize;
        for key in [event.path.as_str(), ALL_EVENTS] {
            if let Some(mut listeners) = self.event_listeners.get_mut(key) {
                listeners.retain(|tx| tx.send(event.clone()).is_ok());
                delivered += listeners.len();
            }
        }
        if delivered == 0 {
            debug!("No listener for event {} from node {}", event.path, self.node_id);
        }
    }

    async fn dispatch_control(&self, control: Control) {
        if control.path == CTRL_PING {
            let pong = Control {
                path: CTRL_PONG.to_string(),
                query: None,
                body: control.body.clone(),
            };
            if let Err(e) = self.send_control(pong).await {
                warn!("Failed to answer ping from node {}: {}", self.node_id, e);
            }
        }

        let sink = self.control_sink.read().ok().and_then(|slot| slot.clone());
        match sink {
            Some(tx) => {
                let _ = tx.send(control);
            }
            None => trace!("No control sink on node {}", self.node_id),
        }
    }

    /// Fail everything in flight and forward the close notification
    pub fn handle_closed(&self, reason: Option<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Connection to node {} closed: {:?}", self.node_id, reason);

        // Dropping the senders wakes every waiter with ConnectionLost
        self.pending.clear();

        let sink = self.close_sink.read().ok().and_then(|slot| slot.clone());
        if let Some(tx) = sink {
            let _ = tx.send(CloseNotice {
                node: self.node_id,
                reason,
            });
        }
    }

    pub async fn close(&self) {
        self.transport.close().await;
        self.handle_closed(Some("closed locally".to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn sent_request_id(text: &str) -> u64 {
        match WireMessage::decode(text).unwrap().payload {
            Payload::Request(r) => r.id,
            other => panic!("expected request, got {:?}", other),
        }
    }

    fn response_frame(id: u64, status: u16, reason: &str) -> String {
        WireMessage::response(
            Some(NodeId(1)),
            Response {
                id,
                status,
                reason: reason.to_string(),
                body: Some(json!({"ok": true})),
            },
        )
        .encode()
        .unwrap()
    }

    #[tokio::test]
    async fn test_request_matches_response_by_id() {
        let (transport, peer, inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);
        mux.spawn(inbound);

        let caller = {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move {
                mux.request(RequestSpec::get("/acd/state"), Duration::from_secs(1))
                    .await
            })
        };

        let sent = peer.recv_sent().await.unwrap();
        let id = sent_request_id(&sent);
        assert_eq!(id, 1);
        peer.inject(response_frame(id, 200, "OK")).await.unwrap();

        let response = caller.await.unwrap().unwrap();
        assert_eq!(response.id, 1);
        assert_eq!(response.status, 200);
        assert_eq!(mux.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_and_caller_id_is_kept() {
        let (transport, peer, _inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);
        let short = Duration::from_millis(20);

        let _ = mux.request(RequestSpec::get("/a"), short).await;
        let _ = mux.request(RequestSpec::get("/b"), short).await;
        let _ = mux.request(RequestSpec::get("/c").with_id(500), short).await;

        assert_eq!(sent_request_id(&peer.recv_sent().await.unwrap()), 1);
        assert_eq!(sent_request_id(&peer.recv_sent().await.unwrap()), 2);
        assert_eq!(sent_request_id(&peer.recv_sent().await.unwrap()), 500);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_and_late_response_is_noop() {
        let (transport, peer, inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);
        mux.spawn(inbound);
        let mut observer = mux.subscribe_responses();

        let result = mux
            .request(RequestSpec::get("/slow"), Duration::from_millis(30))
            .await;
        assert!(matches!(result, Err(VccError::Timeout { .. })));
        assert_eq!(mux.pending_count(), 0);

        let id = sent_request_id(&peer.recv_sent().await.unwrap());
        peer.inject(response_frame(id, 200, "OK")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(mux.pending_count(), 0);
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_failure_surfaces_immediately() {
        let (transport, peer, _inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(4), transport);
        peer.fail_sends(true);

        let started = std::time::Instant::now();
        let result = mux
            .request(RequestSpec::put("/acd/login"), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(VccError::SendFailed { node: NodeId(4), .. })));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(mux.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_future_leaves_no_entry() {
        let (transport, _peer, _inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);

        let fut = mux.request(RequestSpec::get("/x"), Duration::from_secs(10));
        let _ = tokio::time::timeout(Duration::from_millis(10), fut).await;
        assert_eq!(mux.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_pending_requests() {
        let (transport, peer, inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(2), transport);
        let (close_tx, mut close_rx) = mpsc::unbounded_channel();
        mux.set_close_sink(close_tx);
        mux.spawn(inbound);

        let caller = {
            let mux = Arc::clone(&mux);
            tokio::spawn(async move {
                mux.request(RequestSpec::get("/x"), Duration::from_secs(5)).await
            })
        };
        let _ = peer.recv_sent().await;
        peer.close(Some("node restart".into())).await;

        assert!(matches!(
            caller.await.unwrap(),
            Err(VccError::ConnectionLost(NodeId(2)))
        ));
        let notice = close_rx.recv().await.unwrap();
        assert_eq!(notice.node, NodeId(2));
        assert_eq!(notice.reason.as_deref(), Some("node restart"));
        assert!(mux.is_closed());
    }

    #[tokio::test]
    async fn test_events_fan_out_by_path_and_wildcard() {
        let (transport, _peer, _inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);
        let mut acd = mux.subscribe_events("acdStatus");
        let mut all = mux.subscribe_events(ALL_EVENTS);

        mux.handle_incoming(r#"{"node":1,"event":["acdStatus",null,{"status":"LoggedOn"}]}"#)
            .await;
        mux.handle_incoming(r#"{"node":1,"event":["park",null,null]}"#)
            .await;

        assert_eq!(acd.recv().await.unwrap().path, "acdStatus");
        assert!(acd.try_recv().is_err());
        assert_eq!(all.recv().await.unwrap().path, "acdStatus");
        assert_eq!(all.recv().await.unwrap().path, "park");
    }

    #[tokio::test]
    async fn test_malformed_frames_are_counted_and_dropped() {
        let (transport, _peer, _inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);
        let mut all = mux.subscribe_events(ALL_EVENTS);

        mux.handle_incoming("not json").await;
        mux.handle_incoming(r#"{"event":["x",null]}"#).await;
        mux.handle_incoming(r#"{"mystery":[1]}"#).await;

        assert_eq!(mux.malformed_count(), 3);
        assert!(all.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_is_answered_and_forwarded() {
        let (transport, peer, _inbound) = MemoryTransport::pair();
        let mux = ConnectionMultiplexer::new(NodeId(1), transport);
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();
        mux.set_control_sink(control_tx);

        mux.handle_incoming(r#"{"control":["ping",null,{"seq":9}]}"#).await;

        let pong = WireMessage::decode(&peer.recv_sent().await.unwrap()).unwrap();
        match pong.payload {
            Payload::Control(c) => {
                assert_eq!(c.path, "pong");
                assert_eq!(c.body, Some(json!({"seq": 9})));
            }
            other => panic!("expected control, got {:?}", other),
        }
        assert_eq!(control_rx.recv().await.unwrap().path, "ping");
    }
}
