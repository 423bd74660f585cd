//! In-process transport pair
//!
//! [`MemoryTransport`] is handed to a multiplexer like any other transport;
//! the matching [`MemoryPeer`] plays the node: it reads what the client sent,
//! injects inbound frames, can make sends fail, and can close the link.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

use super::{Transport, TransportError, TransportEvent, INBOUND_CHANNEL_CAPACITY};

pub struct MemoryTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::Sender<TransportEvent>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

pub struct MemoryPeer {
    sent: Mutex<mpsc::UnboundedReceiver<String>>,
    inbound: mpsc::Sender<TransportEvent>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MemoryTransport {
    /// Create a connected pair plus the inbound stream for the client side
    pub fn pair() -> (Arc<MemoryTransport>, MemoryPeer, mpsc::Receiver<TransportEvent>) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));

        let transport = Arc::new(MemoryTransport {
            outbound: out_tx,
            inbound: in_tx.clone(),
            fail_sends: Arc::clone(&fail_sends),
            closed: Arc::clone(&closed),
        });
        let peer = MemoryPeer {
            sent: Mutex::new(out_rx),
            inbound: in_tx,
            fail_sends,
            closed,
        };
        (transport, peer, in_rx)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("simulated send failure".to_string()));
        }
        self.outbound
            .send(text)
            .map_err(|_| TransportError::Send("peer dropped".to_string()))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inbound.send(TransportEvent::Closed(None)).await;
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl MemoryPeer {
    /// Next frame the client sent, or `None` once the client side is gone
    pub async fn recv_sent(&self) -> Option<String> {
        self.sent.lock().await.recv().await
    }

    /// Deliver a frame to the client as if the node had sent it
    pub async fn inject(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.inbound
            .send(TransportEvent::Message(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Close the link from the node side
    pub async fn close(&self, reason: Option<String>) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.inbound.send(TransportEvent::Closed(reason)).await;
        }
    }
}
