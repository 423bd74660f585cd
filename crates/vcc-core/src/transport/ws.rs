//! WebSocket transport to a VCC node

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, trace, warn};

use super::{
    Connection, NodeConnector, Transport, TransportError, TransportEvent,
    INBOUND_CHANNEL_CAPACITY,
};
use crate::config::NodeEndpoint;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection carrying envelope JSON as text frames
pub struct WsTransport {
    url: String,
    writer: Mutex<SplitSink<WsStream, WsMessage>>,
    closed: AtomicBool,
}

impl WsTransport {
    /// Connect and start the reader task
    ///
    /// The returned receiver yields every text frame and, last, a
    /// [`TransportEvent::Closed`] when the socket goes away.
    pub async fn connect(
        url: &str,
    ) -> Result<(Arc<Self>, mpsc::Receiver<TransportEvent>), TransportError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", url, e)))?;
        let (writer, mut reader) = ws.split();
        let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let transport = Arc::new(Self {
            url: url.to_string(),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        });
        info!("Connected to node at {}", url);

        let reader_transport = Arc::clone(&transport);
        tokio::spawn(async move {
            let mut reason = None;
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        trace!("Received frame from {}", reader_transport.url);
                        if tx.send(TransportEvent::Message(text)).await.is_err() {
                            debug!("Inbound receiver for {} dropped", reader_transport.url);
                            break;
                        }
                    }
                    Ok(WsMessage::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => {
                            if tx.send(TransportEvent::Message(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(_) => warn!("Dropping non UTF-8 frame from {}", reader_transport.url),
                    },
                    Ok(WsMessage::Ping(data)) => {
                        let mut writer = reader_transport.writer.lock().await;
                        let _ = writer.send(WsMessage::Pong(data)).await;
                    }
                    Ok(WsMessage::Close(frame)) => {
                        info!("Node at {} closed connection: {:?}", reader_transport.url, frame);
                        reason = frame.map(|f| f.reason.to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket error from {}: {}", reader_transport.url, e);
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }
            reader_transport.closed.store(true, Ordering::SeqCst);
            let _ = tx.send(TransportEvent::Closed(reason)).await;
        });

        Ok((transport, rx))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, text: String) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut writer = self.writer.lock().await;
        writer.send(WsMessage::Text(text)).await.map_err(|e| {
            self.closed.store(true, Ordering::SeqCst);
            TransportError::Send(e.to_string())
        })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut writer = self.writer.lock().await;
        let _ = writer.send(WsMessage::Close(None)).await;
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Connector that opens a [`WsTransport`] to the endpoint URL
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl NodeConnector for WsConnector {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<Connection, TransportError> {
        let (transport, inbound) = WsTransport::connect(&endpoint.url).await?;
        Ok(Connection {
            transport,
            inbound,
        })
    }
}
