//! WebSocket peer transport.
//!
//! Every peer listens on a TCP socket and registers its endpoint name in a
//! [`Directory`]. Dialing a peer means resolving its name and opening
//! `ws://<addr>/<target>?from=<own endpoint>`; the acceptor checks the path
//! names itself and takes `from` as the remote identity.
//!
//! ```text
//!            ┌──────── reader task ────────┐
//!  socket ──►│ text frame → WireMessage    │──► TransportEvent (mpsc)
//!            └─────────────────────────────┘
//!            ┌──────── writer task ────────┐
//!  socket ◄──│ String ◄── unbounded queue  │◄── ConnectionHandle::send
//!            └─────────────────────────────┘
//! ```
//!
//! One writer per connection drains its queue in order, so a connection
//! preserves send order. Dropping every clone of a [`ConnectionHandle`]
//! closes the connection.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::directory::{Directory, DirectoryError};
use crate::protocol::{ProtocolError, WireMessage};

/// Per-connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),
    #[error("No peer registered as {0}")]
    UnknownEndpoint(String),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Events delivered to the single loop that owns the graph.
#[derive(Debug)]
pub enum TransportEvent {
    /// A connection finished its handshake (either direction).
    Opened(ConnectionHandle),
    Message {
        connection: u64,
        peer: String,
        message: WireMessage,
    },
    Closed {
        connection: u64,
        peer: String,
    },
    /// An outbound dial failed before the connection opened.
    Failed {
        peer: Option<String>,
        error: String,
    },
}

/// Outbound half of an open connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    peer: String,
    outgoing: mpsc::UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new(id: u64, peer: impl Into<String>, outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id,
            peer: peer.into(),
            outgoing,
        }
    }

    /// Transport-unique connection number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote endpoint name.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queue a text frame. Returns false once the writer has gone away.
    pub fn send(&self, text: String) -> bool {
        self.outgoing.send(text).is_ok()
    }

    pub fn is_open(&self) -> bool {
        !self.outgoing.is_closed()
    }
}

/// A listening endpoint plus the ability to dial other endpoints.
pub struct PeerTransport {
    endpoint: String,
    local_addr: SocketAddr,
    directory: Arc<dyn Directory>,
    events: mpsc::UnboundedSender<TransportEvent>,
    next_id: Arc<AtomicU64>,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for PeerTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerTransport")
            .field("endpoint", &self.endpoint)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl PeerTransport {
    /// Bind `bind_addr`, register `endpoint` in the directory and start
    /// accepting connections.
    pub async fn bind(
        endpoint: impl Into<String>,
        bind_addr: &str,
        directory: Arc<dyn Directory>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;
        directory.register(&endpoint, local_addr)?;
        log::info!("Endpoint {endpoint} listening on {local_addr}");

        let next_id = Arc::new(AtomicU64::new(1));
        let accept_task = tokio::spawn(accept_loop(
            listener,
            endpoint.clone(),
            events.clone(),
            next_id.clone(),
        ));

        Ok(Self {
            endpoint,
            local_addr,
            directory,
            events,
            next_id,
            accept_task,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dial a registered endpoint. On success an `Opened` event follows on
    /// the event channel.
    pub async fn connect(&self, target: &str) -> Result<(), TransportError> {
        connect_to(
            self.directory.as_ref(),
            &self.endpoint,
            target,
            self.events.clone(),
            &self.next_id,
        )
        .await
    }

    /// Dial in the background. The outcome arrives as an `Opened` or a
    /// `Failed` event.
    pub fn dial(&self, target: &str) {
        let directory = self.directory.clone();
        let endpoint = self.endpoint.clone();
        let events = self.events.clone();
        let next_id = self.next_id.clone();
        let target = target.to_string();
        tokio::spawn(async move {
            let result =
                connect_to(directory.as_ref(), &endpoint, &target, events.clone(), &next_id).await;
            if let Err(e) = result {
                log::warn!("Dial to {target} failed: {e}");
                let _ = events.send(TransportEvent::Failed {
                    peer: Some(target),
                    error: e.to_string(),
                });
            }
        });
    }
}

async fn connect_to(
    directory: &dyn Directory,
    endpoint: &str,
    target: &str,
    events: mpsc::UnboundedSender<TransportEvent>,
    next_id: &AtomicU64,
) -> Result<(), TransportError> {
    let addr = directory
        .resolve(target)
        .ok_or_else(|| TransportError::UnknownEndpoint(target.to_string()))?;
    let url = format!("ws://{addr}/{target}?from={endpoint}");
    log::debug!("Dialing {url}");

    let (ws, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    let id = next_id.fetch_add(1, Ordering::Relaxed);
    log::info!("Connected to {target} at {addr}");
    spawn_connection(ws, id, target.to_string(), events);
    Ok(())
}

impl Drop for PeerTransport {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.directory.unregister(&self.endpoint);
    }
}

async fn accept_loop(
    listener: TcpListener,
    endpoint: String,
    events: mpsc::UnboundedSender<TransportEvent>,
    next_id: Arc<AtomicU64>,
) {
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::error!("Accept failed on {endpoint}: {e}");
                break;
            }
        };
        log::debug!("New TCP connection from {addr}");

        let endpoint = endpoint.clone();
        let events = events.clone();
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(async move {
            match handshake(stream, addr, &endpoint).await {
                Ok((ws, peer)) => {
                    log::info!("Accepted {peer} from {addr}");
                    spawn_connection(ws, id, peer, events);
                }
                Err(e) => log::warn!("Rejected connection from {addr}: {e}"),
            }
        });
    }
}

/// Accept the WebSocket upgrade if the request path names `endpoint`.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    endpoint: &str,
) -> Result<(WebSocketStream<TcpStream>, String), TransportError> {
    let expected = format!("/{endpoint}");
    let mut from: Option<String> = None;

    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        let path = req.uri().path();
        if path != expected {
            let mut err = ErrorResponse::new(Some(format!("no endpoint at {path}")));
            *err.status_mut() = StatusCode::NOT_FOUND;
            return Err(err);
        }
        from = req.uri().query().and_then(query_from);
        Ok(resp)
    })
    .await?;

    let peer = from.unwrap_or_else(|| format!("anonymous-{addr}"));
    Ok((ws, peer))
}

fn query_from(query: &str) -> Option<String> {
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("from="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn spawn_connection<S>(
    ws: WebSocketStream<S>,
    id: u64,
    peer: String,
    events: mpsc::UnboundedSender<TransportEvent>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

    if events
        .send(TransportEvent::Opened(ConnectionHandle::new(id, peer.clone(), out_tx)))
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match WireMessage::decode(text.as_str()) {
                    Ok(message) => {
                        log::trace!("{peer} -> {}", message.kind());
                        let event = TransportEvent::Message {
                            connection: id,
                            peer: peer.clone(),
                            message,
                        };
                        if events.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("Dropping frame from {peer}: {e}"),
                },
                Ok(Message::Binary(data)) => {
                    log::warn!("Dropping frame from {peer}: {}", ProtocolError::UnexpectedBinary(data.len()));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    log::debug!("Connection to {peer} ended: {e}");
                    break;
                }
            }
        }
        writer.abort();
        log::info!("Connection to {peer} closed");
        let _ = events.send(TransportEvent::Closed {
            connection: id,
            peer,
        });
    });
}
