//! Vehicle shadow WebSocket server implementation.
//!
//! This module provides the WebSocket server that handles:
//! - Client connections on the stream endpoint
//! - Hello message on connect
//! - Request/response dispatch through a [`ClientSession`]
//! - Forwarding subscription notifications

use std::net::SocketAddr;
use std::sync::Arc;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use shadow_core::SignalStore;
use shadow_protocol::{
    decode_client_message, encode_server_message, salvage_request_id, CodecError, ErrorBody,
    HelloMessage, Response as RpcResponse, ServerMessage,
};

use crate::session::ClientSession;

/// WebSocket path clients connect to.
pub const STREAM_PATH: &str = "/vehicle-shadow/v1/stream";

/// Messages a connection may have waiting from its delivery tasks.
const OUTBOUND_CAPACITY: usize = 256;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Configuration for the vehicle shadow server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server name sent in Hello message.
    pub name: String,
    /// Server version sent in Hello message.
    pub version: String,
    /// Address to bind to.
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "vehicle-shadow".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
        }
    }
}

/// The vehicle shadow WebSocket server.
pub struct ShadowServer {
    config: ServerConfig,
    store: Arc<SignalStore>,
}

impl ShadowServer {
    /// Create a server in front of an existing store.
    pub fn new(config: ServerConfig, store: Arc<SignalStore>) -> Self {
        Self { config, store }
    }

    /// The store this server serves.
    pub fn store(&self) -> Arc<SignalStore> {
        Arc::clone(&self.store)
    }

    /// Run the server, listening for WebSocket connections.
    pub async fn run(self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Vehicle shadow server listening on {}", self.config.bind_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let config = self.config.clone();
                    let store = Arc::clone(&self.store);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, config, store).await {
                            error!("Connection error from {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    config: ServerConfig,
    store: Arc<SignalStore>,
) -> Result<(), BoxError> {
    info!("New connection from {}", addr);

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, check_stream_path).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let hello = HelloMessage::new(&config.name, &config.version);
    send(&mut ws_tx, &ServerMessage::Hello(hello)).await?;
    debug!("Sent Hello to {}", addr);

    let (out_tx, mut out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    // Dropped when this function returns, which releases the connection's
    // subscriptions and locks.
    let mut session = ClientSession::new(store, out_tx);

    loop {
        tokio::select! {
            // Handle incoming requests from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_client_message(&text, &mut session);
                        send(&mut ws_tx, &ServerMessage::Response(response)).await?;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        let response = RpcResponse::error(None, protocol_error(CodecError::BinaryFrame));
                        send(&mut ws_tx, &ServerMessage::Response(response)).await?;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} closed connection", addr);
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        ws_tx.send(Message::Pong(data)).await?;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    _ => {} // Ignore other message types
                }
            }

            // Forward notifications from this connection's subscriptions
            Some(msg) = out_rx.recv() => {
                if session.accepts(&msg) {
                    if let Err(e) = send(&mut ws_tx, &msg).await {
                        error!("Failed to send notification to {}: {}", addr, e);
                        break;
                    }
                }
            }
        }
    }

    debug!(
        "Closing session for {} ({} subscription(s), {} lock(s))",
        addr,
        session.subscription_count(),
        session.lock_count()
    );
    Ok(())
}

/// Decode and run one request. Undecodable requests get an error reply.
fn handle_client_message(text: &str, session: &mut ClientSession) -> RpcResponse {
    match decode_client_message(text) {
        Ok(msg) => session.handle(msg),
        Err(e) => {
            warn!("Malformed request: {}", e);
            RpcResponse::error(salvage_request_id(text), protocol_error(e))
        }
    }
}

fn protocol_error(e: CodecError) -> ErrorBody {
    ErrorBody {
        code: shadow_core::ErrorCode::InvalidRequest,
        message: e.to_string(),
    }
}

async fn send(ws_tx: &mut WsSink, msg: &ServerMessage) -> Result<(), BoxError> {
    let text = encode_server_message(msg)?;
    ws_tx.send(Message::Text(text)).await?;
    Ok(())
}

/// Handshake callback: only the stream endpoint is served.
fn check_stream_path(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    if req.uri().path() == STREAM_PATH {
        return Ok(resp);
    }
    debug!("Rejected WebSocket upgrade on {}", req.uri().path());
    let mut rejection = ErrorResponse::new(Some(format!("Use {}", STREAM_PATH)));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}
