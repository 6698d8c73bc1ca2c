//! WebSocket listener using tokio-tungstenite.
//!
//! Accepts connections, records the upgrade path to choose the wire format
//! (`/ws` speaks raw frames, anything else speaks event frames), and hands
//! each accepted stream to the server over a channel.

use chat_core::{ChatError, ChatResult, WireFormat};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// A handle to an accepted WebSocket connection.
pub struct WebSocketConnection {
    pub ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
    pub remote_addr: SocketAddr,
    /// Framing negotiated from the upgrade path.
    pub format: WireFormat,
}

/// Start the WebSocket listener.
///
/// Returns the bound address (useful when binding port 0) and a receiver
/// that yields accepted connections.
pub async fn start_listener(
    bind_addr: SocketAddr,
) -> ChatResult<(SocketAddr, mpsc::Receiver<WebSocketConnection>)> {
    let tcp_listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| ChatError::Transport(format!("WS bind failed: {e}")))?;
    let local_addr = tcp_listener.local_addr()?;

    info!(addr = %local_addr, "WebSocket listener started");

    let (tx, rx) = mpsc::channel::<WebSocketConnection>(64);

    tokio::spawn(async move {
        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let mut path = String::new();
                        let handshake = tokio_tungstenite::accept_hdr_async(
                            stream,
                            |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                                path = req.uri().path().to_string();
                                Ok(resp)
                            },
                        )
                        .await;
                        match handshake {
                            Ok(ws_stream) => {
                                let format = WireFormat::from_path(&path);
                                debug!(
                                    remote = %addr,
                                    path = %path,
                                    ?format,
                                    "WebSocket connection accepted"
                                );
                                let conn = WebSocketConnection {
                                    ws_stream,
                                    remote_addr: addr,
                                    format,
                                };
                                if tx.send(conn).await.is_err() {
                                    warn!("WebSocket connection channel closed");
                                }
                            }
                            Err(e) => {
                                warn!(remote = %addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "TCP accept failed");
                }
            }
        }
    });

    Ok((local_addr, rx))
}

/// Helper: send a text frame over a WebSocket.
pub async fn ws_send_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
    text: String,
) -> ChatResult<()> {
    ws.send(Message::Text(text))
        .await
        .map_err(|e| ChatError::Transport(format!("WS send failed: {e}")))
}

/// Largest inbound text frame accepted (64 KiB); bigger frames are dropped.
const MAX_WS_FRAME_SIZE: usize = 65_536;

/// Helper: receive the next text frame from a WebSocket.
///
/// Returns `None` once the connection is closed. Binary and oversized
/// frames are dropped; pings are answered.
pub async fn ws_recv_text(
    ws: &mut tokio_tungstenite::WebSocketStream<TcpStream>,
) -> ChatResult<Option<String>> {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                if text.len() > MAX_WS_FRAME_SIZE {
                    debug!(
                        size = text.len(),
                        max = MAX_WS_FRAME_SIZE,
                        "oversized WS frame dropped"
                    );
                    continue;
                }
                return Ok(Some(text));
            }
            Some(Ok(Message::Close(_))) => return Ok(None),
            Some(Ok(Message::Ping(payload))) => {
                let _ = ws.send(Message::Pong(payload)).await;
            }
            Some(Ok(Message::Binary(data))) => {
                debug!(size = data.len(), "binary WS frame dropped");
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                return Err(ChatError::Transport(format!("WS recv failed: {e}")));
            }
            None => return Ok(None),
        }
    }
}
