//! Core server: accepts connections and feeds their events to the session
//! handler.
//!
//! Owns the connection table (outbound queues), the session handler behind a
//! single mutex, and the shutdown broadcast. Each WebSocket connection runs
//! its own task; all of them funnel inbound events through the same lock.

use crate::config::ServerConfig;
use crate::http;
use crate::presence::Broadcaster;
use crate::session::{InboundEvent, SessionHandler};
use crate::transport::websocket::{self, WebSocketConnection};
use crate::transport::{ConnectionTable, Outbound};
use chat_core::codec::{decode_client, encode_server};
use chat_core::{ChatResult, ConnectionId, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Bound listeners, ready to serve.
pub struct Listeners {
    pub http_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    ws_rx: mpsc::Receiver<WebSocketConnection>,
}

/// The chat hub server instance.
pub struct ChatServer {
    config: ServerConfig,
    /// Outbound queues of every live connection.
    connections: Arc<ConnectionTable>,
    /// Session states and presence registry. Held across each event's
    /// mutate-then-broadcast sequence.
    sessions: Arc<Mutex<SessionHandler>>,
    /// Broadcast sender for server shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
}

impl ChatServer {
    /// Create a new server instance.
    pub fn new(config: ServerConfig) -> Self {
        let connections = Arc::new(ConnectionTable::new(config.outbound_buffer));
        let broadcaster = Broadcaster::new(connections.clone());
        let sessions = Arc::new(Mutex::new(SessionHandler::new(broadcaster)));

        Self {
            config,
            connections,
            sessions,
            shutdown_tx: broadcast::channel(1).0,
        }
    }

    /// Bind both listeners and serve until shutdown.
    pub async fn run(self: Arc<Self>) -> ChatResult<()> {
        let listeners = self.bind().await?;
        self.serve(listeners).await;
        Ok(())
    }

    /// Bind the HTTP and WebSocket listeners.
    pub async fn bind(&self) -> ChatResult<Listeners> {
        let http_addr = SocketAddr::new(self.config.host, self.config.port);
        let ws_addr = SocketAddr::new(self.config.host, self.config.ws_port);

        let http_addr = http::start(
            http_addr,
            self.config.static_dir.clone(),
            self.shutdown_tx.subscribe(),
        )
        .await?;
        let (ws_addr, ws_rx) = websocket::start_listener(ws_addr).await?;

        Ok(Listeners {
            http_addr,
            ws_addr,
            ws_rx,
        })
    }

    /// Accept WebSocket connections until shutdown, then wait for every
    /// connection task to finish its disconnect transition.
    pub async fn serve(self: Arc<Self>, mut listeners: Listeners) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        info!(
            http = %listeners.http_addr,
            ws = %listeners.ws_addr,
            "chat-server ready"
        );

        loop {
            tokio::select! {
                Some(ws_conn) = listeners.ws_rx.recv() => {
                    let srv = self.clone();
                    // Subscribe before spawning so a shutdown sent while the
                    // task starts up is not missed.
                    let conn_shutdown = self.shutdown_tx.subscribe();
                    connections.spawn(async move {
                        srv.handle_websocket(ws_conn, conn_shutdown).await;
                    });
                }
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "connection task failed");
                    }
                }
                _ = shutdown_rx.recv() => {
                    let online: Vec<String> = self
                        .sessions
                        .lock()
                        .await
                        .participants()
                        .into_iter()
                        .map(|p| p.display_name)
                        .collect();
                    info!(?online, "shutdown requested, no longer accepting connections");
                    break;
                }
                else => {
                    info!("listener closed, shutting down");
                    break;
                }
            }
        }

        if !self.connections.is_empty() {
            info!(open = self.connections.len(), "waiting for connections to close");
        }
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "connection task failed");
            }
        }
    }

    /// Ask every connection task and the HTTP server to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    async fn handle_websocket(
        &self,
        mut conn: WebSocketConnection,
        shutdown_rx: broadcast::Receiver<()>,
    ) {
        let (id, outbound) = self.connections.register();
        info!(
            conn = %id,
            remote = %conn.remote_addr,
            format = ?conn.format,
            open = self.connections.len(),
            "connection opened"
        );

        self.sessions.lock().await.dispatch(id, InboundEvent::Connect);

        let reason = self.session_loop(&mut conn, id, outbound, shutdown_rx).await;

        // The disconnect transition always runs, whatever ended the loop.
        self.connections.unregister(id);
        let open = {
            let mut sessions = self.sessions.lock().await;
            sessions.dispatch(id, InboundEvent::Disconnect { reason: reason.clone() });
            sessions.open_sessions()
        };
        info!(conn = %id, reason = %reason, open, "connection closed");
    }

    /// Pump events both ways until the connection ends. Returns the reason.
    ///
    /// Queued events are preferred over a pending online count, which is
    /// read from its slot only when the queue is empty.
    async fn session_loop(
        &self,
        conn: &mut WebSocketConnection,
        id: ConnectionId,
        outbound: Outbound,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> String {
        let Outbound {
            events: mut outbound_rx,
            mut online,
        } = outbound;

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.recv() => {
                    debug!(conn = %id, "shutdown signal received, closing WebSocket");
                    let _ = conn.ws_stream.close(None).await;
                    return "server shutdown".to_string();
                }

                Some(event) = outbound_rx.recv() => {
                    if let Err(reason) = write_event(conn, id, &event).await {
                        return reason;
                    }
                }

                Ok(()) = online.changed() => {
                    let count = *online.borrow_and_update();
                    let event = ServerEvent::OnlineCount { count };
                    if let Err(reason) = write_event(conn, id, &event).await {
                        return reason;
                    }
                }

                ws_result = websocket::ws_recv_text(&mut conn.ws_stream) => {
                    match ws_result {
                        Ok(Some(text)) => match decode_client(conn.format, &text) {
                            Ok(event) => {
                                self.sessions
                                    .lock()
                                    .await
                                    .dispatch(id, InboundEvent::Client(event));
                            }
                            Err(e) => {
                                debug!(conn = %id, error = %e, "malformed frame dropped");
                            }
                        },
                        Ok(None) => return "client closed".to_string(),
                        Err(e) => return e.to_string(),
                    }
                }
            }
        }
    }
}

/// Encode and write one event. An encoding failure skips the event; a write
/// failure ends the connection with the returned reason.
async fn write_event(
    conn: &mut WebSocketConnection,
    id: ConnectionId,
    event: &ServerEvent,
) -> Result<(), String> {
    let text = match encode_server(conn.format, event) {
        Ok(text) => text,
        Err(e) => {
            warn!(conn = %id, event = event.name(), error = %e, "failed to encode event");
            return Ok(());
        }
    };
    websocket::ws_send_text(&mut conn.ws_stream, text)
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::codec::decode_server;
    use chat_core::{NoticeKind, WireFormat};
    use futures_util::{SinkExt, StreamExt};
    use std::path::PathBuf;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".parse().unwrap(),
            port: 0,
            ws_port: 0,
            static_dir: PathBuf::from("."),
            outbound_buffer: 64,
        }
    }

    struct Running {
        server: Arc<ChatServer>,
        http_addr: SocketAddr,
        ws_addr: SocketAddr,
        serving: tokio::task::JoinHandle<()>,
    }

    async fn start() -> Running {
        let server = Arc::new(ChatServer::new(test_config()));
        let listeners = server.bind().await.unwrap();
        let (http_addr, ws_addr) = (listeners.http_addr, listeners.ws_addr);
        let serving = tokio::spawn(server.clone().serve(listeners));
        Running {
            server,
            http_addr,
            ws_addr,
            serving,
        }
    }

    async fn connect(ws_addr: SocketAddr, format: WireFormat) -> Client {
        let (client, _) = connect_async(format!("ws://{ws_addr}{}", format.path()))
            .await
            .unwrap();
        client
    }

    async fn send(client: &mut Client, text: &str) {
        client.send(Message::Text(text.to_string())).await.unwrap();
    }

    async fn recv(client: &mut Client, format: WireFormat) -> ServerEvent {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for event")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return decode_server(format, &text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn two_clients_chat_end_to_end() {
        let ws_addr = start().await.ws_addr;

        let mut ann = connect(ws_addr, WireFormat::Events).await;
        send(&mut ann, r#"["join","  Ann  "]"#).await;
        assert_eq!(
            recv(&mut ann, WireFormat::Events).await,
            ServerEvent::Joined { name: "Ann".into() }
        );
        assert_eq!(
            recv(&mut ann, WireFormat::Events).await,
            ServerEvent::OnlineCount { count: 1 }
        );

        let mut bob = connect(ws_addr, WireFormat::Frames).await;
        send(&mut bob, r#"{"type":"join","name":"Bob"}"#).await;
        assert_eq!(
            recv(&mut bob, WireFormat::Frames).await,
            ServerEvent::Joined { name: "Bob".into() }
        );
        assert_eq!(
            recv(&mut bob, WireFormat::Frames).await,
            ServerEvent::OnlineCount { count: 2 }
        );
        match recv(&mut ann, WireFormat::Events).await {
            ServerEvent::SystemMessage(notice) => assert_eq!(notice.kind, NoticeKind::Join),
            other => panic!("expected join notice, got {other:?}"),
        }
        assert_eq!(
            recv(&mut ann, WireFormat::Events).await,
            ServerEvent::OnlineCount { count: 2 }
        );

        // Malformed frames are dropped without a notice.
        send(&mut ann, "definitely not json").await;
        send(&mut ann, r#"["chat_message",{"text":"hi"}]"#).await;

        for (client, format) in [(&mut ann, WireFormat::Events), (&mut bob, WireFormat::Frames)] {
            match recv(client, format).await {
                ServerEvent::ChatMessage(msg) => {
                    assert_eq!(msg.author, "Ann");
                    assert_eq!(msg.text, "hi");
                }
                other => panic!("expected chat message, got {other:?}"),
            }
        }

        bob.close(None).await.unwrap();
        match recv(&mut ann, WireFormat::Events).await {
            ServerEvent::SystemMessage(notice) => assert_eq!(notice.kind, NoticeKind::Leave),
            other => panic!("expected leave notice, got {other:?}"),
        }
        assert_eq!(
            recv(&mut ann, WireFormat::Events).await,
            ServerEvent::OnlineCount { count: 1 }
        );
    }

    #[tokio::test]
    async fn chat_before_join_gets_error_notice() {
        let ws_addr = start().await.ws_addr;

        let mut client = connect(ws_addr, WireFormat::Frames).await;
        send(&mut client, r#"{"type":"chat","text":"hello"}"#).await;

        assert_eq!(
            recv(&mut client, WireFormat::Frames).await,
            ServerEvent::ErrorMessage(crate::session::handler::JOIN_REQUIRED_NOTICE.into())
        );
    }

    #[tokio::test]
    async fn health_endpoint_answers() {
        let http_addr = start().await.http_addr;

        let mut stream = TcpStream::connect(http_addr).await.unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
            .await
            .unwrap()
            .unwrap();

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.contains(r#""status":"ok""#), "{response}");
    }

    #[tokio::test]
    async fn shutdown_closes_connections() {
        let hub = start().await;

        let mut client = connect(hub.ws_addr, WireFormat::Events).await;
        send(&mut client, r#"["join","Ann"]"#).await;
        recv(&mut client, WireFormat::Events).await;
        recv(&mut client, WireFormat::Events).await;

        hub.server.shutdown();

        let closed = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(frame) = client.next().await {
                match frame {
                    Ok(Message::Close(_)) | Err(_) => return true,
                    Ok(_) => continue,
                }
            }
            true
        })
        .await
        .unwrap();
        assert!(closed);
    }

    #[tokio::test]
    async fn serve_returns_after_every_disconnect_ran() {
        let hub = start().await;

        let mut ann = connect(hub.ws_addr, WireFormat::Events).await;
        send(&mut ann, r#"["join","Ann"]"#).await;
        recv(&mut ann, WireFormat::Events).await;
        recv(&mut ann, WireFormat::Events).await;
        let _idle = connect(hub.ws_addr, WireFormat::Frames).await;
        // Wait until the hub has opened a session for the idle connection.
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.server.sessions.lock().await.open_sessions() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        hub.server.shutdown();
        tokio::time::timeout(Duration::from_secs(5), hub.serving)
            .await
            .expect("serve did not return")
            .unwrap();

        let sessions = hub.server.sessions.lock().await;
        assert_eq!(sessions.open_sessions(), 0);
        assert_eq!(sessions.online_count(), 0);
        assert!(hub.server.connections.is_empty());
    }
}
