//! WebSocket event push
//!
//! Accepts RFC 6455 upgrades, keeps a registry of live connections, and
//! broadcasts every command status transition to all of them -- no
//! per-client filtering or subscription scoping. The handshake takes the
//! bearer token from the `token` query parameter because browser
//! WebSocket clients cannot set custom headers.
//!
//! Steady-state I/O is polled, not blocking: the gateway drives `tick`
//! at 10 Hz, which drains incoming frames and sweeps dead connections.

pub mod connection;
pub mod frame;

use crate::auth::TokenAuth;
use crate::model::Command;
use self::connection::WsConnection;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Handshake requests get a single read of at most this many bytes.
const HANDSHAKE_READ_BYTES: usize = 4096;

/// How long to wait for the client's upgrade request.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

struct WsServerInner {
    auth: TokenAuth,
    connections: Mutex<Vec<WsConnection>>,
}

/// The WebSocket side of the gateway.
pub struct WsServer {
    inner: Arc<WsServerInner>,
    cancel: CancellationToken,
}

impl WsServer {
    pub fn new(auth: TokenAuth) -> Self {
        Self {
            inner: Arc::new(WsServerInner {
                auth,
                connections: Mutex::new(Vec::new()),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Bind and start accepting. Returns the actually-bound port.
    pub async fn start(&self, port: u16) -> io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let local_port = listener.local_addr()?.port();
        info!(port = local_port, "WebSocket server listening");

        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _peer)) => {
                            // Handshake runs on its own task so a slow
                            // client cannot stall the accept loop.
                            let inner = inner.clone();
                            tokio::spawn(async move {
                                accept_connection(stream, inner).await;
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    },
                }
            }
            debug!("WebSocket accept loop stopped");
        });

        Ok(local_port)
    }

    /// Liveness sweep: pump every connection and drop the dead ones.
    /// Driven externally (10 Hz) -- the transport has no per-connection
    /// reader task.
    pub fn tick(&self) {
        let mut connections = self.inner.connections.lock();
        connections.retain_mut(|connection| connection.tick());
    }

    /// Serialize the command's event envelope once and send it to every
    /// currently-open connection.
    pub fn broadcast_command_status(&self, command: &Command) {
        let event = command.to_event_json().to_string();
        let mut connections = self.inner.connections.lock();
        for connection in connections.iter_mut() {
            if connection.is_open() {
                connection.send_text(&event);
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.lock().len()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        let mut connections = self.inner.connections.lock();
        for connection in connections.iter_mut() {
            debug!(
                authenticated = !connection.token().is_empty(),
                "closing connection"
            );
            connection.close(1001);
        }
        connections.clear();
        info!("WebSocket server stopped");
    }
}

async fn accept_connection(stream: TcpStream, inner: Arc<WsServerInner>) {
    match perform_handshake(stream).await {
        Some((stream, token)) => {
            // The 101 is already on the wire; an invalid token gets an
            // abrupt close, not a close frame -- the protocol was never
            // established from the server's perspective.
            if !inner.auth.validate_token(&token) {
                warn!("WebSocket connection rejected: invalid token");
                return;
            }
            let mut connections = inner.connections.lock();
            connections.push(WsConnection::new(stream, token));
            info!(total = connections.len(), "WebSocket client connected");
        }
        None => warn!("WebSocket handshake failed"),
    }
}

/// Read the upgrade request, answer `101 Switching Protocols`, and return
/// the stream plus the token query parameter. `None` on any failure --
/// the caller just drops the socket.
async fn perform_handshake(mut stream: TcpStream) -> Option<(TcpStream, String)> {
    let mut buf = vec![0u8; HANDSHAKE_READ_BYTES];
    let read = match timeout(HANDSHAKE_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => n,
        _ => return None,
    };

    let request = String::from_utf8_lossy(&buf[..read]).to_string();
    let mut lines = request.split("\r\n");

    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let _method = parts.next()?;
    let path = parts.next()?;

    // Token rides in the query string; it is not percent-decoded.
    let token = path
        .find('?')
        .map(|idx| &path[idx + 1..])
        .and_then(|query| {
            query
                .split('&')
                .find_map(|param| param.strip_prefix("token="))
        })
        .unwrap_or("")
        .to_string();

    let key = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("sec-websocket-key")
            .then(|| value.trim().to_string())
    })?;
    if key.is_empty() {
        return None;
    }

    let accept = frame::compute_accept_key(&key);
    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         \r\n"
    );
    stream.write_all(response.as_bytes()).await.ok()?;

    Some((stream, token))
}
