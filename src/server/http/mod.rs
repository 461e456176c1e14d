//! HTTP control API
//!
//! TCP accept loop, one short-lived worker per connection, and a static
//! route table over the minimal request parser. Every response carries
//! permissive CORS headers and `Connection: close`: each request is
//! served on a fresh connection, no keep-alive.
//!
//! The command submit/query operations are injected as closures so the
//! transport stays independent of the router's execution-context type --
//! the assembly layer wires them at startup.

pub mod request;

use crate::auth::TokenAuth;
use crate::model::{Capabilities, Command};
use crate::router::SubmitOutcome;
use parking_lot::RwLock;
use self::request::{parse_request, HttpRequest};
use serde_json::{json, Value};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A request is a single read of at most this many bytes; larger requests
/// are not supported.
const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// How long to wait for the client to send its request.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Submits a command `(idempotency_key, type, payload)`.
pub type SubmitHandler = Arc<dyn Fn(&str, &str, Option<Value>) -> SubmitOutcome + Send + Sync>;

/// Looks up a command snapshot by id.
pub type QueryHandler = Arc<dyn Fn(&str) -> Option<Command> + Send + Sync>;

#[derive(Clone)]
struct Handlers {
    submit: SubmitHandler,
    query: QueryHandler,
}

struct HttpServerInner {
    auth: TokenAuth,
    capabilities: Capabilities,
    handlers: RwLock<Option<Handlers>>,
}

/// The HTTP side of the gateway.
pub struct HttpServer {
    inner: Arc<HttpServerInner>,
    cancel: CancellationToken,
}

impl HttpServer {
    pub fn new(auth: TokenAuth, capabilities: Capabilities) -> Self {
        Self {
            inner: Arc::new(HttpServerInner {
                auth,
                capabilities,
                handlers: RwLock::new(None),
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Wire the command operations. Until this is called, command routes
    /// answer 500.
    pub fn set_command_handlers(&self, submit: SubmitHandler, query: QueryHandler) {
        *self.inner.handlers.write() = Some(Handlers { submit, query });
    }

    /// Bind and start accepting. Returns the actually-bound port (useful
    /// when `port` is 0).
    pub async fn start(&self, port: u16) -> io::Result<u16> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let local_port = listener.local_addr()?.port();
        info!(port = local_port, "HTTP server listening");

        let inner = self.inner.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            // A slow client must not stall new accepts.
                            let inner = inner.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, inner).await;
                            });
                        }
                        Err(err) => warn!(error = %err, "accept failed"),
                    },
                }
            }
            debug!("HTTP accept loop stopped");
        });

        Ok(local_port)
    }

    pub fn stop(&self) {
        self.cancel.cancel();
        info!("HTTP server stopped");
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, inner: Arc<HttpServerInner>) {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let read = match timeout(READ_TIMEOUT, stream.read(&mut buf)).await {
        Ok(Ok(0)) => return,
        Ok(Ok(n)) => n,
        Ok(Err(err)) => {
            debug!(peer = %peer, error = %err, "request read failed");
            return;
        }
        Err(_) => {
            debug!(peer = %peer, "request read timed out");
            return;
        }
    };

    let raw = String::from_utf8_lossy(&buf[..read]);
    let response = match parse_request(&raw) {
        Some(request) => route(&request, &inner),
        None => json_error(400, "Bad Request"),
    };

    if let Err(err) = stream.write_all(response.as_bytes()).await {
        debug!(peer = %peer, error = %err, "response write failed");
    }
    let _ = stream.shutdown().await;
}

fn route(request: &HttpRequest, inner: &HttpServerInner) -> String {
    debug!(method = %request.method, path = %request.path, "request");

    // CORS preflight
    if request.method == "OPTIONS" {
        return build_response(204, None, "");
    }

    if request.method == "GET" && request.path == "/control/v1/capabilities" {
        return handle_capabilities(inner);
    }

    if request.method == "POST" && request.path == "/control/v1/commands" {
        return handle_post_command(request, inner);
    }

    if request.method == "GET" {
        if let Some(command_id) = request.path.strip_prefix("/control/v1/commands/") {
            return handle_get_command(request, command_id, inner);
        }
    }

    json_error(404, "Not found")
}

// -- Route handlers --

/// Deliberately unauthenticated: capability discovery must work before a
/// client has a token.
fn handle_capabilities(inner: &HttpServerInner) -> String {
    let body = serde_json::to_value(&inner.capabilities).unwrap_or_else(|_| json!({}));
    json_response(200, &body)
}

fn handle_post_command(request: &HttpRequest, inner: &HttpServerInner) -> String {
    if !inner
        .auth
        .validate_auth_header(request.header("authorization").unwrap_or(""))
    {
        return json_error(401, "Unauthorized");
    }

    let body: Value = match serde_json::from_str(&request.body) {
        Ok(value) => value,
        Err(_) => return json_error(400, "Invalid JSON"),
    };
    let Some(body) = body.as_object() else {
        return json_error(400, "Invalid JSON");
    };

    let (Some(idempotency_key), Some(command_type)) = (
        body.get("idempotencyKey").and_then(Value::as_str),
        body.get("type").and_then(Value::as_str),
    ) else {
        return json_error(400, "Missing required fields: idempotencyKey, type");
    };

    // Passed through opaquely; a non-object payload is treated as absent.
    let payload = body
        .get("payload")
        .and_then(Value::as_object)
        .map(|payload| Value::Object(payload.clone()));

    let handlers = inner.handlers.read().clone();
    let Some(handlers) = handlers else {
        return json_error(500, "Command router not available");
    };

    match (handlers.submit)(idempotency_key, command_type, payload) {
        SubmitOutcome::Accepted(command) | SubmitOutcome::Duplicate(command) => {
            json_response(202, &command.to_response_json())
        }
        SubmitOutcome::RateLimited => {
            // Synthetic failure: no command id, nothing stored.
            let envelope = json!({
                "commandId": "",
                "status": "FAILED",
                "result": Value::Null,
                "error": "Rate limit exceeded",
            });
            json_response(429, &envelope)
        }
        SubmitOutcome::UnknownType(command_type) => {
            json_error(400, &format!("Unknown command type: {command_type}"))
        }
    }
}

fn handle_get_command(request: &HttpRequest, command_id: &str, inner: &HttpServerInner) -> String {
    if !inner
        .auth
        .validate_auth_header(request.header("authorization").unwrap_or(""))
    {
        return json_error(401, "Unauthorized");
    }

    let handlers = inner.handlers.read().clone();
    let Some(handlers) = handlers else {
        return json_error(500, "Command router not available");
    };

    match (handlers.query)(command_id) {
        Some(command) => json_response(200, &command.to_response_json()),
        None => json_error(404, "Command not found"),
    }
}

// -- Response writing --

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        _ => "OK",
    }
}

fn build_response(status: u16, content_type: Option<&str>, body: &str) -> String {
    let mut response = format!(
        "HTTP/1.1 {} {}\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Headers: Content-Type, Authorization\r\n\
         Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
         Connection: close\r\n",
        status,
        status_text(status)
    );
    if let Some(content_type) = content_type {
        response.push_str(&format!("Content-Type: {content_type}\r\n"));
    }
    response.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    response.push_str(body);
    response
}

fn json_response(status: u16, value: &Value) -> String {
    build_response(status, Some("application/json"), &value.to_string())
}

fn json_error(status: u16, message: &str) -> String {
    json_response(status, &json!({"error": message}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CommandStatus;

    fn request(raw: &str) -> HttpRequest {
        parse_request(raw).expect("test request parses")
    }

    fn stored_command() -> Command {
        Command {
            id: "cmd-abc".to_string(),
            idempotency_key: "k1".to_string(),
            command_type: "RESET_FUSE".to_string(),
            payload: None,
            status: CommandStatus::Running,
            result: None,
            error: None,
        }
    }

    /// Server whose submit handler always accepts and whose query knows
    /// exactly one command id.
    fn wired_server(auth: TokenAuth) -> HttpServer {
        let server = HttpServer::new(auth, Capabilities::default());
        server.set_command_handlers(
            Arc::new(|key, command_type, payload| {
                let mut command = stored_command();
                command.idempotency_key = key.to_string();
                command.command_type = command_type.to_string();
                command.payload = payload;
                SubmitOutcome::Accepted(command)
            }),
            Arc::new(|id| (id == "cmd-abc").then(stored_command)),
        );
        server
    }

    fn status_of(response: &str) -> u16 {
        response
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .expect("response has a status code")
    }

    fn body_of(response: &str) -> Value {
        let idx = response.find("\r\n\r\n").expect("response has a body");
        serde_json::from_str(&response[idx + 4..]).expect("body is JSON")
    }

    #[test]
    fn test_options_answers_preflight() {
        let server = wired_server(TokenAuth::new(None));
        let response = route(&request("OPTIONS /anything HTTP/1.1\r\n\r\n"), &server.inner);
        assert_eq!(status_of(&response), 204);
        assert!(response.contains("Access-Control-Allow-Origin: *"));
        assert!(response.contains("Connection: close"));
    }

    #[test]
    fn test_capabilities_requires_no_auth() {
        let server = wired_server(TokenAuth::new(Some("secret".to_string())));
        let response = route(
            &request("GET /control/v1/capabilities HTTP/1.1\r\n\r\n"),
            &server.inner,
        );
        assert_eq!(status_of(&response), 200);
        let body = body_of(&response);
        assert_eq!(body["version"], "1.0.0");
        assert_eq!(body["features"]["resetFuse"], true);
        assert_eq!(body["limits"]["commandsPerSecond"], 5);
    }

    #[test]
    fn test_post_without_token_is_unauthorized() {
        let server = wired_server(TokenAuth::new(Some("secret".to_string())));
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\n{}";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 401);
        assert_eq!(body_of(&response)["error"], "Unauthorized");
    }

    #[test]
    fn test_post_with_wrong_scheme_is_unauthorized() {
        let server = wired_server(TokenAuth::new(Some("secret".to_string())));
        let raw = "POST /control/v1/commands HTTP/1.1\r\nAuthorization: Basic secret\r\n\r\n{}";
        assert_eq!(status_of(&route(&request(raw), &server.inner)), 401);
    }

    #[test]
    fn test_post_invalid_json_body() {
        let server = wired_server(TokenAuth::new(None));
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\nnot json";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 400);
        assert_eq!(body_of(&response)["error"], "Invalid JSON");
    }

    #[test]
    fn test_post_non_object_body_is_invalid() {
        let server = wired_server(TokenAuth::new(None));
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\n[1,2,3]";
        assert_eq!(status_of(&route(&request(raw), &server.inner)), 400);
    }

    #[test]
    fn test_post_missing_required_fields() {
        let server = wired_server(TokenAuth::new(None));
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\n{\"type\":\"RESET_FUSE\"}";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 400);
        assert_eq!(
            body_of(&response)["error"],
            "Missing required fields: idempotencyKey, type"
        );
    }

    #[test]
    fn test_post_accepted_returns_envelope() {
        let server = wired_server(TokenAuth::new(Some("secret".to_string())));
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\
                   Authorization: Bearer secret\r\n\r\n\
                   {\"idempotencyKey\":\"k1\",\"type\":\"RESET_FUSE\",\"payload\":{\"circuitId\":1}}";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 202);
        let body = body_of(&response);
        assert_eq!(body["commandId"], "cmd-abc");
        assert_eq!(body["status"], "RUNNING");
        assert!(body["result"].is_null());
        assert!(body["error"].is_null());
    }

    #[test]
    fn test_post_rate_limited_maps_to_429() {
        let server = HttpServer::new(TokenAuth::new(None), Capabilities::default());
        server.set_command_handlers(
            Arc::new(|_, _, _| SubmitOutcome::RateLimited),
            Arc::new(|_| None),
        );
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\n\
                   {\"idempotencyKey\":\"k1\",\"type\":\"RESET_FUSE\"}";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 429);
        let body = body_of(&response);
        assert_eq!(body["commandId"], "");
        assert_eq!(body["status"], "FAILED");
        assert_eq!(body["error"], "Rate limit exceeded");
    }

    #[test]
    fn test_post_unknown_type_maps_to_400() {
        let server = HttpServer::new(TokenAuth::new(None), Capabilities::default());
        server.set_command_handlers(
            Arc::new(|_, command_type, _| SubmitOutcome::UnknownType(command_type.to_string())),
            Arc::new(|_| None),
        );
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\n\
                   {\"idempotencyKey\":\"k1\",\"type\":\"EXPLODE\"}";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 400);
        assert_eq!(body_of(&response)["error"], "Unknown command type: EXPLODE");
    }

    #[test]
    fn test_post_without_wired_router_is_500() {
        let server = HttpServer::new(TokenAuth::new(None), Capabilities::default());
        let raw = "POST /control/v1/commands HTTP/1.1\r\n\r\n\
                   {\"idempotencyKey\":\"k1\",\"type\":\"RESET_FUSE\"}";
        let response = route(&request(raw), &server.inner);
        assert_eq!(status_of(&response), 500);
        assert_eq!(body_of(&response)["error"], "Command router not available");
    }

    #[test]
    fn test_get_command_found_and_missing() {
        let server = wired_server(TokenAuth::new(None));
        let found = route(
            &request("GET /control/v1/commands/cmd-abc HTTP/1.1\r\n\r\n"),
            &server.inner,
        );
        assert_eq!(status_of(&found), 200);
        assert_eq!(body_of(&found)["commandId"], "cmd-abc");

        let missing = route(
            &request("GET /control/v1/commands/cmd-nope HTTP/1.1\r\n\r\n"),
            &server.inner,
        );
        assert_eq!(status_of(&missing), 404);
        assert_eq!(body_of(&missing)["error"], "Command not found");
    }

    #[test]
    fn test_get_command_requires_auth() {
        let server = wired_server(TokenAuth::new(Some("secret".to_string())));
        let response = route(
            &request("GET /control/v1/commands/cmd-abc HTTP/1.1\r\n\r\n"),
            &server.inner,
        );
        assert_eq!(status_of(&response), 401);
    }

    #[test]
    fn test_unknown_route_is_404() {
        let server = wired_server(TokenAuth::new(None));
        let response = route(&request("GET /nope HTTP/1.1\r\n\r\n"), &server.inner);
        assert_eq!(status_of(&response), 404);
        assert_eq!(body_of(&response)["error"], "Not found");
    }

    #[test]
    fn test_content_length_matches_body_bytes() {
        let server = wired_server(TokenAuth::new(None));
        let response = route(
            &request("GET /control/v1/commands/cmd-abc HTTP/1.1\r\n\r\n"),
            &server.inner,
        );
        let idx = response.find("\r\n\r\n").unwrap();
        let body = &response[idx + 4..];
        let declared: usize = response
            .lines()
            .find_map(|line| line.strip_prefix("Content-Length: "))
            .and_then(|len| len.trim().parse().ok())
            .expect("Content-Length header present");
        assert_eq!(declared, body.len());
    }
}
