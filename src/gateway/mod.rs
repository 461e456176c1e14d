//! Gateway assembly
//!
//! Builds the router and both transports from configuration and wires
//! them together: router status changes fan out to the WebSocket
//! broadcaster, the HTTP command routes delegate to the router, and a
//! 10 Hz housekeeping task drives the WebSocket sweep. Constructed once
//! at startup and passed around explicitly -- there is no discoverable
//! singleton.

use crate::auth::TokenAuth;
use crate::config::GatewayConfig;
use crate::router::CommandRouter;
use crate::server::http::HttpServer;
use crate::server::ws::WsServer;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// WebSocket housekeeping cadence.
const TICK_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("server start failed: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled gateway.
///
/// `W` is the execution-context type handed to executors; attach it with
/// [`Gateway::set_world`] before the first submission.
pub struct Gateway<W: Send + Sync + 'static> {
    config: GatewayConfig,
    router: Arc<CommandRouter<W>>,
    http: Arc<HttpServer>,
    ws: Arc<WsServer>,
    tick_cancel: CancellationToken,
    http_port: Option<u16>,
    ws_port: Option<u16>,
}

impl<W: Send + Sync + 'static> Gateway<W> {
    pub fn new(config: GatewayConfig) -> Self {
        let auth = TokenAuth::new(config.auth_token.clone());
        let router = Arc::new(CommandRouter::new(config.rate_limit));
        let ws = Arc::new(WsServer::new(auth.clone()));
        let http = Arc::new(HttpServer::new(auth, config.capabilities()));

        // Every status transition goes out to every subscriber.
        let broadcaster = ws.clone();
        router.add_status_listener(Box::new(move |command| {
            broadcaster.broadcast_command_status(command);
        }));

        let submit_router = router.clone();
        let query_router = router.clone();
        http.set_command_handlers(
            Arc::new(move |key, command_type, payload| {
                submit_router.submit(key, command_type, payload)
            }),
            Arc::new(move |command_id| query_router.get(command_id)),
        );

        Self {
            config,
            router,
            http,
            ws,
            tick_cancel: CancellationToken::new(),
            http_port: None,
            ws_port: None,
        }
    }

    pub fn router(&self) -> &Arc<CommandRouter<W>> {
        &self.router
    }

    pub fn set_world(&self, world: Arc<W>) {
        self.router.set_world(world);
    }

    /// Start both servers and the housekeeping tick. Records the
    /// actually-bound ports (pass port 0 in config for an ephemeral one).
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        let http_port = self.http.start(self.config.http_port).await?;
        let ws_port = self.ws.start(self.config.ws_port).await?;
        self.http_port = Some(http_port);
        self.ws_port = Some(ws_port);

        let ws = self.ws.clone();
        let cancel = self.tick_cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => ws.tick(),
                }
            }
        });

        info!(http_port, ws_port, "control gateway started");
        Ok(())
    }

    pub fn stop(&self) {
        self.tick_cancel.cancel();
        self.ws.stop();
        self.http.stop();
        info!("control gateway stopped");
    }

    /// Bound HTTP port, once started.
    pub fn http_port(&self) -> Option<u16> {
        self.http_port
    }

    /// Bound WebSocket port, once started.
    pub fn ws_port(&self) -> Option<u16> {
        self.ws_port
    }

    pub fn ws_connection_count(&self) -> usize {
        self.ws.connection_count()
    }
}
