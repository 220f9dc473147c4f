//! HTTP surface: index page, liveness check, static assets and the
//! WebSocket upgrade that feeds the hub.
//!
//! ```text
//! GET /          rendered chat page
//! GET /ping      liveness greeting
//! GET /static/*  files under `static_dir`
//! GET /ws        WebSocket upgrade (426 without an upgrade request)
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

use crate::connection::{Connection, WsConnection};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::hub::{Hub, HubConfig};
use crate::receive::receive_loop;
use crate::render::render_index;

/// Body of the liveness check.
pub const PING_GREETING: &str = "Welcome to relay";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Directory served under `/static`
    pub static_dir: PathBuf,
    pub hub: HubConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3300".to_string(),
            static_dir: PathBuf::from("./static"),
            hub: HubConfig::default(),
        }
    }
}

#[derive(Clone)]
struct AppState {
    hub: Arc<Hub<WsConnection>>,
}

/// Build the router for a hub.
pub fn router(hub: Arc<Hub<WsConnection>>, static_dir: impl Into<PathBuf>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/ws", get(ws_upgrade))
        .nest_service("/static", ServeDir::new(static_dir.into()))
        .with_state(AppState { hub })
}

async fn index() -> Html<String> {
    Html(render_index().into_string())
}

async fn ping() -> &'static str {
    PING_GREETING
}

async fn ws_upgrade(
    State(state): State<AppState>,
    ws: std::result::Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(state.hub, socket)),
        Err(rejection) => {
            log::debug!("Rejected non-upgrade request on /ws: {rejection}");
            (StatusCode::UPGRADE_REQUIRED, "Upgrade Required").into_response()
        }
    }
}

/// Register the sink half with the hub and run the receive loop on the
/// stream half.
async fn handle_socket(hub: Arc<Hub<WsConnection>>, socket: WebSocket) {
    let (sink, stream) = socket.split();
    let conn = Arc::new(WsConnection::new(sink));
    let id = conn.id();

    hub.register(conn).await;
    let exit = receive_loop(hub, id, stream).await;
    log::debug!("Receive loop for {id} ended: {exit:?}");
}

/// The relay server.
pub struct RelayServer {
    config: ServerConfig,
    hub: Arc<Hub<WsConnection>>,
    dispatcher: Dispatcher<WsConnection>,
}

impl RelayServer {
    /// Create a new server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let (hub, dispatcher) = Hub::new(config.hub.clone());
        Self {
            config,
            hub,
            dispatcher,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Get the configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Get the hub.
    pub fn hub(&self) -> &Arc<Hub<WsConnection>> {
        &self.hub
    }

    /// Build the router over this server's hub.
    pub fn router(&self) -> Router {
        router(self.hub.clone(), self.config.static_dir.clone())
    }

    /// Bind `bind_addr` and serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve_with_shutdown(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, std::future::pending::<()>()).await
    }

    /// Serve until `shutdown` resolves. Open connections are closed as the
    /// process winds down; there is no drain of the inbound queue.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let Self { hub, dispatcher, .. } = self;

        tokio::spawn(dispatcher.run());
        log::info!(
            "Relay server (hub {}) listening on {}",
            hub.id(),
            listener.local_addr()?
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;
        log::info!("Relay server stopped");
        Ok(())
    }
}
