//! HTTP and WebSocket handlers.
//!
//! Each WebSocket connection becomes one hub session. A writer task drains
//! the session's outbound queue into the socket while the connection task
//! reads client frames and submits them to the hub.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard, Direction};
use anyhow::{bail, Context, Result};
use axum::{
    extract::{
        ws::{Message as WsFrame, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use chorus_core::{HtmlFormatter, Hub, HubError, HubHandle, Message, Outbound, SessionId};
use chorus_protocol::{ChatEvent, MessageCodec, ProtocolError, WsMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::future::IntoFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared server state.
pub struct AppState {
    /// Handle to the running hub.
    pub hub: HubHandle,
    /// Server configuration.
    pub config: Config,
    /// Inbound frame decoder.
    pub codec: MessageCodec,
    active: AtomicUsize,
}

impl AppState {
    #[must_use]
    pub fn new(hub: HubHandle, config: Config) -> Self {
        let codec = MessageCodec::new(config.limits.max_message_size);
        Self {
            hub,
            config,
            codec,
            active: AtomicUsize::new(0),
        }
    }

    /// Number of open WebSocket connections.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

/// A reserved connection slot, released on drop.
struct ConnectionSlot(Arc<AppState>);

impl ConnectionSlot {
    fn acquire(state: &Arc<AppState>) -> Option<Self> {
        let max = state.config.limits.max_connections;
        if state.active.fetch_add(1, Ordering::AcqRel) >= max {
            state.active.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(Self(Arc::clone(state)))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the application router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/history", get(history_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until it or the hub fails.
///
/// # Errors
///
/// Returns an error if the template cannot be loaded, the listener cannot be
/// bound, or the hub stops.
pub async fn run_server(config: Config) -> Result<()> {
    let formatter = match &config.template.path {
        Some(path) => HtmlFormatter::from_file(path)
            .with_context(|| format!("Failed to load message template {}", path.display()))?,
        None => HtmlFormatter::default(),
    };

    let (hub, hub_task) = Hub::spawn(config.hub_config(), formatter);

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Chorus server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let app = build_app(Arc::new(AppState::new(hub, config)));

    tokio::select! {
        result = axum::serve(listener, app).into_future() => {
            result.context("HTTP server failed")?;
        }
        result = hub_task => {
            match result {
                Ok(Ok(())) => bail!("Hub stopped unexpectedly"),
                Ok(Err(e)) => return Err(e).context("Hub failed"),
                Err(e) => return Err(e).context("Hub task panicked"),
            }
        }
    }

    Ok(())
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(INDEX_HTML.replace("__WS_PATH__", &state.config.transport.websocket_path))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => {
            metrics::record_hub_stats(&stats);
            Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "connections": state.active_connections(),
                "hub": stats,
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        )
            .into_response(),
    }
}

async fn history_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.hub.history().await {
        Ok(history) => {
            let events: Vec<ChatEvent> = history
                .into_iter()
                .map(|m| ChatEvent::new(m.client_id, m.text))
                .collect();
            Json(events).into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(slot) = ConnectionSlot::acquire(&state) else {
        metrics::record_rejected();
        warn!(
            max_connections = state.config.limits.max_connections,
            "Rejecting connection, server full"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "Server is at capacity").into_response();
    };

    ws.max_message_size(state.codec.max_message_size())
        .on_upgrade(move |socket| handle_websocket(socket, state, slot))
}

async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, _slot: ConnectionSlot) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let Some(outbound) = register_session(&state.hub).await else {
        return;
    };
    let key = outbound.key().clone();
    let id = key.id().clone();

    debug!(session = %id, "WebSocket connected");

    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_pump(sink, outbound));

    loop {
        tokio::select! {
            _ = &mut writer => {
                debug!(session = %id, "Outbound queue closed");
                break;
            }
            frame = stream.next() => {
                let decoded = match frame {
                    Some(Ok(WsFrame::Text(text))) => {
                        metrics::record_message(text.len(), Direction::Inbound);
                        state.codec.decode_text(&text)
                    }
                    Some(Ok(WsFrame::Binary(data))) => {
                        metrics::record_message(data.len(), Direction::Inbound);
                        state.codec.decode_binary(&data)
                    }
                    Some(Ok(WsFrame::Ping(_) | WsFrame::Pong(_))) => continue,
                    Some(Ok(WsFrame::Close(_))) => {
                        debug!(session = %id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = %id, "WebSocket stream ended");
                        break;
                    }
                };

                if let Err(e) = submit(&state, &id, decoded).await {
                    error!(session = %id, error = %e, "Hub unavailable");
                    break;
                }
            }
        }
    }

    if let Err(e) = state.hub.unregister(&key).await {
        debug!(session = %id, error = %e, "Unregister failed");
    }
    writer.abort();

    debug!(session = %id, "WebSocket disconnected");
}

/// Open a session for a new connection and register it with the hub.
async fn register_session(hub: &HubHandle) -> Option<Outbound> {
    let (session, outbound) = hub.open_session(SessionId::generate());

    match hub.register(session).await {
        Ok(()) => Some(outbound),
        Err(e) => {
            warn!(session = %outbound.id(), error = %e, "Failed to register session");
            metrics::record_error("register");
            if matches!(e, HubError::Timeout(_)) {
                // The registration may still land later.
                if let Err(e) = hub.unregister(outbound.key()).await {
                    debug!(session = %outbound.id(), error = %e, "Unregister failed");
                }
            }
            None
        }
    }
}

/// Submit a decoded frame. Only a stopped hub is reported as an error.
async fn submit(
    state: &AppState,
    id: &SessionId,
    decoded: Result<WsMessage, ProtocolError>,
) -> Result<(), HubError> {
    let wire = match decoded {
        Ok(wire) => wire,
        Err(e) => {
            warn!(session = %id, error = %e, "Dropping undecodable message");
            metrics::record_error("decode");
            return Ok(());
        }
    };

    if wire.is_blank() {
        debug!(session = %id, "Ignoring blank message");
        return Ok(());
    }

    let start = Instant::now();
    match state.hub.submit(Message::from_wire(id.as_str(), wire)).await {
        Ok(()) => {
            metrics::record_submit_latency(start.elapsed().as_secs_f64());
            Ok(())
        }
        Err(HubError::Timeout(limit)) => {
            warn!(session = %id, ?limit, "Hub did not accept message in time");
            metrics::record_error("submit_timeout");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Forward queued payloads to the socket until the queue closes.
async fn write_pump(mut sink: SplitSink<WebSocket, WsFrame>, mut outbound: Outbound) {
    while let Some(payload) = outbound.recv().await {
        let len = payload.len();
        if sink.send(to_frame(payload)).await.is_err() {
            return;
        }
        metrics::record_message(len, Direction::Outbound);
    }

    if let Err(e) = sink.send(WsFrame::Close(None)).await {
        debug!(session = %outbound.id(), error = %e, "Failed to send close frame");
    }
}

/// UTF-8 payloads go out as text frames, anything else as binary.
fn to_frame(payload: Bytes) -> WsFrame {
    match String::from_utf8(payload.to_vec()) {
        Ok(text) => WsFrame::Text(text),
        Err(e) => WsFrame::Binary(e.into_bytes()),
    }
}
