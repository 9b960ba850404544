//! Connection handlers for the Parley server.
//!
//! The handshake runs before the WebSocket upgrade: an unsupported format or
//! protocol version is answered with 400, a missing or unknown credential
//! with 401. Once upgraded, each connection is served by one task that
//! forwards its outbound queue to the socket and feeds inbound frames to the
//! gateway in order.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::seed;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parley_core::{ContentFilter, Gateway, GatewayError, Identity, Session};
use parley_protocol::{
    codec, error_codes, ClientEvent, Encoded, ProtocolError, ServerEvent, Version, WireFormat,
    PROTOCOL_VERSION,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Shared server state.
pub struct AppState {
    /// The connection gateway.
    pub gateway: Gateway,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state, seeding the in-memory store.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed data or filter configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let (store, identities) = seed::build(&config.seed)?;
        let filter = ContentFilter::new(&config.filter).context("Invalid filter configuration")?;

        let gateway = Gateway::new(
            Arc::new(identities),
            Arc::new(store),
            filter,
            config.gateway_config(),
        );

        Ok(Self { gateway, config })
    }
}

/// Build the HTTP router.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config.clone())?);

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let app = build_app(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Parley server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.gateway.stats();
    let status = if state.gateway.notifier_running() {
        "ok"
    } else {
        "degraded"
    };
    axum::Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION.to_string(),
        "sessions": stats.sessions,
        "users": stats.users,
        "rooms": stats.active_rooms,
    }))
}

/// Handshake query parameters.
#[derive(Debug, Default, Deserialize)]
struct ConnectParams {
    token: Option<String>,
    format: Option<String>,
    version: Option<String>,
}

/// Credential from `?token=`, else from an `Authorization: Bearer` header.
fn credential<'a>(params: &'a ConnectParams, headers: &'a HeaderMap) -> Option<&'a str> {
    params.token.as_deref().or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
    })
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let format = match params.format.as_deref() {
        None => WireFormat::default(),
        Some(name) => match WireFormat::parse(name) {
            Some(format) => format,
            None => {
                return (StatusCode::BAD_REQUEST, "Unsupported format").into_response();
            }
        },
    };

    if let Some(version) = params.version.as_deref() {
        match version.parse::<Version>() {
            Ok(version) if PROTOCOL_VERSION.is_compatible_with(&version) => {}
            Ok(version) => {
                debug!(version = %version, "Incompatible protocol version");
                return (StatusCode::BAD_REQUEST, "Incompatible protocol version")
                    .into_response();
            }
            Err(reason) => return (StatusCode::BAD_REQUEST, reason).into_response(),
        }
    }

    if state.gateway.stats().sessions >= state.config.limits.max_connections {
        warn!("Connection limit reached");
        metrics::record_error("capacity");
        return (StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached").into_response();
    }

    let identity = match state.gateway.resolve(credential(&params, &headers)).await {
        Ok(identity) => identity,
        Err(e) if e.is_unauthorized() => {
            debug!(error = %e, "Handshake refused");
            let reason = if matches!(e, GatewayError::MissingCredential) {
                "missing"
            } else {
                "invalid"
            };
            metrics::record_auth_failure(reason);
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
        Err(e) => {
            warn!(error = %e, "Identity lookup failed");
            metrics::record_error("identity");
            return (StatusCode::SERVICE_UNAVAILABLE, "Identity service unavailable")
                .into_response();
        }
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, identity, format))
}

/// Handle a WebSocket connection.
async fn handle_websocket(
    socket: WebSocket,
    state: Arc<AppState>,
    identity: Identity,
    format: WireFormat,
) {
    // Record connection metrics
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (mut session, mut outbound) = state.gateway.admit(&identity);
    debug!(session = %session.id(), user = %session.user_id(), "WebSocket connected");

    // Split the WebSocket
    let (mut sender, mut receiver) = socket.split();

    // Read buffer for partial MessagePack frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    let timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let idle = tokio::time::sleep(timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            biased;

            // Events queued for this session
            Some(event) = outbound.recv() => {
                if let Err(e) = send_event(&mut sender, format, &event).await {
                    debug!(session = %session.id(), error = %e, "Failed to write event");
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                idle.as_mut().reset(Instant::now() + timeout);

                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics::record_frame(text.len(), "inbound");
                        let decoded = format.decode_text::<ClientEvent>(&text);
                        process(&state, &mut session, decoded).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        metrics::record_frame(data.len(), "inbound");

                        if format != WireFormat::MessagePack {
                            let decoded = format.decode_binary::<ClientEvent>(&data);
                            process(&state, &mut session, decoded).await;
                            continue;
                        }

                        read_buffer.extend_from_slice(&data);
                        loop {
                            match codec::decode_from::<ClientEvent>(&mut read_buffer) {
                                Ok(Some(event)) => process(&state, &mut session, Ok(event)).await,
                                Ok(None) => break,
                                Err(e) => {
                                    read_buffer.clear();
                                    process(&state, &mut session, Err(e)).await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(session = %session.id(), "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session = %session.id(), error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(session = %session.id(), "WebSocket stream ended");
                        break;
                    }
                }
            }

            () = &mut idle => {
                debug!(session = %session.id(), "Heartbeat timeout");
                metrics::record_error("heartbeat_timeout");
                break;
            }
        }
    }

    state.gateway.disconnect(&mut session);
    metrics::set_active_rooms(state.gateway.stats().active_rooms);

    debug!(session = %session.id(), "WebSocket disconnected");
}

/// Hand a decoded event to the gateway, or answer a bad frame with an error.
async fn process(
    state: &AppState,
    session: &mut Session,
    decoded: Result<ClientEvent, ProtocolError>,
) {
    let event = match decoded {
        Ok(event) => event,
        Err(e) => {
            debug!(session = %session.id(), error = %e, "Undecodable frame");
            metrics::record_error("decode");
            state
                .gateway
                .reject(session, error_codes::INVALID_FRAME, e.to_string());
            return;
        }
    };

    let start = std::time::Instant::now();
    let kind = event.kind().as_str();

    match state.gateway.handle(session, event).await {
        Ok(outcome) => {
            trace!(session = %session.id(), event = kind, outcome = outcome.as_str(), "Event handled");
            metrics::record_event(kind, outcome.as_str());
        }
        Err(e) => {
            warn!(session = %session.id(), event = kind, error = %e, "Event handling failed");
            metrics::record_event(kind, "failed");
            metrics::record_error("store");
        }
    }

    metrics::record_latency(start.elapsed().as_secs_f64());
    metrics::set_active_rooms(state.gateway.stats().active_rooms);
}

/// Encode an event in the negotiated format and write it.
async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    format: WireFormat,
    event: &ServerEvent,
) -> Result<()> {
    let encoded = format.encode(event)?;
    metrics::record_frame(encoded.len(), "outbound");

    let message = match encoded {
        Encoded::Text(text) => Message::Text(text),
        Encoded::Binary(data) => Message::Binary(data.to_vec()),
    };
    sender.send(message).await?;
    Ok(())
}
