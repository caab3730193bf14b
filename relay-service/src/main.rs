// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod registry;

use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        ConnectInfo, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header::ORIGIN},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use futures_util::{
    SinkExt, StreamExt,
    stream::SplitSink,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::registry::{ConnectionId, ConnectionRegistry, OUTBOUND_QUEUE_CAPACITY, OutboundRx};

#[derive(Clone)]
struct AppState {
    registry: ConnectionRegistry,
    settings: RelaySettings,
}

#[derive(Debug, Clone)]
struct RelaySettings {
    ping_interval: Duration,
    pong_timeout: Duration,
    allowed_origins: Vec<String>,
}

impl RelaySettings {
    fn from_env() -> Self {
        Self {
            ping_interval: duration_from_env("RELAY_PING_INTERVAL_SECS", 20),
            pong_timeout: duration_from_env("RELAY_PONG_TIMEOUT_SECS", 60),
            allowed_origins: std::env::var("RELAY_ALLOWED_ORIGINS")
                .ok()
                .map(|value| parse_allowed_origins(&value))
                .unwrap_or_default(),
        }
    }

    /// An empty allow-list accepts every origin, as does a request that
    /// carries no `Origin` header at all.
    fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            _ if self.allowed_origins.is_empty() => true,
            None => true,
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| origin.contains(allowed.as_str())),
        }
    }
}

fn duration_from_env(var_name: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(var_name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

fn parse_allowed_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "relay_service=debug,tower_http=info".to_string()),
        )
        .init();

    let settings = RelaySettings::from_env();
    info!(
        ping_interval_secs = settings.ping_interval.as_secs(),
        pong_timeout_secs = settings.pong_timeout.as_secs(),
        allowed_origins = ?settings.allowed_origins,
        "relay settings loaded"
    );

    let state = AppState {
        registry: ConnectionRegistry::default(),
        settings,
    };

    let app = build_router(state);

    let bind_addr = parse_bind_addr("RELAY_SERVICE_BIND", "0.0.0.0:8765")?;
    info!(%bind_addr, "relay-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(relay_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "relay-service",
        "connections": state.registry.len(),
    }))
}

async fn relay_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    if !state.settings.origin_allowed(origin) {
        warn!(peer = %peer, origin = origin.unwrap_or(""), "rejecting relay upgrade from disallowed origin");
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": "origin not allowed"})),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let registration = state.registry.register(peer, outbound_tx);
    let connection_id = registration.id();
    debug!(connection_id = %connection_id, peer = %peer, connected_at = %Utc::now(), "relay socket open");

    let connection = tokio::spawn(run_connection(
        socket,
        state.settings.clone(),
        state.registry.clone(),
        connection_id,
        outbound_rx,
    ));
    let reason = supervise(connection, connection_id).await;
    info!(connection_id = %connection_id, peer = %peer, reason, "relay socket closed");
    drop(registration);
}

/// Wait for a connection task, logging a panic instead of propagating it.
async fn supervise(task: JoinHandle<&'static str>, connection_id: ConnectionId) -> &'static str {
    match task.await {
        Ok(reason) => reason,
        Err(error) => {
            warn!(connection_id = %connection_id, error = %error, "relay connection task failed");
            "connection task failed"
        }
    }
}

/// Pump one connection until it closes, errors or misses the keepalive
/// deadline. Writes happen on a separate task so a peer that stops reading
/// cannot hold up the deadline check. Returns the reason the loop ended.
async fn run_connection(
    socket: WebSocket,
    settings: RelaySettings,
    registry: ConnectionRegistry,
    connection_id: ConnectionId,
    outbound_rx: OutboundRx,
) -> &'static str {
    let (sink, mut stream) = socket.split();
    let mut writer = tokio::spawn(write_outbound(
        sink,
        outbound_rx,
        connection_id,
        settings.ping_interval,
    ));

    let mut last_seen = Instant::now();
    let mut deadline = interval_at(Instant::now() + settings.ping_interval, settings.ping_interval);
    deadline.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            inbound = stream.next() => {
                let message = match inbound {
                    Some(Ok(message)) => message,
                    Some(Err(error)) => {
                        warn!(connection_id = %connection_id, error = %error, "relay socket receive error");
                        break "receive error";
                    }
                    None => break "stream ended",
                };
                last_seen = Instant::now();

                match message {
                    Message::Text(text) => {
                        registry.handle_inbound(connection_id, text.as_str());
                    }
                    Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            registry.handle_inbound(connection_id, text);
                        }
                        Err(error) => {
                            warn!(connection_id = %connection_id, error = %error, "dropping non-UTF-8 binary relay frame");
                        }
                    },
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => break "closed by peer",
                }
            }
            finished = &mut writer => {
                break finished.unwrap_or("writer task failed");
            }
            _ = deadline.tick() => {
                if last_seen.elapsed() > settings.pong_timeout {
                    warn!(
                        connection_id = %connection_id,
                        idle_secs = last_seen.elapsed().as_secs(),
                        "relay keepalive timed out"
                    );
                    break "keepalive timeout";
                }
            }
        }
    };

    writer.abort();
    reason
}

/// Drain the outbound queue into the socket and send keepalive pings. Ends
/// when the registry drops the connection or a write fails.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: OutboundRx,
    connection_id: ConnectionId,
    ping_interval: Duration,
) -> &'static str {
    let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    return "dropped from registry";
                };
                if let Err(error) = sink.send(message).await {
                    warn!(connection_id = %connection_id, error = %error, "relay socket send failed");
                    return "send error";
                }
            }
            _ = ticker.tick() => {
                if let Err(error) = sink.send(Message::Ping(Default::default())).await {
                    warn!(connection_id = %connection_id, error = %error, "relay ping failed");
                    return "ping error";
                }
            }
        }
    }
}
