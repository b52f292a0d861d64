// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WebSocket listeners.
//!
//! - **infos** (discovery): a station sends `{"router": <id>}` and learns the
//!   muxs URI it should connect to. `GET /health` reports gateway status.
//! - **muxs** (sessions): `/<router-id>` upgrades to the station's session
//!   and hands it to the matching [`RouterBridge`](crate::bridge::RouterBridge).

use crate::bridge::{WsSink, WsStream};
use crate::registry::{rejection_text, DiscoveryRequest, Registry};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::borrow::Cow;
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Discovery router.
pub fn infos_app(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(infos_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Session router.
pub fn muxs_app(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/:router", get(muxs_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serve both listeners until `shutdown` is notified.
pub async fn run(
    infos: TcpListener,
    muxs: TcpListener,
    registry: Arc<Registry>,
    shutdown: Arc<Notify>,
) -> io::Result<()> {
    info!("infos listening on {}", infos.local_addr()?);
    info!("muxs listening on {}", muxs.local_addr()?);

    let infos_shutdown = Arc::clone(&shutdown);
    let infos_server = axum::serve(infos, infos_app(Arc::clone(&registry)))
        .with_graceful_shutdown(async move { infos_shutdown.notified().await });
    let muxs_server = axum::serve(muxs, muxs_app(registry))
        .with_graceful_shutdown(async move { shutdown.notified().await });

    tokio::try_join!(async { infos_server.await }, async { muxs_server.await })?;
    info!("Listeners stopped");
    Ok(())
}

/// Health check endpoint
async fn health_handler(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "routers": registry.len(),
        "connected": registry.connected_count(),
    }))
}

async fn infos_handler(ws: WebSocketUpgrade, State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_discovery(socket, registry))
}

async fn handle_discovery(mut socket: WebSocket, registry: Arc<Registry>) {
    let request = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                debug!("Discovery request: {}", text);
                break serde_json::from_str::<DiscoveryRequest>(&text).unwrap_or_default();
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(_)) => break DiscoveryRequest::default(),
            Some(Err(e)) => {
                warn!("Discovery connection failed: {}", e);
                return;
            }
            None => return,
        }
    };

    let response = registry.discover(&request);
    info!("Discovery: {:?}", response);
    let reply = match serde_json::to_string(&response) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Discovery reply failed: {}", e);
            return;
        }
    };
    if let Err(e) = socket.send(Message::Text(reply)).await {
        warn!("Discovery reply failed: {}", e);
        return;
    }
    let _ = socket.close().await;
}

async fn muxs_handler(
    ws: WebSocketUpgrade,
    Path(router): Path<String>,
    State(registry): State<Arc<Registry>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(socket, router, registry))
}

async fn handle_session(mut socket: WebSocket, router: String, registry: Arc<Registry>) {
    let bridge = match registry.lookup(&router) {
        Ok(bridge) => Arc::clone(bridge),
        Err(e) => {
            warn!("Rejecting session for {}: {}", router, e);
            let payload = serde_json::json!({"router": router, "error": rejection_text(&e)});
            let _ = socket.send(Message::Text(payload.to_string())).await;
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: Cow::Borrowed("unknown router"),
            };
            let _ = socket.send(Message::Close(Some(frame))).await;
            return;
        }
    };

    let (sink, stream) = socket.split();
    let sink: WsSink = Box::pin(sink);
    let stream: WsStream = Box::pin(stream);
    bridge.on_connect(sink, stream).await;
}
