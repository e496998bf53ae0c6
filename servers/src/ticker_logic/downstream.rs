use crate::ticker_logic::config::Config;
use crate::ticker_logic::model::{ClientMessage, HealthReport, ServerMessage};
use crate::ticker_logic::state::AppState;
use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use axum_server::tls_rustls::RustlsConfig;
use chrono::{DateTime, Local};
use futures_util::StreamExt;
use lib_common::streams::Subscription;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(1);

pub fn router(endpoint: &str, app_state: AppState) -> Router {
    Router::new()
        .route(endpoint, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

pub async fn run(config: Config, app_state: AppState) -> Result<()> {
    let app = router(config.endpoint(), app_state.clone());
    let addr: SocketAddr = format!("{}:{}", config.host(), config.port())
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host(), config.port()))?;
    let shutdown = app_state.shutdown_token();

    if let (Some(cert_path), Some(key_path)) = (config.tls_cert_path.clone(), config.tls_key_path.clone()) {
        let tls_config = RustlsConfig::from_pem_file(cert_path, key_path)
            .await
            .context("Failed to load TLS configuration")?;

        let handle = axum_server::Handle::new();
        let grace = config.shutdown_grace();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            log::info!("Ticker server shutting down.");
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        log::info!("Ticker server listening on wss://{}{}", addr, config.endpoint());
        axum_server::bind_rustls(addr, tls_config)
            .handle(handle)
            .serve(app.into_make_service())
            .await
            .context("TLS server failed")?;
        Ok(())
    } else {
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        log::info!("Ticker server listening on ws://{}{}", addr, config.endpoint());
        serve(listener, app, shutdown).await
    }
}

/// Serves `app` on an already bound listener until `shutdown` fires.
pub async fn serve(listener: TcpListener, app: Router, shutdown: CancellationToken) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            log::info!("Ticker server shutting down.");
        })
        .await
        .context("Server failed")
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.report().await)
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
    state.add_client(client_id).await;
    log::info!("Client {} connected", client_id);

    let shutdown = state.shutdown_token();
    let mut subscription: Option<Subscription> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            // Handle incoming messages from the client
            incoming = socket.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_message(text.as_str(), client_id, &state, &mut subscription).await;
                        if send_message(&mut socket, &reply).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::debug!("Client {} read error: {}", client_id, e);
                        break;
                    }
                }
            }
            // Forward the next timestamp of the active stream
            tick = next_tick(&mut subscription) => {
                match tick {
                    Some(at) => {
                        if send_message(&mut socket, &ServerMessage::tick(at)).await.is_err() {
                            break; // client disconnected
                        }
                    }
                    None => {
                        subscription = None;
                        state.set_streaming(client_id, false).await;
                    }
                }
            }
        }
    }

    if let Some(active) = subscription.take() {
        active.cancel();
    }
    state.remove_client(client_id).await;
    log::info!("Client {} disconnected", client_id);
}

async fn handle_client_message(
    text: &str,
    client_id: usize,
    state: &AppState,
    subscription: &mut Option<Subscription>,
) -> ServerMessage {
    let request = match serde_json::from_str::<ClientMessage>(text) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("Client {} sent an invalid request: {}", client_id, e);
            return ServerMessage::error(format!("invalid request: {}", e));
        }
    };

    match request {
        ClientMessage::Stream => {
            if subscription.as_ref().is_some_and(|active| !active.is_cancelled()) {
                return ServerMessage::error("stream already active");
            }
            *subscription = Some(state.open_subscription(client_id).await);
            log::info!("Client {} started a stream", client_id);
            ServerMessage::ack("stream")
        }
        ClientMessage::Cancel => match subscription.take() {
            Some(active) => {
                active.cancel();
                state.set_streaming(client_id, false).await;
                log::info!("Client {} cancelled its stream", client_id);
                ServerMessage::ack("cancel")
            }
            None => ServerMessage::error("no active stream"),
        },
    }
}

async fn next_tick(subscription: &mut Option<Subscription>) -> Option<DateTime<Local>> {
    match subscription {
        Some(active) => active.next_tick().await,
        None => std::future::pending().await,
    }
}

async fn send_message(socket: &mut WebSocket, message: &ServerMessage) -> Result<()> {
    let json_str = serde_json::to_string(message)?;
    socket.send(Message::Text(json_str.into())).await?;
    Ok(())
}
