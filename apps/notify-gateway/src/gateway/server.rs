//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use crate::auth::handshake::{extract_credential, HandshakeParams};
use crate::AppState;

use super::events::{ClientMessage, ServerEvent};
use super::lifecycle::{DisconnectReason, Session, SessionReply};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/notifications", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<HandshakeParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let credential = extract_credential(&headers, &params);
    ws.on_upgrade(move |socket| handle_connection(socket, state, credential))
}

async fn handle_connection(socket: WebSocket, state: AppState, credential: Option<String>) {
    let (mut ws_tx, ws_rx) = socket.split();

    let (mut session, mut outbound_rx) = match state.lifecycle.accept(credential).await {
        Ok(accepted) => accepted,
        Err(reason) => {
            let _ = send_close(&mut ws_tx, reason.close_code(), reason.client_message()).await;
            return;
        }
    };

    if send_event(&mut ws_tx, &session.confirmation()).await.is_err() {
        session.disconnect(DisconnectReason::TransportError);
        return;
    }

    let idle_timeout = state.config.idle_timeout();
    let reason = run_session(&mut session, ws_tx, ws_rx, &mut outbound_rx, idle_timeout).await;

    // Unregister before the outbound receiver goes away so a concurrent emit
    // either lands in the queue or misses the handle entirely.
    session.disconnect(reason);
    drop(outbound_rx);
}

/// Main session loop: answer client events, flush pushed notifications,
/// enforce the idle timeout.
async fn run_session(
    session: &mut Session,
    mut ws_tx: WsSink,
    mut ws_rx: WsStream,
    outbound_rx: &mut mpsc::Receiver<Utf8Bytes>,
    idle_timeout: time::Duration,
) -> DisconnectReason {
    let idle_deadline = time::sleep(idle_timeout);
    tokio::pin!(idle_deadline);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(Message::Close(_))) | None => return DisconnectReason::ClientClosed,
                    Some(Err(e)) => {
                        tracing::debug!(?e, socket_id = %session.socket_id(), "ws read error");
                        return DisconnectReason::TransportError;
                    }
                    Some(Ok(msg)) => msg,
                };

                // Any inbound frame counts as liveness.
                idle_deadline.as_mut().reset(time::Instant::now() + idle_timeout);

                let Message::Text(text) = msg else {
                    continue;
                };

                let client_msg: ClientMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(_) => {
                        let reason = DisconnectReason::MalformedFrame;
                        let _ = send_close(&mut ws_tx, reason.close_code(), "Invalid JSON").await;
                        return reason;
                    }
                };

                let event = match client_msg.into_event() {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(
                            ?e,
                            socket_id = %session.socket_id(),
                            "invalid client event payload"
                        );
                        continue;
                    }
                };

                match session.on_event(event) {
                    SessionReply::Send(reply) => {
                        if send_event(&mut ws_tx, &reply).await.is_err() {
                            return DisconnectReason::TransportError;
                        }
                    }
                    SessionReply::Ignore => {}
                    SessionReply::Close(reason) => {
                        let _ = send_close(&mut ws_tx, reason.close_code(), reason.as_str()).await;
                        return reason;
                    }
                }
            }

            frame = outbound_rx.recv() => {
                let Some(frame) = frame else {
                    return DisconnectReason::ServerShutdown;
                };
                if ws_tx.send(Message::Text(frame)).await.is_err() {
                    return DisconnectReason::TransportError;
                }
            }

            _ = &mut idle_deadline => {
                tracing::debug!(
                    socket_id = %session.socket_id(),
                    "idle timeout, closing connection"
                );
                let reason = DisconnectReason::IdleTimeout;
                let _ = send_close(&mut ws_tx, reason.close_code(), "Idle timeout").await;
                return reason;
            }
        }
    }
}

async fn send_event(ws_tx: &mut WsSink, event: &ServerEvent) -> Result<(), axum::Error> {
    match event.encode() {
        Ok(text) => ws_tx.send(Message::Text(text)).await,
        Err(e) => {
            tracing::error!(?e, event = %event.event, "failed to encode server event");
            Ok(())
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
