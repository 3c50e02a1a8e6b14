//! WebSocket endpoint: authenticates the handshake, then runs one reader
//! loop and one writer task per connection.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use parlor_auth::AuthError;
use parlor_realtime::{ClientEvent, ServerEvent, SessionHandle};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::state::GatewayState;

const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/ws", get(websocket_handler))
}

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WebSocketQuery>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let verified = match params.token.as_deref().map(str::trim) {
        Some(token) if !token.is_empty() => state.verifier().verify(token),
        _ => Err(AuthError::MissingCredential),
    };

    match verified {
        Ok(user) => ws.on_upgrade(move |socket| handle_socket(socket, state, user.user_id)),
        Err(err) => {
            warn!(error = %err, "rejecting websocket connection");
            ws.on_upgrade(move |socket| reject_socket(socket, err))
        }
    }
}

fn close_reason(err: &AuthError) -> &'static str {
    match err {
        AuthError::MissingCredential => "missing credential",
        AuthError::Expired => "credential expired",
        AuthError::InvalidCredential(_) | AuthError::TokenCreation(_) => "invalid credential",
    }
}

async fn reject_socket(mut socket: WebSocket, err: AuthError) {
    let frame = CloseFrame {
        code: close_code::POLICY,
        reason: Cow::Borrowed(close_reason(&err)),
    };
    if let Err(send_err) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %send_err, "peer went away before the policy close");
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, user_id: String) {
    let realtime = state.realtime().clone();
    let (sink, mut stream) = socket.split();
    let (handle, outbound) = SessionHandle::new(user_id.clone(), realtime.outbound_buffer);
    let session_id = handle.id();

    let mut writer = tokio::spawn(write_outbound(
        sink,
        outbound,
        realtime.keepalive_interval(),
    ));

    info!(user_id = %user_id, session_id = %session_id, "websocket connected");
    state.engine().open_session(handle.clone()).await;

    let idle_limit = realtime.keepalive_timeout();
    loop {
        let frame = match timeout(idle_limit, stream.next()).await {
            Err(_) => {
                info!(user_id = %user_id, session_id = %session_id, "keepalive timeout, closing connection");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                warn!(user_id = %user_id, session_id = %session_id, error = %err, "websocket transport error");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => match ClientEvent::decode(&text) {
                Ok(event) => state.engine().dispatch(&handle, event).await,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "ignoring malformed frame");
                }
            },
            Message::Close(_) => {
                debug!(user_id = %user_id, session_id = %session_id, "client closed connection");
                break;
            }
            Message::Binary(_) => debug!(user_id = %user_id, "ignoring binary frame"),
            // Pings are answered by the transport; both only count as liveness.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    state.engine().close_session(&handle).await;
    drop(handle);

    if timeout(WRITER_SHUTDOWN_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    info!(user_id = %user_id, session_id = %session_id, "websocket disconnected");
}

/// Drains the session queue onto the socket and pings on every keepalive tick.
/// Ends once every sender is gone or the socket refuses a write.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    keepalive: Duration,
) {
    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(payload) => payload,
                    Err(err) => {
                        error!(event = event.kind(), error = %err, "failed to encode outbound event");
                        continue;
                    }
                };
                if let Err(err) = sink.send(Message::Text(payload)).await {
                    debug!(error = %err, "socket rejected outbound frame");
                    return;
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = sink.send(Message::Ping(Vec::new())).await {
                    debug!(error = %err, "socket rejected keepalive ping");
                    return;
                }
            }
        }
    }

    let frame = CloseFrame {
        code: close_code::NORMAL,
        reason: Cow::Borrowed("session closed"),
    };
    let _ = sink.send(Message::Close(Some(frame))).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reasons_fit_in_a_control_frame() {
        for err in [
            AuthError::MissingCredential,
            AuthError::Expired,
            AuthError::InvalidCredential("bad signature".into()),
        ] {
            assert!(close_reason(&err).len() <= 123);
        }
    }
}
