//! WebSocket upgrade handler and per-connection reader/writer tasks.

use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use eskimoe_common::id::{prefix, prefixed_ulid};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;

use super::events::{ClientMessage, ControlMessage};
use super::subscriber::{Frame, Subscriber};
use crate::auth::middleware::RequestContext;
use crate::error::ApiError;
use crate::AppState;

/// Close code sent when the hub releases a connection (1001 going away).
const CLOSE_GOING_AWAY: u16 = 1001;

/// Pending control replies per connection. Heartbeats beyond this are
/// answered on a best-effort basis.
const CONTROL_BUFFER: usize = 8;

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    context: RequestContext,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let member_id = context.require()?.id();
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, member_id)))
}

async fn handle_connection(socket: WebSocket, state: AppState, member_id: i32) {
    let conn_id = prefixed_ulid(prefix::CONNECTION);
    let (events_tx, events_rx) =
        Subscriber::channel(conn_id.clone(), member_id, state.config.hub_outbound_buffer);
    let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
    let (ws_tx, ws_rx) = socket.split();

    state.hub.register(events_tx);
    tracing::info!(conn_id = %conn_id, member_id, "subscriber connected");

    let writer = tokio::spawn(write_loop(
        ws_tx,
        events_rx,
        control_rx,
        state.config.ws_write_timeout,
        conn_id.clone(),
    ));

    read_loop(ws_rx, control_tx, &conn_id).await;

    // No-op if the hub already dropped this connection.
    state.hub.unregister(&conn_id);
    if let Err(err) = writer.await {
        tracing::error!(conn_id = %conn_id, ?err, "writer task failed");
    }

    tracing::info!(conn_id = %conn_id, member_id, "subscriber disconnected");
}

/// Reads until the client goes away or the writer has stopped.
async fn read_loop(mut ws_rx: WsStream, control_tx: mpsc::Sender<ControlMessage>, conn_id: &str) {
    loop {
        tokio::select! {
            // Writer exited, so nothing more can be sent on this socket.
            _ = control_tx.closed() => break,

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(ClientMessage::Heartbeat) => {
                                if control_tx.try_send(ControlMessage::HeartbeatAck).is_err() {
                                    tracing::debug!(conn_id, "heartbeat ack skipped");
                                }
                            }
                            Err(_) => {
                                tracing::trace!(conn_id, "ignoring client message");
                            }
                        }
                    }
                    // Pings are answered by the websocket layer itself.
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(?e, conn_id, "ws read error");
                        break;
                    }
                    Some(Ok(_)) => continue,
                }
            }
        }
    }
}

/// Why the writer stopped.
#[derive(Debug)]
enum WriterExit {
    /// The hub dropped the subscriber: unregistered, overflowed or shut down.
    Released,
    /// The reader finished; the client is gone or closing.
    ReaderGone,
    WriteFailed,
    DeadlineExceeded,
}

/// Drains the outbound buffer onto the socket, one write at a time, each
/// under `deadline`. The socket is closed here and only here.
async fn write_loop(
    mut ws_tx: WsSink,
    mut events: mpsc::Receiver<Frame>,
    mut control: mpsc::Receiver<ControlMessage>,
    deadline: Duration,
    conn_id: String,
) {
    let exit = loop {
        let message = tokio::select! {
            frame = events.recv() => match frame {
                Some(frame) => Message::Text(frame.to_string().into()),
                None => break WriterExit::Released,
            },
            reply = control.recv() => match reply {
                Some(reply) => match serde_json::to_string(&reply) {
                    Ok(json) => Message::Text(json.into()),
                    Err(err) => {
                        tracing::error!(?err, conn_id = %conn_id, "failed to encode control reply");
                        continue;
                    }
                },
                None => break WriterExit::ReaderGone,
            },
        };

        match time::timeout(deadline, ws_tx.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(?err, conn_id = %conn_id, "ws write failed");
                break WriterExit::WriteFailed;
            }
            Err(_) => {
                tracing::warn!(conn_id = %conn_id, ?deadline, "ws write deadline exceeded");
                break WriterExit::DeadlineExceeded;
            }
        }
    };

    // Dropping the receivers makes any later hub offer fail as closed.
    drop(events);
    drop(control);

    match exit {
        WriterExit::Released => {
            let _ = time::timeout(
                deadline,
                send_close(&mut ws_tx, CLOSE_GOING_AWAY, "Subscription ended"),
            )
            .await;
        }
        WriterExit::ReaderGone => {
            let _ = time::timeout(deadline, ws_tx.close()).await;
        }
        // The socket is unusable; dropping it releases the connection.
        WriterExit::WriteFailed | WriterExit::DeadlineExceeded => {}
    }

    tracing::debug!(conn_id = %conn_id, ?exit, "writer finished");
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(ws_tx: &mut WsSink, code: u16, reason: &str) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
