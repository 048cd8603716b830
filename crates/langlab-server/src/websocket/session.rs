//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::channel::{Channel, Outbound};
use super::handler::{handle_binary, handle_text};
use crate::hub::{CloseReason, Hub};
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;

/// How long the writer may take to flush its close frame.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drive one channel until the client goes away or the channel is closed
/// elsewhere (liveness eviction, invalid token, shutdown).
///
/// The reader runs on this task; a spawned writer drains the channel's
/// outbound queue, including liveness pings. Pongs mark the channel alive.
#[instrument(skip_all, fields(channel = %channel.handle()))]
pub async fn run_ws_session(
    ws: WebSocket,
    hub: Arc<Hub>,
    channel: Arc<Channel>,
    outbound: mpsc::Receiver<Outbound>,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let closed = channel.close_token();

    let mut writer = tokio::spawn(run_writer(ws_tx, outbound, closed.clone()));

    let reason = loop {
        tokio::select! {
            () = closed.cancelled() => break None,
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = handle_text(&hub, &channel, text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = handle_binary(&hub, &channel, &bytes);
                }
                Some(Ok(Message::Pong(_))) => channel.mark_alive(),
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => break Some(CloseReason::ClientClosed),
                Some(Err(error)) => {
                    debug!(error = %error, "websocket read failed");
                    break Some(CloseReason::TransportError);
                }
            },
        }
    };

    if let Some(reason) = reason {
        let _ = hub.close_channel(channel.handle(), reason);
    }
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        debug!("writer did not finish, aborting");
        writer.abort();
    }
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(channel.age().as_secs_f64());
}

async fn run_writer(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let message = match frame {
            Outbound::Text(text) => Message::Text(text.as_str().into()),
            Outbound::Ping => Message::Ping(Bytes::new()),
        };
        if ws_tx.send(message).await.is_err() {
            debug!("websocket write failed");
            return;
        }
    }
    let _ = ws_tx.send(Message::Close(None)).await;
}
