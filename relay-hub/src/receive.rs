//! Per-connection receive loop.
//!
//! Reads frames from one client, decodes them and submits the resulting
//! messages to the hub. The loop never writes to the client; a malformed
//! payload is logged and skipped. When the stream ends or fails the
//! connection is deregistered.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use futures_util::{Stream, StreamExt};

use crate::connection::{Connection, ConnectionId};
use crate::hub::Hub;
use crate::message::Message;

/// Why a receive loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Close frame or end of stream
    Closed,
    /// Transport read failure
    ReadError,
    /// The dispatcher is gone
    QueueClosed,
}

/// Run the receive loop for `id` until the client goes away.
pub async fn receive_loop<C, S, E>(hub: Arc<Hub<C>>, id: ConnectionId, mut stream: S) -> LoopExit
where
    C: Connection,
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: Display,
{
    let max_len = hub.config().max_message_bytes;

    let exit = loop {
        let payload = match stream.next().await {
            Some(Ok(WsMessage::Text(text))) => text.as_str().as_bytes().to_vec(),
            Some(Ok(WsMessage::Binary(data))) => data.to_vec(),
            Some(Ok(WsMessage::Close(_))) | None => {
                log::info!("Connection {id} closed by peer");
                break LoopExit::Closed;
            }
            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => continue,
            Some(Err(e)) => {
                log::warn!("Read error on connection {id}: {e}");
                break LoopExit::ReadError;
            }
        };

        let message = match Message::decode_limited(&payload, max_len) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("Dropping malformed message from connection {id}: {e}");
                hub.record_rejected();
                continue;
            }
        };

        log::trace!("Connection {id} submitted {} bytes", message.text().len());
        if let Err(e) = hub.submit(message).await {
            log::error!("Ending receive loop for {id}: {e}");
            break LoopExit::QueueClosed;
        }
    };

    hub.deregister(id).await;
    exit
}
