//! Write half of a client connection.

use std::fmt;
use std::future::Future;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::Result;
use crate::message::Frame;

/// Identity of one connection, assigned when its handle is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound side of one client channel.
///
/// Only the dispatcher calls `send`. `close` may run after the transport
/// has already failed and must not error in that case.
pub trait Connection: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    /// Write one frame to the client.
    fn send(&self, frame: Frame) -> impl Future<Output = Result<()>> + Send;

    /// Close the transport. Errors are swallowed.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// A WebSocket sink registered with the hub.
pub struct WsConnection {
    id: ConnectionId,
    sink: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl WsConnection {
    /// Wrap the sink half of an upgraded socket under a fresh id.
    pub fn new(sink: SplitSink<WebSocket, WsMessage>) -> Self {
        Self {
            id: ConnectionId::new(),
            sink: Mutex::new(sink),
        }
    }
}

impl Connection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send(&self, frame: Frame) -> Result<()> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(frame.to_string().into())).await?;
        Ok(())
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            log::debug!("Close of connection {} after transport error: {e}", self.id);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::error::HubError;

    /// Records every frame it is sent; can be switched to fail writes.
    pub struct RecordingConnection {
        id: ConnectionId,
        frames: StdMutex<Vec<Frame>>,
        fail_writes: AtomicBool,
        closes: AtomicUsize,
    }

    impl RecordingConnection {
        pub fn new() -> Self {
            Self {
                id: ConnectionId::new(),
                frames: StdMutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
                closes: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            let conn = Self::new();
            conn.fail_writes.store(true, Ordering::SeqCst);
            conn
        }

        pub fn frames(&self) -> Vec<Frame> {
            self.frames.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    impl Connection for RecordingConnection {
        fn id(&self) -> ConnectionId {
            self.id
        }

        async fn send(&self, frame: Frame) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) || self.close_count() > 0 {
                return Err(HubError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "peer gone",
                )));
            }
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.as_uuid().to_string());
    }
}
