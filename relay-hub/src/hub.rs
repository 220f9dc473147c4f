//! The hub: connection registry plus the inbound message queue.
//!
//! ```text
//! receive loop A ──┐
//! receive loop B ──┼── mpsc queue ── Dispatcher ── render ──┬── conn A
//! receive loop C ──┘                                         ├── conn B
//!                                                            └── conn C
//! ```
//!
//! One hub exists per process. It is constructed once and shared behind an
//! `Arc`; the queue's single receiver lives in the [`Dispatcher`] returned
//! alongside it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionId};
use crate::dispatcher::Dispatcher;
use crate::error::{HubError, Result};
use crate::message::Message;
use crate::registry::ConnectionRegistry;

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Messages buffered between receive loops and the dispatcher. A full
    /// queue suspends submitting receive loops.
    pub queue_capacity: usize,
    /// Largest inbound payload accepted, in bytes
    pub max_message_bytes: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_message_bytes: 64 * 1024,
        }
    }
}

/// Hub statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Messages accepted onto the queue
    pub messages_received: u64,
    /// Payloads that failed to decode
    pub messages_rejected: u64,
    /// Messages fanned out by the dispatcher
    pub messages_dispatched: u64,
    /// Successful per-connection writes
    pub frames_delivered: u64,
    /// Connections removed after a failed write
    pub connections_evicted: u64,
    /// Currently registered connections
    pub active_connections: usize,
}

/// Counters updated on the hot path without taking a lock.
#[derive(Default)]
pub(crate) struct AtomicHubStats {
    pub(crate) messages_received: AtomicU64,
    pub(crate) messages_rejected: AtomicU64,
    pub(crate) messages_dispatched: AtomicU64,
    pub(crate) frames_delivered: AtomicU64,
    pub(crate) connections_evicted: AtomicU64,
}

/// Shared state of one relay: live connections and the inbound queue.
pub struct Hub<C> {
    id: Uuid,
    config: HubConfig,
    registry: ConnectionRegistry<C>,
    inbound: mpsc::Sender<Message>,
    pub(crate) stats: AtomicHubStats,
}

impl<C: Connection> Hub<C> {
    /// Create the hub and its dispatcher.
    ///
    /// The dispatcher owns the only receiver of the inbound queue; spawn
    /// [`Dispatcher::run`] to start delivering.
    pub fn new(config: HubConfig) -> (Arc<Self>, Dispatcher<C>) {
        let (inbound, rx) = mpsc::channel(config.queue_capacity.max(1));
        let hub = Arc::new(Self {
            id: Uuid::new_v4(),
            config,
            registry: ConnectionRegistry::new(),
            inbound,
            stats: AtomicHubStats::default(),
        });
        log::info!(
            "Hub {} created (queue capacity {})",
            hub.id,
            hub.config.queue_capacity
        );
        let dispatcher = Dispatcher::new(hub.clone(), rx);
        (hub, dispatcher)
    }

    /// Create with default configuration.
    pub fn with_defaults() -> (Arc<Self>, Dispatcher<C>) {
        Self::new(HubConfig::default())
    }

    /// Get the hub id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &ConnectionRegistry<C> {
        &self.registry
    }

    /// Add a connection. See [`ConnectionRegistry::register`].
    pub async fn register(&self, conn: Arc<C>) -> bool {
        self.registry.register(conn).await
    }

    /// Remove and close a connection. See [`ConnectionRegistry::deregister`].
    pub async fn deregister(&self, id: ConnectionId) -> bool {
        self.registry.deregister(id).await
    }

    /// Enqueue a message for broadcast.
    ///
    /// Suspends while the queue is full. The only error is
    /// [`HubError::QueueClosed`], once the dispatcher has stopped.
    pub async fn submit(&self, message: Message) -> Result<()> {
        self.inbound
            .send(message)
            .await
            .map_err(|_| HubError::QueueClosed)?;
        self.stats.messages_received.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Count a payload that failed to decode.
    pub fn record_rejected(&self) {
        self.stats.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a statistics snapshot.
    pub async fn stats(&self) -> HubStats {
        HubStats {
            messages_received: self.stats.messages_received.load(Ordering::Relaxed),
            messages_rejected: self.stats.messages_rejected.load(Ordering::Relaxed),
            messages_dispatched: self.stats.messages_dispatched.load(Ordering::Relaxed),
            frames_delivered: self.stats.frames_delivered.load(Ordering::Relaxed),
            connections_evicted: self.stats.connections_evicted.load(Ordering::Relaxed),
            active_connections: self.registry.len().await,
        }
    }
}
