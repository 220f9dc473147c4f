//! Set of live connections.
//!
//! Receive loops register and deregister concurrently while the dispatcher
//! iterates. Iteration works on a snapshot taken under the read lock, so
//! the lock is never held across a write to a client. Each snapshot entry
//! is checked for membership again right before its visit, so a
//! connection deregistered mid-pass is skipped. Eviction requests from the
//! visitor are applied after the pass.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::connection::{Connection, ConnectionId};

/// Visitor verdict for one connection during [`ConnectionRegistry::for_each`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Keep,
    Evict,
}

/// Outcome of one pass over the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Connections the visitor ran for. Entries removed mid-pass are not
    /// counted.
    pub visited: usize,
    /// Visits that returned [`Visit::Keep`]
    pub kept: usize,
    /// Connections this pass actually removed
    pub evicted: usize,
}

/// Live connections keyed by id.
pub struct ConnectionRegistry<C> {
    connections: RwLock<HashMap<ConnectionId, Arc<C>>>,
}

impl<C: Connection> ConnectionRegistry<C> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Add a connection. It becomes a broadcast target from the next pass.
    ///
    /// Returns `false` and leaves the set unchanged if the id is already
    /// registered.
    pub async fn register(&self, conn: Arc<C>) -> bool {
        let id = conn.id();
        let mut connections = self.connections.write().await;
        if connections.contains_key(&id) {
            log::warn!("Connection {id} registered twice, ignoring");
            return false;
        }
        connections.insert(id, conn);
        log::info!("Connection {id} registered. Total: {}", connections.len());
        true
    }

    /// Remove a connection and close it.
    ///
    /// Only the caller that removes the entry closes the transport, so
    /// concurrent calls for the same id close it exactly once. Returns
    /// whether this call removed it.
    pub async fn deregister(&self, id: ConnectionId) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            let removed = connections.remove(&id);
            if removed.is_some() {
                log::info!("Connection {id} deregistered. Remaining: {}", connections.len());
            }
            removed
        };

        match removed {
            Some(conn) => {
                conn.close().await;
                true
            }
            None => false,
        }
    }

    /// Run `f` once for every connection live at the start of the pass and
    /// still registered when its turn comes, in no particular order.
    /// Connections the visitor marks [`Visit::Evict`] are deregistered once
    /// all visits finish.
    pub async fn for_each<F, Fut>(&self, mut f: F) -> FanOut
    where
        F: FnMut(Arc<C>) -> Fut,
        Fut: Future<Output = Visit>,
    {
        let snapshot: Vec<Arc<C>> = self.connections.read().await.values().cloned().collect();

        let mut visited = 0;
        let mut kept = 0;
        let mut evict = Vec::new();
        for conn in &snapshot {
            if !self.contains(conn.id()).await {
                log::trace!("Connection {} left mid-pass, skipping", conn.id());
                continue;
            }
            visited += 1;
            match f(Arc::clone(conn)).await {
                Visit::Keep => kept += 1,
                Visit::Evict => evict.push(conn.id()),
            }
        }

        let mut evicted = 0;
        for id in evict {
            if self.deregister(id).await {
                evicted += 1;
            }
        }

        FanOut {
            visited,
            kept,
            evicted,
        }
    }

    /// Get the current connection count.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Ids of all registered connections, in no particular order.
    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.connections.read().await.keys().copied().collect()
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::RecordingConnection;

    #[tokio::test]
    async fn test_register_deregister() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::new());
        let id = conn.id();

        assert!(registry.register(conn.clone()).await);
        assert_eq!(registry.len().await, 1);
        assert!(registry.contains(id).await);

        assert!(registry.deregister(id).await);
        assert!(registry.is_empty().await);
        assert_eq!(conn.close_count(), 1);
    }

    #[tokio::test]
    async fn test_register_twice_keeps_one_entry() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::new());

        assert!(registry.register(conn.clone()).await);
        assert!(!registry.register(conn.clone()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_deregister_twice_closes_once() {
        let registry = ConnectionRegistry::new();
        let conn = Arc::new(RecordingConnection::new());
        let id = conn.id();
        registry.register(conn.clone()).await;

        assert!(registry.deregister(id).await);
        assert!(!registry.deregister(id).await);
        assert_eq!(conn.close_count(), 1);
        assert!(!registry.contains(id).await);
    }

    #[tokio::test]
    async fn test_racing_deregister_closes_once() {
        let registry = Arc::new(ConnectionRegistry::new());
        let conn = Arc::new(RecordingConnection::new());
        let id = conn.id();
        registry.register(conn.clone()).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.deregister(id).await })
            })
            .collect();

        let mut removed = 0;
        for h in handles {
            if h.await.unwrap() {
                removed += 1;
            }
        }

        assert_eq!(removed, 1);
        assert_eq!(conn.close_count(), 1);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_for_each_visits_all() {
        let registry = ConnectionRegistry::new();
        for _ in 0..5 {
            registry.register(Arc::new(RecordingConnection::new())).await;
        }

        let mut seen = 0;
        let fan_out = registry
            .for_each(|_| {
                seen += 1;
                async { Visit::Keep }
            })
            .await;

        assert_eq!(seen, 5);
        assert_eq!(fan_out, FanOut { visited: 5, kept: 5, evicted: 0 });
    }

    #[tokio::test]
    async fn test_for_each_evicts_after_pass() {
        let registry = ConnectionRegistry::new();
        let keep = Arc::new(RecordingConnection::new());
        let drop_a = Arc::new(RecordingConnection::new());
        let drop_b = Arc::new(RecordingConnection::new());
        registry.register(keep.clone()).await;
        registry.register(drop_a.clone()).await;
        registry.register(drop_b.clone()).await;

        let keep_id = keep.id();
        let fan_out = registry
            .for_each(|conn| {
                let verdict = if conn.id() == keep_id { Visit::Keep } else { Visit::Evict };
                async move { verdict }
            })
            .await;

        assert_eq!(fan_out.visited, 3);
        assert_eq!(fan_out.kept, 1);
        assert_eq!(fan_out.evicted, 2);
        assert_eq!(registry.ids().await, vec![keep_id]);
        assert_eq!(drop_a.close_count(), 1);
        assert_eq!(drop_b.close_count(), 1);
        assert_eq!(keep.close_count(), 0);
    }

    #[tokio::test]
    async fn test_for_each_eviction_of_already_removed() {
        let registry = Arc::new(ConnectionRegistry::new());
        let conn = Arc::new(RecordingConnection::new());
        let id = conn.id();
        registry.register(conn.clone()).await;

        // Receive loop removes the connection while the pass is in flight.
        let inner = registry.clone();
        let fan_out = registry
            .for_each(|c| {
                let inner = inner.clone();
                async move {
                    inner.deregister(c.id()).await;
                    Visit::Evict
                }
            })
            .await;

        assert_eq!(fan_out.visited, 1);
        assert_eq!(fan_out.kept, 0);
        assert_eq!(fan_out.evicted, 0);
        assert!(!registry.contains(id).await);
        assert_eq!(conn.close_count(), 1);
    }

    #[tokio::test]
    async fn test_for_each_skips_connection_removed_mid_pass() {
        let registry = Arc::new(ConnectionRegistry::new());
        let a = Arc::new(RecordingConnection::new());
        let b = Arc::new(RecordingConnection::new());
        registry.register(a.clone()).await;
        registry.register(b.clone()).await;
        let (a_id, b_id) = (a.id(), b.id());

        // The first visit removes the other connection, as its receive loop
        // would if the client hung up while the pass is running.
        let inner = registry.clone();
        let mut seen = Vec::new();
        let fan_out = registry
            .for_each(|conn| {
                let first = seen.is_empty();
                seen.push(conn.id());
                let other = if conn.id() == a_id { b_id } else { a_id };
                let inner = inner.clone();
                async move {
                    if first {
                        inner.deregister(other).await;
                    }
                    Visit::Keep
                }
            })
            .await;

        assert_eq!(fan_out, FanOut { visited: 1, kept: 1, evicted: 0 });
        assert_eq!(seen.len(), 1);
        let removed = if seen[0] == a_id { &b } else { &a };
        assert!(!seen.contains(&removed.id()));
        assert_eq!(removed.close_count(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_register_deregister() {
        let registry = Arc::new(ConnectionRegistry::new());
        let total = 50;
        let removed = 20;

        let conns: Vec<_> = (0..total).map(|_| Arc::new(RecordingConnection::new())).collect();

        let mut handles = Vec::new();
        for (i, conn) in conns.iter().cloned().enumerate() {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.register(conn.clone()).await;
                tokio::task::yield_now().await;
                if i < removed {
                    registry.deregister(conn.id()).await;
                }
            }));
        }

        // Iterate concurrently with the mutations.
        let passes = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    registry.for_each(|_| async { Visit::Keep }).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        for h in handles {
            h.await.unwrap();
        }
        passes.await.unwrap();

        assert_eq!(registry.len().await, total - removed);
        let mut ids = registry.ids().await;
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), total - removed);
        for conn in &conns[..removed] {
            assert!(!registry.contains(conn.id()).await);
        }
    }
}
