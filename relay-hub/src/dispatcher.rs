//! Single consumer of the inbound queue.
//!
//! Each message is rendered once and written to every registered
//! connection before the next message is taken off the queue. A failed
//! write evicts that connection and the pass continues with the rest.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::hub::Hub;
use crate::message::Message;
use crate::registry::{FanOut, Visit};
use crate::render::render_message;

/// Owns the receiving end of a hub's inbound queue.
pub struct Dispatcher<C> {
    hub: Arc<Hub<C>>,
    inbound: mpsc::Receiver<Message>,
}

impl<C: Connection> Dispatcher<C> {
    pub(crate) fn new(hub: Arc<Hub<C>>, inbound: mpsc::Receiver<Message>) -> Self {
        Self { hub, inbound }
    }

    /// Drain the queue for the life of the process.
    ///
    /// The dispatcher keeps the hub, and with it the queue's sender, alive.
    pub async fn run(self) {
        let Self { hub, mut inbound } = self;
        log::info!("Dispatcher started for hub {}", hub.id());
        while let Some(message) = inbound.recv().await {
            fan_out(&hub, &message).await;
        }
        log::info!("Dispatcher stopped for hub {}", hub.id());
    }

    /// Fan one message out to every live connection.
    pub async fn dispatch(&self, message: &Message) -> FanOut {
        fan_out(&self.hub, message).await
    }

    #[cfg(test)]
    pub(crate) fn next_queued(&mut self) -> Option<Message> {
        self.inbound.try_recv().ok()
    }
}

async fn fan_out<C: Connection>(hub: &Hub<C>, message: &Message) -> FanOut {
    let frame = render_message(message);

    let summary = hub
        .registry()
        .for_each(|conn| {
            let frame = frame.clone();
            async move {
                match conn.send(frame).await {
                    Ok(()) => Visit::Keep,
                    Err(e) => {
                        log::warn!("Write to connection {} failed: {e}", conn.id());
                        Visit::Evict
                    }
                }
            }
        })
        .await;

    let stats = &hub.stats;
    stats.messages_dispatched.fetch_add(1, Ordering::Relaxed);
    stats
        .frames_delivered
        .fetch_add(summary.kept as u64, Ordering::Relaxed);
    stats
        .connections_evicted
        .fetch_add(summary.evicted as u64, Ordering::Relaxed);

    log::debug!(
        "Dispatched {} bytes to {} connections ({} evicted)",
        frame.len(),
        summary.kept,
        summary.evicted
    );
    summary
}
