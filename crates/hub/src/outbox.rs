//! Outbound delivery to connected clients.

use crate::protocol::ServerEvent;
use serde::Deserialize;
use std::future::Future;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

/// Events buffered per subscriber before a slow client starts lagging.
pub const DEFAULT_HUB_CAPACITY: usize = 1024;

/// Who receives chat output that is addressed to "all clients".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Every connected client sees every turn.
    #[default]
    Broadcast,
    /// Only the connection that started the turn sees it.
    Caller,
}

/// Where the session endpoint sends its notifications.
pub trait Outbox: Send + Sync {
    /// Send to every client in the audience of a chat turn.
    fn all(&self, event: ServerEvent) -> impl Future<Output = ()> + Send;

    /// Send only to the client that made the request.
    fn caller(&self, event: ServerEvent) -> impl Future<Output = ()> + Send;
}

/// Fan-out point shared by all connections.
#[derive(Debug, Clone)]
pub struct Hub {
    events: broadcast::Sender<ServerEvent>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_HUB_CAPACITY)
    }
}

impl Hub {
    /// Hub keeping up to `capacity` events (at least one) per subscriber.
    ///
    /// A subscriber that falls further behind loses the oldest events.
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self { events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    /// Publish to every subscriber. Having no subscribers is not an error.
    pub fn publish(&self, event: ServerEvent) {
        if self.events.send(event).is_err() {
            debug!("no clients connected; event dropped");
        }
    }
}

/// Outbox of one socket connection.
#[derive(Debug, Clone)]
pub struct ConnectionOutbox {
    hub: Hub,
    caller: mpsc::UnboundedSender<ServerEvent>,
    delivery: Delivery,
}

impl ConnectionOutbox {
    pub fn new(hub: Hub, caller: mpsc::UnboundedSender<ServerEvent>, delivery: Delivery) -> Self {
        Self {
            hub,
            caller,
            delivery,
        }
    }

    fn send_to_caller(&self, event: ServerEvent) {
        if self.caller.send(event).is_err() {
            debug!("caller disconnected; event dropped");
        }
    }
}

impl Outbox for ConnectionOutbox {
    async fn all(&self, event: ServerEvent) {
        match self.delivery {
            Delivery::Broadcast => self.hub.publish(event),
            Delivery::Caller => self.send_to_caller(event),
        }
    }

    async fn caller(&self, event: ServerEvent) {
        self.send_to_caller(event);
    }
}
