//! WebSocket transport for the chat hub.

use crate::endpoint::{ChatEndpoint, ChatTurn};
use crate::error::ServerError;
use crate::outbox::{ConnectionOutbox, Delivery, Hub};
use crate::protocol::{ClientMessage, ServerEvent};
use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use runtime::{ChatClient, ToolHost};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Path the hub is served under.
pub const HUB_PATH: &str = "/chathub";

/// Shared state of every connection.
pub struct HubState<H, C> {
    endpoint: Arc<ChatEndpoint<H, C>>,
    hub: Hub,
    delivery: Delivery,
    shutdown: CancellationToken,
}

impl<H, C> Clone for HubState<H, C> {
    fn clone(&self) -> Self {
        Self {
            endpoint: Arc::clone(&self.endpoint),
            hub: self.hub.clone(),
            delivery: self.delivery,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<H, C> HubState<H, C>
where
    H: ToolHost + 'static,
    C: ChatClient + 'static,
{
    pub fn new(endpoint: ChatEndpoint<H, C>, delivery: Delivery) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            hub: Hub::default(),
            delivery,
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the broadcast hub with one buffering `capacity` events per client.
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.hub = Hub::new(capacity);
        self
    }

    /// Token that stops the server and every open connection when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn dispatch(&self, frame: &str, outbox: &ConnectionOutbox, connection: &CancellationToken) {
        let message = match serde_json::from_str::<ClientMessage>(frame) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "ignoring unparseable frame");
                return;
            }
        };

        let endpoint = Arc::clone(&self.endpoint);
        let outbox = outbox.clone();
        match message {
            ClientMessage::SendMessage {
                user,
                message,
                history,
            } => {
                let turn = ChatTurn {
                    user,
                    message,
                    history,
                };
                let cancel = connection.child_token();
                tokio::spawn(async move {
                    endpoint.send_message(&outbox, turn, &cancel).await;
                });
            }
            ClientMessage::GetAvailableTools => {
                tokio::spawn(async move {
                    endpoint.get_available_tools(&outbox).await;
                });
            }
        }
    }
}

/// Build the hub router.
pub fn router<H, C>(state: HubState<H, C>) -> Router
where
    H: ToolHost + 'static,
    C: ChatClient + 'static,
{
    Router::new()
        .route(HUB_PATH, get(ws_handler::<H, C>))
        .with_state(state)
}

/// Serve the hub on `addr` until the state's shutdown token fires.
pub async fn serve<H, C>(state: HubState<H, C>, addr: SocketAddr) -> Result<(), ServerError>
where
    H: ToolHost + 'static,
    C: ChatClient + 'static,
{
    let shutdown = state.shutdown_token();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    info!(%addr, path = HUB_PATH, "hub ready to accept connections");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(ServerError::Serve)
}

async fn ws_handler<H, C>(
    ws: WebSocketUpgrade,
    State(state): State<HubState<H, C>>,
) -> impl IntoResponse
where
    H: ToolHost + 'static,
    C: ChatClient + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<H, C>(mut socket: WebSocket, state: HubState<H, C>)
where
    H: ToolHost + 'static,
    C: ChatClient + 'static,
{
    let connection_id = Uuid::new_v4();
    let connection = state.shutdown.child_token();
    let (caller_tx, mut caller_rx) = mpsc::unbounded_channel();
    let outbox = ConnectionOutbox::new(state.hub.clone(), caller_tx, state.delivery);
    let mut broadcasts = state.hub.subscribe();
    info!(%connection_id, "client connected");

    loop {
        let event = tokio::select! {
            _ = connection.cancelled() => break,
            received = broadcasts.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%connection_id, skipped, "client lagging; events dropped");
                    lag_notice(skipped)
                }
                Err(RecvError::Closed) => break,
            },
            Some(event) = caller_rx.recv() => event,
            inbound = socket.recv() => {
                let Some(Ok(message)) = inbound else {
                    break;
                };
                match message {
                    Message::Text(text) => state.dispatch(text.as_str(), &outbox, &connection),
                    Message::Close(_) => break,
                    _ => {}
                }
                continue;
            }
        };

        if send_event(&mut socket, &event).await.is_err() {
            break;
        }
    }

    connection.cancel();
    info!(%connection_id, "client disconnected");
}

/// Tells a lagging client that part of the output never reached it.
fn lag_notice(skipped: u64) -> ServerEvent {
    ServerEvent::system(format!(
        "Error: {skipped} updates were dropped because this connection fell behind"
    ))
}

async fn send_event(socket: &mut WebSocket, event: &ServerEvent) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(error) => {
            warn!(%error, "failed to encode event");
            return Ok(());
        }
    };
    debug!(frame = %json, "sending frame");
    socket.send(Message::Text(json.into())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_notice_is_a_system_error() {
        let ServerEvent::ReceiveMessage { sender, text } = lag_notice(7) else {
            panic!("expected a receiveMessage event");
        };
        assert_eq!(sender, crate::protocol::SYSTEM_SENDER);
        assert!(text.starts_with("Error: 7 updates were dropped"));
    }
}
