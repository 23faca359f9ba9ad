use std::{collections::HashMap, sync::Arc};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{sink::SinkExt, stream::StreamExt};
use sigrun_shared::{SignalingMessage, SignalingType};
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::{RwLock, mpsc},
};
use uuid::Uuid;

const PEER_MSG_BUF: usize = 100;

type Registry = Arc<RwLock<HashMap<String, mpsc::Sender<SignalingMessage>>>>;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("No channel registered for user `{user_name}`")]
    RoutingMiss { user_name: String },
    #[error("Channel for user `{user_name}` is closed")]
    ChannelClosed { user_name: String },
}

#[derive(Debug, Clone)]
struct RouterState {
    registry: Registry,
    offer_tx: mpsc::Sender<SignalingMessage>,
}

/// Lookup-and-forward handle over the identity registry, cloned out to the
/// SFU-side delegate. Forwarding never creates registry entries.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    registry: Registry,
}

impl RouterHandle {
    /// Sends `message` to the channel registered for `message.user_name`.
    ///
    /// A routing miss is reported as a typed error but is otherwise
    /// harmless; callers are free to ignore it and keep the historical
    /// silent-drop behavior.
    pub async fn update_sdp(&self, message: SignalingMessage) -> Result<(), RouterError> {
        let tx = {
            let registry = self.registry.read().await;
            registry.get(&message.user_name).cloned()
        };

        match tx {
            Some(tx) => tx.send(message).await.map_err(|e| RouterError::ChannelClosed {
                user_name: e.0.user_name,
            }),
            None => {
                tracing::debug!("No channel for user `{}`, message dropped", message.user_name);
                Err(RouterError::RoutingMiss { user_name: message.user_name })
            }
        }
    }
}

/// Terminates inbound signaling channels and maintains the
/// identity → channel registry.
///
/// Every inbound `offer` registers (or replaces) its sender under the
/// message's `userName` and is forwarded to the delegate channel; the
/// delegate answers through [`RouterHandle::update_sdp`].
#[derive(Debug)]
pub struct SignalingRouter {
    state: RouterState,
}

impl SignalingRouter {
    pub fn new(offer_tx: mpsc::Sender<SignalingMessage>) -> Self {
        Self {
            state: RouterState {
                registry: Arc::new(RwLock::new(HashMap::new())),
                offer_tx,
            },
        }
    }

    pub fn handle(&self) -> RouterHandle {
        RouterHandle { registry: self.state.registry.clone() }
    }

    pub async fn listen(
        &self,
        listen_addr: impl ToSocketAddrs + std::fmt::Debug,
    ) -> anyhow::Result<()> {
        let router =
            Router::new().route("/ws", get(Self::ws_handler)).with_state(self.state.clone());
        tracing::info!("Signaling router listening on {:?}", listen_addr);

        let listener = TcpListener::bind(listen_addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }

    async fn ws_handler(
        ws: WebSocketUpgrade,
        State(state): State<RouterState>,
    ) -> impl IntoResponse {
        ws.on_upgrade(|socket| Self::handle_socket(socket, state))
    }

    async fn handle_socket(socket: WebSocket, state: RouterState) {
        // Connections have no identity until their first offer arrives;
        // until then this id names them in the logs.
        let conn_id = Uuid::new_v4();
        tracing::info!("New WebSocket connection {}", conn_id);

        let (mut sender, mut receiver) = socket.split();

        let (tx, mut rx) = mpsc::channel(PEER_MSG_BUF);

        // This task serializes outbound messages to the client.
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match serde_json::to_string(&msg) {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Failed to serialize signaling message: {}", e),
                }
            }
        });

        let mut identity = None;
        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            Self::handle_frame(&state, &tx, &mut identity, &text, conn_id).await;
        }

        tracing::info!("Connection {} closed", conn_id);
        Self::deregister(&state, identity.as_deref(), &tx).await;
    }

    /// Parses one inbound frame and dispatches it. A malformed payload is
    /// fatal to that message only: it is dropped and logged, the channel
    /// stays open and the registry is untouched.
    async fn handle_frame(
        state: &RouterState,
        peer_tx: &mpsc::Sender<SignalingMessage>,
        identity: &mut Option<String>,
        text: &str,
        conn_id: Uuid,
    ) {
        match serde_json::from_str::<SignalingMessage>(text) {
            Ok(message) => Self::route_inbound(state, peer_tx, identity, message, conn_id).await,
            Err(e) => {
                tracing::error!("Dropping malformed signaling message from {}: {}", conn_id, e);
            }
        }
    }

    async fn route_inbound(
        state: &RouterState,
        peer_tx: &mpsc::Sender<SignalingMessage>,
        identity: &mut Option<String>,
        message: SignalingMessage,
        conn_id: Uuid,
    ) {
        match message.signaling_type {
            SignalingType::Offer => {
                tracing::info!("Offer from `{}` ({})", message.user_name, conn_id);
                {
                    let mut registry = state.registry.write().await;
                    // A second offer from the same identity replaces the
                    // stored channel.
                    registry.insert(message.user_name.clone(), peer_tx.clone());
                }
                *identity = Some(message.user_name.clone());

                if state.offer_tx.send(message).await.is_err() {
                    tracing::error!("Offer delegate is gone, dropping offer");
                }
            }
            other => {
                tracing::debug!("{:?} received from {}, not routed", other, conn_id);
            }
        }
    }

    /// Removes the identity's registry entry on socket teardown, but only if
    /// the stored sender still belongs to this socket. An entry replaced by
    /// a newer offer from the same identity must survive the old socket
    /// going away.
    async fn deregister(
        state: &RouterState,
        identity: Option<&str>,
        peer_tx: &mpsc::Sender<SignalingMessage>,
    ) {
        let Some(user_name) = identity else {
            return;
        };
        let mut registry = state.registry.write().await;
        if registry.get(user_name).is_some_and(|current| current.same_channel(peer_tx)) {
            registry.remove(user_name);
            tracing::info!("User `{}` disconnected", user_name);
        }
    }
}
