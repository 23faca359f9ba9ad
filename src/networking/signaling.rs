use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use sigrun_shared::SignalingMessage;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

use crate::networking::signaling_error::SignalingError;

type Result<T> = std::result::Result<T, SignalingError>;

const OUTBOUND_BUF: usize = 100;

/// Handle to an open signaling connection.
///
/// Messages are delivered in send order by the underlying WebSocket; there
/// are no sequence numbers, acknowledgements, or retries at this layer.
#[derive(Debug)]
pub struct SignalingChannel {
    outbound: Option<mpsc::Sender<SignalingMessage>>,
}

impl SignalingChannel {
    pub async fn send(&self, message: SignalingMessage) -> Result<()> {
        let outbound = self.outbound.as_ref().ok_or(SignalingError::ChannelClosed)?;
        outbound.send(message).await.map_err(|_| SignalingError::ChannelClosed)
    }

    /// Closes the channel. The writer task sends a Close frame and finishes;
    /// any later `send` fails with [`SignalingError::ChannelClosed`].
    /// Calling this more than once is harmless.
    pub fn close(&mut self) {
        self.outbound = None;
    }

    pub fn is_closed(&self) -> bool {
        self.outbound.is_none()
    }

    /// Builds a channel over a bare sender, without a WebSocket behind it.
    #[cfg(test)]
    pub(crate) fn from_sender(outbound: mpsc::Sender<SignalingMessage>) -> Self {
        Self { outbound: Some(outbound) }
    }
}

/// Connects to the signaling server, returning a channel handle used to send
/// messages to the server. Incoming messages from the server will be sent
/// to the `inbound_tx` channel.
pub async fn connect(
    server_url: &str,
    inbound_tx: mpsc::Sender<SignalingMessage>,
) -> Result<SignalingChannel> {
    let (ws_stream, _) =
        connect_async(server_url).await.map_err(SignalingError::ConnectionFailed)?;

    tracing::info!("Successfully connected to signaling server");

    let (write, read) = ws_stream.split();

    // Channel for sending messages to the server's writer task
    let (outbound_tx, outbound_rx) = mpsc::channel::<SignalingMessage>(OUTBOUND_BUF);

    spawn_writer_task(outbound_rx, write);
    spawn_reader_task(read, inbound_tx);

    Ok(SignalingChannel { outbound: Some(outbound_tx) })
}

fn spawn_writer_task(
    mut outbound_rx: mpsc::Receiver<SignalingMessage>,
    mut write: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
) {
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if write.send(Message::Text(json.into())).await.is_err() {
                        tracing::error!(
                            "Failed to send message to signaling server. WebSocket connection closed."
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize signaling message: {}", e);
                }
            }
        }
        // All senders dropped, the channel was closed on our side.
        if let Err(e) = write.send(Message::Close(None)).await {
            tracing::debug!("Failed to send close frame: {}", e);
        }
        tracing::info!("Signaling WebSocket writer task finished.");
    });
}

fn spawn_reader_task(
    mut read: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    inbound_tx: mpsc::Sender<SignalingMessage>,
) {
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            match message {
                Ok(msg) => {
                    if let Message::Text(text) = msg {
                        match serde_json::from_str::<SignalingMessage>(&text) {
                            Ok(signaling_message) => {
                                if inbound_tx.send(signaling_message).await.is_err() {
                                    tracing::error!(
                                        "Failed to send message to negotiation task. Channel closed."
                                    );
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::error!("Failed to deserialize signaling message: {}", e);
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Error receiving signaling message: {}", e);
                    break;
                }
            }
        }
        tracing::info!("Signaling WebSocket reader task finished.");
    });
}
