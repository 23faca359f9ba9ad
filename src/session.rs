use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    Result,
    config::Config,
    media::rtc::{LocalTrack, RemoteTrack, RtcMediaTransport},
    networking::{
        negotiation::{EngineCommand, NegotiationEngine},
        signaling,
    },
};

const INBOUND_BUF: usize = 100;
const REMOTE_STREAM_BUF: usize = 16;

/// Handle to a running peer session.
///
/// Dropping the handle tears the session down; [`disconnect`](Session::disconnect)
/// does so explicitly.
#[derive(Debug)]
pub struct Session {
    remote_streams: mpsc::Receiver<RemoteTrack>,
    commands: mpsc::Sender<EngineCommand>,
}

impl Session {
    /// Yields remote streams as the SFU routes them in. Returns `None` once
    /// the session is disconnected.
    pub async fn next_remote_stream(&mut self) -> Option<RemoteTrack> {
        self.remote_streams.recv().await
    }

    pub async fn disconnect(&self) {
        let _ = self.commands.send(EngineCommand::Disconnect).await;
    }
}

/// Connects signaling, builds the WebRTC transport, sends the initial offer
/// and spawns the negotiation loop.
pub async fn connect(config: &Config, local: LocalTrack) -> Result<Session> {
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUF);
    let channel = signaling::connect(&config.server_url, inbound_tx).await?;

    let (transport, transport_rx) = RtcMediaTransport::new(&config.stun_server).await?;

    let (remote_tx, remote_rx) = mpsc::channel(REMOTE_STREAM_BUF);
    let mut engine = NegotiationEngine::new(Arc::new(transport), channel, remote_tx);
    engine.connect(local, &config.room_name, &config.user_name).await?;

    let (command_tx, command_rx) = mpsc::channel(4);
    tokio::spawn(engine.run(inbound_rx, transport_rx, command_rx));

    Ok(Session { remote_streams: remote_rx, commands: command_tx })
}
