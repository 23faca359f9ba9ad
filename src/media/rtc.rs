use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use webrtc::{
    api::{
        APIBuilder,
        media_engine::{MIME_TYPE_H264, MediaEngine},
    },
    ice_transport::ice_server::RTCIceServer,
    media::Sample,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
    rtp_transceiver::rtp_codec::RTCRtpCodecCapability,
    track::{
        track_local::track_local_static_sample::TrackLocalStaticSample, track_remote::TrackRemote,
    },
};

use crate::media::{
    ConnectivityState, MediaError, MediaStream, MediaTransport, SdpKind, SessionDescription,
    TransportEvent,
};

const EVENT_BUF: usize = 16;

/// A locally produced media track the host application feeds with encoded
/// samples. Clones share the same underlying track.
#[derive(Debug, Clone)]
pub struct LocalTrack {
    stream_id: String,
    track: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    /// Creates an H264 video track under the given stream id.
    pub fn video(stream_id: impl Into<String>) -> Self {
        let stream_id = stream_id.into();
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability { mime_type: MIME_TYPE_H264.to_owned(), ..Default::default() },
            "video".to_owned(),
            stream_id.clone(),
        ));
        Self { stream_id, track }
    }

    pub async fn write_sample(&self, data: Bytes, duration: Duration) -> Result<(), MediaError> {
        let sample = Sample { data, duration, ..Default::default() };
        self.track
            .write_sample(&sample)
            .await
            .map_err(|e| MediaError::Transport(Box::new(e)))
    }
}

impl MediaStream for LocalTrack {
    fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

/// An inbound track surfaced by the peer connection.
#[derive(Clone)]
pub struct RemoteTrack {
    stream_id: String,
    track: Arc<TrackRemote>,
}

impl RemoteTrack {
    pub fn track(&self) -> &Arc<TrackRemote> {
        &self.track
    }
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack").field("stream_id", &self.stream_id).finish()
    }
}

impl MediaStream for RemoteTrack {
    fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

/// [`MediaTransport`] implementation backed by a `webrtc` peer connection.
#[derive(Debug)]
pub struct RtcMediaTransport {
    peer: Arc<RTCPeerConnection>,
}

impl RtcMediaTransport {
    /// Builds a peer connection with the default codec set and the given
    /// STUN server, returning the transport together with the receiver for
    /// its connectivity and remote-stream events.
    pub async fn new(
        stun_server: &str,
    ) -> Result<(Self, mpsc::Receiver<TransportEvent<RemoteTrack>>), MediaError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| MediaError::Transport(Box::new(e)))?;
        let api = APIBuilder::new().with_media_engine(media_engine).build();

        let config = RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: vec![stun_server.to_owned()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let peer = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| MediaError::Transport(Box::new(e)))?,
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUF);

        let connectivity_tx = event_tx.clone();
        peer.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            tracing::debug!("Peer connection state has changed: {}", s);
            let connectivity_tx = connectivity_tx.clone();
            Box::pin(async move {
                let state = match s {
                    RTCPeerConnectionState::Connected => ConnectivityState::Connected,
                    RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Closed => ConnectivityState::Disconnected,
                    _ => return,
                };
                if connectivity_tx.send(TransportEvent::Connectivity(state)).await.is_err() {
                    tracing::debug!("Transport event receiver dropped");
                }
            })
        }));

        peer.on_track(Box::new(move |track, _rtp_receiver, _rtp_transceiver| {
            tracing::debug!("Received track: {}", track.id());
            let event_tx = event_tx.clone();
            Box::pin(async move {
                let remote = RemoteTrack { stream_id: track.stream_id(), track };
                if event_tx.send(TransportEvent::RemoteStream(remote)).await.is_err() {
                    tracing::debug!("Transport event receiver dropped");
                }
            })
        }));

        tracing::info!("Peer connection created.");

        Ok((Self { peer }, event_rx))
    }
}

#[async_trait]
impl MediaTransport for RtcMediaTransport {
    type LocalMedia = LocalTrack;
    type RemoteMedia = RemoteTrack;

    async fn attach_local(&self, media: LocalTrack) -> Result<(), MediaError> {
        self.peer
            .add_track(Arc::clone(&media.track)
                as Arc<dyn webrtc::track::track_local::TrackLocal + Send + Sync>)
            .await
            .map_err(|e| MediaError::Transport(Box::new(e)))?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        let offer = self
            .peer
            .create_offer(None)
            .await
            .map_err(|e| MediaError::Synthesis(Box::new(e)))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        let answer = self
            .peer
            .create_answer(None)
            .await
            .map_err(|e| MediaError::Synthesis(Box::new(e)))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        let desc = to_rtc_description(desc)?;
        self.peer
            .set_local_description(desc)
            .await
            .map_err(|e| MediaError::Apply(Box::new(e)))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError> {
        let desc = to_rtc_description(desc)?;
        self.peer
            .set_remote_description(desc)
            .await
            .map_err(|e| MediaError::Apply(Box::new(e)))
    }

    async fn close(&self) -> Result<(), MediaError> {
        self.peer.close().await.map_err(|e| MediaError::Transport(Box::new(e)))
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, MediaError> {
    let result = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    result.map_err(|e| MediaError::Apply(Box::new(e)))
}
