use async_trait::async_trait;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Description synthesis failed: {0}")]
    Synthesis(#[source] BoxError),
    #[error("Description could not be applied: {0}")]
    Apply(#[source] BoxError),
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),
}

/// Which side of the exchange a session description represents. Needed to
/// reconstruct the description on the peer API; the payload itself stays
/// opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// An opaque session description blob plus its negotiation role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

/// Health of the underlying media path, reported asynchronously by the
/// transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Disconnected,
}

/// Anything carrying a media stream identity. Used to tell remote streams
/// apart from the locally attached one.
pub trait MediaStream {
    fn stream_id(&self) -> &str;
}

/// Out-of-band events surfaced by a [`MediaTransport`] implementation.
#[derive(Debug)]
pub enum TransportEvent<R> {
    Connectivity(ConnectivityState),
    RemoteStream(R),
}

/// The typed capability interface the negotiation engine drives.
///
/// Implementations own the actual media machinery (peer connection, tracks,
/// packet transport); the engine only ever exchanges opaque session
/// descriptions with it. Connectivity and remote-stream events are delivered
/// separately through an `mpsc::Receiver<TransportEvent<Self::RemoteMedia>>`
/// handed out at construction time.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    type LocalMedia: MediaStream + Send;
    type RemoteMedia: MediaStream + Send + 'static;

    async fn attach_local(&self, media: Self::LocalMedia) -> Result<(), MediaError>;

    async fn create_offer(&self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), MediaError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), MediaError>;

    /// Releases the media session. Must be safe to call at any point,
    /// including mid-negotiation.
    async fn close(&self) -> Result<(), MediaError>;
}
