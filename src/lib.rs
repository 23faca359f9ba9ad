pub mod config;
pub mod media;
pub mod networking;
pub mod session;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Signaling error: {0}")]
    SignalingError(#[from] networking::SignalingError),
    #[error("Negotiation error: {0}")]
    NegotiationError(#[from] networking::negotiation::NegotiationError),
    #[error("Media transport error: {0}")]
    MediaError(#[from] media::MediaError),
}

pub type Result<T> = std::result::Result<T, Error>;
