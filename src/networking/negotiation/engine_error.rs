use sigrun_shared::SignalingType;

use crate::{media::MediaError, networking::SignalingError, networking::negotiation::Phase};

#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    #[error("Operation `{operation}` is not valid in phase {phase:?}")]
    InvalidPhase { operation: &'static str, phase: Phase },
    #[error("Unexpected {message_type:?} message in phase {phase:?}")]
    UnexpectedMessage { message_type: SignalingType, phase: Phase },
    #[error("Media transport error: {0}")]
    Media(#[from] MediaError),
    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),
}
