pub mod negotiation;
pub mod signaling;
mod signaling_error;

pub use signaling::SignalingChannel;
pub use signaling_error::SignalingError;
