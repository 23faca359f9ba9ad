pub mod signaling_router;

pub use signaling_router::{RouterError, RouterHandle, SignalingRouter};
