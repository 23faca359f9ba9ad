pub mod rtc;
mod transport;

pub use transport::{
    ConnectivityState, MediaError, MediaStream, MediaTransport, SdpKind, SessionDescription,
    TransportEvent,
};
