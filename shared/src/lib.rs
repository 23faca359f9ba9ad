use serde::{Deserialize, Serialize};

/// Negotiation phase carried by a signaling message.
///
/// `Offer` flows client → server and implicitly establishes the routing
/// identity. `Answer` and `Update` flow server → client; an `Update` is a
/// server-initiated renegotiation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SignalingType {
    Offer,
    Answer,
    Update,
}

/// The wire envelope for negotiation messages.
///
/// The `sdp` payload is an opaque session description, never interpreted by
/// the signaling layer. `user_name` is the routing identity the server keys
/// its registry on; `room_name` is an advisory grouping key. Server-sent
/// messages do not promise meaningful values for either, so both default to
/// empty when absent.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignalingMessage {
    #[serde(rename = "type")]
    pub signaling_type: SignalingType,
    pub sdp: String,
    #[serde(default)]
    pub room_name: String,
    #[serde(default)]
    pub user_name: String,
}

impl SignalingMessage {
    pub fn offer(
        sdp: impl Into<String>,
        room_name: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            signaling_type: SignalingType::Offer,
            sdp: sdp.into(),
            room_name: room_name.into(),
            user_name: user_name.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            signaling_type: SignalingType::Answer,
            sdp: sdp.into(),
            room_name: String::new(),
            user_name: user_name.into(),
        }
    }

    pub fn update(sdp: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            signaling_type: SignalingType::Update,
            sdp: sdp.into(),
            room_name: String::new(),
            user_name: user_name.into(),
        }
    }
}
