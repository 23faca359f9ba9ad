use std::sync::Arc;

use sigrun_shared::{SignalingMessage, SignalingType};
use tokio::sync::mpsc;

use crate::{
    media::{
        ConnectivityState, MediaStream, MediaTransport, SessionDescription, TransportEvent,
    },
    networking::{SignalingChannel, negotiation::NegotiationError},
};

type Result<T> = std::result::Result<T, NegotiationError>;

/// Negotiation phase of one peer session. The phase gates which operations
/// are currently legal; illegal ones fail with a typed error instead of
/// corrupting the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Offering,
    Negotiated,
    Renegotiating,
    Disconnected,
}

/// Commands a host application can issue to a running engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    Disconnect,
}

/// Drives exactly one outbound negotiation against the SFU and stays
/// responsive to server-initiated renegotiation.
///
/// The engine owns its signaling channel and a handle to the media
/// transport. All methods take `&mut self`, so at most one negotiation step
/// runs per session at a time; the [`run`](NegotiationEngine::run) loop
/// awaits each step before selecting the next event.
///
/// After [`disconnect`](NegotiationEngine::disconnect) the engine is
/// terminal. Reconnection requires a new instance.
#[derive(Debug)]
pub struct NegotiationEngine<T: MediaTransport> {
    transport: Arc<T>,
    signaling: SignalingChannel,
    phase: Phase,
    local_stream_id: Option<String>,
    remote_stream_tx: mpsc::Sender<T::RemoteMedia>,
}

impl<T: MediaTransport> NegotiationEngine<T> {
    /// New remote streams surfaced by the transport are forwarded on
    /// `remote_stream_tx` — the engine's sole upward data path.
    pub fn new(
        transport: Arc<T>,
        signaling: SignalingChannel,
        remote_stream_tx: mpsc::Sender<T::RemoteMedia>,
    ) -> Self {
        Self {
            transport,
            signaling,
            phase: Phase::Idle,
            local_stream_id: None,
            remote_stream_tx,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Attaches the local media, synthesizes an offer and sends it to the
    /// SFU. Only legal while `Idle`. On failure the engine stays in `Idle`,
    /// so the caller may retry on the same instance; a retry reuses the
    /// media already attached by the failed attempt.
    pub async fn connect(
        &mut self,
        local_media: T::LocalMedia,
        room_name: &str,
        user_name: &str,
    ) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(NegotiationError::InvalidPhase {
                operation: "connect",
                phase: self.phase,
            });
        }

        self.send_offer(local_media, room_name, user_name).await?;
        self.phase = Phase::Offering;
        Ok(())
    }

    async fn send_offer(
        &mut self,
        local_media: T::LocalMedia,
        room_name: &str,
        user_name: &str,
    ) -> Result<()> {
        // A failed attempt leaves the media attached to the transport; a
        // retry must not attach it a second time.
        if self.local_stream_id.is_none() {
            let stream_id = local_media.stream_id().to_owned();
            self.transport.attach_local(local_media).await?;
            self.local_stream_id = Some(stream_id);
        }

        let offer = self.transport.create_offer().await?;
        let message = SignalingMessage::offer(offer.sdp.clone(), room_name, user_name);
        self.transport.set_local_description(offer).await?;

        self.signaling.send(message).await?;
        tracing::info!("Sent offer for user `{}` in room `{}`", user_name, room_name);
        Ok(())
    }

    /// Applies one inbound signaling message according to the current phase.
    pub async fn handle_message(&mut self, message: SignalingMessage) -> Result<()> {
        match message.signaling_type {
            SignalingType::Answer => self.apply_answer(message.sdp).await,
            SignalingType::Update => self.apply_update(message.sdp).await,
            // The SFU never sends offers to a client.
            SignalingType::Offer => Err(NegotiationError::UnexpectedMessage {
                message_type: SignalingType::Offer,
                phase: self.phase,
            }),
        }
    }

    async fn apply_answer(&mut self, sdp: String) -> Result<()> {
        if self.phase != Phase::Offering {
            return Err(NegotiationError::UnexpectedMessage {
                message_type: SignalingType::Answer,
                phase: self.phase,
            });
        }

        self.transport
            .set_remote_description(SessionDescription::answer(sdp))
            .await?;
        self.phase = Phase::Negotiated;
        tracing::info!("Received answer, session negotiated");
        Ok(())
    }

    /// A server-initiated `update` is a fresh remote offer: apply it, then
    /// synthesize and set a local answer. The answer is not sent back over
    /// signaling; the SFU distributes remote answers out-of-band.
    async fn apply_update(&mut self, sdp: String) -> Result<()> {
        if self.phase != Phase::Negotiated {
            return Err(NegotiationError::UnexpectedMessage {
                message_type: SignalingType::Update,
                phase: self.phase,
            });
        }

        self.phase = Phase::Renegotiating;
        let result = self.renegotiate(sdp).await;
        self.phase = Phase::Negotiated;
        result
    }

    async fn renegotiate(&mut self, sdp: String) -> Result<()> {
        self.transport
            .set_remote_description(SessionDescription::offer(sdp))
            .await?;
        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer).await?;
        tracing::info!("Applied server-initiated update");
        Ok(())
    }

    /// Reacts to a connectivity or remote-stream event from the transport.
    pub async fn handle_transport_event(&mut self, event: TransportEvent<T::RemoteMedia>) {
        match event {
            TransportEvent::Connectivity(ConnectivityState::Disconnected) => {
                tracing::info!("Transport reported disconnected, tearing down session");
                self.disconnect().await;
            }
            TransportEvent::Connectivity(state) => {
                tracing::debug!("Connectivity state changed: {:?}", state);
            }
            TransportEvent::RemoteStream(remote) => {
                if Some(remote.stream_id()) == self.local_stream_id.as_deref() {
                    tracing::debug!("Ignoring echo of local stream `{}`", remote.stream_id());
                    return;
                }
                if self.remote_stream_tx.send(remote).await.is_err() {
                    tracing::debug!("Remote stream receiver dropped");
                }
            }
        }
    }

    /// Releases the media session and the signaling channel. Legal from any
    /// phase, including mid-negotiation; duplicate calls are no-ops.
    pub async fn disconnect(&mut self) {
        if self.phase == Phase::Disconnected {
            return;
        }
        self.phase = Phase::Disconnected;

        if let Err(e) = self.transport.close().await {
            tracing::error!("Failed to close media transport: {}", e);
        }
        self.signaling.close();
        tracing::info!("Session disconnected");
    }

    /// Event loop driving the engine until teardown: inbound signaling
    /// messages, transport events and host commands, one at a time.
    ///
    /// Negotiation failures are logged and absorbed here — non-fatal to the
    /// host application by policy. Callers wanting typed errors drive the
    /// `handle_*` methods directly instead.
    pub async fn run(
        mut self,
        mut signaling_rx: mpsc::Receiver<SignalingMessage>,
        mut transport_rx: mpsc::Receiver<TransportEvent<T::RemoteMedia>>,
        mut command_rx: mpsc::Receiver<EngineCommand>,
    ) {
        while self.phase != Phase::Disconnected {
            tokio::select! {
                message = signaling_rx.recv() => match message {
                    Some(message) => {
                        if let Err(e) = self.handle_message(message).await {
                            tracing::error!("Error handling signaling message: {}", e);
                        }
                    }
                    None => {
                        tracing::info!("Signaling channel closed by server");
                        self.disconnect().await;
                    }
                },
                event = transport_rx.recv() => match event {
                    Some(event) => self.handle_transport_event(event).await,
                    None => self.disconnect().await,
                },
                command = command_rx.recv() => match command {
                    Some(EngineCommand::Disconnect) | None => self.disconnect().await,
                },
            }
        }
        tracing::info!("Negotiation engine task finished.");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::media::{MediaError, SdpKind};

    // `super::*` pulls in the engine's single-argument `Result` alias, so
    // the mock's trait signatures need their own name for the plain one.
    type MediaResult<T> = std::result::Result<T, MediaError>;

    struct MockStream(&'static str);

    impl MediaStream for MockStream {
        fn stream_id(&self) -> &str {
            self.0
        }
    }

    #[derive(Default)]
    struct MockState {
        attached: Vec<String>,
        local_descriptions: Vec<SessionDescription>,
        remote_descriptions: Vec<SessionDescription>,
        close_calls: usize,
        fail_create_offer: bool,
    }

    #[derive(Default)]
    struct MockTransport {
        state: Mutex<MockState>,
    }

    impl MockTransport {
        fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
            f(&mut self.state.lock().unwrap())
        }
    }

    #[async_trait]
    impl MediaTransport for MockTransport {
        type LocalMedia = MockStream;
        type RemoteMedia = MockStream;

        async fn attach_local(&self, media: MockStream) -> MediaResult<()> {
            self.with(|s| s.attached.push(media.stream_id().to_owned()));
            Ok(())
        }

        async fn create_offer(&self) -> MediaResult<SessionDescription> {
            if self.with(|s| s.fail_create_offer) {
                return Err(MediaError::Synthesis("no codecs".into()));
            }
            Ok(SessionDescription::offer("mock-offer"))
        }

        async fn create_answer(&self) -> MediaResult<SessionDescription> {
            Ok(SessionDescription::answer("mock-answer"))
        }

        async fn set_local_description(&self, desc: SessionDescription) -> MediaResult<()> {
            self.with(|s| s.local_descriptions.push(desc));
            Ok(())
        }

        async fn set_remote_description(&self, desc: SessionDescription) -> MediaResult<()> {
            self.with(|s| s.remote_descriptions.push(desc));
            Ok(())
        }

        async fn close(&self) -> MediaResult<()> {
            self.with(|s| s.close_calls += 1);
            Ok(())
        }
    }

    struct Harness {
        transport: Arc<MockTransport>,
        engine: NegotiationEngine<MockTransport>,
        outbound_rx: mpsc::Receiver<SignalingMessage>,
        remote_rx: mpsc::Receiver<MockStream>,
    }

    fn harness() -> Harness {
        let transport = Arc::new(MockTransport::default());
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let (remote_tx, remote_rx) = mpsc::channel(8);
        let engine = NegotiationEngine::new(
            transport.clone(),
            SignalingChannel::from_sender(outbound_tx),
            remote_tx,
        );
        Harness { transport, engine, outbound_rx, remote_rx }
    }

    async fn negotiated(h: &mut Harness) {
        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();
        h.outbound_rx.try_recv().unwrap();
        h.engine
            .handle_message(SignalingMessage::answer("A1", "alice"))
            .await
            .unwrap();
        assert_eq!(h.engine.phase(), Phase::Negotiated);
    }

    #[tokio::test]
    async fn connect_sends_offer_and_enters_offering() {
        let mut h = harness();

        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();

        assert_eq!(h.engine.phase(), Phase::Offering);
        let sent = h.outbound_rx.try_recv().unwrap();
        assert_eq!(sent, SignalingMessage::offer("mock-offer", "lobby", "alice"));
        h.transport.with(|s| {
            assert_eq!(s.attached, vec!["local"]);
            assert_eq!(s.local_descriptions, vec![SessionDescription::offer("mock-offer")]);
        });
    }

    #[tokio::test]
    async fn connect_is_only_legal_from_idle() {
        let mut h = harness();
        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();

        let err = h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::InvalidPhase { operation: "connect", phase: Phase::Offering }
        ));
    }

    #[tokio::test]
    async fn failed_offer_synthesis_resets_to_idle() {
        let mut h = harness();
        h.transport.with(|s| s.fail_create_offer = true);

        let err = h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap_err();
        assert!(matches!(err, NegotiationError::Media(_)));
        assert_eq!(h.engine.phase(), Phase::Idle);
        assert!(h.outbound_rx.try_recv().is_err(), "no offer must go out");

        // The failure is non-fatal; a retry on the same instance works and
        // must not attach the local media a second time.
        h.transport.with(|s| s.fail_create_offer = false);
        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();
        assert_eq!(h.engine.phase(), Phase::Offering);
        h.transport.with(|s| assert_eq!(s.attached, vec!["local"]));
    }

    #[tokio::test]
    async fn answer_completes_negotiation() {
        let mut h = harness();
        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();

        h.engine
            .handle_message(SignalingMessage::answer("A1", "alice"))
            .await
            .unwrap();

        assert_eq!(h.engine.phase(), Phase::Negotiated);
        h.transport.with(|s| {
            assert_eq!(s.remote_descriptions, vec![SessionDescription::answer("A1")]);
        });
    }

    #[tokio::test]
    async fn answer_before_offer_is_rejected() {
        let mut h = harness();

        let err = h
            .engine
            .handle_message(SignalingMessage::answer("A1", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NegotiationError::UnexpectedMessage {
                message_type: SignalingType::Answer,
                phase: Phase::Idle,
            }
        ));
        assert_eq!(h.engine.phase(), Phase::Idle);
        h.transport.with(|s| assert!(s.remote_descriptions.is_empty()));
    }

    #[tokio::test]
    async fn update_renegotiates_without_outbound_message() {
        let mut h = harness();
        negotiated(&mut h).await;

        h.engine
            .handle_message(SignalingMessage::update("O2", "alice"))
            .await
            .unwrap();

        assert_eq!(h.engine.phase(), Phase::Negotiated);
        h.transport.with(|s| {
            assert_eq!(s.remote_descriptions[1], SessionDescription::offer("O2"));
            assert_eq!(s.local_descriptions[1], SessionDescription::answer("mock-answer"));
            assert_eq!(s.local_descriptions[1].kind, SdpKind::Answer);
        });
        assert!(h.outbound_rx.try_recv().is_err(), "update must not produce outbound traffic");
    }

    #[tokio::test]
    async fn update_outside_negotiated_is_rejected() {
        let mut h = harness();
        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();

        let err = h
            .engine
            .handle_message(SignalingMessage::update("O2", "alice"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            NegotiationError::UnexpectedMessage {
                message_type: SignalingType::Update,
                phase: Phase::Offering,
            }
        ));
    }

    #[tokio::test]
    async fn inbound_offer_is_a_protocol_violation() {
        let mut h = harness();
        negotiated(&mut h).await;

        let err = h
            .engine
            .handle_message(SignalingMessage::offer("O9", "lobby", "mallory"))
            .await
            .unwrap_err();
        assert!(matches!(err, NegotiationError::UnexpectedMessage { .. }));
    }

    #[tokio::test]
    async fn disconnect_is_terminal_and_idempotent() {
        let mut h = harness();
        negotiated(&mut h).await;

        h.engine.disconnect().await;
        h.engine.disconnect().await;

        assert_eq!(h.engine.phase(), Phase::Disconnected);
        h.transport.with(|s| assert_eq!(s.close_calls, 1));
        assert!(h.engine.signaling.is_closed());

        // No operation may produce outbound traffic afterwards.
        let err = h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap_err();
        assert!(matches!(err, NegotiationError::InvalidPhase { .. }));
        assert!(h
            .engine
            .handle_message(SignalingMessage::update("O3", "alice"))
            .await
            .is_err());
        assert!(h.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn connectivity_loss_tears_down_from_any_phase() {
        let mut h = harness();
        h.engine.connect(MockStream("local"), "lobby", "alice").await.unwrap();
        assert_eq!(h.engine.phase(), Phase::Offering);

        h.engine
            .handle_transport_event(TransportEvent::Connectivity(ConnectivityState::Disconnected))
            .await;
        assert_eq!(h.engine.phase(), Phase::Disconnected);

        // A duplicate disconnect event releases nothing twice.
        h.engine
            .handle_transport_event(TransportEvent::Connectivity(ConnectivityState::Disconnected))
            .await;
        h.transport.with(|s| assert_eq!(s.close_calls, 1));
    }

    #[tokio::test]
    async fn remote_streams_are_filtered_by_identity() {
        let mut h = harness();
        negotiated(&mut h).await;

        // Echo of the local stream is dropped.
        h.engine
            .handle_transport_event(TransportEvent::RemoteStream(MockStream("local")))
            .await;
        assert!(h.remote_rx.try_recv().is_err());

        h.engine
            .handle_transport_event(TransportEvent::RemoteStream(MockStream("sfu-mix")))
            .await;
        let remote = h.remote_rx.try_recv().unwrap();
        assert_eq!(remote.stream_id(), "sfu-mix");
    }

    #[tokio::test]
    async fn run_loop_disconnects_on_command() {
        let h = harness();
        let transport = h.transport.clone();
        let (_signaling_tx, signaling_rx) = mpsc::channel(8);
        let (_transport_tx, transport_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);

        let task = tokio::spawn(h.engine.run(signaling_rx, transport_rx, command_rx));
        command_tx.send(EngineCommand::Disconnect).await.unwrap();
        task.await.unwrap();

        transport.with(|s| assert_eq!(s.close_calls, 1));
    }
}
