use heimdall::SignalingRouter;
use tokio::sync::mpsc;

const OFFER_BUF: usize = 64;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let listen_addr =
        std::env::var("HEIMDALL_ADDR").unwrap_or_else(|_| "0.0.0.0:30000".to_string());

    let (offer_tx, mut offer_rx) = mpsc::channel(OFFER_BUF);
    let router = SignalingRouter::new(offer_tx);

    // The SFU-side delegate consumes offers from this channel and answers
    // through `router.handle().update_sdp(..)`. Standalone, incoming offers
    // are only logged.
    tokio::spawn(async move {
        while let Some(offer) = offer_rx.recv().await {
            tracing::info!("Offer from `{}` awaiting SFU delegate", offer.user_name);
        }
    });

    router.listen(listen_addr).await
}
