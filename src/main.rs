//! sharehost: share this machine's screen through a relay session.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sharehost_lib::capture::StaticCaptureSource;
use sharehost_lib::control::AlwaysApprove;
use sharehost_lib::input::EnigoInjector;
use sharehost_lib::overlay::NoopOverlay;
use sharehost_lib::peer::RtcPeerConnector;
use sharehost_lib::relay_api::HttpRelayApi;
use sharehost_lib::{logger, Collaborators, HostConfig, SessionOrchestrator};

#[derive(Parser)]
#[command(name = "sharehost", about = "Share this screen with viewers through a relay")]
struct Args {
    /// Session id handed out by the relay.
    #[arg(short, long)]
    session: String,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the signaling WebSocket URL.
    #[arg(long)]
    signaling_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = HostConfig::load(args.config.as_deref())?;
    if let Some(url) = args.signaling_url {
        config.signaling_url = url;
    }
    config.validate()?;
    logger::init(&config.log);

    let collaborators = Collaborators {
        relay: Arc::new(HttpRelayApi::new(&config.relay_api_url)?),
        capture: Arc::new(StaticCaptureSource {
            width: config.capture_width,
            height: config.capture_height,
        }),
        connector: Arc::new(RtcPeerConnector::new(&config)?),
        injector: Arc::new(EnigoInjector),
        overlay: Arc::new(NoopOverlay),
        control_policy: Arc::new(AlwaysApprove),
    };
    let host = SessionOrchestrator::new(config, collaborators);

    host.connect(&args.session).await?;
    tracing::info!(session_id = %args.session, "Sharing, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    host.end_session().await;
    Ok(())
}
