//! Experimental Hub command line client
//!
//! Joins a hub session as an experimenter or a participant, logs every
//! connection, peer and message event, and stops cleanly on Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # Experimenter against a local hub
//! cargo run -p exphub-client -- \
//!   --role experimenter \
//!   --negotiation-url http://localhost:8080/offer
//!
//! # Participant, configuration from a TOML file plus overrides
//! cargo run -p exphub-client -- \
//!   --config ./hub.toml \
//!   --session-id session-1 \
//!   --participant-id participant-7
//!
//! # Send one chat message once connected
//! cargo run -p exphub-client -- --chat "hello"
//! ```

use anyhow::Context;
use clap::Parser;
use exphub_core::{
    events, message_types, ConnectionConfig, ConnectionEvent, ConnectionState, MainConnection,
    UserRole,
};
use exphub_http::HttpNegotiator;
use exphub_webrtc::WebRtcTransportFactory;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Experimental Hub client
///
/// Flags override values loaded from `--config`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Client role: 'participant' or 'experimenter'
    #[arg(short, long, env = "HUB_ROLE")]
    role: Option<UserRole>,

    /// Session to join (participants)
    #[arg(long, env = "HUB_SESSION_ID")]
    session_id: Option<String>,

    /// Participant identity inside the session (participants)
    #[arg(long, env = "HUB_PARTICIPANT_ID")]
    participant_id: Option<String>,

    /// Negotiation endpoint receiving the initial offer
    #[arg(long, env = "HUB_NEGOTIATION_URL")]
    negotiation_url: Option<String>,

    /// STUN servers (comma-separated)
    #[arg(long, value_delimiter = ',', env = "HUB_STUN_SERVERS")]
    stun_servers: Vec<String>,

    /// Chat message to send once connected
    #[arg(long)]
    chat: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "HUB_LOG_JSON")]
    log_json: bool,
}

/// Message types logged when received on the relay channel
const LOGGED_MESSAGE_TYPES: &[&str] = &[
    message_types::SESSION_LIST,
    message_types::SUCCESS,
    message_types::ERROR,
    message_types::CHAT,
    message_types::MUTE,
];

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_handler = Arc::clone(&shutdown_flag);

    ctrlc::set_handler(move || {
        if shutdown_flag_handler.swap(true, Ordering::SeqCst) {
            eprintln!("Shutdown already in progress, forcing exit");
            std::process::exit(1);
        }
        eprintln!("Ctrl+C received, closing connection...");
    })
    .context("failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("hub-client-worker")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args, shutdown_flag))
}

async fn async_main(args: Args, shutdown_flag: Arc<AtomicBool>) -> anyhow::Result<()> {
    let chat = args.chat.clone();
    let config = build_config(args)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        role = %config.role,
        negotiation_url = %config.negotiation_url,
        stun_servers = ?config.stun_servers,
        "hub client starting"
    );

    let factory = Arc::new(
        WebRtcTransportFactory::new(&config).context("failed to build WebRTC transport factory")?,
    );
    let negotiator = Arc::new(
        HttpNegotiator::new(&config.negotiation_url)
            .context("failed to build negotiation client")?,
    );

    let main = MainConnection::new(config, factory, negotiator)?;
    log_events(&main, chat);

    main.start(Vec::new()).await?;

    // Wait for Ctrl+C or for the connection to end on its own
    while !shutdown_flag.load(Ordering::SeqCst) && !main.state().is_terminal() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    if main.state() == ConnectionState::Failed {
        warn!("connection failed");
    }

    main.stop(true).await;
    info!(state = %main.state(), "hub client stopped");
    Ok(())
}

/// Start from the TOML file (or defaults) and apply flag overrides
fn build_config(args: Args) -> anyhow::Result<ConnectionConfig> {
    let mut config = match &args.config {
        Some(path) => ConnectionConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => ConnectionConfig::default(),
    };

    if let Some(role) = args.role {
        config.role = role;
    }
    if args.session_id.is_some() {
        config.session_id = args.session_id;
    }
    if args.participant_id.is_some() {
        config.participant_id = args.participant_id;
    }
    if let Some(url) = args.negotiation_url {
        config.negotiation_url = url;
    }
    if !args.stun_servers.is_empty() {
        config.stun_servers = args.stun_servers;
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn log_events(main: &Arc<MainConnection>, chat: Option<String>) {
    let weak = Arc::downgrade(main);
    main.events()
        .on(events::CONNECTION_STATE_CHANGE, move |event: ConnectionEvent| {
            let weak = weak.clone();
            let chat = chat.clone();
            async move {
                let ConnectionEvent::StateChange(state) = event else {
                    return;
                };
                info!(state = %state, "connection state changed");

                if state != ConnectionState::Connected {
                    return;
                }
                let (Some(main), Some(text)) = (weak.upgrade(), chat) else {
                    return;
                };
                // Handlers run on the channel's event task
                tokio::spawn(async move {
                    if let Err(e) = main
                        .send_message(message_types::CHAT, json!({ "message": text }))
                        .await
                    {
                        warn!(error = %e, "failed to send chat message");
                    }
                });
            }
        });

    main.events()
        .on(events::REMOTE_STREAM_CHANGE, |event: ConnectionEvent| async move {
            if let ConnectionEvent::RemoteStreamChange(stream) = event {
                info!(tracks = stream.len(), "relay media changed");
            }
        });

    main.events()
        .on(events::CONNECTED_PEERS_CHANGE, |event: ConnectionEvent| async move {
            if let ConnectionEvent::ConnectedPeersChange(peers) = event {
                let ids: Vec<&str> = peers.iter().map(|p| p.id.as_str()).collect();
                info!(count = peers.len(), peers = ?ids, "connected peers changed");
            }
        });

    for &msg_type in LOGGED_MESSAGE_TYPES {
        main.api().on(msg_type, move |data: Value| async move {
            info!(message_type = %msg_type, data = %data, "message received");
        });
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
