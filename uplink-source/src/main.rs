//! Uplink source entry point.
//!
//! ```text
//! uplink-source                       Run with uplink-source.toml
//! uplink-source --config <path>       Load a custom config TOML
//! uplink-source --gen-config          Write default config to stdout
//! uplink-source --route /dev/video1   Override the video source
//! ```
//!
//! `--route`, `--endpoint` and `--password` may also come from the
//! `VIDEO_FEED`, `WS_ENDPOINT` and `STREAM_PASSWORD` environment
//! variables. Settings still missing after that are prompted for.

use std::io;
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uplink_source::config::SourceConfig;
use uplink_source::service::UplinkService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "uplink-source", about = "Stream a local video source to a signaling server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "uplink-source.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Video device, file or URL (overrides `source.local_route`).
    #[arg(long, env = "VIDEO_FEED")]
    route: Option<String>,

    /// Signaling server URL (overrides `server.ws_endpoint`).
    #[arg(long, env = "WS_ENDPOINT")]
    endpoint: Option<String>,

    /// Source password (overrides `server.password`).
    #[arg(long, env = "STREAM_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&SourceConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config; a file that does not parse stops start-up untouched.
    let mut config = SourceConfig::load(&cli.config)?;

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if !cli.config.exists() {
        info!("no config at {}; using defaults", cli.config.display());
    }

    // Command line and environment take precedence over the file.
    if let Some(route) = cli.route {
        config.source.local_route = route;
    }
    if let Some(endpoint) = cli.endpoint {
        config.server.ws_endpoint = endpoint;
    }
    if let Some(password) = cli.password {
        config.server.password = password;
    }

    // Ask for anything still missing, then persist it.
    let stdin = io::stdin();
    if config.prompt_missing(&mut stdin.lock(), &mut io::stdout())? {
        config.save(&cli.config)?;
        info!("configuration saved to {}", cli.config.display());
    }

    info!("uplink-source v{}", env!("CARGO_PKG_VERSION"));
    info!("video source: {}", config.source.local_route);
    info!("endpoint: {}", config.server.ws_endpoint);
    info!("target FPS: {}", config.stream.target_fps);

    let service = UplinkService::new(config)?;
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.cancel();
    });

    service.run().await;

    Ok(())
}
