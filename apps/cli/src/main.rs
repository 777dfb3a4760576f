use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use xmboot_core::config::BootConfig;
use xmboot_core::flash::{FlashEngine, SimFlash};
use xmboot_core::handoff::{Handoff, VectorTable};
use xmboot_core::protocol::TransferMode;
use xmboot_core::session::BootSession;
use xmboot_core::transport::SerialPortTransport;

#[derive(Parser, Debug)]
#[command(author, version, about = "Xmodem firmware bootloader (hosted)", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Serial device to listen on (overrides the config file)
    #[arg(long)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(long)]
    baud: Option<u32>,

    /// Use the additive-checksum handshake instead of CRC
    #[arg(long)]
    checksum: bool,

    /// Dump the received flash image to this file before the handoff
    #[arg(long)]
    image_out: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Hosted stand-in for the jump into the application: report the vector
/// pair and end the bootloader's life.
struct ProcessHandoff;

impl Handoff for ProcessHandoff {
    fn handoff(self, vectors: VectorTable) -> ! {
        info!(
            initial_sp = %format!("{:#010x}", vectors.initial_sp),
            reset_vector = %format!("{:#010x}", vectors.reset_vector),
            "Handing control to the application image"
        );
        std::process::exit(0);
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => BootConfig::load_from_file(path)
            .with_context(|| format!("loading config from {path}"))?,
        None => BootConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = Some(port);
    }
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    if args.checksum {
        config.mode = TransferMode::Checksum;
    }

    let port = config
        .port
        .clone()
        .context("no serial port configured; pass --port or set it in the config file")?;
    let region = config.memory_region()?;

    info!(
        port = %port,
        baud = config.baud,
        app_start = %format!("{:#010x}", region.app_start()),
        capacity = region.capacity(),
        "Starting bootloader"
    );

    let transport = SerialPortTransport::open(&port, config.baud)?;
    let flash = FlashEngine::new(SimFlash::new(region));

    let mut session = BootSession::new(transport, flash, config);
    let vectors = session.run()?;

    if let Some(path) = &args.image_out {
        std::fs::write(path, session.flash().controller().bytes())
            .with_context(|| format!("writing image to {path}"))?;
        info!(path = %path, "Flash image dumped");
    }

    ProcessHandoff.handoff(vectors)
}
