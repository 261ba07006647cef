//! Paxlink - POS terminal driver CLI
//!
//! Drives sync, sale, and refund exchanges against a PAX IM30-class
//! payment terminal over a serial link.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use paxlink_core::{
    list_ports, DriverConfig, SerialParity, SerialTransport, TerminalSession, Timeouts,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Paxlink CLI
#[derive(Parser, Debug)]
#[command(
    name = "paxlink",
    version,
    about = "RS-232 driver for PAX IM30-class payment terminals",
    long_about = None
)]
struct Cli {
    /// Serial port name (e.g., COM3, /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Parity (none, odd, even)
    #[arg(long)]
    parity: Option<String>,

    /// Config file path (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List available serial ports
    ListPorts,

    /// Run the sync handshake and report the terminal's limits
    Sync,

    /// Run a sale transaction
    Sale {
        /// Amount in minor currency units
        #[arg(short, long)]
        amount: u32,
    },

    /// Refund a prior transaction
    Refund {
        /// Transaction id of the sale being refunded
        #[arg(short, long)]
        transaction_id: String,

        /// Amount in minor currency units
        #[arg(short, long)]
        amount: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    if let Commands::ListPorts = cli.command {
        for port in list_ports().map_err(|e| anyhow!("{e}"))? {
            println!("{}", port.port_name);
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => DriverConfig::load_from(path).map_err(|e| anyhow!("{e}"))?,
        None => DriverConfig::load().map_err(|e| anyhow!("{e}"))?,
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(parity) = &cli.parity {
        config.serial.parity = parity.parse().unwrap_or(SerialParity::None);
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupt received, cancelling");
        handler_token.cancel();
    })
    .context("failed to install interrupt handler")?;

    let transport = SerialTransport::new(config.serial.clone());
    let timeouts: Timeouts = config.timeouts.into();
    let mut session = TerminalSession::connect(Box::new(transport), timeouts, cancel)
        .await
        .with_context(|| format!("failed to open {}", config.serial.port))?;
    tracing::info!(link = %session.connection_info(), "connected");

    // The port is released on every exit path below.
    let outcome = run_command(&mut session, cli.command).await;
    session.close().await;
    outcome
}

async fn run_command(session: &mut TerminalSession, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::ListPorts => unreachable!("handled before connecting"),
        Commands::Sync => {
            let info = session.sync().await?;
            println!("Sync OK");
            println!("Maximum supported packet size = {}", info.max_packet_size);
            println!("Maximum supported frame size = {}", info.max_frame_size);
            Ok(())
        }
        Commands::Sale { amount } => {
            let response = session.sale(amount).await;
            if response.is_empty() {
                bail!("sale failed, see log for the reason");
            }
            println!("{response}");
            Ok(())
        }
        Commands::Refund {
            transaction_id,
            amount,
        } => {
            let response = session.refund(&transaction_id, amount).await;
            if response.is_empty() {
                bail!("refund failed, see log for the reason");
            }
            println!("{response}");
            Ok(())
        }
    }
}
