//! # Paxlink Core Library
//!
//! RS-232 driver for PAX IM30-class payment terminals. Exchanges STX/ETX
//! delimited, XOR-checksummed frames over a half-duplex serial link and
//! drives the request/acknowledge/response handshake for synchronization,
//! sale, and refund transactions.
//!
//! ## Example
//!
//! ```rust,no_run
//! use paxlink_core::{SerialConfig, SerialTransport, TerminalSession, Timeouts};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let transport = SerialTransport::new(SerialConfig::new("/dev/ttyUSB0", 115200));
//!     let mut session = TerminalSession::connect(
//!         Box::new(transport),
//!         Timeouts::default(),
//!         CancellationToken::new(),
//!     )
//!     .await?;
//!
//!     let receipt = session.sale(100).await;
//!     if !receipt.is_empty() {
//!         println!("{receipt}");
//!     }
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::config::{DriverConfig, TimeoutSettings};
pub use crate::core::protocol::{
    checksum, compose, is_valid_checksum, Frame, FrameError, FrameReassembler, ProtocolError,
};
pub use crate::core::session::{SessionError, SyncInfo, TerminalSession, Timeouts};
pub use crate::core::transport::{
    list_ports, SerialConfig, SerialParity, SerialTransport, TransportError, TransportStats,
    TransportTrait,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
