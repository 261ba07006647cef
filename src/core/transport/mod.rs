//! Transport layer: raw byte I/O with the terminal
//!
//! The session only consumes this interface: open the link, write byte
//! sequences, and receive arriving bytes asynchronously via a broadcast
//! subscription. The serial implementation lives in [`serial`]; tests
//! provide scripted implementations of the same trait.

mod serial;

pub use serial::{list_ports, SerialConfig, SerialParity, SerialTransport};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::broadcast;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Not connected
    #[error("not connected")]
    NotConnected,

    /// Send error
    #[error("send error: {0}")]
    SendError(String),
}

/// Transport statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Write calls issued
    pub writes: u64,
    /// Read chunks delivered
    pub reads: u64,
}

/// Byte transport to the terminal
#[async_trait]
pub trait TransportTrait: Send + Sync {
    /// Open the link
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the link
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Check if the link is open
    fn is_connected(&self) -> bool;

    /// Write a byte sequence. Writes are serialized internally; a
    /// half-duplex serial link must never interleave two writers.
    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Subscribe to arriving byte chunks
    fn subscribe(&self) -> broadcast::Receiver<Bytes>;

    /// Human-readable description of the link
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}
