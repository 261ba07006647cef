//! Serial port transport implementation

use super::{TransportError, TransportStats, TransportTrait};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

impl std::str::FromStr for SerialParity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "odd" | "o" => Ok(Self::Odd),
            "even" | "e" => Ok(Self::Even),
            _ => Ok(Self::None),
        }
    }
}

/// Serial port configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
}

impl SerialConfig {
    /// Create a new serial configuration with 8N1 framing
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
        }
    }

    /// Set data bits
    #[must_use]
    pub fn data_bits(mut self, bits: u8) -> Self {
        self.data_bits = bits;
        self
    }

    /// Set stop bits
    #[must_use]
    pub fn stop_bits(mut self, bits: u8) -> Self {
        self.stop_bits = bits;
        self
    }

    /// Set parity
    #[must_use]
    pub fn parity(mut self, parity: SerialParity) -> Self {
        self.parity = parity;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("COM1", 115200)
    }
}

/// Serial port transport.
///
/// `connect` opens the port and spawns a blocking reader task over a
/// cloned port handle; arriving chunks are broadcast to subscribers.
/// Writes go through a mutex-guarded writer handle.
pub struct SerialTransport {
    config: SerialConfig,
    port: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
    running: Arc<AtomicBool>,
    stats: Arc<RwLock<TransportStats>>,
    tx: broadcast::Sender<Bytes>,
}

impl SerialTransport {
    /// Create a new serial transport
    pub fn new(config: SerialConfig) -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            config,
            port: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(RwLock::new(TransportStats::default())),
            tx,
        }
    }
}

#[async_trait]
impl TransportTrait for SerialTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        let data_bits = match self.config.data_bits {
            5 => DataBits::Five,
            6 => DataBits::Six,
            7 => DataBits::Seven,
            _ => DataBits::Eight,
        };

        let stop_bits = match self.config.stop_bits {
            2 => StopBits::Two,
            _ => StopBits::One,
        };

        let parity = match self.config.parity {
            SerialParity::Odd => Parity::Odd,
            SerialParity::Even => Parity::Even,
            SerialParity::None => Parity::None,
        };

        let port = serialport::new(&self.config.port, self.config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => {
                    TransportError::PortNotFound(self.config.port.clone())
                }
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(self.config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        let mut reader = port
            .try_clone()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        *self.port.lock() = Some(port);
        *self.stats.write() = TransportStats::default();
        self.running.store(true, Ordering::Release);

        let running = self.running.clone();
        let stats = self.stats.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let mut buf = [0u8; 4096];
            while running.load(Ordering::Acquire) {
                match reader.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        {
                            let mut stats = stats.write();
                            stats.bytes_received += n as u64;
                            stats.reads += 1;
                        }
                        let _ = tx.send(Bytes::copy_from_slice(&buf[..n]));
                    }
                    Err(ref e)
                        if e.kind() == std::io::ErrorKind::TimedOut
                            || e.kind() == std::io::ErrorKind::Interrupted => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "serial read failed, stopping reader");
                        break;
                    }
                }
            }
        });

        tracing::info!(port = %self.config.port, baud = self.config.baud_rate, "serial port opened");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.running.store(false, Ordering::Release);
        *self.port.lock() = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.lock().is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let mut port_guard = self.port.lock();
        let port = port_guard.as_mut().ok_or(TransportError::NotConnected)?;

        port.write_all(data).map_err(TransportError::IoError)?;
        port.flush().map_err(TransportError::IoError)?;

        let mut stats = self.stats.write();
        stats.bytes_sent += data.len() as u64;
        stats.writes += 1;

        Ok(data.len())
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.config.port,
            self.config.baud_rate,
            self.config.data_bits,
            match self.config.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.config.stop_bits,
        )
    }

    fn stats(&self) -> TransportStats {
        *self.stats.read()
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::ConnectionFailed(e.to_string()))
}
