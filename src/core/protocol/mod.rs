//! IM30 wire protocol: constants, frame codec, stream reassembly
//!
//! Frame layout (all integers big-endian):
//!
//! ```text
//! offset  size  field
//! 0       1     STX (0x02)
//! 1       1     VERSION (0x01)
//! 2-3     2     PaNo (logical channel)
//! 4-5     2     FrNo (sequence/correlation number)
//! 6-7     2     data length N
//! 8..     N     data
//! 8+N     1     checksum (XOR of bytes 0..8+N)
//! 9+N     1     ETX (0x03)
//! ```

pub mod frame;
pub mod reassembly;

pub use frame::{checksum, compose, is_valid_checksum, Frame, FrameError};
pub use reassembly::{FrameReassembler, ProtocolError};

/// Start-of-frame delimiter
pub const STX: u8 = 0x02;
/// End-of-frame delimiter
pub const ETX: u8 = 0x03;
/// Acknowledgment byte
pub const ACK: u8 = 0x06;
/// Negative acknowledgment byte
pub const NAK: u8 = 0x15;
/// Protocol version carried in every frame
pub const VERSION: u8 = 0x01;

/// Smallest structurally valid frame: STX + VERSION + PaNo + FrNo + length
/// field + checksum + ETX with an empty data section.
pub const MIN_FRAME_LEN: usize = 10;
/// Total length of an ACK frame (single data byte 0x06)
pub const ACK_FRAME_LEN: usize = 11;

/// Channel used when acknowledging a peer frame
pub const ACK_PA_NO: [u8; 2] = [0x00, 0x00];
/// Channel the sync handshake runs on
pub const SYNC_PA_NO: [u8; 2] = [0x00, 0x01];
/// POS transaction channel (0x03E8)
pub const POS_PA_NO: [u8; 2] = [0x03, 0xE8];
/// Frame number used for every outbound data/sync frame. The terminal
/// correlates on this value; keep it fixed for wire compatibility.
pub const DEFAULT_FR_NO: [u8; 2] = [0x00, 0x01];

/// The sync handshake frame, reproduced byte-for-byte from the terminal
/// documentation. Empty data section; the XOR of the eight header bytes is
/// 0x03, so the checksum coincides with the ETX value.
pub const SYNC_FRAME: [u8; 10] = [STX, VERSION, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x03, ETX];

/// Expected header of the sync response (PaNo 0x0001, FrNo 0x0001, 8 data bytes)
pub const SYNC_RESPONSE_HEADER: [u8; 8] = [STX, VERSION, 0x00, 0x01, 0x00, 0x01, 0x00, 0x08];
/// Total length of the sync response frame
pub const SYNC_RESPONSE_LEN: usize = 18;

/// Default wait for an ACK or sync response, milliseconds
pub const PROTOCOL_TIMEOUT_MS: u64 = 1000;
/// Default wait for a sale/refund response; card read and PIN entry can
/// take tens of seconds.
pub const TRANSACTION_TIMEOUT_MS: u64 = 70_000;
/// Sleep between polls of the receive queue, milliseconds
pub const POLL_INTERVAL_MS: u64 = 100;
