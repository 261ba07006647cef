//! Frame codec: compose, checksum, validate
//!
//! Pure functions plus the [`Frame`] type. A `Frame` is only constructed
//! from bytes that already passed structural and checksum validation, so
//! its accessors never fail.

use super::{ETX, MIN_FRAME_LEN, STX, VERSION};
use std::fmt;
use thiserror::Error;

/// Frame composition errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// PaNo or FrNo was not exactly 2 bytes
    #[error("address must be exactly 2 bytes, got {0}")]
    MalformedAddress(usize),

    /// Data section exceeds the 16-bit length field
    #[error("payload of {0} bytes exceeds the 65535 byte frame limit")]
    PayloadTooLarge(usize),

    /// Data contains an ETX-valued byte; the wire format has no escaping
    /// scheme, so such a payload cannot be framed.
    #[error("payload contains an ETX (0x03) byte at offset {0}")]
    UnsupportedPayload(usize),
}

/// XOR-fold (LRC) over `header` then `data`.
///
/// Used both to checksum a fresh header+data pair when composing and to
/// re-verify the header+data span of a received frame.
pub fn checksum(header: &[u8], data: &[u8]) -> u8 {
    header.iter().chain(data.iter()).fold(0u8, |lrc, &b| lrc ^ b)
}

/// Recompute the checksum over `frame[0..len-2]` and compare it to the
/// transmitted checksum byte at `frame[len-2]`. Pure; false for slices too
/// short to carry a checksum.
pub fn is_valid_checksum(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let (body, tail) = frame.split_at(frame.len() - 2);
    checksum(body, &[]) == tail[0]
}

/// Build a complete frame: header, data, checksum, ETX.
///
/// `pa_no` and `fr_no` must each be exactly 2 bytes. `data` may be empty;
/// it must not contain an ETX byte and must fit the 16-bit length field.
pub fn compose(pa_no: &[u8], fr_no: &[u8], data: &[u8]) -> Result<Frame, FrameError> {
    if pa_no.len() != 2 {
        return Err(FrameError::MalformedAddress(pa_no.len()));
    }
    if fr_no.len() != 2 {
        return Err(FrameError::MalformedAddress(fr_no.len()));
    }
    if data.len() > usize::from(u16::MAX) {
        return Err(FrameError::PayloadTooLarge(data.len()));
    }
    if let Some(pos) = data.iter().position(|&b| b == ETX) {
        return Err(FrameError::UnsupportedPayload(pos));
    }

    let len = (data.len() as u16).to_be_bytes();
    let header = [STX, VERSION, pa_no[0], pa_no[1], fr_no[0], fr_no[1], len[0], len[1]];
    let lrc = checksum(&header, data);

    let mut bytes = Vec::with_capacity(MIN_FRAME_LEN + data.len());
    bytes.extend_from_slice(&header);
    bytes.extend_from_slice(data);
    bytes.push(lrc);
    bytes.push(ETX);
    Ok(Frame { bytes })
}

/// A structurally complete, checksum-valid frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Wrap bytes that already passed reassembly validation.
    pub(crate) fn from_validated(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= MIN_FRAME_LEN);
        debug_assert!(is_valid_checksum(&bytes));
        Self { bytes }
    }

    /// Logical channel this frame is addressed to
    pub fn pa_no(&self) -> u16 {
        u16::from_be_bytes([self.bytes[2], self.bytes[3]])
    }

    /// Sequence/correlation number chosen by the sender
    pub fn fr_no(&self) -> u16 {
        u16::from_be_bytes([self.bytes[4], self.bytes[5]])
    }

    /// FrNo as raw bytes, for echoing in an ACK
    pub fn fr_no_bytes(&self) -> [u8; 2] {
        [self.bytes[4], self.bytes[5]]
    }

    /// Data length declared in the header
    pub fn declared_len(&self) -> u16 {
        u16::from_be_bytes([self.bytes[6], self.bytes[7]])
    }

    /// The data section, bounded by the declared length and clamped to the
    /// physical frame (checksum and ETX are never part of the payload).
    pub fn payload(&self) -> &[u8] {
        let end = (8 + usize::from(self.declared_len())).min(self.bytes.len() - 2);
        &self.bytes[8..end]
    }

    /// Total on-wire length in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the frame carries no data bytes (never the case for a
    /// validated frame, present for completeness)
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The complete on-wire byte sequence
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning the on-wire bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(&self.bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::{ACK, ACK_PA_NO, DEFAULT_FR_NO, POS_PA_NO, SYNC_FRAME};

    #[test]
    fn compose_known_frame() {
        let frame = compose(&POS_PA_NO, &DEFAULT_FR_NO, b"AB").unwrap();
        assert_eq!(
            frame.as_bytes(),
            &[0x02, 0x01, 0x03, 0xE8, 0x00, 0x01, 0x00, 0x02, 0x41, 0x42, 0xE8, 0x03]
        );
    }

    #[test]
    fn compose_roundtrips_checksum() {
        for data in [&b""[..], &b"\x06"[..], &b"{\"task\":\"sale\"}"[..], &[0u8; 300][..]] {
            let frame = compose(&POS_PA_NO, &DEFAULT_FR_NO, data).unwrap();
            assert!(is_valid_checksum(frame.as_bytes()));
            assert_eq!(frame.declared_len() as usize, data.len());
            assert_eq!(frame.payload(), data);
        }
    }

    #[test]
    fn single_byte_corruption_is_detected() {
        let frame = compose(&POS_PA_NO, &DEFAULT_FR_NO, b"payment").unwrap();
        let bytes = frame.as_bytes();
        // Flip one bit in every position except the checksum byte itself
        // and the trailing ETX.
        for i in 0..bytes.len() - 2 {
            let mut corrupted = bytes.to_vec();
            corrupted[i] ^= 0x40;
            assert!(!is_valid_checksum(&corrupted), "corruption at {i} undetected");
        }
    }

    #[test]
    fn malformed_addresses_rejected() {
        assert_eq!(
            compose(&[0x03], &DEFAULT_FR_NO, b""),
            Err(FrameError::MalformedAddress(1))
        );
        assert_eq!(
            compose(&POS_PA_NO, &[0x00, 0x01, 0x02], b""),
            Err(FrameError::MalformedAddress(3))
        );
    }

    #[test]
    fn etx_in_payload_rejected() {
        assert_eq!(
            compose(&POS_PA_NO, &DEFAULT_FR_NO, &[0x41, ETX, 0x42]),
            Err(FrameError::UnsupportedPayload(1))
        );
    }

    #[test]
    fn ack_frame_shape() {
        let frame = compose(&ACK_PA_NO, &DEFAULT_FR_NO, &[ACK]).unwrap();
        assert_eq!(frame.len(), 11);
        assert_eq!(
            &frame.as_bytes()[..9],
            &[STX, VERSION, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, ACK]
        );
    }

    #[test]
    fn sync_literal_is_checksum_valid() {
        // The documented literal happens to be a well-formed empty-data
        // frame whose checksum equals 0x03.
        assert!(is_valid_checksum(&SYNC_FRAME));
        let composed = compose(&[0x00, 0x01], &DEFAULT_FR_NO, &[]).unwrap();
        assert_eq!(composed.as_bytes(), &SYNC_FRAME);
    }

    #[test]
    fn short_slices_are_invalid() {
        assert!(!is_valid_checksum(&[]));
        assert!(!is_valid_checksum(&[STX]));
    }
}
