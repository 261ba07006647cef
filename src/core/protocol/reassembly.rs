//! Byte-stream reassembly into validated frames
//!
//! The transport delivers bytes in arbitrary-sized chunks with no framing
//! guarantee. [`FrameReassembler`] recovers frame boundaries from the STX
//! and ETX delimiters alone: the declared length field is never used to
//! find the end of a frame. Noise, incomplete frames, and checksum
//! mismatches are discarded locally and logged; they never surface as
//! errors.

use super::frame::{is_valid_checksum, Frame};
use super::{ETX, MIN_FRAME_LEN, POLL_INTERVAL_MS, STX};
use bytes::Bytes;
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Frame-wait outcomes that end an exchange
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// No valid frame arrived within the deadline
    #[error("no frame received within {0:?}")]
    Timeout(Duration),

    /// The wait ended early because the cancellation token fired
    #[error("frame wait cancelled")]
    Cancelled,
}

/// Reassembles a continuous byte stream into discrete validated frames.
///
/// Bytes arrive on a channel fed by the transport's delivery task; the
/// reassembler is the sole consumer and exclusively owns the pending
/// buffer. Tests inject bytes by sending chunks on the channel directly.
pub struct FrameReassembler {
    rx: Receiver<Bytes>,
    pending: VecDeque<u8>,
    candidate: Vec<u8>,
    in_frame: bool,
    poll_interval: Duration,
}

impl FrameReassembler {
    /// Create a reassembler draining the given byte channel
    pub fn new(rx: Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
            candidate: Vec::new(),
            in_frame: false,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }

    /// Set the sleep between polls of the byte channel
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Drain whatever has arrived and return the next complete frame, if
    /// one can be extracted. Non-blocking.
    pub fn poll_frame(&mut self) -> Option<Frame> {
        while let Ok(chunk) = self.rx.try_recv() {
            self.pending.extend(chunk.as_ref());
        }
        while let Some(byte) = self.pending.pop_front() {
            if let Some(frame) = self.feed(byte) {
                return Some(frame);
            }
        }
        None
    }

    /// Wait for the next complete frame, polling the byte channel until
    /// `timeout` elapses or `cancel` fires.
    pub async fn next_frame(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Frame, ProtocolError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.poll_frame() {
                return Ok(frame);
            }
            if cancel.is_cancelled() {
                return Err(ProtocolError::Cancelled);
            }
            if Instant::now() >= deadline {
                return Err(ProtocolError::Timeout(timeout));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Advance the state machine by one byte.
    fn feed(&mut self, byte: u8) -> Option<Frame> {
        match byte {
            STX => {
                if self.in_frame {
                    tracing::debug!(
                        dropped = %hex::encode_upper(&self.candidate),
                        "mid-frame STX, restarting candidate"
                    );
                }
                self.candidate.clear();
                self.candidate.push(STX);
                self.in_frame = true;
                None
            }
            ETX if !self.in_frame => {
                tracing::trace!("ETX outside frame, dropping");
                None
            }
            ETX => {
                self.candidate.push(ETX);
                if self.candidate.len() < MIN_FRAME_LEN {
                    // Below the minimum structural length the delimiter can
                    // only be payload (e.g. a checksum byte equal to 0x03).
                    return None;
                }
                self.in_frame = false;
                let candidate = std::mem::take(&mut self.candidate);
                if is_valid_checksum(&candidate) {
                    tracing::trace!(frame = %hex::encode_upper(&candidate), "frame reassembled");
                    Some(Frame::from_validated(candidate))
                } else {
                    tracing::debug!(
                        dropped = %hex::encode_upper(&candidate),
                        "checksum mismatch, dropping frame"
                    );
                    None
                }
            }
            other => {
                if self.in_frame {
                    self.candidate.push(other);
                } else {
                    tracing::trace!(byte = %format!("{other:02X}"), "stray byte outside frame");
                }
                None
            }
        }
    }
}
