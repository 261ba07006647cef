//! Terminal session: sync handshake and sale/refund exchanges
//!
//! One exchange is in flight at a time by design. Every transaction
//! re-runs the sync handshake first so it starts from a known-good link
//! state, trading a little latency for robustness against link drift.

use crate::core::protocol::{
    compose, FrameReassembler, ProtocolError, ACK, ACK_FRAME_LEN, ACK_PA_NO, DEFAULT_FR_NO,
    FrameError, MIN_FRAME_LEN, POLL_INTERVAL_MS, POS_PA_NO, PROTOCOL_TIMEOUT_MS, STX, SYNC_FRAME,
    SYNC_RESPONSE_HEADER, SYNC_RESPONSE_LEN, TRANSACTION_TIMEOUT_MS, VERSION,
};
use crate::core::transport::{TransportError, TransportStats, TransportTrait};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Session-layer errors. These abort the current exchange; sale and refund
/// additionally swallow them into an empty result plus a logged diagnostic.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Frame composition failed
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// The frame wait timed out or was cancelled
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Expected ACK not received or mismatched
    #[error("no valid ACK received: {0}")]
    AckFailure(String),

    /// A structurally complete but semantically wrong frame arrived
    #[error("unexpected frame received: {0}")]
    UnexpectedFrame(String),

    /// Transaction attempted without a successful prior sync
    #[error("terminal is not synced")]
    NotSynced,

    /// Non-positive amount, empty or non-ASCII transaction id
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Request body could not be encoded
    #[error("failed to encode request payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Exchange timeouts
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Wait for an ACK or sync response
    pub protocol: Duration,
    /// Wait for a sale/refund response (card read, PIN entry)
    pub transaction: Duration,
    /// Sleep between polls of the receive queue
    pub poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            protocol: Duration::from_millis(PROTOCOL_TIMEOUT_MS),
            transaction: Duration::from_millis(TRANSACTION_TIMEOUT_MS),
            poll: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }
}

/// Limits reported by the terminal in the sync response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInfo {
    /// Maximum supported packet size
    pub max_packet_size: u32,
    /// Maximum supported frame size
    pub max_frame_size: u32,
}

#[derive(Serialize)]
struct Request<T: Serialize> {
    task: &'static str,
    data: T,
}

#[derive(Serialize)]
struct SaleBody {
    amount: String,
}

#[derive(Serialize)]
struct RefundBody {
    #[serde(rename = "transId")]
    trans_id: String,
    amount: String,
}

/// An active session with a payment terminal
pub struct TerminalSession {
    transport: Box<dyn TransportTrait>,
    reassembler: FrameReassembler,
    cancel: CancellationToken,
    timeouts: Timeouts,
    synced: bool,
    pump: JoinHandle<()>,
}

impl TerminalSession {
    /// Open the transport and start the byte-delivery pump.
    pub async fn connect(
        mut transport: Box<dyn TransportTrait>,
        timeouts: Timeouts,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        // Subscribe before opening so no delivered byte is missed.
        let mut chunks = transport.subscribe();
        transport.connect().await?;

        let (byte_tx, byte_rx) = crossbeam_channel::unbounded();
        let pump = tokio::spawn(async move {
            loop {
                match chunks.recv().await {
                    Ok(chunk) => {
                        if byte_tx.send(chunk).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "byte delivery lagged, chunks dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let reassembler = FrameReassembler::new(byte_rx).with_poll_interval(timeouts.poll);

        Ok(Self {
            transport,
            reassembler,
            cancel,
            timeouts,
            synced: false,
            pump,
        })
    }

    /// Stop the pump and close the transport. Safe to call on any exit
    /// path; errors on close are ignored.
    pub async fn close(&mut self) {
        self.pump.abort();
        let _ = self.transport.disconnect().await;
        self.synced = false;
    }

    /// True after the last sync exchange succeeded
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Human-readable description of the underlying link
    pub fn connection_info(&self) -> String {
        self.transport.connection_info()
    }

    /// Transport statistics
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Run the sync handshake: fixed sync frame, ACK, sync response,
    /// response ACK. Sets the synced flag accordingly; never retries.
    pub async fn sync(&mut self) -> Result<SyncInfo, SessionError> {
        self.synced = false;
        tracing::info!("syncing");

        self.transport.send(&SYNC_FRAME).await?;
        self.await_ack(DEFAULT_FR_NO).await?;

        let frame = self
            .reassembler
            .next_frame(self.timeouts.protocol, &self.cancel)
            .await?;
        if frame.len() != SYNC_RESPONSE_LEN || frame.as_bytes()[..8] != SYNC_RESPONSE_HEADER {
            return Err(SessionError::UnexpectedFrame(frame.to_string()));
        }
        self.send_ack(frame.fr_no_bytes()).await?;

        let payload: [u8; 8] = frame
            .payload()
            .try_into()
            .map_err(|_| SessionError::UnexpectedFrame(frame.to_string()))?;
        let info = SyncInfo {
            max_packet_size: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            max_frame_size: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
        };

        self.synced = true;
        tracing::info!(
            max_packet_size = info.max_packet_size,
            max_frame_size = info.max_frame_size,
            "sync ok"
        );
        Ok(info)
    }

    /// Run a sale. Returns the terminal's response payload as text, or an
    /// empty string on any failure (the reason is logged); errors never
    /// cross this boundary.
    pub async fn sale(&mut self, amount: u32) -> String {
        match self.try_sale(amount).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "sale failed");
                String::new()
            }
        }
    }

    /// Run a refund against a prior transaction. Same failure contract as
    /// [`sale`](Self::sale).
    pub async fn refund(&mut self, transaction_id: &str, amount: u32) -> String {
        match self.try_refund(transaction_id, amount).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "refund failed");
                String::new()
            }
        }
    }

    async fn try_sale(&mut self, amount: u32) -> Result<String, SessionError> {
        if let Err(e) = self.sync().await {
            tracing::warn!(error = %e, "sync failed before sale");
        }
        tracing::info!(amount, "operation: sale");

        if !self.synced {
            return Err(SessionError::NotSynced);
        }
        if amount == 0 {
            return Err(SessionError::InvalidArgument(
                "amount must be greater than zero".into(),
            ));
        }

        let body = serde_json::to_string(&Request {
            task: "sale",
            data: SaleBody {
                amount: amount.to_string(),
            },
        })?;
        self.send_request(&body).await
    }

    async fn try_refund(
        &mut self,
        transaction_id: &str,
        amount: u32,
    ) -> Result<String, SessionError> {
        if let Err(e) = self.sync().await {
            tracing::warn!(error = %e, "sync failed before refund");
        }
        tracing::info!(transaction_id, amount, "operation: refund");

        if !self.synced {
            return Err(SessionError::NotSynced);
        }
        if amount == 0 {
            return Err(SessionError::InvalidArgument(
                "amount must be greater than zero".into(),
            ));
        }
        if transaction_id.is_empty() {
            return Err(SessionError::InvalidArgument(
                "transaction id must not be empty".into(),
            ));
        }
        if !transaction_id.is_ascii() {
            return Err(SessionError::InvalidArgument(
                "transaction id must be ASCII".into(),
            ));
        }

        let body = serde_json::to_string(&Request {
            task: "refund",
            data: RefundBody {
                trans_id: transaction_id.to_string(),
                amount: amount.to_string(),
            },
        })?;
        self.send_request(&body).await
    }

    /// Drive one data-frame exchange on the POS channel: send, await ACK,
    /// await the response on the long timeout, ACK the response.
    async fn send_request(&mut self, body: &str) -> Result<String, SessionError> {
        let frame = compose(&POS_PA_NO, &DEFAULT_FR_NO, body.as_bytes())?;
        self.transport.send(frame.as_bytes()).await?;
        self.await_ack(DEFAULT_FR_NO).await?;

        tracing::debug!("awaiting terminal response");
        let response = self
            .reassembler
            .next_frame(self.timeouts.transaction, &self.cancel)
            .await?;
        if response.len() <= MIN_FRAME_LEN || response.pa_no() != u16::from_be_bytes(POS_PA_NO) {
            return Err(SessionError::UnexpectedFrame(response.to_string()));
        }
        self.send_ack(response.fr_no_bytes()).await?;

        let text = String::from_utf8_lossy(response.payload()).into_owned();
        tracing::info!(response = %text, "transaction response");
        Ok(text)
    }

    /// Wait for the ACK of the frame we just sent. The terminal echoes our
    /// FrNo on the reserved 0x0000 channel with a single 0x06 data byte.
    async fn await_ack(&mut self, fr_no: [u8; 2]) -> Result<(), SessionError> {
        let frame = match self
            .reassembler
            .next_frame(self.timeouts.protocol, &self.cancel)
            .await
        {
            Ok(frame) => frame,
            Err(ProtocolError::Timeout(waited)) => {
                return Err(SessionError::AckFailure(format!(
                    "no frame within {waited:?}"
                )));
            }
            Err(cancelled) => return Err(cancelled.into()),
        };

        let expected = [STX, VERSION, 0x00, 0x00, fr_no[0], fr_no[1], 0x00, 0x01, ACK];
        if frame.len() == ACK_FRAME_LEN && frame.as_bytes()[..9] == expected {
            tracing::debug!("request acknowledged");
            Ok(())
        } else {
            Err(SessionError::AckFailure(frame.to_string()))
        }
    }

    /// Acknowledge a peer frame, echoing its FrNo on channel 0x0000.
    async fn send_ack(&mut self, fr_no: [u8; 2]) -> Result<(), SessionError> {
        let frame = compose(&ACK_PA_NO, &fr_no, &[ACK])?;
        self.transport.send(frame.as_bytes()).await?;
        Ok(())
    }
}
