//! End-to-end exchange tests over a scripted terminal transport

use async_trait::async_trait;
use bytes::Bytes;
use paxlink_core::core::protocol::{compose, ACK, NAK, POS_PA_NO, SYNC_FRAME, SYNC_PA_NO};
use paxlink_core::{TerminalSession, Timeouts, TransportError, TransportStats, TransportTrait};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// What the scripted terminal does with incoming frames
#[derive(Clone, Copy, PartialEq, Eq)]
enum Script {
    /// ACK everything and answer sync and transaction requests
    Responsive,
    /// Reply to the sync frame with a NAK frame instead of an ACK
    NakSync,
    /// Never send anything
    Silent,
}

/// In-memory stand-in for the terminal side of the link
struct ScriptedTerminal {
    tx: broadcast::Sender<Bytes>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    script: Script,
    transaction_response: String,
    connected: bool,
}

impl ScriptedTerminal {
    fn new(script: Script, transaction_response: &str) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            sent: Arc::new(Mutex::new(Vec::new())),
            script,
            transaction_response: transaction_response.to_string(),
            connected: false,
        }
    }

    fn sent_frames(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.sent.clone()
    }

    fn emit(&self, bytes: Vec<u8>) {
        let _ = self.tx.send(Bytes::from(bytes));
    }

    fn ack_frame() -> Vec<u8> {
        compose(&[0x00, 0x00], &[0x00, 0x01], &[ACK])
            .unwrap()
            .into_bytes()
    }

    fn sync_response() -> Vec<u8> {
        // max packet 2048, max frame 1024
        let limits = [0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x04, 0x00];
        compose(&SYNC_PA_NO, &[0x00, 0x01], &limits)
            .unwrap()
            .into_bytes()
    }
}

#[async_trait]
impl TransportTrait for ScriptedTerminal {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.sent.lock().unwrap().push(data.to_vec());
        if self.script == Script::Silent {
            return Ok(data.len());
        }

        if data == SYNC_FRAME {
            if self.script == Script::NakSync {
                let nak = compose(&[0x00, 0x00], &[0x00, 0x01], &[NAK])
                    .unwrap()
                    .into_bytes();
                self.emit(nak);
            } else {
                self.emit(Self::ack_frame());
                self.emit(Self::sync_response());
            }
        } else if data.len() > 4 && data[2..4] == POS_PA_NO {
            self.emit(Self::ack_frame());
            let response = compose(&POS_PA_NO, &[0x00, 0x2A], self.transaction_response.as_bytes())
                .unwrap()
                .into_bytes();
            self.emit(response);
        }
        // Host ACKs (channel 0x0000) need no reply.
        Ok(data.len())
    }

    fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    fn connection_info(&self) -> String {
        "scripted terminal".to_string()
    }

    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

fn test_timeouts() -> Timeouts {
    Timeouts {
        protocol: Duration::from_millis(100),
        transaction: Duration::from_millis(300),
        poll: Duration::from_millis(5),
    }
}

async fn session_with(terminal: ScriptedTerminal) -> TerminalSession {
    TerminalSession::connect(Box::new(terminal), test_timeouts(), CancellationToken::new())
        .await
        .expect("session connects")
}

#[tokio::test]
async fn sync_exchange_reports_terminal_limits() {
    let mut session = session_with(ScriptedTerminal::new(Script::Responsive, "{}")).await;

    let info = session.sync().await.expect("sync succeeds");
    assert_eq!(info.max_packet_size, 2048);
    assert_eq!(info.max_frame_size, 1024);
    assert!(session.is_synced());

    // Idempotent: a second sync observes the same outcome.
    let again = session.sync().await.expect("second sync succeeds");
    assert_eq!(again, info);
    assert!(session.is_synced());

    session.close().await;
}

#[tokio::test]
async fn sale_returns_response_payload() {
    let receipt = r#"{"result":"approved","transId":"T-42"}"#;
    let terminal = ScriptedTerminal::new(Script::Responsive, receipt);
    let sent = terminal.sent_frames();
    let mut session = session_with(terminal).await;

    let response = session.sale(100).await;
    assert_eq!(response, receipt);

    // The request frame carried the expected JSON body on the POS channel.
    let frames = sent.lock().unwrap();
    let request = frames
        .iter()
        .find(|f| f.len() > 4 && f[2..4] == POS_PA_NO)
        .expect("request frame sent");
    let body_len = u16::from_be_bytes([request[6], request[7]]) as usize;
    let body = std::str::from_utf8(&request[8..8 + body_len]).unwrap();
    assert_eq!(body, r#"{"task":"sale","data":{"amount":"100"}}"#);

    // The exchange ends with the host acknowledging the response.
    let last = frames.last().unwrap();
    assert_eq!(&last[2..4], &[0x00, 0x00]);
    assert_eq!(last[8], ACK);
    assert_eq!(&last[4..6], &[0x00, 0x2A]);
}

#[tokio::test]
async fn refund_carries_transaction_id() {
    let terminal = ScriptedTerminal::new(Script::Responsive, r#"{"result":"refunded"}"#);
    let sent = terminal.sent_frames();
    let mut session = session_with(terminal).await;

    let response = session.refund("T-42", 50).await;
    assert_eq!(response, r#"{"result":"refunded"}"#);

    let frames = sent.lock().unwrap();
    let request = frames
        .iter()
        .find(|f| f.len() > 4 && f[2..4] == POS_PA_NO)
        .expect("request frame sent");
    let body_len = u16::from_be_bytes([request[6], request[7]]) as usize;
    let body = std::str::from_utf8(&request[8..8 + body_len]).unwrap();
    assert_eq!(
        body,
        r#"{"task":"refund","data":{"transId":"T-42","amount":"50"}}"#
    );
}

#[tokio::test]
async fn sale_against_silent_terminal_returns_empty() {
    let mut session = session_with(ScriptedTerminal::new(Script::Silent, "")).await;

    let response = session.sale(100).await;
    assert!(response.is_empty());
    assert!(!session.is_synced());
}

#[tokio::test]
async fn nak_instead_of_ack_fails_sync() {
    let mut session = session_with(ScriptedTerminal::new(Script::NakSync, "")).await;

    let err = session.sync().await.unwrap_err();
    assert!(matches!(
        err,
        paxlink_core::SessionError::AckFailure(_)
    ));
    assert!(!session.is_synced());
}

#[tokio::test]
async fn invalid_arguments_return_empty_without_sending_a_request() {
    let terminal = ScriptedTerminal::new(Script::Responsive, "{}");
    let sent = terminal.sent_frames();
    let mut session = session_with(terminal).await;

    assert!(session.sale(0).await.is_empty());
    assert!(session.refund("", 50).await.is_empty());
    assert!(session.refund("T-42", 0).await.is_empty());

    // Sync frames and their ACKs went out, but no POS-channel request.
    let frames = sent.lock().unwrap();
    assert!(frames
        .iter()
        .all(|f| f.len() <= 4 || f[2..4] != POS_PA_NO));
}
