use crate::*;
use async_trait::async_trait;
use proxtrace_primitives::{DatagramChannel, TracerError, TracerResult, CSV_HEADER};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

const LOG: &str = "timeStamp,peerId,rssi,deviceId,uploadDuration,contactDuration,closeContactDuration,exposureStatus\n\
1717000000,aa:bb,-55,QW7ZK2M4,0,0,0,NORMAL\n\
1717000200,aa:bb,-80,QW7ZK2M4,0,200,200,NORMAL\n";

/// In-memory channel whose replies are scripted per transmit attempt.
#[derive(Default)]
struct ScriptedChannel {
    connected: bool,
    connects: u32,
    connect_error: bool,
    connect_hangs: bool,
    send_calls: u32,
    failing_sends: Vec<u32>,
    sent: Vec<Vec<u8>>,
    replies: HashMap<u32, Vec<Vec<u8>>>,
    inbox: VecDeque<Vec<u8>>,
    discarded: usize,
}

impl ScriptedChannel {
    fn acking_on(attempt: u32) -> Self {
        Self::default().reply_on(attempt, &[b"ACK"])
    }

    fn silent() -> Self {
        Self::default()
    }

    fn reply_on(mut self, attempt: u32, datagrams: &[&[u8]]) -> Self {
        self.replies
            .entry(attempt)
            .or_default()
            .extend(datagrams.iter().map(|d| d.to_vec()));
        self
    }
}

#[async_trait]
impl DatagramChannel for ScriptedChannel {
    async fn connect(&mut self) -> TracerResult<()> {
        self.connects += 1;
        if self.connect_hangs {
            std::future::pending::<()>().await;
        }
        if self.connect_error {
            return Err(TracerError::TransportUnavailable("no network".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, payload: &[u8]) -> TracerResult<()> {
        self.send_calls += 1;
        if self.failing_sends.contains(&self.send_calls) {
            return Err(TracerError::Transport("radio busy".into()));
        }
        self.sent.push(payload.to_vec());
        if let Some(replies) = self.replies.remove(&self.send_calls) {
            self.inbox.extend(replies);
        }
        Ok(())
    }

    async fn recv(&mut self) -> TracerResult<Vec<u8>> {
        match self.inbox.pop_front() {
            Some(datagram) => Ok(datagram),
            None => std::future::pending().await,
        }
    }

    fn discard_pending(&mut self) -> usize {
        let dropped = self.inbox.len();
        self.inbox.clear();
        self.discarded += dropped;
        dropped
    }
}

fn batch() -> UploadBatch {
    UploadBatch::new(1_717_000_500, LOG.to_string())
}

fn protocol(channel: ScriptedChannel) -> UploadProtocol<ScriptedChannel> {
    UploadProtocol::new(channel, UploadConfig::default())
}

// =============================================================================
// Protocol
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_ack_on_second_attempt() {
    let mut uploader = protocol(ScriptedChannel::acking_on(2));
    let report = uploader.attempt_upload(&batch()).await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 2);
    assert_eq!(report.datagrams_sent, 2);
    assert_eq!(uploader.channel().sent.len(), 2);
    assert_eq!(uploader.state(), UploadState::Acked);
    assert_eq!(
        report.trace,
        vec![
            UploadState::Idle,
            UploadState::Connecting,
            UploadState::Sending { attempt: 1 },
            UploadState::AwaitingAck { attempt: 1 },
            UploadState::TimedOut { attempt: 1 },
            UploadState::Sending { attempt: 2 },
            UploadState::AwaitingAck { attempt: 2 },
            UploadState::Acked,
        ]
    );
    assert!(report.elapsed >= Duration::from_millis(5_000));
    assert!(report.elapsed < Duration::from_millis(10_000));
}

#[tokio::test(start_paused = true)]
async fn test_never_acknowledged_exhausts_budget() {
    let mut uploader = protocol(ScriptedChannel::silent());
    let report = uploader.attempt_upload(&batch()).await;

    assert_eq!(report.outcome, UploadOutcome::Failure(UploadFailure::NoAcknowledgement));
    assert_eq!(report.attempts, 3);
    assert_eq!(report.datagrams_sent, 3);
    assert_eq!(uploader.state(), UploadState::Exhausted);
    assert_eq!(report.elapsed, Duration::from_millis(15_000));
}

#[tokio::test(start_paused = true)]
async fn test_retries_resend_identical_payload() {
    let mut uploader = protocol(ScriptedChannel::acking_on(3));
    let b = batch();
    let report = uploader.attempt_upload(&b).await;

    assert!(report.is_success());
    let sent = &uploader.channel().sent;
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|p| *p == b.payload()));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_replies_are_not_acks() {
    let channel = ScriptedChannel::default()
        .reply_on(1, &[b"NAK", b"ACKX", b"ack", b"AC"])
        .reply_on(2, &[b"garbage", b"ACK"]);
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_only_times_out() {
    let channel = ScriptedChannel::default()
        .reply_on(1, &[b"NAK"])
        .reply_on(2, &[b"ACK\n"])
        .reply_on(3, &[b" ACK"]);
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert!(!report.is_success());
    assert_eq!(report.datagrams_sent, 3);
}

#[tokio::test(start_paused = true)]
async fn test_send_error_spends_an_attempt() {
    let mut channel = ScriptedChannel::acking_on(2);
    channel.failing_sends = vec![1];
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 2);
    assert_eq!(report.datagrams_sent, 1);
    assert!(report.trace.contains(&UploadState::TimedOut { attempt: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_sends_nothing() {
    let channel = ScriptedChannel {
        connect_error: true,
        ..ScriptedChannel::default()
    };
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert!(matches!(
        report.outcome,
        UploadOutcome::Failure(UploadFailure::ConnectFailed(_))
    ));
    assert_eq!(report.datagrams_sent, 0);
    assert_eq!(report.attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out() {
    let channel = ScriptedChannel {
        connect_hangs: true,
        ..ScriptedChannel::default()
    };
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert_eq!(
        report.outcome,
        UploadOutcome::Failure(UploadFailure::ConnectFailed("timed out".into()))
    );
    assert_eq!(report.elapsed, Duration::from_millis(10_000));
}

#[tokio::test(start_paused = true)]
async fn test_existing_connection_is_reused() {
    let channel = ScriptedChannel::acking_on(1).reply_on(2, &[b"ACK"]);
    let mut uploader = protocol(channel);

    assert!(uploader.attempt_upload(&batch()).await.is_success());
    assert!(uploader.attempt_upload(&batch()).await.is_success());
    assert_eq!(uploader.channel().connects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_ack_from_earlier_batch_is_not_an_ack() {
    let mut channel = ScriptedChannel::silent();
    channel.connected = true;
    channel.inbox.extend([b"ACK".to_vec(), b"junk".to_vec()]);
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert_eq!(report.outcome, UploadOutcome::Failure(UploadFailure::NoAcknowledgement));
    assert_eq!(report.datagrams_sent, 3);
    assert_eq!(uploader.channel().discarded, 2);
    assert_eq!(report.elapsed, Duration::from_millis(15_000));
}

#[tokio::test(start_paused = true)]
async fn test_queued_datagrams_do_not_hide_fresh_ack() {
    let mut channel = ScriptedChannel::acking_on(1);
    channel.inbox.push_back(b"ACK".to_vec());
    let mut uploader = protocol(channel);
    let report = uploader.attempt_upload(&batch()).await;

    assert!(report.is_success());
    assert_eq!(report.attempts, 1);
    assert_eq!(uploader.channel().discarded, 1);
    assert!(uploader.channel().inbox.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_oversized_payload_rejected() {
    let config = UploadConfig {
        max_payload: 64,
        ..UploadConfig::default()
    };
    let mut uploader = UploadProtocol::new(ScriptedChannel::acking_on(1), config);
    let report = uploader.attempt_upload(&batch()).await;

    assert!(matches!(
        report.outcome,
        UploadOutcome::Failure(UploadFailure::PayloadTooLarge { limit: 64, .. })
    ));
    assert_eq!(report.datagrams_sent, 0);
    assert_eq!(uploader.channel().connects, 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_ack_honours_deadline() {
    let mut uploader = protocol(ScriptedChannel::silent());
    let start = tokio::time::Instant::now();
    let deadline = start + Duration::from_millis(1_234);

    assert!(!uploader.wait_for_ack(deadline).await);
    assert_eq!(tokio::time::Instant::now() - start, Duration::from_millis(1_234));
}

#[test]
fn test_is_ack() {
    assert!(is_ack(b"ACK"));
    assert!(!is_ack(b"ACK\0"));
    assert!(!is_ack(b""));
    assert!(!is_ack(b"NAK"));
}

// =============================================================================
// Batch framing
// =============================================================================

#[test]
fn test_payload_with_metadata() {
    let payload = String::from_utf8(batch().payload()).unwrap();
    assert!(payload.starts_with("# Upload Timestamp: 1717000500\ntimeStamp,"));
    assert!(payload.ends_with(LOG));
}

#[test]
fn test_payload_without_time_has_no_metadata() {
    let b = UploadBatch::new(0, LOG.to_string());
    assert_eq!(b.upload_timestamp(), None);
    assert_eq!(b.payload(), LOG.as_bytes());
}

#[test]
fn test_record_count() {
    assert_eq!(batch().record_count(), 2);
    assert!(UploadBatch::new(5, format!("{CSV_HEADER}\n")).is_empty());
    assert!(UploadBatch::new(5, String::new()).is_empty());
}

#[test]
fn test_parse_batch() {
    let mut payload = batch().payload();
    payload.extend_from_slice(b"not,a,record\n1717000300,cc:dd,-40,QW7ZK2M4,0,0,0,EXPOSURE\n");

    let parsed = UploadBatch::parse(&payload).unwrap();
    assert_eq!(parsed.upload_timestamp, Some(1_717_000_500));
    assert!(parsed.header_seen);
    assert_eq!(parsed.records.len(), 3);
    assert_eq!(parsed.rejected_rows, 1);
    assert_eq!(parsed.exposure_count(), 1);
    assert_eq!(parsed.records[1].close_contact_duration_secs, 200);
}

#[test]
fn test_parse_rejects_binary() {
    assert!(UploadBatch::parse(&[0xff, 0xfe, 0x00]).is_err());
}

// =============================================================================
// UDP transport
// =============================================================================

#[tokio::test]
async fn test_udp_upload_to_loopback_collector() {
    let collector = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = collector.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let mut buf = vec![0u8; 65_535];
        let (len, from) = collector.recv_from(&mut buf).await.unwrap();
        collector.send_to(b"ACK", from).await.unwrap();
        buf.truncate(len);
        buf
    });

    let mut uploader = UploadProtocol::new(UdpChannel::new(addr.to_string(), 0), UploadConfig::default());
    let report = uploader.attempt_upload(&batch()).await;
    assert!(report.is_success());
    assert_eq!(report.datagrams_sent, 1);

    let received = server.await.unwrap();
    assert_eq!(received, batch().payload());
    assert!(uploader.channel().local_addr().is_some());
}

#[tokio::test]
async fn test_udp_late_ack_does_not_confirm_next_batch() {
    let collector = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = collector.local_addr().unwrap();
    let config = UploadConfig {
        retry_budget: 1,
        ack_timeout: Duration::from_millis(50),
        ..UploadConfig::default()
    };
    let mut uploader = UploadProtocol::new(UdpChannel::new(addr.to_string(), 0), config);
    let mut buf = vec![0u8; 65_535];

    assert!(!uploader.attempt_upload(&batch()).await.is_success());
    let (_, node) = collector.recv_from(&mut buf).await.unwrap();
    collector.send_to(b"ACK", node).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let report = uploader.attempt_upload(&batch()).await;
    assert_eq!(report.outcome, UploadOutcome::Failure(UploadFailure::NoAcknowledgement));
    assert_eq!(report.datagrams_sent, 1);
}

#[test]
fn test_udp_discard_before_connect_is_noop() {
    let mut channel = UdpChannel::new("127.0.0.1:9", 0);
    assert_eq!(channel.discard_pending(), 0);
}

#[tokio::test]
async fn test_udp_send_before_connect_fails() {
    let mut channel = UdpChannel::new("127.0.0.1:9", 0);
    assert!(!channel.is_connected());
    assert!(channel.send(b"x").await.is_err());
}
