//! Acknowledged delivery of one batch.
//!
//! State: Idle -> Connecting -> Sending -> AwaitingAck -> Acked | TimedOut
//! TimedOut -> Sending (retry) | Exhausted
//!
//! Each attempt re-sends the identical payload with no backoff. Delivery is
//! at-least-once: a lost acknowledgement causes a duplicate batch at the
//! collector, never a silent loss. Datagrams queued before the first send
//! belong to an earlier batch and are discarded.

use std::time::Duration;

use proxtrace_primitives::{
    DatagramChannel, ACK_TOKEN, DEFAULT_ACK_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_RETRY_BUDGET, MAX_DATAGRAM_SIZE,
};
use tokio::time::{sleep_until, timeout, timeout_at, Instant};

use crate::batch::UploadBatch;

/// Pause after a receive error so a broken socket does not spin.
pub const ACK_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadConfig {
    /// Total transmissions allowed per upload.
    pub retry_budget: u32,
    pub ack_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_payload: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            max_payload: MAX_DATAGRAM_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Connecting,
    Sending { attempt: u32 },
    AwaitingAck { attempt: u32 },
    TimedOut { attempt: u32 },
    Acked,
    Exhausted,
}

impl UploadState {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Acked | Self::Exhausted)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadFailure {
    /// Batch does not fit in one datagram. Nothing was sent.
    PayloadTooLarge { size: usize, limit: usize },
    ConnectFailed(String),
    /// Retry budget spent without an acknowledgement.
    NoAcknowledgement,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    Success,
    Failure(UploadFailure),
}

#[derive(Clone, Debug)]
pub struct UploadReport {
    pub outcome: UploadOutcome,
    pub attempts: u32,
    pub datagrams_sent: u32,
    pub elapsed: Duration,
    pub trace: Vec<UploadState>,
}

impl UploadReport {
    pub fn is_success(&self) -> bool {
        self.outcome == UploadOutcome::Success
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

pub fn is_ack(datagram: &[u8]) -> bool {
    datagram == ACK_TOKEN
}

pub struct UploadProtocol<C: DatagramChannel> {
    channel: C,
    config: UploadConfig,
    state: UploadState,
    trace: Vec<UploadState>,
}

impl<C: DatagramChannel> UploadProtocol<C> {
    pub fn new(channel: C, config: UploadConfig) -> Self {
        Self {
            channel,
            config,
            state: UploadState::Idle,
            trace: Vec::new(),
        }
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn into_channel(self) -> C {
        self.channel
    }

    /// Deliver `batch` and report the result. Never returns early on an error:
    /// every failure ends in `Exhausted`.
    pub async fn attempt_upload(&mut self, batch: &UploadBatch) -> UploadReport {
        let started = Instant::now();
        let payload = batch.payload();
        let mut attempts = 0u32;
        let mut datagrams_sent = 0u32;
        let mut failure = None;

        self.trace.clear();
        self.transition(UploadState::Idle);

        if payload.len() > self.config.max_payload {
            log::warn!(
                "Upload batch of {} bytes exceeds datagram limit {}",
                payload.len(),
                self.config.max_payload
            );
            failure = Some(UploadFailure::PayloadTooLarge {
                size: payload.len(),
                limit: self.config.max_payload,
            });
            self.transition(UploadState::Exhausted);
        } else {
            self.transition(UploadState::Connecting);
        }

        while !self.state.is_terminal() {
            let next = match self.state {
                UploadState::Idle | UploadState::Connecting => match self.connect().await {
                    Ok(()) => {
                        let stale = self.channel.discard_pending();
                        if stale > 0 {
                            log::warn!("Discarded {} stale datagram(s) before sending", stale);
                        }
                        self.next_attempt(&mut attempts)
                    }
                    Err(reason) => {
                        failure = Some(reason);
                        UploadState::Exhausted
                    }
                },
                UploadState::Sending { attempt } => match self.channel.send(&payload).await {
                    Ok(()) => {
                        datagrams_sent += 1;
                        log::debug!("Sent batch datagram #{} ({} bytes)", attempt, payload.len());
                        UploadState::AwaitingAck { attempt }
                    }
                    Err(e) => {
                        log::warn!("Transmit #{} failed: {}", attempt, e);
                        UploadState::TimedOut { attempt }
                    }
                },
                UploadState::AwaitingAck { attempt } => {
                    let deadline = Instant::now() + self.config.ack_timeout;
                    if self.wait_for_ack(deadline).await {
                        UploadState::Acked
                    } else {
                        log::info!("ACK timeout on attempt {}/{}", attempt, self.config.retry_budget);
                        UploadState::TimedOut { attempt }
                    }
                }
                UploadState::TimedOut { .. } => self.next_attempt(&mut attempts),
                UploadState::Acked | UploadState::Exhausted => break,
            };
            self.transition(next);
        }

        let outcome = match self.state {
            UploadState::Acked => {
                log::info!("Batch acknowledged after {} attempt(s)", attempts);
                UploadOutcome::Success
            }
            _ => {
                let reason = failure.unwrap_or(UploadFailure::NoAcknowledgement);
                log::warn!("Upload failed: {:?}", reason);
                UploadOutcome::Failure(reason)
            }
        };

        UploadReport {
            outcome,
            attempts,
            datagrams_sent,
            elapsed: started.elapsed(),
            trace: self.trace.clone(),
        }
    }

    /// Wait until `deadline` for the acknowledgement token. Anything else on
    /// the channel is ignored.
    pub async fn wait_for_ack(&mut self, deadline: Instant) -> bool {
        loop {
            match timeout_at(deadline, self.channel.recv()).await {
                Err(_) => return false,
                Ok(Ok(datagram)) if is_ack(&datagram) => return true,
                Ok(Ok(datagram)) => {
                    log::debug!("Ignoring non-ACK reply of {} bytes", datagram.len());
                }
                Ok(Err(e)) => {
                    log::debug!("Receive failed while awaiting ACK: {}", e);
                    let pause = Instant::now() + ACK_POLL_INTERVAL;
                    sleep_until(pause.min(deadline)).await;
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<(), UploadFailure> {
        if self.channel.is_connected() {
            return Ok(());
        }

        match timeout(self.config.connect_timeout, self.channel.connect()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                log::warn!("Transport connection failed: {}", e);
                Err(UploadFailure::ConnectFailed(e.to_string()))
            }
            Err(_) => {
                log::warn!(
                    "Transport connection timed out after {}ms",
                    self.config.connect_timeout.as_millis()
                );
                Err(UploadFailure::ConnectFailed("timed out".into()))
            }
        }
    }

    fn next_attempt(&self, attempts: &mut u32) -> UploadState {
        if *attempts >= self.config.retry_budget {
            return UploadState::Exhausted;
        }
        *attempts += 1;
        UploadState::Sending { attempt: *attempts }
    }

    fn transition(&mut self, next: UploadState) {
        self.state = next;
        self.trace.push(next);
    }
}
