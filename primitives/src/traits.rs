//! Seams to the external collaborators: wall clock, durable log storage and
//! the datagram transport.

use async_trait::async_trait;

use crate::errors::TracerResult;
use crate::types::Timestamp;

/// Wall-clock synchronization.
pub trait TimeSource {
    /// Current Unix time, or `0` when synchronization failed.
    fn unix_time(&mut self) -> Timestamp;
}

/// Durable append-only store holding a single log file.
pub trait LogStorage {
    fn mount(&mut self) -> TracerResult<()>;

    /// Wipe the medium. Used once as recovery when mounting fails.
    fn format(&mut self) -> TracerResult<()>;

    /// Size of the log in bytes, `None` if the log does not exist.
    fn size(&self) -> TracerResult<Option<u64>>;

    fn append(&mut self, bytes: &[u8]) -> TracerResult<()>;

    /// Full log content, `None` if the log does not exist.
    fn read_all(&self) -> TracerResult<Option<String>>;

    fn truncate(&mut self) -> TracerResult<()>;
}

/// Unreliable datagram transport towards the collector.
#[async_trait]
pub trait DatagramChannel: Send {
    /// Establish the link. Must be cheap when already connected.
    async fn connect(&mut self) -> TracerResult<()>;

    fn is_connected(&self) -> bool;

    async fn send(&mut self, payload: &[u8]) -> TracerResult<()>;

    /// Wait for the next datagram addressed to us.
    async fn recv(&mut self) -> TracerResult<Vec<u8>>;

    /// Drop every datagram already queued without waiting. Returns how many
    /// were dropped.
    fn discard_pending(&mut self) -> usize;
}

/// Always reports the same time. Useful for replaying recorded cycles.
#[derive(Debug, Clone, Copy)]
pub struct FixedTime(pub Timestamp);

impl TimeSource for FixedTime {
    fn unix_time(&mut self) -> Timestamp {
        self.0
    }
}
