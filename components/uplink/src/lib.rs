//! Reliable delivery of contact-log batches over an unreliable datagram
//! channel, with an application-level `ACK` and a bounded retry budget.

#[cfg(test)]
mod tests;

pub mod batch;
pub mod protocol;
pub mod udp;

pub use batch::{ParsedBatch, UploadBatch};
pub use protocol::{
    is_ack, UploadConfig, UploadFailure, UploadOutcome, UploadProtocol, UploadReport, UploadState,
};
pub use udp::UdpChannel;
