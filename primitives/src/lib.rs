//! Core primitives for the proxtrace proximity exposure tracker.

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod traits;
pub mod types;

pub use constants::*;
pub use errors::{TracerError, TracerResult};
pub use types::*;

pub use traits::{DatagramChannel, FixedTime, LogStorage, TimeSource};
