//! Tracker error taxonomy.

use thiserror::Error;

pub type TracerResult<T> = Result<T, TracerError>;

#[derive(Debug, Error)]
pub enum TracerError {
    // Storage
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("storage i/o failed: {0}")]
    StorageIo(#[from] std::io::Error),

    // Transport
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("transport error: {0}")]
    Transport(String),

    // Persistence & parsing
    #[error("persisted state corrupted: {0}")]
    StateCorrupted(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TracerError {
    /// Only a storage that cannot be mounted even after a reformat stops the
    /// device for the rest of the boot.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(TracerError::StorageUnavailable("mount".into()).is_fatal());
        assert!(!TracerError::StateCorrupted("checksum".into()).is_fatal());
        assert!(!TracerError::Transport("reset".into()).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(!TracerError::from(io).is_fatal());
    }

    #[test]
    fn display_messages() {
        let err = TracerError::TransportUnavailable("no route".into());
        assert_eq!(err.to_string(), "transport unavailable: no route");
    }
}
