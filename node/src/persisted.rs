//! State that survives the sleep between wake cycles.
//!
//! File layout: `magic (4) | version (1) | SCALE body | blake2b-256 (32)`.
//! The checksum covers magic, version and body. A file that fails any check
//! is discarded as a whole and the device cold boots.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use parity_scale_codec::{Decode, DecodeAll, Encode};
use proxtrace_peer_table::PeerEntry;
use proxtrace_primitives::{Timestamp, TracerError, TracerResult, UNKNOWN_TIME};
use std::path::Path;

type Blake2b256 = Blake2b<U32>;

pub const STATE_MAGIC: [u8; 4] = *b"PXTS";
pub const STATE_VERSION: u8 = 1;
const HEADER_LEN: usize = STATE_MAGIC.len() + 1;
const CHECKSUM_LEN: usize = 32;

#[derive(Clone, Debug, Default, PartialEq, Eq, Encode, Decode)]
pub struct PersistedState {
    /// Completed wake cycles since cold boot. Wraps to 0, which forces the
    /// next cycle to cold boot.
    pub boot_count: u32,
    /// Duration of the last successful upload, 0 if none yet.
    pub last_upload_duration_ms: u64,
    /// Start of the last cycle whose time was known.
    pub last_cycle_unix: Timestamp,
    pub peers: Vec<PeerEntry>,
}

impl PersistedState {
    pub fn is_cold_boot(&self) -> bool {
        self.boot_count == 0
    }

    /// Drop everything a cold boot must not carry over. The cycle counter is
    /// left alone.
    pub fn reset_epoch(&mut self) {
        self.last_upload_duration_ms = 0;
        self.last_cycle_unix = UNKNOWN_TIME;
        self.peers.clear();
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + 64 + CHECKSUM_LEN);
        bytes.extend_from_slice(&STATE_MAGIC);
        bytes.push(STATE_VERSION);
        self.encode_to(&mut bytes);
        let checksum = Blake2b256::digest(&bytes);
        bytes.extend_from_slice(checksum.as_slice());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> TracerResult<Self> {
        if bytes.len() < HEADER_LEN + CHECKSUM_LEN {
            return Err(corrupted(format!("{} bytes is too short", bytes.len())));
        }
        let (signed, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
        if Blake2b256::digest(signed).as_slice() != checksum {
            return Err(corrupted("checksum mismatch".into()));
        }
        if signed[..STATE_MAGIC.len()] != STATE_MAGIC {
            return Err(corrupted("bad magic".into()));
        }
        let version = signed[STATE_MAGIC.len()];
        if version != STATE_VERSION {
            return Err(corrupted(format!("unsupported version {version}")));
        }

        Self::decode_all(&mut &signed[HEADER_LEN..]).map_err(|e| corrupted(e.to_string()))
    }

    /// Restore the state written at the end of the previous cycle. Missing or
    /// unreadable state means cold boot.
    pub fn load_on_resume(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No persisted state at {}, cold boot", path.display());
                return Self::default();
            }
            Err(e) => {
                log::warn!("Failed to read persisted state {}: {}", path.display(), e);
                return Self::default();
            }
        };

        match Self::from_bytes(&bytes) {
            Ok(state) => {
                log::debug!(
                    "Resumed: boot #{}, {} tracked peers",
                    state.boot_count,
                    state.peers.len()
                );
                state
            }
            Err(e) => {
                log::warn!("Discarding persisted state: {}", e);
                Self::default()
            }
        }
    }

    /// Write the state atomically: a crash mid-write leaves the previous file.
    pub fn save_on_suspend(&self, path: &Path) -> TracerResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_bytes())?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Remove the state file, forcing the next cycle to cold boot.
    pub fn purge(path: &Path) -> TracerResult<bool> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn corrupted(reason: String) -> TracerError {
    TracerError::StateCorrupted(reason)
}
