//! Tracker configuration: reference defaults, JSON file, CLI overrides.

use crate::scanner::{ScannerConfig, ScannerMode};
use proxtrace_exposure::ExposureConfig;
use proxtrace_primitives::*;
use proxtrace_uplink::UploadConfig;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // Wake cycle
    pub wake_interval_secs: u64,
    pub scan_duration_secs: u64,
    pub upload_every_n_cycles: u32,
    /// Stop after this many cycles; 0 runs forever.
    pub max_cycles: u64,

    // Exposure
    pub close_contact_rssi_dbm: Rssi,
    pub exposure_threshold_secs: u64,
    pub peer_table_capacity: usize,

    // Radio
    pub rssi_floor_dbm: Rssi,
    pub scanner_mode: ScannerMode,
    pub mock_peers: u32,
    pub mock_seed: u64,

    // Upload
    pub collector_addr: String,
    pub local_port: u16,
    pub retry_budget: u32,
    pub ack_timeout_ms: u64,
    pub connect_timeout_ms: u64,

    // Storage
    /// Directory owned by the contact log. Reformatting wipes it.
    pub data_dir: PathBuf,
    pub state_path: PathBuf,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            wake_interval_secs: DEFAULT_WAKE_INTERVAL_SECS,
            scan_duration_secs: DEFAULT_SCAN_DURATION_SECS,
            upload_every_n_cycles: DEFAULT_UPLOAD_EVERY_N_CYCLES,
            max_cycles: 0,
            close_contact_rssi_dbm: DEFAULT_CLOSE_CONTACT_RSSI_DBM,
            exposure_threshold_secs: DEFAULT_EXPOSURE_THRESHOLD_SECS,
            peer_table_capacity: DEFAULT_PEER_TABLE_CAPACITY,
            rssi_floor_dbm: DEFAULT_RSSI_FLOOR_DBM,
            scanner_mode: ScannerMode::default(),
            mock_peers: 4,
            mock_seed: 42,
            collector_addr: format!("127.0.0.1:{DEFAULT_COLLECTOR_PORT}"),
            local_port: 0,
            retry_budget: DEFAULT_RETRY_BUDGET,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            data_dir: PathBuf::from("proxtrace-data/log"),
            state_path: PathBuf::from("proxtrace-data/state.bin"),
        }
    }
}

impl TrackerConfig {
    /// Read a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> TracerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> TracerResult<Self> {
        serde_json::from_str(raw).map_err(|e| TracerError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> TracerResult<()> {
        let fail = |msg: &str| Err(TracerError::InvalidConfig(msg.to_string()));

        if self.peer_table_capacity == 0 {
            return fail("peer_table_capacity must be at least 1");
        }
        if self.upload_every_n_cycles == 0 {
            return fail("upload_every_n_cycles must be at least 1");
        }
        if self.retry_budget == 0 {
            return fail("retry_budget must be at least 1");
        }
        if self.ack_timeout_ms == 0 {
            return fail("ack_timeout_ms must be positive");
        }
        if self.close_contact_rssi_dbm < self.rssi_floor_dbm {
            return fail("close_contact_rssi_dbm is below rssi_floor_dbm; no contact could ever be close");
        }
        if self.collector_addr.trim().is_empty() {
            return fail("collector_addr is empty");
        }
        if normalized(&self.state_path).starts_with(normalized(&self.data_dir)) {
            return fail("state_path must live outside data_dir");
        }
        Ok(())
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_secs)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    /// Expected seconds between the starts of two consecutive cycles.
    pub fn cycle_period_secs(&self) -> u64 {
        self.wake_interval_secs.saturating_add(self.scan_duration_secs)
    }

    pub fn exposure_config(&self) -> ExposureConfig {
        ExposureConfig {
            close_contact_rssi_threshold: self.close_contact_rssi_dbm,
            exposure_time_threshold_secs: self.exposure_threshold_secs,
        }
    }

    pub fn upload_config(&self) -> UploadConfig {
        UploadConfig {
            retry_budget: self.retry_budget,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            max_payload: MAX_DATAGRAM_SIZE,
        }
    }

    pub fn scanner_config(&self) -> ScannerConfig {
        ScannerConfig {
            mode: self.scanner_mode,
            mock_peers: self.mock_peers,
            mock_seed: self.mock_seed,
        }
    }
}

/// Absolute form of `path` with `.` and `..` folded away, without touching
/// the filesystem.
fn normalized(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
