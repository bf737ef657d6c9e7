//! Reference configuration values and wire constants.

use crate::types::Timestamp;

// Wake Cycle
pub const DEFAULT_WAKE_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;
pub const DEFAULT_UPLOAD_EVERY_N_CYCLES: u32 = 5;

// Exposure
pub const DEFAULT_CLOSE_CONTACT_RSSI_DBM: i8 = -60;
pub const DEFAULT_EXPOSURE_THRESHOLD_SECS: u64 = 300;
pub const DEFAULT_PEER_TABLE_CAPACITY: usize = 10;

// Radio
pub const DEFAULT_RSSI_FLOOR_DBM: i8 = -90;
pub const BROADCAST_ID_LEN: usize = 8;
pub const BROADCAST_ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const MANUFACTURER_COMPANY_ID: u16 = 0x1234;
pub const ADVERTISEMENT_TAG: &[u8] = b"PXT:";

// Upload
pub const DEFAULT_RETRY_BUDGET: u32 = 3;
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COLLECTOR_PORT: u16 = 4210;
pub const ACK_TOKEN: &[u8; 3] = b"ACK";
/// Largest payload a single UDP/IPv4 datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
pub const UPLOAD_TIMESTAMP_PREFIX: &str = "# Upload Timestamp: ";

// Contact Log
pub const LOG_FILE_NAME: &str = "data.csv";
pub const CSV_HEADER: &str =
    "timeStamp,peerId,rssi,deviceId,uploadDuration,contactDuration,closeContactDuration,exposureStatus";
pub const CSV_FIELD_COUNT: usize = 8;

// Time
/// Reserved timestamp meaning "unknown" / "not tracked".
pub const UNKNOWN_TIME: Timestamp = 0;
pub const MILLIS_PER_SECOND: u64 = 1_000;

/// Wall-clock time for the current cycle: boot time plus whole seconds elapsed.
///
/// An unknown boot time stays unknown rather than turning into a small
/// positive timestamp.
#[inline]
pub const fn cycle_time(boot_unix: Timestamp, elapsed_ms: u64) -> Timestamp {
    if boot_unix == UNKNOWN_TIME {
        return UNKNOWN_TIME;
    }
    boot_unix.saturating_add(elapsed_ms / MILLIS_PER_SECOND)
}

/// Whether the 1-based `cycle_number` is an upload cycle.
#[inline]
pub const fn is_upload_cycle(cycle_number: u32, every_n: u32) -> bool {
    every_n != 0 && cycle_number != 0 && cycle_number % every_n == 0
}
