//! Core domain types for the proxtrace exposure tracker.

use core::fmt;
use core::str::FromStr;
use parity_scale_codec::{Decode, Encode};

use crate::constants::{
    ADVERTISEMENT_TAG, BROADCAST_ID_CHARSET, BROADCAST_ID_LEN, CSV_FIELD_COUNT,
};
use crate::errors::TracerError;

/// Unix seconds. `0` is reserved for "unknown" / "not tracked".
pub type Timestamp = u64;

/// Received signal strength in dBm.
pub type Rssi = i8;

// =============================================================================
// Identity Types
// =============================================================================

/// Stable link-layer address of a peer, distinct from its rotating broadcast
/// identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Encode, Decode)]
pub struct PeerId(String);

impl PeerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for PeerId {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(TracerError::InvalidRecord("empty peer id".into()));
        }
        if trimmed.contains([',', '\n', '\r']) {
            return Err(TracerError::InvalidRecord(format!(
                "peer id contains a separator: {trimmed:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// This device's advertised identifier. Regenerated every wake cycle.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Encode, Decode)]
pub struct BroadcastId(String);

impl BroadcastId {
    /// Build an identifier from charset indices, e.g. random draws.
    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        let id = indices
            .into_iter()
            .take(BROADCAST_ID_LEN)
            .map(|i| BROADCAST_ID_CHARSET[i % BROADCAST_ID_CHARSET.len()] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Manufacturer-data payload carried in advertisements.
    pub fn advertisement_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(ADVERTISEMENT_TAG.len() + self.0.len());
        payload.extend_from_slice(ADVERTISEMENT_TAG);
        payload.extend_from_slice(self.0.as_bytes());
        payload
    }

    /// Extract a tracer identifier from manufacturer data, if it carries one.
    pub fn from_advertisement(payload: &[u8]) -> Option<Self> {
        let rest = payload.strip_prefix(ADVERTISEMENT_TAG)?;
        let text = core::str::from_utf8(rest).ok()?;
        text.parse().ok()
    }
}

impl FromStr for BroadcastId {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s.len() == BROADCAST_ID_LEN
            && s.bytes().all(|b| BROADCAST_ID_CHARSET.contains(&b));
        if !valid {
            return Err(TracerError::InvalidRecord(format!("bad broadcast id {s:?}")));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Observations
// =============================================================================

/// A peer sighting already classified as relevant by the radio layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Observation {
    pub peer: PeerId,
    pub rssi: Rssi,
    pub timestamp: Timestamp,
}

impl Observation {
    pub fn new(peer: PeerId, rssi: Rssi, timestamp: Timestamp) -> Self {
        Self { peer, rssi, timestamp }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Encode, Decode)]
pub enum ExposureStatus {
    #[default]
    Normal,
    Exposure,
}

impl ExposureStatus {
    pub const fn from_flag(exposed: bool) -> Self {
        if exposed {
            Self::Exposure
        } else {
            Self::Normal
        }
    }

    pub const fn is_exposure(&self) -> bool {
        matches!(self, Self::Exposure)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Exposure => "EXPOSURE",
        }
    }
}

impl fmt::Display for ExposureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExposureStatus {
    type Err = TracerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NORMAL" => Ok(Self::Normal),
            "EXPOSURE" => Ok(Self::Exposure),
            other => Err(TracerError::InvalidRecord(format!("unknown exposure status {other:?}"))),
        }
    }
}

// =============================================================================
// Contact Records
// =============================================================================

/// One log row per accepted observation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContactRecord {
    pub timestamp: Timestamp,
    pub peer: PeerId,
    pub rssi: Rssi,
    pub device_id: BroadcastId,
    pub upload_duration_ms: u64,
    pub contact_duration_secs: u64,
    /// Includes any ongoing close-contact session.
    pub close_contact_duration_secs: u64,
    pub exposure_status: ExposureStatus,
}

impl ContactRecord {
    /// Render as a CSV row without trailing newline.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            self.timestamp,
            self.peer,
            self.rssi,
            self.device_id,
            self.upload_duration_ms,
            self.contact_duration_secs,
            self.close_contact_duration_secs,
            self.exposure_status,
        )
    }
}

fn parse_field<T: FromStr>(name: &str, raw: &str) -> Result<T, TracerError> {
    raw.trim()
        .parse()
        .map_err(|_| TracerError::InvalidRecord(format!("bad {name}: {raw:?}")))
}

impl FromStr for ContactRecord {
    type Err = TracerError;

    fn from_str(row: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = row.trim_end_matches(['\r', '\n']).split(',').collect();
        if fields.len() != CSV_FIELD_COUNT {
            return Err(TracerError::InvalidRecord(format!(
                "expected {CSV_FIELD_COUNT} fields, found {}",
                fields.len()
            )));
        }

        Ok(Self {
            timestamp: parse_field("timeStamp", fields[0])?,
            peer: fields[1].parse()?,
            rssi: parse_field("rssi", fields[2])?,
            device_id: fields[3].trim().parse()?,
            upload_duration_ms: parse_field("uploadDuration", fields[4])?,
            contact_duration_secs: parse_field("contactDuration", fields[5])?,
            close_contact_duration_secs: parse_field("closeContactDuration", fields[6])?,
            exposure_status: fields[7].parse()?,
        })
    }
}
