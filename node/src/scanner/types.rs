use proxtrace_primitives::{BroadcastId, Rssi, MANUFACTURER_COMPANY_ID};
use std::collections::HashMap;
use thiserror::Error;

/// One advertisement as reported by a scanner backend, before any filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAdvertisement {
    /// Link-layer address of the advertiser.
    pub address: String,
    pub rssi: Option<i16>,
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
    pub local_name: Option<String>,
}

impl RawAdvertisement {
    pub fn new(address: impl Into<String>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            rssi: Some(rssi),
            ..Self::default()
        }
    }

    pub fn with_manufacturer_data(mut self, company_id: u16, data: Vec<u8>) -> Self {
        self.manufacturer_data.insert(company_id, data);
        self
    }

    /// Tracer identifier carried under our company id, if any.
    pub fn tracer_id(&self) -> Option<BroadcastId> {
        self.manufacturer_data
            .get(&MANUFACTURER_COMPANY_ID)
            .and_then(|payload| BroadcastId::from_advertisement(payload))
    }

    /// Signal strength clamped into the `i8` dBm range.
    pub fn rssi_dbm(&self) -> Option<Rssi> {
        self.rssi
            .map(|r| r.clamp(i16::from(Rssi::MIN), i16::from(Rssi::MAX)) as Rssi)
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Unsupported platform")]
    UnsupportedPlatform,
    #[error("Permission denied")]
    PermissionDenied,
    #[error("Interface not found")]
    InterfaceNotFound,
    #[error("Scan failed: {0}")]
    ScanFailed(String),
    #[error("Bluetooth error: {0}")]
    BluetoothError(String),
}
