pub mod bluetooth;
pub mod filter;
pub mod identity;
pub mod mock;
pub mod types;

pub use filter::{classify, collect_observations, Classification};
pub use identity::IdentityRotator;
pub use mock::{MockConfig, MockScanner};
pub use types::*;

use async_trait::async_trait;
use bluetooth::BluetoothScanner;
use proxtrace_primitives::BroadcastId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Radio backend: advertises our identifier and reports what it heard.
#[async_trait]
pub trait Scanner: Send {
    fn name(&self) -> &'static str;

    async fn advertise(&mut self, id: &BroadcastId) -> Result<(), ScanError>;

    /// Listen for `duration` and return every advertisement heard.
    async fn scan(&mut self, duration: Duration) -> Result<Vec<RawAdvertisement>, ScanError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerMode {
    #[default]
    Mock,
    Bluetooth,
    Disabled,
}

impl std::str::FromStr for ScannerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "bluetooth" | "ble" | "real" => Ok(Self::Bluetooth),
            "disabled" | "off" | "none" => Ok(Self::Disabled),
            _ => Err(format!("Unknown scanner mode: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub mode: ScannerMode,
    pub mock_peers: u32,
    pub mock_seed: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            mode: ScannerMode::Mock,
            mock_peers: 4,
            mock_seed: 42,
        }
    }
}

/// Hears nothing. The cycle still waits out the scan window so the wake
/// cadence is unchanged.
pub struct DisabledScanner;

#[async_trait]
impl Scanner for DisabledScanner {
    fn name(&self) -> &'static str {
        "disabled"
    }

    async fn advertise(&mut self, _id: &BroadcastId) -> Result<(), ScanError> {
        Ok(())
    }

    async fn scan(&mut self, duration: Duration) -> Result<Vec<RawAdvertisement>, ScanError> {
        tokio::time::sleep(duration).await;
        Ok(Vec::new())
    }
}

pub async fn create_scanner(config: &ScannerConfig) -> Result<Box<dyn Scanner>, ScanError> {
    let scanner: Box<dyn Scanner> = match config.mode {
        ScannerMode::Disabled => {
            log::info!("Device scanner disabled");
            Box::new(DisabledScanner)
        }
        ScannerMode::Mock => {
            log::info!(
                "Mock scanner started - {} peers, seed {}",
                config.mock_peers,
                config.mock_seed
            );
            Box::new(MockScanner::new(MockConfig {
                peer_count: config.mock_peers,
                seed: config.mock_seed,
                ..MockConfig::default()
            }))
        }
        ScannerMode::Bluetooth => Box::new(BluetoothScanner::new().await?),
    };
    Ok(scanner)
}
