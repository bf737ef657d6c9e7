use super::types::{RawAdvertisement, ScanError};
use super::Scanner;
use async_trait::async_trait;
use proxtrace_primitives::BroadcastId;
use std::time::Duration;

#[cfg(feature = "bluetooth")]
use btleplug::api::{Central, Manager as _, Peripheral, ScanFilter};
#[cfg(feature = "bluetooth")]
use btleplug::platform::{Adapter, Manager};

/// Central-role scanner. It listens only: peers never hear this node.
pub struct BluetoothScanner {
    #[cfg(feature = "bluetooth")]
    adapter: Adapter,
}

#[cfg(feature = "bluetooth")]
fn adapter_error(e: btleplug::Error) -> ScanError {
    match e {
        btleplug::Error::PermissionDenied => ScanError::PermissionDenied,
        other => ScanError::BluetoothError(other.to_string()),
    }
}

#[cfg(feature = "bluetooth")]
fn scan_error(stage: &str, e: btleplug::Error) -> ScanError {
    match e {
        btleplug::Error::PermissionDenied => ScanError::PermissionDenied,
        other => ScanError::ScanFailed(format!("{stage}: {other}")),
    }
}

impl BluetoothScanner {
    pub async fn new() -> Result<Self, ScanError> {
        #[cfg(feature = "bluetooth")]
        {
            let manager = Manager::new().await.map_err(adapter_error)?;

            let adapter = manager
                .adapters()
                .await
                .map_err(adapter_error)?
                .into_iter()
                .next()
                .ok_or(ScanError::InterfaceNotFound)?;

            Ok(Self { adapter })
        }

        #[cfg(not(feature = "bluetooth"))]
        {
            log::warn!("Bluetooth scanning disabled - btleplug feature not enabled");
            Err(ScanError::UnsupportedPlatform)
        }
    }

    #[cfg(feature = "bluetooth")]
    fn process_peripheral(props: btleplug::api::PeripheralProperties) -> RawAdvertisement {
        RawAdvertisement {
            address: props.address.to_string().to_lowercase(),
            rssi: props.rssi,
            manufacturer_data: props.manufacturer_data,
            local_name: props.local_name,
        }
    }
}

#[async_trait]
impl Scanner for BluetoothScanner {
    fn name(&self) -> &'static str {
        "bluetooth"
    }

    /// btleplug drives the central role only, so there is no way to put the
    /// id on air.
    async fn advertise(&mut self, _id: &BroadcastId) -> Result<(), ScanError> {
        Err(ScanError::UnsupportedPlatform)
    }

    async fn scan(&mut self, scan_duration: Duration) -> Result<Vec<RawAdvertisement>, ScanError> {
        #[cfg(feature = "bluetooth")]
        {
            self.adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(|e| scan_error("start", e))?;

            tokio::time::sleep(scan_duration).await;

            self.adapter
                .stop_scan()
                .await
                .map_err(|e| scan_error("stop", e))?;

            let peripherals = self
                .adapter
                .peripherals()
                .await
                .map_err(adapter_error)?;

            let mut ads = Vec::new();
            for peripheral in peripherals {
                if let Ok(Some(props)) = peripheral.properties().await {
                    ads.push(Self::process_peripheral(props));
                }
            }

            log::debug!("Bluetooth scan heard {} advertisers", ads.len());
            Ok(ads)
        }

        #[cfg(not(feature = "bluetooth"))]
        {
            let _ = scan_duration;
            Err(ScanError::UnsupportedPlatform)
        }
    }
}
