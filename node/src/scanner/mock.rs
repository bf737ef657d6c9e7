use super::identity::random_broadcast_id;
use super::types::{RawAdvertisement, ScanError};
use super::Scanner;
use async_trait::async_trait;
use proxtrace_primitives::{BroadcastId, MANUFACTURER_COMPANY_ID};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

/// Simulated radio neighbourhood: a fixed pool of tracer peers that drift
/// closer and further away, some unrelated BLE devices, and optionally a
/// reflection of our own advertisement.
pub struct MockScanner {
    rng: ChaCha8Rng,
    peer_pool: Vec<MockPeer>,
    config: MockConfig,
    advertised: Option<BroadcastId>,
    scans: u64,
}

#[derive(Clone, Debug)]
pub struct MockConfig {
    pub peer_count: u32,
    pub noise_devices: u32,
    pub rssi_range: (i16, i16),
    pub rssi_jitter: i16,
    pub self_echo: bool,
    /// Sleep for the requested scan duration, as a real radio would.
    pub realtime: bool,
    pub seed: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            peer_count: 4,
            noise_devices: 3,
            rssi_range: (-85, -45),
            rssi_jitter: 6,
            self_echo: true,
            realtime: true,
            seed: 42,
        }
    }
}

struct MockPeer {
    address: String,
    base_rssi: i16,
    visibility_probability: f64,
    /// dB per scan; a negative drift walks away.
    drift: i16,
}

impl MockScanner {
    pub fn new(config: MockConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let peer_pool = Self::generate_peer_pool(&mut rng, &config);

        Self {
            rng,
            peer_pool,
            config,
            advertised: None,
            scans: 0,
        }
    }

    fn generate_peer_pool(rng: &mut ChaCha8Rng, config: &MockConfig) -> Vec<MockPeer> {
        let (low, high) = ordered(config.rssi_range);
        (0..config.peer_count.min(64))
            .map(|_| MockPeer {
                address: random_address(rng),
                base_rssi: rng.gen_range(low..=high),
                visibility_probability: rng.gen_range(0.5..1.0),
                drift: rng.gen_range(-2i16..=2),
            })
            .collect()
    }

    pub fn peer_addresses(&self) -> Vec<&str> {
        self.peer_pool.iter().map(|p| p.address.as_str()).collect()
    }

    pub fn advertised(&self) -> Option<&BroadcastId> {
        self.advertised.as_ref()
    }

    fn peer_advertisement(&mut self, idx: usize) -> RawAdvertisement {
        let jitter = self.config.rssi_jitter.max(0);
        let variation = self.rng.gen_range(-jitter..=jitter);
        let peer = &self.peer_pool[idx];
        let walked = peer
            .drift
            .saturating_mul(i16::try_from(self.scans % 20).unwrap_or(0));
        let rssi = peer
            .base_rssi
            .saturating_add(walked)
            .saturating_add(variation)
            .clamp(-100, -20);

        // Peers rotate their identifiers every cycle too.
        let id = random_broadcast_id(&mut self.rng);
        RawAdvertisement::new(peer.address.clone(), rssi)
            .with_manufacturer_data(MANUFACTURER_COMPANY_ID, id.advertisement_payload())
    }

    fn noise_advertisement(&mut self) -> RawAdvertisement {
        let rssi = self.rng.gen_range(-95i16..=-40);
        let address = random_address(&mut self.rng);
        if self.rng.gen_bool(0.5) {
            // Apple company id
            RawAdvertisement::new(address, rssi).with_manufacturer_data(0x004C, vec![0x02, 0x15])
        } else {
            let mut ad = RawAdvertisement::new(address, rssi);
            ad.local_name = Some("LE-Speaker".to_string());
            ad
        }
    }
}

#[async_trait]
impl Scanner for MockScanner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn advertise(&mut self, id: &BroadcastId) -> Result<(), ScanError> {
        self.advertised = Some(id.clone());
        Ok(())
    }

    async fn scan(&mut self, duration: Duration) -> Result<Vec<RawAdvertisement>, ScanError> {
        if self.config.realtime {
            tokio::time::sleep(duration).await;
        }

        let visible: Vec<usize> = (0..self.peer_pool.len())
            .filter(|&i| self.rng.gen::<f64>() < self.peer_pool[i].visibility_probability)
            .collect();

        let mut ads: Vec<RawAdvertisement> = visible
            .into_iter()
            .map(|idx| self.peer_advertisement(idx))
            .collect();

        for _ in 0..self.config.noise_devices {
            let ad = self.noise_advertisement();
            ads.push(ad);
        }

        if self.config.self_echo {
            if let Some(own) = &self.advertised {
                ads.push(
                    RawAdvertisement::new("00:00:00:00:00:01", -30)
                        .with_manufacturer_data(MANUFACTURER_COMPANY_ID, own.advertisement_payload()),
                );
            }
        }

        self.scans = self.scans.saturating_add(1);
        ads.sort_by(|a, b| b.rssi.cmp(&a.rssi));
        Ok(ads)
    }
}

fn ordered((a, b): (i16, i16)) -> (i16, i16) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn random_address<R: Rng>(rng: &mut R) -> String {
    let mut mac = [0u8; 6];
    rng.fill(&mut mac);
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}
