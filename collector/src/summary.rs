//! Offline per-peer summary of everything the collector has stored.

use proxtrace_primitives::{ExposureStatus, PeerId, Rssi, TracerResult};
use proxtrace_uplink::UploadBatch;
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignalBand {
    VeryWeak,
    Weak,
    Good,
    Strong,
}

impl SignalBand {
    /// Upper bounds are inclusive: -80 is very weak, -40 is good.
    pub const fn of(rssi: Rssi) -> Self {
        if rssi <= -80 {
            Self::VeryWeak
        } else if rssi <= -60 {
            Self::Weak
        } else if rssi <= -40 {
            Self::Good
        } else {
            Self::Strong
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerSummary {
    pub records: u64,
    pub strongest: Rssi,
    pub weakest: Rssi,
    rssi_total: i64,
    pub longest_contact_secs: u64,
    pub longest_close_contact_secs: u64,
    pub exposed: bool,
}

impl PeerSummary {
    fn new(rssi: Rssi) -> Self {
        Self {
            records: 0,
            strongest: rssi,
            weakest: rssi,
            rssi_total: 0,
            longest_contact_secs: 0,
            longest_close_contact_secs: 0,
            exposed: false,
        }
    }

    pub fn mean_rssi(&self) -> f64 {
        if self.records == 0 {
            return 0.0;
        }
        self.rssi_total as f64 / self.records as f64
    }
}

#[derive(Debug, Default)]
pub struct Summary {
    pub peers: BTreeMap<PeerId, PeerSummary>,
    pub bands: BTreeMap<SignalBand, u64>,
    pub rejected_rows: usize,
}

impl Summary {
    pub fn record_count(&self) -> u64 {
        self.peers.values().map(|p| p.records).sum()
    }

    pub fn exposed_peers(&self) -> usize {
        self.peers.values().filter(|p| p.exposed).count()
    }
}

/// Group every stored row by peer. `content` is the collector output file:
/// batches appended back to back, metadata and header lines included.
pub fn summarize(content: &[u8]) -> TracerResult<Summary> {
    let parsed = UploadBatch::parse(content)?;
    let mut summary = Summary {
        rejected_rows: parsed.rejected_rows,
        ..Summary::default()
    };

    for record in &parsed.records {
        *summary.bands.entry(SignalBand::of(record.rssi)).or_default() += 1;

        let peer = summary
            .peers
            .entry(record.peer.clone())
            .or_insert_with(|| PeerSummary::new(record.rssi));
        peer.records += 1;
        peer.strongest = peer.strongest.max(record.rssi);
        peer.weakest = peer.weakest.min(record.rssi);
        peer.rssi_total += i64::from(record.rssi);
        peer.longest_contact_secs = peer.longest_contact_secs.max(record.contact_duration_secs);
        peer.longest_close_contact_secs = peer
            .longest_close_contact_secs
            .max(record.close_contact_duration_secs);
        peer.exposed |= record.exposure_status == ExposureStatus::Exposure;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLLECTED: &[u8] = b"# Upload Timestamp: 1717000500\n\
timeStamp,peerId,rssi,deviceId,uploadDuration,contactDuration,closeContactDuration,exposureStatus\n\
1717000000,aa:bb,-55,QW7ZK2M4,0,0,0,NORMAL\n\
1717000005,cc:dd,-85,QW7ZK2M4,0,0,0,NORMAL\n\
# Upload Timestamp: 1717001000\n\
timeStamp,peerId,rssi,deviceId,uploadDuration,contactDuration,closeContactDuration,exposureStatus\n\
1717000400,aa:bb,-35,PL0XN3C8,812,400,400,EXPOSURE\n\
broken,row\n";

    #[test]
    fn test_groups_rows_by_peer() {
        let summary = summarize(COLLECTED).unwrap();

        assert_eq!(summary.record_count(), 3);
        assert_eq!(summary.rejected_rows, 1);
        assert_eq!(summary.exposed_peers(), 1);

        let near: PeerId = "aa:bb".parse().unwrap();
        let near = &summary.peers[&near];
        assert_eq!(near.records, 2);
        assert_eq!((near.strongest, near.weakest), (-35, -55));
        assert_eq!(near.mean_rssi(), -45.0);
        assert_eq!(near.longest_close_contact_secs, 400);
        assert!(near.exposed);

        let far: PeerId = "cc:dd".parse().unwrap();
        assert!(!summary.peers[&far].exposed);
    }

    #[test]
    fn test_signal_bands() {
        assert_eq!(SignalBand::of(-80), SignalBand::VeryWeak);
        assert_eq!(SignalBand::of(-79), SignalBand::Weak);
        assert_eq!(SignalBand::of(-60), SignalBand::Weak);
        assert_eq!(SignalBand::of(-40), SignalBand::Good);
        assert_eq!(SignalBand::of(-39), SignalBand::Strong);

        let summary = summarize(COLLECTED).unwrap();
        assert_eq!(summary.bands.get(&SignalBand::VeryWeak), Some(&1));
        assert_eq!(summary.bands.get(&SignalBand::Good), Some(&1));
        assert_eq!(summary.bands.get(&SignalBand::Strong), Some(&1));
        assert_eq!(summary.bands.get(&SignalBand::Weak), None);
    }

    #[test]
    fn test_empty_file() {
        let summary = summarize(b"").unwrap();
        assert!(summary.peers.is_empty());
        assert_eq!(summary.record_count(), 0);
    }
}
