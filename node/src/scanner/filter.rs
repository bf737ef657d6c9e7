//! Decides which advertisements are peer observations.
//!
//! A peer advertises its rotating identifier as `PXT:<id>` under our company
//! id. Everything else in radio range is noise to the tracker.

use super::types::RawAdvertisement;
use proxtrace_primitives::{BroadcastId, Observation, PeerId, Rssi, Timestamp};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Peer(Observation),
    /// Carries no tracer identifier.
    Foreign,
    /// Our own identifier, reflected back or heard from a second radio.
    SelfEcho,
    TooWeak(Rssi),
    /// Address unusable as a peer id, or no signal strength reported.
    Malformed,
}

pub fn classify(
    ad: &RawAdvertisement,
    own_id: &BroadcastId,
    rssi_floor: Rssi,
    now: Timestamp,
) -> Classification {
    let Some(id) = ad.tracer_id() else {
        return Classification::Foreign;
    };
    if &id == own_id {
        return Classification::SelfEcho;
    }
    let Some(rssi) = ad.rssi_dbm() else {
        return Classification::Malformed;
    };
    if rssi < rssi_floor {
        return Classification::TooWeak(rssi);
    }
    match ad.address.parse::<PeerId>() {
        Ok(peer) => Classification::Peer(Observation::new(peer, rssi, now)),
        Err(_) => Classification::Malformed,
    }
}

/// Peer observations from one scan, one per peer (strongest sample wins),
/// ordered by address.
pub fn collect_observations(
    ads: &[RawAdvertisement],
    own_id: &BroadcastId,
    rssi_floor: Rssi,
    now: Timestamp,
) -> Vec<Observation> {
    let mut strongest: BTreeMap<PeerId, Observation> = BTreeMap::new();
    let mut ignored = 0usize;

    for ad in ads {
        match classify(ad, own_id, rssi_floor, now) {
            Classification::Peer(obs) => {
                let keep = strongest
                    .get(&obs.peer)
                    .map_or(true, |seen| obs.rssi > seen.rssi);
                if keep {
                    strongest.insert(obs.peer.clone(), obs);
                }
            }
            Classification::TooWeak(rssi) => {
                log::debug!("Ignored {} due to weak RSSI: {}", ad.address, rssi);
                ignored += 1;
            }
            Classification::SelfEcho => {
                log::debug!("Ignored own advertisement from {}", ad.address);
                ignored += 1;
            }
            Classification::Foreign | Classification::Malformed => ignored += 1,
        }
    }

    log::debug!(
        "Scan classified: {} peers, {} ignored",
        strongest.len(),
        ignored
    );
    strongest.into_values().collect()
}
