//! Close-contact accounting and exposure classification.
//!
//! Accounting is session based: a close-contact session opens on the first
//! observation at or above the close threshold and is folded into the
//! accumulator on the first observation below it. Durations come from the
//! wall-clock deltas between those transitions, so an irregular scan cadence
//! cannot inflate the total.

#[cfg(test)]
mod tests;

use proxtrace_peer_table::{Admission, PeerEntry, PeerTable};
use proxtrace_primitives::{
    ExposureStatus, Observation, PeerId, Rssi, Timestamp, DEFAULT_CLOSE_CONTACT_RSSI_DBM,
    DEFAULT_EXPOSURE_THRESHOLD_SECS,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExposureConfig {
    /// Observations at or above this strength count as close contact.
    pub close_contact_rssi_threshold: Rssi,
    /// Inclusive bound on close-contact seconds that flags an exposure.
    pub exposure_time_threshold_secs: u64,
}

impl Default for ExposureConfig {
    fn default() -> Self {
        Self {
            close_contact_rssi_threshold: DEFAULT_CLOSE_CONTACT_RSSI_DBM,
            exposure_time_threshold_secs: DEFAULT_EXPOSURE_THRESHOLD_SECS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionTransition {
    Opened,
    Closed { added_secs: u64 },
    Unchanged,
}

/// Derived metrics for one observation, as written to the contact log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContactMetrics {
    pub admission: Admission,
    pub transition: SessionTransition,
    /// Seconds since the peer was first seen.
    pub total_contact_secs: u64,
    /// Completed sessions only.
    pub close_contact_accumulated_secs: u64,
    /// Completed sessions plus the running one.
    pub close_contact_secs: u64,
    pub exposure_status: ExposureStatus,
}

impl ContactMetrics {
    /// Metrics for a peer the table does not track.
    pub const fn untracked(admission: Admission) -> Self {
        Self {
            admission,
            transition: SessionTransition::Unchanged,
            total_contact_secs: 0,
            close_contact_accumulated_secs: 0,
            close_contact_secs: 0,
            exposure_status: ExposureStatus::Normal,
        }
    }

    pub const fn is_tracked(&self) -> bool {
        self.admission.is_tracked()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ExposureEvaluator {
    config: ExposureConfig,
}

impl ExposureEvaluator {
    pub fn new(config: ExposureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExposureConfig {
        &self.config
    }

    pub fn is_close(&self, rssi: Rssi) -> bool {
        rssi >= self.config.close_contact_rssi_threshold
    }

    pub fn is_exposure_event(&self, close_contact_secs: u64) -> bool {
        close_contact_secs >= self.config.exposure_time_threshold_secs
    }

    /// Process one observation against the table.
    ///
    /// Peers the table cannot admit (full, or time unknown) leave every
    /// tracked entry untouched.
    pub fn evaluate(&self, table: &mut PeerTable, observation: &Observation) -> ContactMetrics {
        let now = observation.timestamp;
        let admission = table.record_first_contact(&observation.peer, now);

        let Some(entry) = table.find_mut(&observation.peer).filter(|_| admission.is_tracked())
        else {
            if admission == Admission::TableFull {
                log::debug!("Observation of untracked peer {} ignored", observation.peer);
            }
            return ContactMetrics::untracked(admission);
        };

        let transition = self.update_close_contact(entry, observation.rssi, now);
        let metrics = self.metrics_at(entry, now, admission, transition);

        if metrics.exposure_status.is_exposure() {
            log::info!(
                "Exposure: peer {} close for {}s (threshold {}s)",
                observation.peer,
                metrics.close_contact_secs,
                self.config.exposure_time_threshold_secs
            );
        }

        metrics
    }

    /// Apply the none/close transition for one sample. Repeated close samples
    /// keep the original session start.
    pub fn update_close_contact(
        &self,
        entry: &mut PeerEntry,
        rssi: Rssi,
        now: Timestamp,
    ) -> SessionTransition {
        match (entry.in_close_session(), self.is_close(rssi)) {
            (false, true) => {
                entry.begin_close_session(now);
                SessionTransition::Opened
            }
            (true, false) => {
                let added_secs = entry.end_close_session(now).unwrap_or(0);
                log::debug!("Close session with {} ended after {}s", entry.peer(), added_secs);
                SessionTransition::Closed { added_secs }
            }
            _ => SessionTransition::Unchanged,
        }
    }

    /// Read-only view of a tracked peer at `now`.
    pub fn query(&self, table: &PeerTable, peer: &PeerId, now: Timestamp) -> Option<ContactMetrics> {
        let entry = table.find(peer)?;
        Some(self.metrics_at(entry, now, Admission::AlreadyTracked, SessionTransition::Unchanged))
    }

    fn metrics_at(
        &self,
        entry: &PeerEntry,
        now: Timestamp,
        admission: Admission,
        transition: SessionTransition,
    ) -> ContactMetrics {
        let close_contact_secs = entry.close_contact_at(now);

        ContactMetrics {
            admission,
            transition,
            total_contact_secs: now.saturating_sub(entry.first_seen()),
            close_contact_accumulated_secs: entry.close_contact_accumulated(),
            close_contact_secs,
            exposure_status: ExposureStatus::from_flag(self.is_exposure_event(close_contact_secs)),
        }
    }
}
