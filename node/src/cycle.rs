//! The wake cycle: scan, evaluate, log, maybe upload, then suspend.
//!
//! Cycles never overlap. Everything that must outlive the sleep is carried in
//! [`PersistedState`] and the contact log; the rest is rebuilt every cycle.

use crate::config::TrackerConfig;
use crate::persisted::PersistedState;
use crate::scanner::{collect_observations, IdentityRotator, Scanner};
use crate::time::{CycleClock, TimeQuality};
use proxtrace_contact_log::ContactLogger;
use proxtrace_exposure::ExposureEvaluator;
use proxtrace_peer_table::PeerTable;
use proxtrace_primitives::{
    is_upload_cycle, BroadcastId, ContactRecord, DatagramChannel, LogStorage, TimeSource,
    Timestamp, TracerResult,
};
use proxtrace_uplink::{UploadBatch, UploadProtocol, UploadReport};
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CycleReport {
    /// 1-based cycle number since cold boot.
    pub cycle_number: u32,
    pub cold_boot: bool,
    pub time_quality: TimeQuality,
    pub now: Timestamp,
    pub broadcast_id: BroadcastId,
    pub advertisements: usize,
    pub observations: usize,
    pub records_written: usize,
    /// Observations of peers the table could not admit.
    pub untracked: usize,
    pub upload: Option<UploadReport>,
}

pub struct Tracker<S: LogStorage, C: DatagramChannel, T: TimeSource> {
    config: TrackerConfig,
    logger: ContactLogger<S>,
    uploader: UploadProtocol<C>,
    scanner: Box<dyn Scanner>,
    time: T,
    identity: IdentityRotator,
    evaluator: ExposureEvaluator,
}

impl<S: LogStorage, C: DatagramChannel, T: TimeSource> Tracker<S, C, T> {
    pub fn new(
        config: TrackerConfig,
        storage: S,
        channel: C,
        scanner: Box<dyn Scanner>,
        time: T,
        identity: IdentityRotator,
    ) -> Self {
        let evaluator = ExposureEvaluator::new(config.exposure_config());
        let uploader = UploadProtocol::new(channel, config.upload_config());
        Self {
            config,
            logger: ContactLogger::new(storage),
            uploader,
            scanner,
            time,
            identity,
            evaluator,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn logger(&self) -> &ContactLogger<S> {
        &self.logger
    }

    pub fn uploader(&self) -> &UploadProtocol<C> {
        &self.uploader
    }

    /// Run one cycle against `state`. Only a storage that cannot be mounted
    /// is an error; `state` is left untouched in that case.
    pub async fn run_cycle(&mut self, state: &mut PersistedState) -> TracerResult<CycleReport> {
        self.logger.mount()?;

        let cold_boot = state.is_cold_boot();
        state.boot_count = state.boot_count.wrapping_add(1);
        let cycle_number = state.boot_count;
        if cold_boot {
            log::info!("Cold boot: clearing peer table and contact log");
            state.reset_epoch();
            self.logger.clear();
        }

        let mut table = PeerTable::from_entries(
            self.config.peer_table_capacity,
            std::mem::take(&mut state.peers),
        );
        let clock = CycleClock::start(
            &mut self.time,
            state.last_cycle_unix,
            self.config.cycle_period_secs(),
        );

        let broadcast_id = self.identity.rotate();
        if let Err(e) = self.scanner.advertise(&broadcast_id).await {
            log::warn!("Failed to advertise {}: {}", broadcast_id, e);
        }

        let advertisements = match self.scanner.scan(self.config.scan_duration()).await {
            Ok(ads) => ads,
            Err(e) => {
                log::warn!("{} scan failed: {}", self.scanner.name(), e);
                Vec::new()
            }
        };

        let now = clock.now();
        let observations =
            collect_observations(&advertisements, &broadcast_id, self.config.rssi_floor_dbm, now);

        let mut records_written = 0;
        let mut untracked = 0;
        for observation in &observations {
            let metrics = self.evaluator.evaluate(&mut table, observation);
            if !metrics.is_tracked() {
                untracked += 1;
            }

            let record = ContactRecord {
                timestamp: now,
                peer: observation.peer.clone(),
                rssi: observation.rssi,
                device_id: broadcast_id.clone(),
                upload_duration_ms: state.last_upload_duration_ms,
                contact_duration_secs: metrics.total_contact_secs,
                close_contact_duration_secs: metrics.close_contact_secs,
                exposure_status: metrics.exposure_status,
            };
            if self.logger.append(&record) {
                records_written += 1;
            }
        }

        let upload = if is_upload_cycle(cycle_number, self.config.upload_every_n_cycles) {
            self.upload(state, &clock).await
        } else {
            None
        };

        state.peers = table.into_entries();
        if clock.is_known() {
            state.last_cycle_unix = clock.boot_unix();
        }

        log::info!(
            "Cycle {} done: {} heard, {} peers, {} logged, {} tracked",
            cycle_number,
            advertisements.len(),
            observations.len(),
            records_written,
            state.peers.len()
        );

        Ok(CycleReport {
            cycle_number,
            cold_boot,
            time_quality: clock.quality(),
            now,
            broadcast_id,
            advertisements: advertisements.len(),
            observations: observations.len(),
            records_written,
            untracked,
            upload,
        })
    }

    /// Deliver the whole log. The log is cleared only once the collector
    /// acknowledged it.
    async fn upload(&mut self, state: &mut PersistedState, clock: &CycleClock) -> Option<UploadReport> {
        let batch = UploadBatch::new(clock.now(), self.logger.read_all());
        if batch.is_empty() {
            log::debug!("Upload cycle with an empty log, nothing to send");
            return None;
        }

        log::info!(
            "Uploading {} records to {}",
            batch.record_count(),
            self.config.collector_addr
        );
        let report = self.uploader.attempt_upload(&batch).await;

        if report.is_success() {
            state.last_upload_duration_ms = report.elapsed_ms();
            if !self.logger.clear() {
                log::warn!("Batch delivered but the log was not cleared; it will be sent again");
            }
        } else {
            log::warn!(
                "Upload failed, keeping {} records for the next window",
                batch.record_count()
            );
        }
        Some(report)
    }
}

/// Repeat cycles until `max_cycles` have run (0 = forever) or Ctrl-C.
///
/// State is loaded once on resume and saved after every cycle, before the
/// suspend.
pub async fn run<S, C, T>(
    tracker: &mut Tracker<S, C, T>,
    state_path: &Path,
    max_cycles: u64,
) -> TracerResult<u64>
where
    S: LogStorage,
    C: DatagramChannel,
    T: TimeSource,
{
    let mut state = PersistedState::load_on_resume(state_path);
    let mut completed = 0u64;

    loop {
        tracker.run_cycle(&mut state).await?;
        if let Err(e) = state.save_on_suspend(state_path) {
            log::warn!("Failed to persist state to {}: {}", state_path.display(), e);
        }
        completed += 1;

        if max_cycles != 0 && completed >= max_cycles {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(tracker.config().wake_interval()) => {}
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted after {} cycles", completed);
                break;
            }
        }
    }

    Ok(completed)
}
