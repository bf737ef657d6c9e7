use proxtrace_primitives::{cycle_time, Timestamp, TimeSource, UNKNOWN_TIME};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Host wall clock. Reports 0 if the clock reads before the epoch, as an
/// unsynchronized board would.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn unix_time(&mut self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(UNKNOWN_TIME)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeQuality {
    Synced,
    /// Time sync failed; extrapolated from the previous cycle.
    Estimated,
    Unknown,
}

/// Wall-clock anchor for one wake cycle.
#[derive(Clone, Copy, Debug)]
pub struct CycleClock {
    boot_unix: Timestamp,
    quality: TimeQuality,
    started: Instant,
}

impl CycleClock {
    /// Sync once at cycle start. When the source fails, fall back to the
    /// previous cycle's start plus one cycle period.
    pub fn start<T: TimeSource>(
        source: &mut T,
        last_cycle_unix: Timestamp,
        cycle_period_secs: u64,
    ) -> Self {
        let started = Instant::now();
        let synced = source.unix_time();

        let (boot_unix, quality) = if synced != UNKNOWN_TIME {
            (synced, TimeQuality::Synced)
        } else if last_cycle_unix != UNKNOWN_TIME {
            let estimate = last_cycle_unix.saturating_add(cycle_period_secs);
            log::warn!("Time sync failed, estimating {} from the previous cycle", estimate);
            (estimate, TimeQuality::Estimated)
        } else {
            log::warn!("Time sync failed and no previous cycle time; logging without timestamps");
            (UNKNOWN_TIME, TimeQuality::Unknown)
        };

        Self {
            boot_unix,
            quality,
            started,
        }
    }

    pub fn boot_unix(&self) -> Timestamp {
        self.boot_unix
    }

    pub fn quality(&self) -> TimeQuality {
        self.quality
    }

    pub fn is_known(&self) -> bool {
        self.quality != TimeQuality::Unknown
    }

    /// Cycle start plus whole seconds elapsed since; 0 when unknown.
    pub fn now(&self) -> Timestamp {
        let elapsed_ms = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        cycle_time(self.boot_unix, elapsed_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxtrace_primitives::FixedTime;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_synced_clock_advances() {
        let clock = CycleClock::start(&mut FixedTime(1_717_000_000), 0, 15);
        assert_eq!(clock.quality(), TimeQuality::Synced);
        tokio::time::sleep(Duration::from_millis(10_900)).await;
        assert_eq!(clock.now(), 1_717_000_010);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sync_estimates_from_last_cycle() {
        let clock = CycleClock::start(&mut FixedTime(0), 1_717_000_000, 15);
        assert_eq!(clock.quality(), TimeQuality::Estimated);
        assert_eq!(clock.boot_unix(), 1_717_000_015);
        assert_eq!(clock.now(), 1_717_000_015);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sync_without_history_is_unknown() {
        let clock = CycleClock::start(&mut FixedTime(0), 0, 15);
        assert!(!clock.is_known());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(clock.now(), UNKNOWN_TIME);
    }

    #[test]
    fn test_system_time_is_set() {
        assert!(SystemTimeSource.unix_time() > 1_600_000_000);
    }
}
