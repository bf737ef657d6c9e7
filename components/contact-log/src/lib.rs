//! Append-only CSV log of contact records.
//!
//! The log is the only durable output of a wake cycle. Every operation is
//! safe on storage that never mounted: it logs a warning and does nothing,
//! so the rest of the cycle can still run.


pub mod file;
pub mod memory;

pub use file::FileLogStorage;
pub use memory::MemoryLogStorage;

use proxtrace_primitives::{ContactRecord, LogStorage, TracerError, TracerResult, CSV_HEADER};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Mounted,
    /// Mount failed even after reformatting.
    Failed,
}

pub struct ContactLogger<S: LogStorage> {
    storage: S,
    state: MountState,
}

impl<S: LogStorage> ContactLogger<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            state: MountState::Unmounted,
        }
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    pub fn is_mounted(&self) -> bool {
        self.state == MountState::Mounted
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Mount the storage, reformatting once if the first attempt fails.
    ///
    /// A second failure is fatal for the current boot.
    pub fn mount(&mut self) -> TracerResult<()> {
        if self.is_mounted() {
            return Ok(());
        }

        match self.storage.mount() {
            Ok(()) => {
                self.state = MountState::Mounted;
                return Ok(());
            }
            Err(e) => log::warn!("Log storage mount failed: {}. Formatting...", e),
        }

        let retry = self.storage.format().and_then(|()| self.storage.mount());
        match retry {
            Ok(()) => {
                log::info!("Log storage mounted after format");
                self.state = MountState::Mounted;
                Ok(())
            }
            Err(e) => {
                log::error!("Log storage unusable after format: {}", e);
                self.state = MountState::Failed;
                Err(TracerError::StorageUnavailable(e.to_string()))
            }
        }
    }

    /// Append one record, writing the header first when the log is empty.
    pub fn append(&mut self, record: &ContactRecord) -> bool {
        if !self.ensure_mounted("append") {
            return false;
        }

        match self.try_append(record) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to append contact record: {}", e);
                false
            }
        }
    }

    fn try_append(&mut self, record: &ContactRecord) -> TracerResult<()> {
        let needs_header = matches!(self.storage.size()?, None | Some(0));

        let mut chunk = String::new();
        if needs_header {
            log::debug!("Starting new contact log");
            chunk.push_str(CSV_HEADER);
            chunk.push('\n');
        }
        chunk.push_str(&record.to_csv_row());
        chunk.push('\n');

        self.storage.append(chunk.as_bytes())
    }

    /// Full log content, or an empty string when the log is missing or
    /// unreadable.
    pub fn read_all(&self) -> String {
        if !self.ensure_mounted("read") {
            return String::new();
        }

        match self.storage.read_all() {
            Ok(Some(content)) => content,
            Ok(None) => {
                log::debug!("Contact log does not exist");
                String::new()
            }
            Err(e) => {
                log::warn!("Failed to read contact log: {}", e);
                String::new()
            }
        }
    }

    /// Number of records currently logged, header excluded.
    pub fn record_count(&self) -> usize {
        self.read_all()
            .lines()
            .filter(|line| !line.is_empty() && *line != CSV_HEADER)
            .count()
    }

    pub fn clear(&mut self) -> bool {
        if !self.ensure_mounted("clear") {
            return false;
        }

        match self.storage.truncate() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to clear contact log: {}", e);
                false
            }
        }
    }

    fn ensure_mounted(&self, op: &str) -> bool {
        if !self.is_mounted() {
            log::warn!("Contact log {} skipped: storage not mounted", op);
            return false;
        }
        true
    }
}
