use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use proxtrace_primitives::{LogStorage, TracerError, TracerResult, LOG_FILE_NAME};

const MOUNT_PROBE: &str = ".mount_probe";
const PROBE_CONTENT: &[u8] = b"proxtrace storage probe\n";

/// Log file stored under a data directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileLogStorage {
    root: PathBuf,
    file_name: String,
}

impl FileLogStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_name: LOG_FILE_NAME.to_string(),
        }
    }

    pub fn with_file_name(mut self, file_name: &str) -> Self {
        self.file_name = file_name.to_string();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(&self.file_name)
    }

    fn probe(&self) -> TracerResult<()> {
        let path = self.root.join(MOUNT_PROBE);
        fs::write(&path, PROBE_CONTENT)?;
        let read_back = fs::read(&path)?;
        fs::remove_file(&path)?;

        if read_back != PROBE_CONTENT {
            return Err(TracerError::StorageUnavailable(format!(
                "probe mismatch under {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

impl LogStorage for FileLogStorage {
    fn mount(&mut self) -> TracerResult<()> {
        fs::create_dir_all(&self.root)?;
        self.probe()?;

        let used: u64 = fs::read_dir(&self.root)?
            .filter_map(Result::ok)
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum();
        log::debug!("Storage mounted at {} ({} bytes used)", self.root.display(), used);
        Ok(())
    }

    fn format(&mut self) -> TracerResult<()> {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        fs::create_dir_all(&self.root)?;
        log::warn!("Storage at {} formatted", self.root.display());
        Ok(())
    }

    fn size(&self) -> TracerResult<Option<u64>> {
        match fs::metadata(self.log_path()) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> TracerResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        file.write_all(bytes)?;
        file.sync_data()?;
        Ok(())
    }

    fn read_all(&self) -> TracerResult<Option<String>> {
        match fs::read_to_string(self.log_path()) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn truncate(&mut self) -> TracerResult<()> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.log_path())?;
        Ok(())
    }
}
