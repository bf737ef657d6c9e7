use proxtrace_primitives::{LogStorage, TracerError, TracerResult};

/// In-memory storage with failure injection, for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogStorage {
    content: Option<String>,
    /// Number of upcoming mount attempts that fail.
    pub failing_mounts: u32,
    pub format_fails: bool,
    pub writes_fail: bool,
    pub formats: u32,
}

impl MemoryLogStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage whose next `n` mount attempts fail.
    pub fn failing(n: u32) -> Self {
        Self {
            failing_mounts: n,
            ..Self::default()
        }
    }

    pub fn with_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Self::default()
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl LogStorage for MemoryLogStorage {
    fn mount(&mut self) -> TracerResult<()> {
        if self.failing_mounts > 0 {
            self.failing_mounts -= 1;
            return Err(TracerError::StorageUnavailable("injected mount failure".into()));
        }
        Ok(())
    }

    fn format(&mut self) -> TracerResult<()> {
        self.formats += 1;
        if self.format_fails {
            return Err(TracerError::StorageUnavailable("injected format failure".into()));
        }
        self.content = None;
        Ok(())
    }

    fn size(&self) -> TracerResult<Option<u64>> {
        Ok(self.content.as_ref().map(|c| c.len() as u64))
    }

    fn append(&mut self, bytes: &[u8]) -> TracerResult<()> {
        if self.writes_fail {
            return Err(TracerError::StorageIo(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        let text = String::from_utf8_lossy(bytes);
        self.content.get_or_insert_with(String::new).push_str(&text);
        Ok(())
    }

    fn read_all(&self) -> TracerResult<Option<String>> {
        Ok(self.content.clone())
    }

    fn truncate(&mut self) -> TracerResult<()> {
        self.content = Some(String::new());
        Ok(())
    }
}
