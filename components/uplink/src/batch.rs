use proxtrace_primitives::{
    ContactRecord, Timestamp, TracerError, TracerResult, CSV_HEADER, UNKNOWN_TIME,
    UPLOAD_TIMESTAMP_PREFIX,
};

/// The full log plus metadata, assembled for one upload attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadBatch {
    upload_timestamp: Option<Timestamp>,
    log_content: String,
}

impl UploadBatch {
    /// An unknown upload time omits the metadata line.
    pub fn new(upload_timestamp: Timestamp, log_content: String) -> Self {
        Self {
            upload_timestamp: (upload_timestamp != UNKNOWN_TIME).then_some(upload_timestamp),
            log_content,
        }
    }

    pub fn upload_timestamp(&self) -> Option<Timestamp> {
        self.upload_timestamp
    }

    pub fn log_content(&self) -> &str {
        &self.log_content
    }

    /// Rows other than the header.
    pub fn record_count(&self) -> usize {
        self.log_content
            .lines()
            .filter(|line| !line.trim().is_empty() && *line != CSV_HEADER)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Wire payload: optional metadata line followed by the verbatim log.
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = String::with_capacity(self.log_content.len() + 40);
        if let Some(ts) = self.upload_timestamp {
            payload.push_str(UPLOAD_TIMESTAMP_PREFIX);
            payload.push_str(&ts.to_string());
            payload.push('\n');
        }
        payload.push_str(&self.log_content);
        payload.into_bytes()
    }

    /// Decode a received payload. Rows that fail to parse are counted, not
    /// fatal.
    pub fn parse(payload: &[u8]) -> TracerResult<ParsedBatch> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| TracerError::InvalidRecord(format!("payload is not utf-8: {e}")))?;

        let mut parsed = ParsedBatch::default();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(ts) = line.strip_prefix(UPLOAD_TIMESTAMP_PREFIX) {
                parsed.upload_timestamp = ts.trim().parse().ok();
                continue;
            }
            if line == CSV_HEADER {
                parsed.header_seen = true;
                continue;
            }
            match line.parse::<ContactRecord>() {
                Ok(record) => parsed.records.push(record),
                Err(e) => {
                    log::debug!("Rejected batch row {:?}: {}", line, e);
                    parsed.rejected_rows += 1;
                }
            }
        }

        Ok(parsed)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub upload_timestamp: Option<Timestamp>,
    pub header_seen: bool,
    pub records: Vec<ContactRecord>,
    pub rejected_rows: usize,
}

impl ParsedBatch {
    pub fn exposure_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.exposure_status.is_exposure())
            .count()
    }
}
