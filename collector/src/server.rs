use proxtrace_primitives::{TracerResult, ACK_TOKEN};
use proxtrace_uplink::{ParsedBatch, UploadBatch};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::net::UdpSocket;

/// Largest UDP payload.
const RECV_BUFFER_LEN: usize = 65_535;

/// Appends every accepted batch, verbatim, to one output file.
pub struct BatchSink {
    output: PathBuf,
    pub batches: u64,
    pub records: u64,
    pub rejected_rows: u64,
}

impl BatchSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            batches: 0,
            records: 0,
            rejected_rows: 0,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Store one received payload. An error means the sender must not be
    /// acknowledged.
    pub fn accept(&mut self, payload: &[u8]) -> TracerResult<ParsedBatch> {
        let parsed = UploadBatch::parse(payload)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output)?;
        file.write_all(payload)?;
        if !payload.ends_with(b"\n") {
            file.write_all(b"\n")?;
        }
        file.sync_data()?;

        self.batches += 1;
        self.records += parsed.records.len() as u64;
        self.rejected_rows += parsed.rejected_rows as u64;
        Ok(parsed)
    }
}

/// Receive batches until `max_batches` were stored (`None` = forever).
pub async fn serve(
    socket: &UdpSocket,
    sink: &mut BatchSink,
    max_batches: Option<u64>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];

    while max_batches.map_or(true, |max| sink.batches < max) {
        let (len, from) = socket.recv_from(&mut buf).await?;

        match sink.accept(&buf[..len]) {
            Ok(batch) => {
                if batch.rejected_rows > 0 {
                    log::warn!("{} malformed rows in batch from {}", batch.rejected_rows, from);
                }
                log::info!(
                    "Batch from {}: {} records, {} exposures, uploaded at {}",
                    from,
                    batch.records.len(),
                    batch.exposure_count(),
                    batch
                        .upload_timestamp
                        .map_or_else(|| "unknown".to_string(), |ts| ts.to_string())
                );
                if let Err(e) = socket.send_to(ACK_TOKEN, from).await {
                    log::warn!("Failed to acknowledge {}: {}", from, e);
                }
            }
            Err(e) => log::warn!("Dropped {} bytes from {}: {}", len, from, e),
        }
    }

    Ok(())
}
