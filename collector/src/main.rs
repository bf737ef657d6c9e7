//! proxtrace collector - receives contact-log batches over UDP and replies ACK

mod server;
mod summary;

use anyhow::Context;
use clap::Parser;
use proxtrace_primitives::DEFAULT_COLLECTOR_PORT;
use server::BatchSink;
use std::path::{Path, PathBuf};
use tokio::net::UdpSocket;

#[derive(Debug, Parser)]
#[command(author, version, about = "proxtrace collector", propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Address to receive batches on.
    #[arg(long, default_value_t = format!("0.0.0.0:{DEFAULT_COLLECTOR_PORT}"))]
    bind: String,

    /// File every received batch is appended to.
    #[arg(long, global = true, default_value = "received.csv")]
    output: PathBuf,

    /// Exit after this many stored batches.
    #[arg(long)]
    max_batches: Option<u64>,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Log a per-peer signal and close-contact summary of the output file.
    Summary,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Some(Command::Summary) = cli.command {
        return log_summary(&cli.output);
    }

    let socket = UdpSocket::bind(&cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;

    log::info!(
        "Collector listening on {}, writing to {}",
        socket.local_addr()?,
        cli.output.display()
    );

    let mut sink = BatchSink::new(cli.output);
    tokio::select! {
        result = server::serve(&socket, &mut sink, cli.max_batches) => {
            result.context("receiving batches")?;
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    log::info!(
        "Stored {} batches ({} records, {} malformed rows)",
        sink.batches,
        sink.records,
        sink.rejected_rows
    );
    Ok(())
}

fn log_summary(output: &Path) -> anyhow::Result<()> {
    let content =
        std::fs::read(output).with_context(|| format!("reading {}", output.display()))?;
    let summary = summary::summarize(&content).context("parsing collected batches")?;

    log::info!(
        "{}: {} records from {} peers, {} exposed, {} malformed rows",
        output.display(),
        summary.record_count(),
        summary.peers.len(),
        summary.exposed_peers(),
        summary.rejected_rows
    );
    for (band, count) in &summary.bands {
        log::info!("  {:?}: {} records", band, count);
    }
    for (peer, stats) in &summary.peers {
        log::info!(
            "  {} {} records, rssi {}..{} (mean {:.1}), contact {}s, close {}s{}",
            peer,
            stats.records,
            stats.weakest,
            stats.strongest,
            stats.mean_rssi(),
            stats.longest_contact_secs,
            stats.longest_close_contact_secs,
            if stats.exposed { " EXPOSURE" } else { "" }
        );
    }
    Ok(())
}
