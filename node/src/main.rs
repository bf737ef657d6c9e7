//! proxtrace node - proximity exposure tracker

mod cli;
mod config;
mod cycle;
mod persisted;
mod scanner;
mod time;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Subcommand};
use config::TrackerConfig;
use persisted::PersistedState;
use proxtrace_contact_log::{ContactLogger, FileLogStorage};
use proxtrace_uplink::UdpChannel;
use scanner::IdentityRotator;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    cli.run.apply(&mut config);
    config.validate().context("invalid configuration")?;

    match cli.subcommand {
        Some(Subcommand::PurgeState) => purge_state(&config),
        Some(Subcommand::InspectState) => inspect_state(&config),
        None => run_tracker(config).await,
    }
}

async fn run_tracker(config: TrackerConfig) -> anyhow::Result<()> {
    let scanner = scanner::create_scanner(&config.scanner_config())
        .await
        .context("starting scanner")?;

    log::info!(
        "proxtrace node v{} - scanner: {}, collector: {}, upload every {} cycles",
        env!("CARGO_PKG_VERSION"),
        scanner.name(),
        config.collector_addr,
        config.upload_every_n_cycles
    );

    let storage = FileLogStorage::new(&config.data_dir);
    let channel = UdpChannel::new(config.collector_addr.clone(), config.local_port);
    let state_path = config.state_path.clone();
    let max_cycles = config.max_cycles;

    let mut tracker = cycle::Tracker::new(
        config,
        storage,
        channel,
        scanner,
        time::SystemTimeSource,
        IdentityRotator::from_entropy(),
    );

    match cycle::run(&mut tracker, &state_path, max_cycles).await {
        Ok(cycles) => {
            log::info!("Stopped after {} cycles", cycles);
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            log::error!("Halting: {}. No further cycles until restart.", e);
            let _ = tokio::signal::ctrl_c().await;
            Err(e).context("storage unavailable")
        }
        Err(e) => Err(e.into()),
    }
}

fn purge_state(config: &TrackerConfig) -> anyhow::Result<()> {
    let removed = PersistedState::purge(&config.state_path)
        .with_context(|| format!("removing {}", config.state_path.display()))?;

    let mut logger = ContactLogger::new(FileLogStorage::new(&config.data_dir));
    logger.mount().context("mounting log storage")?;
    let cleared = logger.clear();

    log::info!(
        "Purged state (file removed: {}, log cleared: {}); next cycle cold boots",
        removed,
        cleared
    );
    Ok(())
}

fn inspect_state(config: &TrackerConfig) -> anyhow::Result<()> {
    let state = PersistedState::load_on_resume(&config.state_path);
    log::info!(
        "boot #{}, last cycle at {}, last upload took {}ms, {} tracked peers",
        state.boot_count,
        state.last_cycle_unix,
        state.last_upload_duration_ms,
        state.peers.len()
    );
    for entry in &state.peers {
        log::info!(
            "  {} first seen {}, close {}s{}",
            entry.peer(),
            entry.first_seen(),
            entry.close_contact_accumulated(),
            if entry.in_close_session() { " (in session)" } else { "" }
        );
    }

    let mut logger = ContactLogger::new(FileLogStorage::new(&config.data_dir));
    logger.mount().context("mounting log storage")?;
    log::info!(
        "Contact log {}: {} records pending upload",
        logger.storage().log_path().display(),
        logger.record_count()
    );
    Ok(())
}
