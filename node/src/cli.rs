use crate::config::TrackerConfig;
use crate::scanner::ScannerMode;
use std::path::PathBuf;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about = "proxtrace node - proximity exposure tracker",
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub subcommand: Option<Subcommand>,

    /// JSON configuration file. Flags override its values.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(flatten)]
    pub run: ExtendedRunCmd,
}

/// Per-field overrides on top of the configuration file.
#[derive(Debug, Default, clap::Parser)]
pub struct ExtendedRunCmd {
    /// Run a single wake cycle and exit (external scheduler mode).
    #[arg(long)]
    pub once: bool,

    #[arg(long)]
    pub max_cycles: Option<u64>,

    #[arg(long)]
    pub wake_interval: Option<u64>,

    #[arg(long)]
    pub scan_duration: Option<u64>,

    #[arg(long)]
    pub upload_every: Option<u32>,

    #[arg(long, allow_hyphen_values = true)]
    pub close_rssi: Option<i8>,

    #[arg(long)]
    pub exposure_threshold: Option<u64>,

    #[arg(long)]
    pub capacity: Option<usize>,

    #[arg(long, allow_hyphen_values = true)]
    pub rssi_floor: Option<i8>,

    #[arg(long)]
    pub retry_budget: Option<u32>,

    #[arg(long)]
    pub ack_timeout_ms: Option<u64>,

    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    #[arg(long)]
    pub collector: Option<String>,

    #[arg(long)]
    pub local_port: Option<u16>,

    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long)]
    pub state_path: Option<PathBuf>,

    /// mock | bluetooth | disabled. bluetooth only listens: it cannot
    /// advertise, so peers never see this node.
    #[arg(long)]
    pub scanner_mode: Option<ScannerMode>,

    #[arg(long)]
    pub mock_peers: Option<u32>,

    #[arg(long)]
    pub mock_seed: Option<u64>,
}

impl ExtendedRunCmd {
    pub fn apply(&self, config: &mut TrackerConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut config.max_cycles, &self.max_cycles);
        set(&mut config.wake_interval_secs, &self.wake_interval);
        set(&mut config.scan_duration_secs, &self.scan_duration);
        set(&mut config.upload_every_n_cycles, &self.upload_every);
        set(&mut config.close_contact_rssi_dbm, &self.close_rssi);
        set(&mut config.exposure_threshold_secs, &self.exposure_threshold);
        set(&mut config.peer_table_capacity, &self.capacity);
        set(&mut config.rssi_floor_dbm, &self.rssi_floor);
        set(&mut config.retry_budget, &self.retry_budget);
        set(&mut config.ack_timeout_ms, &self.ack_timeout_ms);
        set(&mut config.connect_timeout_ms, &self.connect_timeout_ms);
        set(&mut config.collector_addr, &self.collector);
        set(&mut config.local_port, &self.local_port);
        set(&mut config.data_dir, &self.data_dir);
        set(&mut config.state_path, &self.state_path);
        set(&mut config.scanner_mode, &self.scanner_mode);
        set(&mut config.mock_peers, &self.mock_peers);
        set(&mut config.mock_seed, &self.mock_seed);

        if self.once {
            config.max_cycles = 1;
        }
    }
}

#[derive(Debug, clap::Subcommand)]
pub enum Subcommand {
    /// Delete persisted state and the contact log; the next cycle cold boots.
    PurgeState,

    /// Log the persisted state and contact log summary.
    InspectState,
}
