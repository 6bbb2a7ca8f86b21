use clap::Parser;

/// Demo driver for the triage deadline scheduler.
///
/// Submits a batch of synthetic work items with deadlines spread evenly over
/// a window, then reports per-tier statistics until every item has fired.
#[derive(Debug, Parser)]
#[command(name = "triage", version)]
pub struct Cli {
    /// Number of synthetic work items to submit.
    #[arg(long, default_value_t = 1_000)]
    pub items: u64,

    /// Smallest item delay, in milliseconds from startup.
    #[arg(long, default_value_t = 50)]
    pub min_delay_ms: u64,

    /// Width of the deadline window in milliseconds.
    #[arg(long, default_value_t = 8_000)]
    pub spread_ms: u64,

    /// Engine base tick in milliseconds.
    #[arg(long, default_value_t = 50)]
    pub frequency_ms: u64,

    /// Fast-tier threshold in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub fast_ms: u64,

    /// Slow-tier threshold in milliseconds.
    #[arg(long, default_value_t = 2_000)]
    pub slow_ms: u64,

    /// Concurrent work items per batch (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub parallel: usize,

    /// Print the periodic statistics line as JSON.
    #[arg(long)]
    pub stats_json: bool,
}
