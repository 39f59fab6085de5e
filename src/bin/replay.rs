//! Replays a request trace through a flash cache engine and reports ratios.
//!
//! ```text
//! flashbox-replay trace.txt --cache-size 10737418240 --policy tire --quota 1073741824 --k 3
//! RUST_LOG=flashbox=debug flashbox-replay - --cache-size 1048576 --box-size 65536 < trace.txt
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use flashbox::admission::{AdmissionConfig, AdmissionPolicy};
use flashbox::builder::{
    DEFAULT_GHOST_SLOT_BYTES, DEFAULT_MAX_BOX_SIZE, DEFAULT_SIZE_CLASSES, EngineBuilder,
};
use flashbox::metrics::{
    MetricsExporter, MetricsSnapshotProvider, PrometheusTextExporter, StatsSeries,
};
use flashbox::trace::TraceReader;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "flashbox-replay")]
#[command(about = "Replay a request trace through a log-structured flash cache simulator")]
struct Cli {
    /// Trace file (`id size` or `timestamp id size` per line); `-` reads stdin
    #[arg(default_value = "-")]
    trace: PathBuf,

    /// Total cache size in bytes, split evenly between hot and cold segments
    #[arg(long)]
    cache_size: u64,

    /// Box capacity in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_BOX_SIZE)]
    box_size: u64,

    /// Number of equal-logarithmic size classes
    #[arg(long, default_value_t = DEFAULT_SIZE_CLASSES)]
    classes: usize,

    /// Largest routable object size (defaults to the box size)
    #[arg(long)]
    max_object_size: Option<u64>,

    /// Explicit size-class bounds, comma separated; overrides --classes
    #[arg(long, value_delimiter = ',')]
    bounds: Vec<u64>,

    /// Admission policy name or nickname
    #[arg(long, default_value = "admit-all")]
    policy: AdmissionPolicy,

    /// Bytes admitted per quantum
    #[arg(long, default_value_t = 0)]
    quota: u64,

    /// Slack multiplier for the curves and interval boundaries
    #[arg(long, default_value_t = 2)]
    k: u32,

    /// Frequency-threshold sub-intervals
    #[arg(long, default_value_t = 1)]
    interval: u32,

    /// Requests per quantum
    #[arg(long, default_value_t = AdmissionConfig::DEFAULT_EPOCH)]
    epoch: u64,

    /// Quanta admitted unconditionally before accounting starts
    #[arg(long, default_value_t = 1)]
    warmup_quanta: u64,

    /// Starting balance (defaults to the quota)
    #[arg(long, allow_hyphen_values = true)]
    initial_balance: Option<i64>,

    /// Starting probability for fixed-probability policies
    #[arg(long, default_value_t = 1.0)]
    fixed_probability: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Ghost cache capacity in entries
    #[arg(long, conflicts_with = "ghost_bytes")]
    ghost_slots: Option<usize>,

    /// Ghost cache budget in bytes, 8 bytes per entry
    #[arg(long)]
    ghost_bytes: Option<u64>,

    /// Rederive size classes from observed sizes every N requests
    #[arg(long)]
    rebalance_every: Option<u64>,

    /// Sample running ratios every N requests
    #[arg(long, default_value_t = 0)]
    sample_every: u64,

    /// Write sampled ratios as CSV
    #[arg(long, requires = "sample_every")]
    series_csv: Option<PathBuf>,

    /// Print the final snapshot in Prometheus text format
    #[arg(long)]
    prometheus: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(level)
    };
    fmt().with_env_filter(filter).with_writer(io::stderr).init();
}

fn open_trace(path: &Path) -> io::Result<Box<dyn BufRead>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut admission = AdmissionConfig::new(cli.policy, cli.quota)
        .k(cli.k)
        .interval(cli.interval)
        .epoch(cli.epoch)
        .warmup_quanta(cli.warmup_quanta)
        .fixed_probability(cli.fixed_probability)
        .seed(cli.seed);
    if let Some(balance) = cli.initial_balance {
        admission = admission.initial_balance(balance);
    }

    let mut builder = EngineBuilder::new(cli.cache_size)
        .max_box_size(cli.box_size)
        .admission(admission)
        .record_size_histogram(cli.rebalance_every.is_some());
    builder = if cli.bounds.is_empty() {
        builder.equal_log_classes(cli.classes, cli.max_object_size.unwrap_or(cli.box_size))
    } else {
        builder.size_classes(cli.bounds.clone())
    };
    if let Some(slots) = cli.ghost_slots {
        builder = builder.ghost_capacity(slots);
    }
    if let Some(bytes) = cli.ghost_bytes {
        builder = builder.ghost_byte_budget(bytes, DEFAULT_GHOST_SLOT_BYTES);
    }
    let mut engine = builder.try_build()?;
    info!(
        cache_size = cli.cache_size,
        box_size = cli.box_size,
        bounds = ?engine.store().classes().bounds(),
        policy = %cli.policy,
        "engine configured"
    );

    let class_count = engine.store().classes().len();
    let mut series = StatsSeries::new(cli.sample_every);
    let mut reader = TraceReader::new(open_trace(&cli.trace)?);
    for request in reader.by_ref() {
        let request = request?;
        engine.request(&request.id, request.size);

        let counters = engine.counters();
        series.observe(&counters);
        if let Some(every) = cli.rebalance_every
            && every > 0
            && counters.num_requests % every == 0
            && let Err(err) = engine.rebalance_size_classes(class_count)
        {
            warn!(%err, "size class rebalance skipped");
        }
    }

    let snapshot = engine.snapshot();
    let summary = snapshot.summary();
    let c = &snapshot.counters;
    info!(
        requests = c.num_requests,
        skipped_lines = reader.skipped(),
        seals = c.num_seals,
        evicted_boxes = c.evicted_boxes,
        "replay finished"
    );

    println!("requests:                 {}", c.num_requests);
    println!("hits:                     {} ({} open, {} sealed)", c.hits, c.open_hits, c.sealed_hits);
    println!("misses admitted:          {} ({} bytes)", c.miss_admitted, c.admitted_bytes);
    println!("misses rejected:          {}", c.miss_rejected);
    println!("unroutable:               {}", c.unroutable);
    println!("seals:                    {}", c.num_seals);
    println!("waste cache ratio:        {:.6}", summary.waste_cache_ratio);
    println!("sealed box request ratio: {:.6}", summary.sealed_box_request_ratio);
    println!("object hit ratio:         {:.6}", summary.object_hit_ratio);
    println!("byte hit ratio:           {:.6}", summary.byte_hit_ratio);

    if let Some(path) = &cli.series_csv {
        let mut out = BufWriter::new(File::create(path)?);
        series.write_csv(&mut out)?;
        out.flush()?;
        info!(path = %path.display(), samples = series.len(), "wrote ratio series");
    }

    if cli.prometheus {
        let exporter = PrometheusTextExporter::new("flashbox", io::stdout());
        exporter.export(&snapshot);
        exporter.export(&summary);
    }
    Ok(())
}
