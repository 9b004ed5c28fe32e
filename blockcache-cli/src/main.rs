use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use blockcache_engine::{
    EngineConfig, NhitParam, OccurrenceKey, PromotionPolicy, PromotionPolicyType, PromotionStats,
    Request, crc32,
};
use clap::Parser;
use colored::Colorize;
use serde::Serialize;
use tracing::info;

mod trace;

use trace::TraceOp;

#[derive(Parser, Debug)]
#[command(name = "blockcache-sim")]
#[command(about = "Replay a cache-miss trace through a promotion policy", long_about = None)]
struct Args {
    /// YAML engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Promotion policy (always, nhit)
    #[arg(short, long, value_parser = parse_policy)]
    policy: Option<PromotionPolicyType>,

    /// NHit insertion threshold
    #[arg(short, long)]
    threshold: Option<u64>,

    /// Occurrence table capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Worker threads replaying the trace
    #[arg(short, long, default_value_t = 1)]
    workers: usize,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Trace file, or `-` for stdin
    trace: String,
}

fn parse_policy(value: &str) -> std::result::Result<PromotionPolicyType, String> {
    match value.to_lowercase().as_str() {
        "always" => Ok(PromotionPolicyType::Always),
        "nhit" => Ok(PromotionPolicyType::Nhit),
        other => Err(format!("unknown policy '{}' (expected always or nhit)", other)),
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    policy: PromotionPolicyType,
    insertion_threshold: Option<i64>,
    operations: usize,
    trace_crc32: String,
    pending_entries: usize,
    elapsed_ms: f64,
    stats: PromotionStats,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(policy) = args.policy {
        config.promotion.policy = policy;
    }
    if let Some(threshold) = args.threshold {
        config.promotion.nhit.insertion_threshold = threshold;
    }
    if let Some(capacity) = args.capacity {
        config.promotion.nhit.table_capacity = Some(capacity);
    }

    config.validate()?;
    Ok(config)
}

fn init_logging(config: &EngineConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);

    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_trace(source: &str) -> Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("reading trace from stdin")?;
        Ok(buf)
    } else {
        fs::read(source).with_context(|| format!("reading trace {}", source))
    }
}

fn apply(policy: &PromotionPolicy, op: &TraceOp) {
    match op {
        TraceOp::Miss(request) => {
            policy.should_promote(request);
        }
        TraceOp::Purge(request) => policy.req_purge(request),
    }
}

fn request_of(op: &TraceOp) -> &Request {
    match op {
        TraceOp::Miss(request) | TraceOp::Purge(request) => request,
    }
}

/// Split the trace so that every operation on one occurrence key lands on
/// the same worker, in trace order.
fn partition(ops: &[TraceOp], workers: usize, line_size: u64) -> Vec<Vec<&TraceOp>> {
    let mut parts: Vec<Vec<&TraceOp>> = (0..workers).map(|_| Vec::new()).collect();
    for op in ops {
        let mut hasher = DefaultHasher::new();
        OccurrenceKey::for_request(request_of(op), line_size).hash(&mut hasher);
        parts[(hasher.finish() as usize) % workers].push(op);
    }
    parts
}

/// Replay the trace, optionally across several workers.
///
/// Per-key ordering is kept, so results match a single-worker run unless
/// the occurrence table overflows; eviction then depends on interleaving.
fn replay(policy: &PromotionPolicy, ops: &[TraceOp], workers: usize, line_size: u64) {
    if workers <= 1 || ops.len() < workers {
        ops.iter().for_each(|op| apply(policy, op));
        return;
    }

    let parts = partition(ops, workers, line_size);
    std::thread::scope(|scope| {
        for part in &parts {
            scope.spawn(move || part.iter().for_each(|op| apply(policy, op)));
        }
    });
}

fn print_summary(summary: &Summary) {
    println!("{}", "Promotion summary".bold());
    println!("  policy            {}", summary.policy.to_string().cyan());
    if let Some(threshold) = summary.insertion_threshold {
        println!("  threshold         {}", threshold);
    }
    println!("  operations        {}", summary.operations);
    println!("  decisions         {}", summary.stats.decisions);
    println!("  promoted          {}", summary.stats.promoted.to_string().green());
    println!("  deferred          {}", summary.stats.deferred.to_string().yellow());
    println!("  purged            {}", summary.stats.purged);
    println!("  evictions         {}", summary.stats.evictions);
    println!("  pending entries   {}", summary.pending_entries);
    println!("  trace crc32       {}", summary.trace_crc32);
    println!("{}", format!("({:.2} ms)", summary.elapsed_ms).dimmed());
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;
    init_logging(&config);

    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let raw = read_trace(&args.trace)?;
    let checksum = crc32(0, &raw);
    let text = String::from_utf8(raw).context("trace is not valid UTF-8")?;
    let ops = trace::parse_trace(&text)?;

    info!(
        "Replaying {} operations with '{}' policy on {} worker(s)",
        ops.len(),
        config.promotion.policy,
        args.workers
    );

    let policy = PromotionPolicy::init(&config).context("initializing promotion policy")?;

    let start = Instant::now();
    replay(&policy, &ops, args.workers, config.cache.line_size);
    let elapsed = start.elapsed();

    let summary = Summary {
        policy: policy.policy_type(),
        insertion_threshold: policy.get_param(NhitParam::InsertionThreshold.id()).ok(),
        operations: ops.len(),
        trace_crc32: format!("{:08x}", checksum),
        pending_entries: policy.occurrence_table().map_or(0, |t| t.len()),
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        stats: policy.stats(),
    };

    policy.deinit();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}
