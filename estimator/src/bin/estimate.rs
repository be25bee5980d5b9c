//! selectivity-estimate: estimate one query's selectivity over a CSV file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use selectivity::config::{init_rayon_threads, init_tracing};
use selectivity::{load_csv, EstimatorConfig, Estimator, LoadOptions, QuerySpec, RangeSpec};

#[derive(Parser)]
#[command(name = "selectivity-estimate")]
#[command(version)]
#[command(about = "Estimate multi-attribute query selectivity by chain-rule sampling")]
struct Cli {
    /// Delimited data file with a header row
    #[arg(short, long)]
    data: PathBuf,

    /// JSON query file: {"order": [...], "ranges": {...}}
    #[arg(short, long, conflicts_with_all = ["order", "range", "between"])]
    query: Option<PathBuf>,

    /// Attribute order, comma separated
    #[arg(short, long, value_delimiter = ',')]
    order: Vec<String>,

    /// Allowed values as NAME=V1,V2,... (repeatable)
    #[arg(short, long)]
    range: Vec<String>,

    /// Numeric interval as NAME=MIN:MAX (repeatable)
    #[arg(long)]
    between: Vec<String>,

    /// Number of trials (default: SELECTIVITY_TRIALS or 1000)
    #[arg(short, long)]
    trials: Option<usize>,

    /// Base seed for reproducible runs (default: SELECTIVITY_SEED or random)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Run trials on one thread
    #[arg(long)]
    sequential: bool,

    /// Print every trial's sampled assignment
    #[arg(long)]
    samples: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Field delimiter
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Trim whitespace around cells
    #[arg(long)]
    trim: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_query(cli: &Cli) -> Result<QuerySpec> {
    if let Some(path) = &cli.query {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read query file {:?}", path))?;
        return QuerySpec::from_json(&text)
            .with_context(|| format!("Failed to parse query file {:?}", path));
    }

    if cli.order.is_empty() {
        bail!("either --query or --order is required");
    }
    let mut spec = QuerySpec {
        order: cli.order.clone(),
        ..QuerySpec::default()
    };
    for arg in &cli.range {
        let (name, values) = arg
            .split_once('=')
            .with_context(|| format!("Invalid --range '{arg}', expected NAME=V1,V2"))?;
        spec.ranges
            .insert(name.to_string(), RangeSpec::values(values.split(',')));
    }
    for arg in &cli.between {
        let (name, bounds) = arg
            .split_once('=')
            .with_context(|| format!("Invalid --between '{arg}', expected NAME=MIN:MAX"))?;
        let (min, max) = bounds
            .split_once(':')
            .with_context(|| format!("Invalid --between '{arg}', expected NAME=MIN:MAX"))?;
        let min: f64 = min.trim().parse().with_context(|| format!("Invalid minimum in '{arg}'"))?;
        let max: f64 = max.trim().parse().with_context(|| format!("Invalid maximum in '{arg}'"))?;
        spec.ranges
            .insert(name.to_string(), RangeSpec::between(min, max));
    }
    Ok(spec)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if !cli.delimiter.is_ascii() {
        bail!("--delimiter must be a single ASCII character");
    }
    let options = LoadOptions {
        delimiter: cli.delimiter as u8,
        trim: cli.trim,
    };

    let mut config = EstimatorConfig::from_env();
    if let Some(trials) = cli.trials {
        config.trials = trials;
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.parallel = !cli.sequential;
    config.record_samples = cli.samples;

    let spec = parse_query(&cli)?;
    let dataset = load_csv(&cli.data, &options)
        .with_context(|| format!("Failed to load dataset from {:?}", cli.data))?;

    if config.parallel {
        let threads = init_rayon_threads();
        info!(threads, "rayon pool ready");
    }

    let estimator = Estimator::from_spec(&dataset, &spec)?;
    let result = estimator.run(&config)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if let Some(samples) = &result.samples {
        for (i, sample) in samples.iter().enumerate() {
            let assignment: Vec<String> = sample
                .assignment
                .iter()
                .map(|(attr, value)| format!("{attr}={value:?}"))
                .collect();
            println!(
                "trial {:>6}  p={:.6}  {}",
                i,
                sample.probability,
                if assignment.is_empty() {
                    "(zero)".to_string()
                } else {
                    assignment.join(", ")
                }
            );
        }
        println!();
    }

    println!("Query probability estimate: {:.6}", result.estimate);
    println!(
        "  trials={}  zero={}  std_err={:.6}  seed={}  time={:.1}ms",
        result.trials,
        result.zero_trials,
        result.std_error,
        result.seed.map_or_else(|| "-".to_string(), |s| s.to_string()),
        result.elapsed.as_secs_f64() * 1000.0
    );
    println!(
        "  estimated rows: {:.1} of {}",
        result.estimate * dataset.num_rows() as f64,
        dataset.num_rows()
    );
    Ok(())
}
