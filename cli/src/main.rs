//! CLI for Kernelscope
//!
//! Runs the full pipeline over a captured trace dump: correlate every GPU
//! kernel with the tensor operation that launched it, estimate FLOPs and
//! bytes per kernel, and write one record per kernel as JSON lines or CSV.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use kernelscope_cost::{registry, Record};
use kernelscope_trace::{Correlator, JsonStore};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

#[derive(Parser, Debug)]
#[command(name = "kernelscope")]
#[command(about = "Correlate GPU kernels with tensor operations and estimate FLOPs/bytes", long_about = None)]
#[command(version)]
struct Args {
    /// JSON trace dump (kernel rows plus marker ranges)
    #[arg(short, long)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: Format,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// One JSON record per line
    Json,
    /// CSV with a header row
    Csv,
}

/// Run configuration assembled from the CLI arguments
#[derive(Debug)]
struct Config {
    input: PathBuf,
    output: Option<PathBuf>,
    format: Format,
}

impl Config {
    fn validate(&self) -> Result<()> {
        if !self.input.is_file() {
            anyhow::bail!("no such file: {}", self.input.display());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config {
        input: args.input,
        output: args.output,
        format: args.format,
    };
    config.validate()?;

    run(&config)
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn run(config: &Config) -> Result<()> {
    let store = JsonStore::open(&config.input)
        .with_context(|| format!("failed to open trace {}", config.input.display()))?;

    let mut correlator = Correlator::new();
    let kernels = correlator
        .correlate(&store)
        .context("trace correlation failed")?;

    if kernels.is_empty() {
        info!("found 0 kernels, nothing to report");
        return Ok(());
    }

    let progress = ProgressBar::new(kernels.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} kernels")
            .expect("static progress template"),
    );

    let records: Vec<Record> = kernels
        .iter()
        .map(|kernel| {
            let cost = registry::dispatch(kernel);
            progress.inc(1);
            Record::new(kernel, &cost)
        })
        .collect();
    progress.finish_and_clear();

    let unsupported = records.iter().filter(|r| !r.supported).count();
    info!(
        "processed {} kernels ({} without a cost model)",
        records.len(),
        unsupported
    );

    match &config.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_records(BufWriter::new(file), &records, config.format)?;
            info!("report written to {}", path.display());
        }
        None => {
            let stdout = std::io::stdout();
            write_records(stdout.lock(), &records, config.format)?;
        }
    }

    Ok(())
}

fn write_records<W: Write>(mut writer: W, records: &[Record], format: Format) -> Result<()> {
    match format {
        Format::Json => {
            for record in records {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
        }
        Format::Csv => output::write_csv(&mut writer, records)?,
    }
    writer.flush()?;
    Ok(())
}
