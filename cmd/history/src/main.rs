//! history - keep a bounded, downsampled history of numeric samples.
//!
//! Reads whitespace separated numbers from a file or stdin, feeds them into a
//! ring buffer through a background ingestion task and prints what is left in
//! the window once the input ends.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use history_buffer::RingBuffer;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::level_filters::LevelFilter;
use tracing::{debug, info};

/// Keep the most recent samples of a numeric stream.
#[derive(Parser, Debug)]
#[command(name = "history")]
#[command(about = "Keep a bounded, downsampled history of numeric samples")]
#[command(version)]
struct Cli {
    /// Number of samples retained
    #[arg(short = 'n', long, default_value_t = 100)]
    capacity: usize,

    /// Keep one sample out of every N
    #[arg(short = 's', long, default_value_t = 1)]
    sample_rate: usize,

    /// Only print the N most recent samples
    #[arg(short = 'l', long)]
    last: Option<usize>,

    /// Input file (default: stdin)
    #[arg(short = 'f', long = "file")]
    input: Option<PathBuf>,

    /// Output as JSON (for piping)
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct Summary {
    capacity: usize,
    len: usize,
    full: bool,
    /// Oldest first.
    history: Vec<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let buffer = RingBuffer::<f64>::new(cli.capacity);
    let (tx, rx) = mpsc::channel(1024);
    let handle = buffer.ingest(ReceiverStream::new(rx), cli.sample_rate);

    let read = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            read_samples(BufReader::new(file), tx).await
        }
        None => read_samples(BufReader::new(tokio::io::stdin()), tx).await,
    };
    let read = read?;

    let report = handle.join().await?;
    info!(
        "read {} samples, kept {} (dropped {} by sampling)",
        read, report.pushed, report.skipped
    );

    let mut out = std::io::stdout().lock();
    if cli.json {
        let summary = Summary {
            capacity: buffer.capacity(),
            len: buffer.len(),
            full: buffer.is_full(),
            history: tail(&buffer, cli.last),
        };
        serde_json::to_writer_pretty(&mut out, &summary)?;
        writeln!(out)?;
    } else {
        let count = cli.last.map_or(buffer.len(), |n| n.min(buffer.len()));
        for offset in 0..count {
            writeln!(out, "{}\t{}", offset, buffer.read_from_end(offset)?)?;
        }
    }

    Ok(())
}

/// Sends every sample found in `reader` to `tx`, returning how many were read.
async fn read_samples<R>(reader: R, tx: mpsc::Sender<f64>) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut count = 0;

    while let Some(line) = lines.next_line().await.context("failed to read input")? {
        line_no += 1;
        for sample in parse_line(line_no, &line)? {
            if tx.send(sample).await.is_err() {
                debug!("ingestion stopped, discarding remaining input");
                return Ok(count);
            }
            count += 1;
        }
    }

    Ok(count)
}

fn parse_line(line_no: usize, line: &str) -> Result<Vec<f64>> {
    let line = line.split('#').next().unwrap_or_default();
    line.split_whitespace()
        .map(|field| {
            field
                .parse::<f64>()
                .with_context(|| format!("line {}: invalid sample {:?}", line_no, field))
        })
        .collect()
}

/// Returns the `last` most recent samples (all when unset), oldest first.
fn tail(buffer: &RingBuffer<f64>, last: Option<usize>) -> Vec<f64> {
    let all = buffer.to_vec();
    let skip = last.map_or(0, |n| all.len().saturating_sub(n));
    all.into_iter().skip(skip).collect()
}
