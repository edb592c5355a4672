use std::path::PathBuf;

use anyhow::{Context, Result};
use cache_sim::{
    config::SimConfig,
    geometry::Geometry,
    sim::Simulator,
    trace::{TraceDecoder, TraceSource},
};
use clap::{Args, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// File path to the captured bus trace
    #[arg(default_value = "gcc1.trace")]
    trace: PathBuf,
    /// File path to a JSON run configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    trace_args: TraceArgs,
    /// Instruction cache geometry as L,K,N
    #[arg(long, value_parser = parse_geometry)]
    icache: Option<Geometry>,
    /// Data cache geometry as L,K,N
    #[arg(long, value_parser = parse_geometry)]
    dcache: Option<Geometry>,
    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct TraceArgs {
    /// How the trace bytes are acquired
    #[arg(long, value_enum)]
    source: Option<SourceArg>,
    /// Read at most this many bytes of the trace
    #[arg(short, long)]
    limit: Option<usize>,
    /// 32-bit words per record (2 for 64-bit trace entries)
    #[arg(long)]
    stride: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    /// read the capture file directly
    Raw,
    /// parse a saved `xxd -b` dump
    Dump,
    /// run `xxd -b` on the capture
    Xxd,
}

impl From<SourceArg> for TraceSource {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Raw => TraceSource::Raw,
            SourceArg::Dump => TraceSource::Dump,
            SourceArg::Xxd => TraceSource::Xxd,
        }
    }
}

fn parse_geometry(s: &str) -> Result<Geometry> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<usize>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("`{s}` is not L,K,N"))?;
    let &[l, k, n] = parts.as_slice() else {
        return Err(anyhow::anyhow!("expected 3 values as L,K,N, got {}", parts.len()));
    };
    Ok(Geometry::new(l, k, n)?)
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let config = build_config(&args)?;
    log::debug!("{config:?}");

    let decoder = TraceDecoder::new(config.trace.clone())?;
    let trace = decoder
        .load(&args.trace)
        .context("cannot acquire the trace; no statistics produced")?;

    let mut sim = Simulator::new(&config);
    sim.run_trace(&trace);
    println!("{sim}");
    Ok(())
}

fn build_config(args: &Cli) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(p) => SimConfig::load(p)?,
        None => SimConfig::default(),
    };
    if let Some(g) = args.icache {
        config.icache = g;
    }
    if let Some(g) = args.dcache {
        config.dcache = g;
    }
    let TraceArgs {
        source,
        limit,
        stride,
    } = args.trace_args;
    if let Some(s) = source {
        config.trace.source = s.into();
    }
    if limit.is_some() {
        config.trace.limit = limit;
    }
    if let Some(s) = stride {
        config.trace.stride = s;
    }
    Ok(config)
}
