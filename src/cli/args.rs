//! Command-line argument parsing for the nmt-q8 CLI
//!
//! Uses clap derive macros for type-safe argument parsing.

use clap::{Parser, Subcommand, ValueEnum};

use crate::{BackendType, EngineConfig};

/// nmt-q8: 8-bit quantized NMT inference core
///
/// Benchmarks the quantized product against a float reference and drives
/// a toy model through the scorer.
#[derive(Parser, Debug, Clone)]
#[command(name = "nmt-q8")]
#[command(version)]
#[command(about = "8-bit quantized NMT inference core", long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (per-iteration timings, per-step scores)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output as JSON (machine-readable)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Time the quantized product against the float product
    Bench(BenchArgs),

    /// Greedy-decode a sentence with the synthetic toy model
    Demo(DemoArgs),

    /// List the weights a model of the given dimensions reads
    Shapes(ShapesArgs),
}

/// Backend selection
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendArg {
    /// Sequential CPU
    Cpu,
    /// Bounded worker pool
    Parallel,
    /// Pick from available threads
    #[default]
    Auto,
}

impl From<BackendArg> for BackendType {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Cpu => Self::Cpu,
            BackendArg::Parallel => Self::Parallel,
            BackendArg::Auto => Self::Auto,
        }
    }
}

impl std::fmt::Display for BackendArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Parallel => write!(f, "parallel"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Arguments for the bench command
#[derive(Parser, Debug, Clone)]
pub struct BenchArgs {
    /// Rows of the left operand
    #[arg(short, long, default_value = "64")]
    pub rows: usize,

    /// Shared inner dimension
    #[arg(short, long, default_value = "512")]
    pub inner: usize,

    /// Columns of the right operand
    #[arg(short, long, default_value = "512")]
    pub cols: usize,

    /// Number of timed iterations
    #[arg(short = 'n', long, default_value = "10")]
    pub iterations: usize,

    /// Backend to use
    #[arg(short, long, default_value = "auto")]
    pub backend: BackendArg,

    /// Number of worker threads (default: all)
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Arguments for the demo command
#[derive(Parser, Debug, Clone)]
pub struct DemoArgs {
    /// Source word ids
    #[arg(default_values_t = vec![2_u32, 5, 1])]
    pub source: Vec<u32>,

    /// Maximum number of target words
    #[arg(long, default_value = "5")]
    pub max_steps: usize,

    /// Restrict the output vocabulary to these ids (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub filter: Vec<u32>,

    /// Truncate the source to this many words (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub max_length: usize,

    /// Backend to use
    #[arg(short, long, default_value = "auto")]
    pub backend: BackendArg,

    /// Number of worker threads (default: all)
    #[arg(long)]
    pub threads: Option<usize>,
}

/// Arguments for the shapes command
#[derive(Parser, Debug, Clone)]
pub struct ShapesArgs {
    /// Source vocabulary size
    #[arg(long, default_value = "6")]
    pub src_vocab: usize,

    /// Target vocabulary size
    #[arg(long, default_value = "6")]
    pub trg_vocab: usize,

    /// Embedding width
    #[arg(long, default_value = "4")]
    pub embedding_dim: usize,

    /// State width
    #[arg(long, default_value = "4")]
    pub hidden_dim: usize,
}

/// Engine configuration from backend flags
#[must_use]
pub fn engine_config(backend: BackendArg, threads: Option<usize>) -> EngineConfig {
    let config = EngineConfig::default().with_backend(backend.into());
    match threads {
        Some(n) => config.with_threads(n),
        None => config,
    }
}
