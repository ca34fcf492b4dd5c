//! Command implementations for the nmt-q8 CLI
//!
//! Each command is implemented as a plain function for testability.
//! The main `run` function dispatches to the appropriate command.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::gemm::{prod, GemmScratch};
use crate::model::{Model, ModelConfig, Weights};
use crate::scorer::{BeamEntry, EncoderDecoder, Scorer, Sentence};
use crate::{simd, BackendSelector, NmtError, QMatrix};

use super::args::{engine_config, Args, BenchArgs, Command, DemoArgs, ShapesArgs};
use super::output::{
    format_bench, format_demo, format_shapes, BenchReport, DemoReport, DemoStep, OutputFormat,
    ShapeEntry,
};

/// End-of-sentence word id of the demo vocabulary
pub const EOS_ID: u32 = 0;

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Engine error
    #[error("Engine error: {0}")]
    Nmt(#[from] NmtError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

/// Command execution result
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded
    pub success: bool,
    /// Rendered output
    pub message: String,
}

impl CommandResult {
    /// Create a success result
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// Run CLI with parsed arguments
///
/// The rendered report is printed unless `--quiet` is set, and returned in
/// the [`CommandResult`] either way.
///
/// # Errors
///
/// Returns the first error of the selected command.
pub fn run(args: Args) -> CliResult<CommandResult> {
    let format = OutputFormat::from_json_flag(args.json);
    let message = match &args.command {
        Command::Bench(b) => format_bench(&run_bench(b, &args)?, format)?,
        Command::Demo(d) => format_demo(&run_demo(d, &args)?, format)?,
        Command::Shapes(s) => format_shapes(&run_shapes(s), format)?,
    };
    if !args.quiet {
        print!("{message}");
    }
    Ok(CommandResult::success(message))
}

// ============================================================================
// Bench
// ============================================================================

fn operand(rows: usize, cols: usize, seed: f32) -> CliResult<QMatrix> {
    let values: Vec<f32> = (0..rows * cols)
        .map(|i| ((i as f32 + seed) * 0.37).sin())
        .collect();
    Ok(QMatrix::from_f32(rows, cols, &values)?)
}

fn mean_ms(times: &[f64]) -> f64 {
    if times.is_empty() {
        0.0
    } else {
        times.iter().sum::<f64>() / times.len() as f64
    }
}

/// Time the quantized product against the float product of the same operands
///
/// # Errors
///
/// Returns [`CliError::InvalidArgument`] for empty shapes or zero iterations.
pub fn run_bench(args: &BenchArgs, global: &Args) -> CliResult<BenchReport> {
    if args.rows == 0 || args.inner == 0 || args.cols == 0 || args.iterations == 0 {
        return Err(CliError::InvalidArgument(
            "shape and iteration count must be positive".into(),
        ));
    }
    let backend = BackendSelector::create(&engine_config(args.backend, args.threads))?;
    let a = operand(args.rows, args.inner, 0.0)?;
    let b = operand(args.inner, args.cols, 11.0)?;
    let (fa, fb) = (a.to_f32(), b.to_f32());

    let mut scratch = GemmScratch::new();
    let mut c = QMatrix::new();
    let mut quantized = Vec::with_capacity(args.iterations);
    let mut float = Vec::with_capacity(args.iterations);
    let mut reference = Vec::new();
    for i in 0..args.iterations {
        let start = Instant::now();
        prod(backend.as_ref(), &mut scratch, &a, false, &b, false, &mut c)?;
        quantized.push(start.elapsed().as_secs_f64() * 1000.0);

        let start = Instant::now();
        reference = simd::matmul(&fa, &fb, args.rows, args.inner, args.cols);
        float.push(start.elapsed().as_secs_f64() * 1000.0);

        if global.verbose {
            eprintln!(
                "  iteration {}: quantized {:.3}ms, float {:.3}ms",
                i + 1,
                quantized[i],
                float[i]
            );
        }
    }

    let caps = backend.capabilities();
    Ok(BenchReport {
        backend: caps.backend_type.name().to_string(),
        threads: caps.threads,
        shape: (args.rows, args.inner, args.cols),
        iterations: args.iterations,
        quantized_ms: mean_ms(&quantized),
        float_ms: mean_ms(&float),
        max_abs_error: simd::max_abs_diff(&c.to_f32(), &reference),
    })
}

// ============================================================================
// Demo
// ============================================================================

/// Greedily decode one sentence, stopping at [`EOS_ID`] or `max_steps`
///
/// # Errors
///
/// Propagates scorer errors.
pub fn greedy_decode(
    scorer: &mut EncoderDecoder,
    sentence: &Sentence,
    max_steps: usize,
) -> CliResult<Vec<DemoStep>> {
    scorer.set_source(std::slice::from_ref(sentence))?;
    let mut state = scorer.new_state();
    let mut next = scorer.new_state();
    scorer.begin_sentence_state(&mut state, 1)?;

    let mut steps = Vec::with_capacity(max_steps);
    for _ in 0..max_steps {
        scorer.decode(&state, &mut next, &[1])?;
        let row = scorer.probs().row(0);
        let Some((column, &log_prob)) = row
            .iter()
            .enumerate()
            .max_by(|x, y| x.1.total_cmp(y.1))
        else {
            break;
        };
        let word = match scorer.filtered_ids() {
            Some(ids) => ids[column],
            None => column,
        };
        let word = u32::try_from(word)
            .map_err(|_| CliError::InvalidArgument(format!("word id {word} exceeds u32")))?;
        let attention = scorer.attention();
        steps.push(DemoStep {
            word,
            log_prob,
            attention: (0..attention.cols()).map(|j| attention.get_f32(0, j)).collect(),
        });
        if word == EOS_ID {
            break;
        }
        scorer.assemble_beam_state(&next, &[BeamEntry::new(0, word)], &mut state)?;
    }
    Ok(steps)
}

/// Run the toy model on the given source ids
///
/// # Errors
///
/// Returns [`CliError::InvalidArgument`] for an empty source.
pub fn run_demo(args: &DemoArgs, global: &Args) -> CliResult<DemoReport> {
    if args.source.is_empty() {
        return Err(CliError::InvalidArgument("empty source sentence".into()));
    }
    let config = engine_config(args.backend, args.threads).with_max_length(args.max_length);
    let weights = Weights::synthetic(&ModelConfig::toy())?;
    let model = Arc::new(Model::new(weights, &config)?);
    let mut scorer = EncoderDecoder::new(model, config)?;
    scorer.filter(&args.filter)?;

    let sentence = Sentence::new(0, args.source.clone());
    let steps = greedy_decode(&mut scorer, &sentence, args.max_steps)?;
    if global.verbose {
        eprintln!(
            "decoded {} words on {}",
            steps.len(),
            scorer.backend().backend_type()
        );
    }
    Ok(DemoReport {
        source: sentence.truncated(args.max_length).to_vec(),
        filter: scorer.filtered_ids().map(<[usize]>::to_vec),
        steps,
    })
}

// ============================================================================
// Shapes
// ============================================================================

/// Every weight a model of the given dimensions reads
#[must_use]
pub fn run_shapes(args: &ShapesArgs) -> Vec<ShapeEntry> {
    ModelConfig::new(
        args.src_vocab,
        args.trg_vocab,
        args.embedding_dim,
        args.hidden_dim,
    )
    .expected_shapes()
    .into_iter()
    .map(|(name, rows, cols)| ShapeEntry { name, rows, cols })
    .collect()
}
