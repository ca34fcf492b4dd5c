//! Output formatters for the nmt-q8 CLI
//!
//! Every report renders as aligned text or pretty JSON.

use std::fmt::Write;

use serde::Serialize;

use super::commands::CliResult;

/// Output format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

impl OutputFormat {
    /// Format selected by the global `--json` flag
    #[must_use]
    pub const fn from_json_flag(json: bool) -> Self {
        if json {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Quantized versus float product timings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchReport {
    /// Backend that ran the quantized product
    pub backend: String,
    /// Worker threads
    pub threads: usize,
    /// `(rows, inner, cols)`
    pub shape: (usize, usize, usize),
    /// Timed iterations
    pub iterations: usize,
    /// Mean quantized product time in milliseconds
    pub quantized_ms: f64,
    /// Mean float product time in milliseconds
    pub float_ms: f64,
    /// Largest absolute difference between the two results
    pub max_abs_error: f32,
}

impl BenchReport {
    /// Float time over quantized time
    #[must_use]
    pub fn speedup(&self) -> f64 {
        if self.quantized_ms > 0.0 {
            self.float_ms / self.quantized_ms
        } else {
            0.0
        }
    }
}

/// One greedily chosen target word
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoStep {
    /// Chosen word id
    pub word: u32,
    /// Its log-probability
    pub log_prob: f32,
    /// Alignment over the source positions
    pub attention: Vec<f32>,
}

/// Greedy decoding of one sentence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DemoReport {
    /// Source word ids after truncation
    pub source: Vec<u32>,
    /// Output columns while filtered
    pub filter: Option<Vec<usize>>,
    /// Decoded steps
    pub steps: Vec<DemoStep>,
}

impl DemoReport {
    /// Sum of the chosen words' log-probabilities
    #[must_use]
    pub fn score(&self) -> f32 {
        self.steps.iter().map(|s| s.log_prob).sum()
    }
}

/// Named weight shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeEntry {
    /// Weight name
    pub name: String,
    /// Rows
    pub rows: usize,
    /// Columns
    pub cols: usize,
}

fn json<T: Serialize>(value: &T) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Format a benchmark report
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_bench(report: &BenchReport, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return json(report);
    }
    let (m, k, n) = report.shape;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{m}x{k} by {k}x{n} on {} ({} threads), {} iterations",
        report.backend, report.threads, report.iterations
    );
    let _ = writeln!(out, "  quantized: {:.3}ms", report.quantized_ms);
    let _ = writeln!(out, "  float:     {:.3}ms", report.float_ms);
    let _ = writeln!(out, "  speedup:   {:.2}x", report.speedup());
    let _ = writeln!(out, "  max error: {:.5}", report.max_abs_error);
    Ok(out)
}

/// Format a demo report
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_demo(report: &DemoReport, format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return json(report);
    }
    let mut out = String::new();
    let _ = writeln!(out, "source: {:?}", report.source);
    if let Some(filter) = &report.filter {
        let _ = writeln!(out, "filter: {filter:?}");
    }
    for (i, step) in report.steps.iter().enumerate() {
        let attention: Vec<String> = step.attention.iter().map(|a| format!("{a:.2}")).collect();
        let _ = writeln!(
            out,
            "{i:>3}  word {:>5}  log p {:>8.4}  attention [{}]",
            step.word,
            step.log_prob,
            attention.join(", ")
        );
    }
    let _ = writeln!(out, "score: {:.4}", report.score());
    Ok(out)
}

/// Format a list of weight shapes
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_shapes(shapes: &[ShapeEntry], format: OutputFormat) -> CliResult<String> {
    if format == OutputFormat::Json {
        return json(&shapes);
    }
    let width = shapes.iter().map(|s| s.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for s in shapes {
        let _ = writeln!(out, "{:<width$}  {} x {}", s.name, s.rows, s.cols);
    }
    let total: usize = shapes.iter().map(|s| s.rows * s.cols).sum();
    let _ = writeln!(out, "{total} parameters");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bench_report() -> BenchReport {
        BenchReport {
            backend: "CPU".into(),
            threads: 1,
            shape: (2, 3, 4),
            iterations: 5,
            quantized_ms: 0.5,
            float_ms: 1.0,
            max_abs_error: 0.01,
        }
    }

    fn demo_report() -> DemoReport {
        DemoReport {
            source: vec![2, 5],
            filter: None,
            steps: vec![
                DemoStep {
                    word: 3,
                    log_prob: -0.5,
                    attention: vec![0.75, 0.25],
                },
                DemoStep {
                    word: 0,
                    log_prob: -1.0,
                    attention: vec![0.5, 0.5],
                },
            ],
        }
    }

    #[test]
    fn test_format_from_flag() {
        assert_eq!(OutputFormat::from_json_flag(true), OutputFormat::Json);
        assert_eq!(OutputFormat::from_json_flag(false), OutputFormat::Text);
    }

    #[test]
    fn test_bench_text() {
        let text = format_bench(&bench_report(), OutputFormat::Text).expect("format");
        assert!(text.contains("2x3 by 3x4"));
        assert!(text.contains("2.00x"));
    }

    #[test]
    fn test_bench_json() {
        let text = format_bench(&bench_report(), OutputFormat::Json).expect("format");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["iterations"], 5);
        assert_eq!(value["backend"], "CPU");
    }

    #[test]
    fn test_speedup_zero_time() {
        let mut report = bench_report();
        report.quantized_ms = 0.0;
        assert!(report.speedup().abs() < f64::EPSILON);
    }

    #[test]
    fn test_demo_text() {
        let report = demo_report();
        assert!((report.score() + 1.5).abs() < 1e-6);
        let text = format_demo(&report, OutputFormat::Text).expect("format");
        assert!(text.contains("source: [2, 5]"));
        assert!(text.contains("[0.75, 0.25]"));
        assert!(text.contains("score: -1.5000"));
    }

    #[test]
    fn test_demo_json() {
        let text = format_demo(&demo_report(), OutputFormat::Json).expect("format");
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["steps"][0]["word"], 3);
        assert!(value["filter"].is_null());
    }

    #[test]
    fn test_shapes_text() {
        let shapes = vec![
            ShapeEntry {
                name: "Wemb".into(),
                rows: 6,
                cols: 4,
            },
            ShapeEntry {
                name: "decoder_c_tt".into(),
                rows: 1,
                cols: 1,
            },
        ];
        let text = format_shapes(&shapes, OutputFormat::Text).expect("format");
        assert!(text.contains(&format!("{:<12}  6 x 4", "Wemb")));
        assert!(text.contains("25 parameters"));
    }
}
