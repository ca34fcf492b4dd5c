//! Benchmarks for the quantized product and one decoding step
//!
//! Compares the integer GEMM (with range shrinking) against the float
//! product of the same operands, then times a full decoder step of the
//! synthetic toy model.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nmt_q8::backend::CpuBackend;
use nmt_q8::gemm::{prod, GemmScratch};
use nmt_q8::model::{Model, ModelConfig, Weights};
use nmt_q8::scorer::{EncoderDecoder, Scorer, Sentence};
use nmt_q8::{simd, BackendSelector, EngineConfig, QMatrix};

fn operand(rows: usize, cols: usize, seed: f32) -> QMatrix {
    let values: Vec<f32> = (0..rows * cols)
        .map(|i| ((i as f32 + seed) * 0.37).sin())
        .collect();
    QMatrix::from_f32(rows, cols, &values).expect("operand")
}

/// Quantized versus float product at decoder-like shapes
fn bench_prod(c: &mut Criterion) {
    let mut group = c.benchmark_group("prod");
    let cpu = CpuBackend::new();
    let auto = BackendSelector::create(&EngineConfig::default()).expect("backend");

    for (m, k, n) in [(1, 512, 512), (12, 512, 1024), (64, 1024, 1024)] {
        let a = operand(m, k, 0.0);
        let b = operand(k, n, 5.0);
        let (fa, fb) = (a.to_f32(), b.to_f32());
        let label = format!("{m}x{k}x{n}");
        group.throughput(Throughput::Elements((m * k * n) as u64));

        group.bench_with_input(BenchmarkId::new("quantized_cpu", &label), &(), |bencher, _| {
            let mut scratch = GemmScratch::new();
            let mut out = QMatrix::new();
            bencher.iter(|| {
                prod(&cpu, &mut scratch, &a, false, &b, false, &mut out).expect("prod");
                black_box(out.data());
            });
        });

        group.bench_with_input(BenchmarkId::new("quantized_auto", &label), &(), |bencher, _| {
            let mut scratch = GemmScratch::new();
            let mut out = QMatrix::new();
            bencher.iter(|| {
                prod(auto.as_ref(), &mut scratch, &a, false, &b, false, &mut out).expect("prod");
                black_box(out.data());
            });
        });

        group.bench_with_input(BenchmarkId::new("float", &label), &(), |bencher, _| {
            bencher.iter(|| black_box(simd::matmul(&fa, &fb, m, k, n)));
        });
    }
    group.finish();
}

/// One decoder step of the toy model with a beam of four
fn bench_decode_step(c: &mut Criterion) {
    let config = EngineConfig::single_threaded();
    let weights = Weights::synthetic(&ModelConfig::new(64, 64, 16, 32)).expect("weights");
    let model = Arc::new(Model::new(weights, &config).expect("model"));
    let mut scorer = EncoderDecoder::new(model, config).expect("scorer");
    scorer
        .set_source(&[Sentence::new(0, (2..22).collect())])
        .expect("source");
    let mut start = scorer.new_state();
    scorer.begin_sentence_state(&mut start, 1).expect("begin");
    let beam: Vec<_> = (0..4)
        .map(|w| nmt_q8::scorer::BeamEntry::new(0, w + 3))
        .collect();
    let mut state = scorer.new_state();
    scorer
        .assemble_beam_state(&start, &beam, &mut state)
        .expect("assemble");
    let mut next = scorer.new_state();

    c.bench_function("decode_step_beam4", |bencher| {
        bencher.iter(|| {
            scorer.decode(&state, &mut next, &[4]).expect("decode");
            black_box(scorer.probs().as_slice());
        });
    });
}

criterion_group!(benches, bench_prod, bench_decode_step);
criterion_main!(benches);
