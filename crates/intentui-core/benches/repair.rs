use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use intentui_core::parser::parse_lenient;
use intentui_core::{repair, Renderer};

fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(format!("../../tests/fixtures/{}", name));
    std::fs::read_to_string(path).unwrap_or_default()
}

fn repair_benchmark(c: &mut Criterion) {
    let valid: serde_json::Value =
        serde_json::from_str(&fixture("valid/fractions-lesson.json")).unwrap_or_default();
    let loose: serde_json::Value =
        serde_json::from_str(&fixture("malformed/loose-shapes.json")).unwrap_or_default();
    let prose = fixture("malformed/prose-wrapped.txt");

    c.bench_function("repair_valid", |b| b.iter(|| repair(black_box(&valid))));
    c.bench_function("repair_loose_shapes", |b| b.iter(|| repair(black_box(&loose))));
    c.bench_function("parse_and_repair_prose", |b| {
        b.iter(|| parse_lenient(black_box(&prose)).map(|v| repair(&v)))
    });

    let response = repair(&valid);
    let renderer = Renderer::default();
    c.bench_function("render_lesson", |b| {
        b.iter(|| renderer.render(black_box(&response.components)))
    });
}

criterion_group!(benches, repair_benchmark);
criterion_main!(benches);
