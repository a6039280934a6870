use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use schemgraph::*;

// Layout-graph benchmark scenarios.
// Every generated design resolves without diagnostics.

/// A bank of `lanes` byte lanes: each lane copies an input through an
/// assignment, splits it in halves, inverts each half in an instance (all
/// instances after the first share its body) and concatenates the halves
/// back into an output.
fn generate_lane_design(lanes: usize) -> String {
    let mut ports = Vec::new();
    let mut signals = Vec::new();
    let mut cells = Vec::new();
    let mut instances = Vec::new();
    for l in 0..lanes {
        ports.push(format!(r#"{{"name": "a{l}", "direction": "input", "width": 8}}"#));
        ports.push(format!(r#"{{"name": "z{l}", "direction": "output", "width": 8}}"#));
        signals.push(format!(
            r#"{{"name": "t{l}", "width": 8}}, {{"name": "hi{l}", "width": 4}}, {{"name": "lo{l}", "width": 4}},
               {{"name": "nhi{l}", "width": 4}}, {{"name": "nlo{l}", "width": 4}}"#
        ));
        cells.push(format!(
            r#"{{"op": {{"kind": "assign"}}, "inputs": ["a{l}"], "outputs": ["t{l}"]}},
               {{"op": {{"kind": "index", "hi": 7, "lo": 4}}, "inputs": ["t{l}"], "outputs": ["hi{l}"]}},
               {{"op": {{"kind": "index", "hi": 3, "lo": 0}}, "inputs": ["t{l}"], "outputs": ["lo{l}"]}},
               {{"op": {{"kind": "operator", "name": "CONCAT"}}, "inputs": ["nhi{l}", "nlo{l}"], "outputs": ["z{l}"]}}"#
        ));
        let share = l > 0;
        instances.push(format!(
            r#"{{"name": "inv_hi{l}", "module": "inv4", "connections": {{"i": "hi{l}", "o": "nhi{l}"}}, "share_body": {share}}},
               {{"name": "inv_lo{l}", "module": "inv4", "connections": {{"i": "lo{l}", "o": "nlo{l}"}}, "share_body": true}}"#
        ));
    }
    format!(
        r#"{{
        "top": "top",
        "modules": [
            {{"name": "inv4",
              "ports": [{{"name": "i", "direction": "input", "width": 4}},
                        {{"name": "o", "direction": "output", "width": 4}}],
              "cells": [{{"op": {{"kind": "operator", "name": "NOT"}}, "inputs": ["i"], "outputs": ["o"]}}]}},
            {{"name": "top",
              "ports": [{}],
              "signals": [{}],
              "cells": [{}],
              "instances": [{}]}}
        ]
    }}"#,
        ports.join(", "),
        signals.join(", "),
        cells.join(", "),
        instances.join(", ")
    )
}

fn build(doc: &design::DesignDoc) -> design::BuiltDesign {
    let built = design::build_graph(doc).unwrap();
    assert!(built.diagnostics.is_empty());
    built
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for lanes in [1_usize, 8, 64] {
        let doc = design::parse_design(&generate_lane_design(lanes)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}lanes", lanes)), &doc, |b, doc| {
            b.iter(|| black_box(build(black_box(doc))));
        });
    }
    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    for lanes in [1_usize, 8, 64] {
        let doc = design::parse_design(&generate_lane_design(lanes)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}lanes", lanes)), &doc, |b, doc| {
            b.iter_batched(
                || build(doc),
                |mut built| {
                    let r = pipeline::run_optimizations(
                        &mut built.graph,
                        built.root,
                        &pass::DEFAULT_PASSES,
                    )
                    .unwrap();
                    black_box(r.total_rewrites());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_export(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_elk");
    for lanes in [1_usize, 8, 64] {
        let doc = design::parse_design(&generate_lane_design(lanes)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}lanes", lanes)), &doc, |b, doc| {
            b.iter_batched(
                || {
                    let mut built = build(doc);
                    pipeline::run_optimizations(&mut built.graph, built.root, &pass::DEFAULT_PASSES)
                        .unwrap();
                    built
                },
                |mut built| {
                    let elk = elk::to_elk(&mut built.graph, built.root).unwrap();
                    black_box(elk::to_json(&elk, false).unwrap());
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_pipeline, bench_export);
criterion_main!(benches);
