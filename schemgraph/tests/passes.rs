// Integration tests for the canonicalization passes.
//
// Each test builds a small design through the JSON front end, runs one pass
// or the default pipeline, and checks the resulting structure through the
// public graph API.

use schemgraph::arena::NodeId;
use schemgraph::design::{build_graph, parse_design};
use schemgraph::diag::codes;
use schemgraph::graph::{EndRole, Graph};
use schemgraph::pass::{run_pass, PassId, DEFAULT_PASSES};
use schemgraph::pipeline::run_optimizations;

// ── Test helpers ────────────────────────────────────────────────────────────

fn build(json: &str) -> (Graph, NodeId) {
    let doc = parse_design(json).unwrap_or_else(|e| panic!("bad test design: {}", e));
    let built = build_graph(&doc).unwrap_or_else(|e| panic!("build failed: {}", e));
    assert!(
        built.diagnostics.is_empty(),
        "unexpected build diagnostics: {:?}",
        built.diagnostics
    );
    (built.graph, built.root)
}

fn child_names(g: &Graph, node: NodeId) -> Vec<String> {
    g[node]
        .children()
        .iter()
        .map(|&c| g.node_label(c))
        .collect()
}

fn edge_lines(g: &Graph, node: NodeId) -> Vec<String> {
    let mut lines: Vec<String> = g[node]
        .edges()
        .iter()
        .map(|&e| {
            let srcs: Vec<String> = g[e].srcs().iter().map(|&p| g.port_label(p)).collect();
            let dsts: Vec<String> = g[e].dsts().iter().map(|&p| g.port_label(p)).collect();
            format!("{} -> {}", srcs.join(", "), dsts.join(", "))
        })
        .collect();
    lines.sort();
    lines
}

fn rewrites(g: &mut Graph, root: NodeId, pass: PassId) -> usize {
    let mut diags = Vec::new();
    run_pass(pass, g, root, &mut diags).unwrap_or_else(|e| panic!("{} failed: {}", pass, e))
}

/// Every edge in the subtree satisfies the direction rule of its scope.
fn assert_edges_valid(g: &Graph, root: NodeId) {
    for node in g.descendants(root) {
        for &e in g[node].edges() {
            let edge = &g[e];
            assert!(!edge.srcs().is_empty() && !edge.dsts().is_empty());
            for &s in edge.srcs() {
                g.check_end(node, s, EndRole::Source).unwrap();
            }
            for &d in edge.dsts() {
                g.check_end(node, d, EndRole::Destination).unwrap();
            }
        }
    }
}

// ── Designs ─────────────────────────────────────────────────────────────────

const ASSIGN_CHAIN: &str = r#"{
    "top": "top",
    "modules": [{
        "name": "top",
        "ports": [
            {"name": "a", "direction": "input", "width": 8},
            {"name": "y", "direction": "output", "width": 8}
        ],
        "signals": [{"name": "t", "width": 8}, {"name": "u", "width": 8}],
        "cells": [
            {"op": {"kind": "assign"}, "inputs": ["a"], "outputs": ["t"]},
            {"op": {"kind": "assign"}, "inputs": ["t"], "outputs": ["u"]},
            {"op": {"kind": "operator", "name": "NOT"}, "inputs": ["u"], "outputs": ["y"]}
        ]
    }]
}"#;

const SPLIT_BYTE: &str = r#"{
    "top": "top",
    "modules": [{
        "name": "top",
        "ports": [
            {"name": "a", "direction": "input", "width": 8},
            {"name": "z", "direction": "output", "width": 8}
        ],
        "signals": [
            {"name": "hi", "width": 4}, {"name": "lo", "width": 4},
            {"name": "nhi", "width": 4}, {"name": "nlo", "width": 4}
        ],
        "cells": [
            {"op": {"kind": "index", "hi": 3, "lo": 0}, "inputs": ["a"], "outputs": ["lo"]},
            {"op": {"kind": "index", "hi": 7, "lo": 4}, "inputs": ["a"], "outputs": ["hi"]},
            {"name": "inv_hi", "op": {"kind": "operator", "name": "NOT"}, "inputs": ["hi"], "outputs": ["nhi"]},
            {"name": "inv_lo", "op": {"kind": "operator", "name": "NOT"}, "inputs": ["lo"], "outputs": ["nlo"]},
            {"op": {"kind": "operator", "name": "CONCAT"}, "inputs": ["nhi", "nlo"], "outputs": ["z"]}
        ]
    }]
}"#;

fn nested_concat(q_width: &str) -> String {
    format!(
        r#"{{
        "top": "top",
        "modules": [{{
            "name": "top",
            "ports": [
                {{"name": "p", "direction": "input", "width": 4}},
                {{"name": "q", "direction": "input"{q_width}}},
                {{"name": "r", "direction": "input", "width": 4}},
                {{"name": "z", "direction": "output", "width": 12}}
            ],
            "signals": [{{"name": "pq", "width": 8}}],
            "cells": [
                {{"op": {{"kind": "operator", "name": "CONCAT"}}, "inputs": ["p", "q"], "outputs": ["pq"]}},
                {{"op": {{"kind": "operator", "name": "CONCAT"}}, "inputs": ["pq", "r"], "outputs": ["z"]}}
            ]
        }}]
    }}"#
    )
}

/// A three-field input bundle; the first `sliced` fields are split in halves.
fn sliced_bundle(sliced: usize) -> String {
    let fields = ["x", "y", "w"];
    let mut signals = Vec::new();
    let mut cells = Vec::new();
    let mut xor_inputs = Vec::new();
    for (i, f) in fields.iter().enumerate() {
        if i < sliced {
            signals.push(format!(r#"{{"name": "{f}h", "width": 4}}, {{"name": "{f}l", "width": 4}}"#));
            cells.push(format!(
                r#"{{"op": {{"kind": "index", "hi": 7, "lo": 4}}, "inputs": ["bus.{f}"], "outputs": ["{f}h"]}}"#
            ));
            cells.push(format!(
                r#"{{"op": {{"kind": "index", "hi": 3, "lo": 0}}, "inputs": ["bus.{f}"], "outputs": ["{f}l"]}}"#
            ));
            xor_inputs.push(format!(r#""{f}h", "{f}l""#));
        } else {
            xor_inputs.push(format!(r#""bus.{f}""#));
        }
    }
    cells.push(format!(
        r#"{{"op": {{"kind": "operator", "name": "XOR"}}, "inputs": [{}], "outputs": ["z"]}}"#,
        xor_inputs.join(", ")
    ));
    format!(
        r#"{{
        "top": "top",
        "modules": [{{
            "name": "top",
            "ports": [
                {{"name": "bus", "direction": "input", "fields": [
                    {{"name": "x", "direction": "input", "width": 8}},
                    {{"name": "y", "direction": "input", "width": 8}},
                    {{"name": "w", "direction": "input", "width": 8}}
                ]}},
                {{"name": "z", "direction": "output", "width": 8}}
            ],
            "signals": [{}],
            "cells": [{}]
        }}]
    }}"#,
        signals.join(", "),
        cells.join(", ")
    )
}

/// Two opaque instances with `n`-field bundles; the first `wired` fields are
/// connected by name, the rest go through an inverter.
fn bundle_pair(n: usize, wired: usize) -> String {
    let names: Vec<String> = (0..n).map(|i| format!("f{i}")).collect();
    let fields = |dir: &str| {
        names
            .iter()
            .map(|f| format!(r#"{{"name": "{f}", "direction": "{dir}"}}"#))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut signals = Vec::new();
    let mut src_conn = Vec::new();
    let mut dst_conn = Vec::new();
    let mut cells = Vec::new();
    for (i, f) in names.iter().enumerate() {
        if i < wired {
            signals.push(format!(r#"{{"name": "s_{f}"}}"#));
            src_conn.push(format!(r#""m.{f}": "s_{f}""#));
            dst_conn.push(format!(r#""s.{f}": "s_{f}""#));
        } else {
            signals.push(format!(r#"{{"name": "x_{f}"}}, {{"name": "y_{f}"}}"#));
            src_conn.push(format!(r#""m.{f}": "x_{f}""#));
            dst_conn.push(format!(r#""s.{f}": "y_{f}""#));
            cells.push(format!(
                r#"{{"op": {{"kind": "operator", "name": "NOT"}}, "inputs": ["x_{f}"], "outputs": ["y_{f}"]}}"#
            ));
        }
    }
    format!(
        r#"{{
        "top": "top",
        "modules": [
            {{"name": "source", "ports": [{{"name": "m", "direction": "output", "fields": [{}]}}]}},
            {{"name": "sink", "ports": [{{"name": "s", "direction": "input", "fields": [{}]}}]}},
            {{"name": "top",
              "signals": [{}],
              "cells": [{}],
              "instances": [
                {{"name": "gen", "module": "source", "connections": {{{}}}}},
                {{"name": "snk", "module": "sink", "connections": {{{}}}}}
              ]}}
        ]
    }}"#,
        fields("output"),
        fields("input"),
        signals.join(", "),
        cells.join(", "),
        src_conn.join(", "),
        dst_conn.join(", ")
    )
}

// ── Dead-connection elision ─────────────────────────────────────────────────

#[test]
fn assignment_chain_collapses_to_direct_wires() {
    let (mut g, top) = build(ASSIGN_CHAIN);
    assert_eq!(rewrites(&mut g, top, PassId::ReduceUselessAssignments), 2);
    assert_eq!(child_names(&g, top), vec!["NOT"]);
    assert_eq!(
        edge_lines(&g, top),
        vec!["NOT.[0] -> top.y", "top.a -> NOT.[0]"]
    );
    assert_edges_valid(&g, top);
}

#[test]
fn hidden_intermediate_keeps_its_assignment() {
    let json = ASSIGN_CHAIN.replace(
        r#"{"name": "t", "width": 8}"#,
        r#"{"name": "t", "width": 8, "hidden": true}"#,
    );
    let (mut g, top) = build(&json);
    // a -> t is elided; t -> u reads a hidden signal and stays
    assert_eq!(rewrites(&mut g, top, PassId::ReduceUselessAssignments), 1);
    assert_eq!(child_names(&g, top), vec!["ASSIGN", "NOT"]);
}

// ── Slice fusion ────────────────────────────────────────────────────────────

#[test]
fn byte_halves_fuse_into_one_slice() {
    let (mut g, top) = build(SPLIT_BYTE);
    assert_eq!(rewrites(&mut g, top, PassId::ExtractSplits), 1);
    assert_eq!(child_names(&g, top), vec!["inv_hi", "inv_lo", "CONCAT", "SLICE"]);
    assert_eq!(
        edge_lines(&g, top),
        vec![
            "CONCAT.[0] -> top.z",
            "SLICE.[3:0] -> inv_lo.[0]",
            "SLICE.[7:4] -> inv_hi.[0]",
            "inv_hi.[0] -> CONCAT.[0]",
            "inv_lo.[0] -> CONCAT.[1]",
            "top.a -> SLICE.[0]",
        ]
    );
    assert_edges_valid(&g, top);
}

#[test]
fn full_width_index_survives_the_pipeline() {
    let json = SPLIT_BYTE.replace(r#""hi": 7, "lo": 4"#, r#""hi": 4294967295, "lo": 0"#);
    let doc = parse_design(&json).unwrap();
    let built = build_graph(&doc).unwrap();
    assert_eq!(built.diagnostics.len(), 1);
    assert_eq!(built.diagnostics[0].code, Some(codes::W0303_INDEX_OUT_OF_RANGE));

    let (mut g, top) = (built.graph, built.root);
    let result = run_optimizations(&mut g, top, &DEFAULT_PASSES).unwrap();
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.code == Some(codes::W0301_SLICE_ITEM_MISMATCH)));
    assert!(child_names(&g, top).iter().all(|n| n != "SLICE"));
    assert_edges_valid(&g, top);
}

#[test]
fn partial_cover_is_reported_and_left_alone() {
    let json = SPLIT_BYTE.replace(r#""hi": 7, "lo": 4"#, r#""hi": 3, "lo": 0"#);
    let (mut g, top) = build(&json);
    let mut diags = Vec::new();
    assert_eq!(run_pass(PassId::ExtractSplits, &mut g, top, &mut diags).unwrap(), 0);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, Some(codes::W0302_SLICE_INCOMPLETE));
    assert!(child_names(&g, top).iter().all(|n| n != "SLICE"));
}

// ── Tree fusion ─────────────────────────────────────────────────────────────

#[test]
fn nested_concat_fuses_with_bit_range_names() {
    let (mut g, top) = build(&nested_concat(r#", "width": 4"#));
    assert_eq!(rewrites(&mut g, top, PassId::FlattenTrees), 1);
    assert_eq!(child_names(&g, top), vec!["CONCAT"]);
    assert_eq!(
        edge_lines(&g, top),
        vec![
            "CONCAT.[0] -> top.z",
            "top.p -> CONCAT.[11:8]",
            "top.q -> CONCAT.[7:4]",
            "top.r -> CONCAT.[3:0]",
        ]
    );
    assert_edges_valid(&g, top);
}

#[test]
fn mixed_widths_skip_the_tree() {
    let (mut g, top) = build(&nested_concat(""));
    let mut diags = Vec::new();
    assert_eq!(run_pass(PassId::FlattenTrees, &mut g, top, &mut diags).unwrap(), 0);
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].code, Some(codes::W0310_TREE_MIXED_NAMING));
    assert_eq!(child_names(&g, top), vec!["CONCAT", "CONCAT"]);
}

// ── Interface merging ───────────────────────────────────────────────────────

#[test]
fn fully_sliced_bundle_merges_into_one_node() {
    let (mut g, top) = build(&sliced_bundle(3));
    let result = run_optimizations(&mut g, top, &DEFAULT_PASSES).unwrap();
    let counts: Vec<(String, usize)> = result
        .outcomes
        .iter()
        .map(|o| (o.pass.to_string(), o.rewrites))
        .collect();
    assert_eq!(counts[1], ("extract-splits".to_owned(), 3));
    assert_eq!(counts[3], ("merge-splits-on-interfaces".to_owned(), 1));
    let slices = child_names(&g, top).into_iter().filter(|n| n == "SLICE").count();
    assert_eq!(slices, 1);
    assert_edges_valid(&g, top);
}

#[test]
fn partly_sliced_bundle_is_not_merged() {
    let (mut g, top) = build(&sliced_bundle(2));
    let result = run_optimizations(&mut g, top, &DEFAULT_PASSES).unwrap();
    assert_eq!(result.outcomes[1].rewrites, 2);
    assert_eq!(result.outcomes[3].rewrites, 0);
    let slices = child_names(&g, top).into_iter().filter(|n| n == "SLICE").count();
    assert_eq!(slices, 2);
}

// ── Shared connections ──────────────────────────────────────────────────────

#[test]
fn one_of_two_fields_keeps_field_wires() {
    let (mut g, top) = build(&bundle_pair(2, 1));
    assert_eq!(rewrites(&mut g, top, PassId::ResolveSharedConnections), 0);
    let gen = g[top].children()[1];
    assert_eq!(g.node_label(gen), "gen");
    assert_eq!(g[g[gen].east()[0]].children().len(), 2);
}

#[test]
fn three_of_four_fields_become_one_bundle_wire() {
    let (mut g, top) = build(&bundle_pair(4, 3));
    assert_eq!(rewrites(&mut g, top, PassId::ResolveSharedConnections), 1);
    let [gen, snk] = [g[top].children()[1], g[top].children()[2]];
    let m = g[gen].east()[0];
    let s = g[snk].west()[0];
    assert_eq!(g[m].children().len(), 1);
    assert_eq!(g[s].children().len(), 1);
    assert!(g[m].is_reduced() && g[s].is_reduced());
    assert!(edge_lines(&g, top).contains(&"gen.m -> snk.s".to_owned()));
    assert!(edge_lines(&g, top).contains(&"gen.m.f3 -> NOT.[0]".to_owned()));
    assert_edges_valid(&g, top);
}

// ── Idempotence ─────────────────────────────────────────────────────────────

#[test]
fn default_pipeline_is_idempotent() {
    let designs = [
        ASSIGN_CHAIN.to_owned(),
        SPLIT_BYTE.to_owned(),
        nested_concat(r#", "width": 4"#),
        sliced_bundle(3),
        bundle_pair(4, 3),
    ];
    for json in &designs {
        let (mut g, top) = build(json);
        let first = run_optimizations(&mut g, top, &DEFAULT_PASSES).unwrap();
        assert!(first.total_rewrites() > 0);
        let before = g.dump(top);
        let second = run_optimizations(&mut g, top, &DEFAULT_PASSES).unwrap();
        assert_eq!(second.total_rewrites(), 0, "second run rewrote:\n{}", before);
        assert_eq!(g.dump(top), before);
    }
}
