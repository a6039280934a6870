// pipeline.rs — Canonicalization pipeline and run provenance
//
// Runs a list of passes in order over one root node, collecting diagnostics
// and per-pass timing.
//
// Preconditions: `root` is a live node of `graph`.
// Postconditions: every listed pass ran once, in order, or the run stopped at
//                 the first invariant violation.
// Failure modes: a pass hitting a `GraphError` → `PipelineError` naming it.
// Side effects: mutates the graph; calls `on_pass_complete` after each pass.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::arena::NodeId;
use crate::diag::{codes, Diagnostic};
use crate::graph::{Graph, GraphError};
use crate::pass::{check_order, run_pass, PassId};

// ── Results ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PassOutcome {
    pub pass: PassId,
    /// Rewrites applied (nodes elided, groups fused, bundles reduced, ...).
    pub rewrites: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
pub struct PipelineResult {
    pub diagnostics: Vec<Diagnostic>,
    pub outcomes: Vec<PassOutcome>,
}

impl PipelineResult {
    pub fn has_error(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn total_rewrites(&self) -> usize {
        self.outcomes.iter().map(|o| o.rewrites).sum()
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// A pass found the graph in a state that breaks a structural invariant.
#[derive(Debug)]
pub struct PipelineError {
    /// The pass that hit the violation.
    pub failing_pass: PassId,
    pub source: GraphError,
}

impl PipelineError {
    /// The violation as an `E0100` error naming the failing pass.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(format!("invariant violated: {}", self.source))
            .with_code(codes::E0100_INVARIANT)
            .with_subject(self.failing_pass.to_string())
            .with_hint("the failing pass may have left the graph partly rewritten")
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.failing_pass, self.source)
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run `passes` in order over the subtree of `root`.
pub fn run_optimizations(
    graph: &mut Graph,
    root: NodeId,
    passes: &[PassId],
) -> Result<PipelineResult, PipelineError> {
    run_optimizations_with(graph, root, passes, |_, _| {})
}

/// Like `run_optimizations`, calling `on_pass_complete` with each pass's
/// outcome and the diagnostics it produced.
pub fn run_optimizations_with(
    graph: &mut Graph,
    root: NodeId,
    passes: &[PassId],
    mut on_pass_complete: impl FnMut(&PassOutcome, &[Diagnostic]),
) -> Result<PipelineResult, PipelineError> {
    let mut result = PipelineResult {
        diagnostics: check_order(passes),
        outcomes: Vec::with_capacity(passes.len()),
    };
    for d in &result.diagnostics {
        warn!("{}", d);
    }

    for &pass in passes {
        let t = Instant::now();
        let mut diags = Vec::new();
        let rewrites = run_pass(pass, graph, root, &mut diags).map_err(|source| PipelineError {
            failing_pass: pass,
            source,
        })?;
        let outcome = PassOutcome {
            pass,
            rewrites,
            elapsed: t.elapsed(),
        };
        info!(
            pass = %pass,
            rewrites,
            ms = outcome.elapsed.as_secs_f64() * 1000.0,
            "pass complete"
        );
        for d in &diags {
            warn!("{}", d);
        }
        on_pass_complete(&outcome, &diags);
        result.diagnostics.extend(diags);
        result.outcomes.push(outcome);
    }
    Ok(result)
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Hashes tying an exported document to its input and tool version.
///
/// `input_hash`: SHA-256 of the raw design description.
/// `output_fingerprint`: SHA-256 of the compact exported JSON.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub input_hash: [u8; 32],
    pub output_fingerprint: [u8; 32],
    pub tool_version: &'static str,
}

impl Provenance {
    pub fn input_hash_hex(&self) -> String {
        bytes_to_hex(&self.input_hash)
    }

    pub fn output_fingerprint_hex(&self) -> String {
        bytes_to_hex(&self.output_fingerprint)
    }

    pub fn to_json(&self) -> String {
        format!(
            "{{\n  \"input_hash\": \"{}\",\n  \"output_fingerprint\": \"{}\",\n  \"tool_version\": \"{}\"\n}}\n",
            self.input_hash_hex(),
            self.output_fingerprint_hex(),
            self.tool_version,
        )
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

pub fn compute_provenance(input: &str, output_json: &str) -> Provenance {
    Provenance {
        input_hash: sha256(input.as_bytes()),
        output_fingerprint: sha256(output_json.as_bytes()),
        tool_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{PortDirection, PortSide};
    use crate::origin::{Assignment, Operand, Origin, Signal};
    use crate::pass::DEFAULT_PASSES;

    fn with_assignment() -> (Graph, NodeId) {
        let mut g = Graph::new();
        let top = g.add_root(Some("top"));
        let a = g.add_port(top, Some("a"), PortDirection::Input, PortSide::West);
        let y = g.add_port(top, Some("y"), PortDirection::Output, PortSide::East);
        let n = g.add_node(top, Some("ASSIGN"));
        g[n].origin = Some(Origin::Assignment(Assignment {
            src: Operand::Signal(Signal::new(0, "a")),
            dst: Signal::new(1, "y"),
            indexes: vec![],
        }));
        let i = g.add_port(n, None, PortDirection::Input, PortSide::West);
        let o = g.add_port(n, None, PortDirection::Output, PortSide::East);
        g.add_edge(top, a, i, None, None).unwrap();
        g.add_edge(top, o, y, None, None).unwrap();
        (g, top)
    }

    #[test]
    fn default_pipeline_reports_each_pass() {
        let (mut g, top) = with_assignment();
        let mut seen = Vec::new();
        let result = run_optimizations_with(&mut g, top, &DEFAULT_PASSES, |o, _| seen.push(o.pass))
            .unwrap();
        assert_eq!(seen, DEFAULT_PASSES.to_vec());
        assert_eq!(result.outcomes[0].rewrites, 1);
        assert_eq!(result.total_rewrites(), 1);
        assert!(!result.has_error());
        assert!(g[top].children().is_empty());
    }

    #[test]
    fn out_of_order_passes_warn_but_run() {
        let (mut g, top) = with_assignment();
        let result = run_optimizations(
            &mut g,
            top,
            &[PassId::ExtractSplits, PassId::ReduceUselessAssignments],
        )
        .unwrap();
        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.diagnostics[0].code, Some(codes::W0400_PASS_ORDER));
    }

    #[test]
    fn invariant_violation_becomes_e0100() {
        let err = PipelineError {
            failing_pass: PassId::FlattenTrees,
            source: GraphError::EmptyEdge {
                scope: "top".into(),
            },
        };
        let d = err.to_diagnostic();
        assert!(d.is_error());
        assert_eq!(d.code, Some(codes::E0100_INVARIANT));
        assert_eq!(d.subject.as_deref(), Some("flatten-trees"));
        assert!(d.to_string().starts_with("error[E0100]: invariant violated: "));
    }

    #[test]
    fn provenance_hashes_are_hex() {
        let p = compute_provenance("{}", "{\"id\":\"0\"}");
        assert_eq!(p.input_hash_hex().len(), 64);
        assert_eq!(
            p.input_hash_hex(),
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert!(p.to_json().contains("\"tool_version\""));
    }
}
