// pass.rs — Pass descriptor module: identifiers, metadata, ordering, dispatch
//
// Declares the canonicalization passes, the passes each one is meant to run
// after, and the default pipeline. Passes may run in any order and any
// subset; running one before a pass it is meant to follow is legal but
// reported, because the later pass then sees fewer opportunities.

use std::fmt;
use std::str::FromStr;

use crate::arena::NodeId;
use crate::diag::{codes, Diagnostic};
use crate::flatten_trees::{flatten_trees, is_concat};
use crate::graph::{Graph, GraphError};

// ── Pass identifiers ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassId {
    ReduceUselessAssignments,
    ExtractSplits,
    FlattenTrees,
    MergeSplitsOnInterfaces,
    ResolveSharedConnections,
    SortStatementPorts,
}

// ── Pass descriptor ────────────────────────────────────────────────────────

/// Static metadata about a pass.
pub struct PassDescriptor {
    /// Name used on the command line and in logs.
    pub name: &'static str,
    /// Passes whose results this pass builds on, when both run.
    pub after: &'static [PassId],
    /// What holds once the pass has run (documentation only).
    pub invariants: &'static str,
}

/// Return the static descriptor for a given pass.
pub fn descriptor(id: PassId) -> PassDescriptor {
    match id {
        PassId::ReduceUselessAssignments => PassDescriptor {
            name: "reduce-useless-assignments",
            after: &[],
            invariants: "no identity assignment nodes remain",
        },
        PassId::ExtractSplits => PassDescriptor {
            name: "extract-splits",
            after: &[PassId::ReduceUselessAssignments],
            invariants: "covering static slices of one signal form one SLICE",
        },
        PassId::FlattenTrees => PassDescriptor {
            name: "flatten-trees",
            after: &[PassId::ReduceUselessAssignments],
            invariants: "no two CONCAT nodes are wired one-to-one",
        },
        PassId::MergeSplitsOnInterfaces => PassDescriptor {
            name: "merge-splits-on-interfaces",
            after: &[PassId::ExtractSplits, PassId::FlattenTrees],
            invariants: "per-field SLICE/CONCAT groups covering an interface are merged",
        },
        PassId::ResolveSharedConnections => PassDescriptor {
            name: "resolve-shared-connections",
            after: &[
                PassId::ReduceUselessAssignments,
                PassId::ExtractSplits,
                PassId::FlattenTrees,
            ],
            invariants: "field-by-field bundle wiring is drawn as one wire",
        },
        PassId::SortStatementPorts => PassDescriptor {
            name: "sort-statement-ports",
            after: &[],
            invariants: "statement node ports are ordered by signal",
        },
    }
}

/// All pass IDs in declaration order.
pub const ALL_PASSES: [PassId; 6] = [
    PassId::ReduceUselessAssignments,
    PassId::ExtractSplits,
    PassId::FlattenTrees,
    PassId::MergeSplitsOnInterfaces,
    PassId::ResolveSharedConnections,
    PassId::SortStatementPorts,
];

/// The default pipeline.
pub const DEFAULT_PASSES: [PassId; 6] = ALL_PASSES;

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", descriptor(*self).name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPass(pub String);

impl fmt::Display for UnknownPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = ALL_PASSES.iter().map(|p| descriptor(*p).name).collect();
        write!(f, "unknown pass '{}' (expected one of: {})", self.0, names.join(", "))
    }
}

impl std::error::Error for UnknownPass {}

impl FromStr for PassId {
    type Err = UnknownPass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "-");
        ALL_PASSES
            .iter()
            .copied()
            .find(|p| descriptor(*p).name == wanted)
            .ok_or_else(|| UnknownPass(s.to_owned()))
    }
}

// ── Ordering ───────────────────────────────────────────────────────────────

/// Warn for every pass scheduled before a pass it is meant to follow.
pub fn check_order(passes: &[PassId]) -> Vec<Diagnostic> {
    let mut diags = Vec::new();
    for (i, &pass) in passes.iter().enumerate() {
        for &dep in descriptor(pass).after {
            let Some(j) = passes.iter().rposition(|&p| p == dep) else {
                continue;
            };
            if j > i {
                diags.push(
                    Diagnostic::warning(format!("{} runs before {}", pass, dep))
                        .with_code(codes::W0400_PASS_ORDER)
                        .with_subject(pass.to_string())
                        .with_hint(format!("move {} after {}", pass, dep)),
                );
            }
        }
    }
    diags
}

// ── Dispatch ───────────────────────────────────────────────────────────────

/// Run one pass over the subtree of `root`; returns the number of rewrites.
pub fn run_pass(
    id: PassId,
    graph: &mut Graph,
    root: NodeId,
    diags: &mut Vec<Diagnostic>,
) -> Result<usize, GraphError> {
    match id {
        PassId::ReduceUselessAssignments => {
            crate::reduce_assignments::reduce_useless_assignments(graph, root)
        }
        PassId::ExtractSplits => crate::extract_splits::extract_splits(graph, root, diags),
        PassId::FlattenTrees => flatten_trees(graph, root, &is_concat, diags),
        PassId::MergeSplitsOnInterfaces => {
            crate::merge_splits::merge_splits_on_interfaces(graph, root, diags)
        }
        PassId::ResolveSharedConnections => {
            crate::shared_connections::resolve_shared_connections(graph, root)
        }
        PassId::SortStatementPorts => crate::sort_ports::sort_statement_ports(graph, root),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
