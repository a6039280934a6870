// flatten_trees.rs — Tree fusion
//
// Chains of reducible single-output operators (by default CONCAT) that feed
// each other one-to-one are fused into one node whose inputs are the tree's
// external inputs in left-to-right operand order:
//
//   concat(concat(a, b), c)   =>   CONCAT(a, b, c)
//
// A node is absorbed into its consumer only when its output has exactly one
// wire with exactly one reader. Trees are picked in child order, so results
// do not depend on hashing.
//
// Input naming: when every input's width is known, inputs are named by the
// bit range they occupy in the result, first operand most significant
// (`[hi:lo]`, or `[bit]` for one bit). When no width is known they are named
// by position, again first operand highest (`[n-1]` .. `[0]`). A tree mixing
// both cannot be named consistently and is left unfused.
//
// Preconditions: the predicate only accepts nodes with exactly one east port.
// Postconditions: no two reducible nodes are connected one-to-one.
// Failure modes: mixed input naming → W0310, tree skipped.
// Side effects: mutates the graph.

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::arena::{EdgeId, NodeId, PortId};
use crate::diag::{codes, Diagnostic};
use crate::graph::{Graph, GraphError, PortDirection, PortSide};
use crate::origin::Origin;

/// Decides which nodes may be fused into trees.
pub type Reducible = dyn Fn(&Graph, NodeId) -> bool;

/// Default predicate: concatenation operators.
pub fn is_concat(graph: &Graph, node: NodeId) -> bool {
    let n = &graph[node];
    n.name.as_deref() == Some("CONCAT") && n.east().len() == 1 && n.children().is_empty()
}

/// An external input of a tree: the consumer port inside the tree and the
/// edge reaching it (if connected).
#[derive(Debug, Clone, Copy)]
struct TreeInput {
    port: PortId,
    edge: Option<EdgeId>,
}

/// Returns the number of fused trees in the subtree.
pub fn flatten_trees(
    graph: &mut Graph,
    root: NodeId,
    reducible: &Reducible,
    diags: &mut Vec<Diagnostic>,
) -> Result<usize, GraphError> {
    let mut fused = 0;
    for child in graph[root].children().to_vec() {
        if !graph[child].children().is_empty() {
            fused += flatten_trees(graph, child, reducible, diags)?;
        }
    }

    let candidates: IndexSet<NodeId> = graph[root]
        .children()
        .iter()
        .copied()
        .filter(|&n| reducible(graph, n))
        .collect();
    let mut done: IndexSet<NodeId> = IndexSet::new();

    for &start in &candidates {
        if done.contains(&start) || graph.node(start).is_none() {
            continue;
        }
        let tree_root = root_of_tree(graph, &candidates, start);
        let (nodes, inputs) = collect(graph, &candidates, tree_root);
        done.extend(nodes.iter().copied());
        if nodes.len() < 2 {
            continue;
        }
        let Some(names) = input_names(graph, &inputs) else {
            diags.push(
                Diagnostic::warning("tree inputs mix known and unknown widths, not fused")
                    .with_code(codes::W0310_TREE_MIXED_NAMING)
                    .with_subject(graph.node_label(tree_root))
                    .with_hint("give every operand signal a width"),
            );
            continue;
        };
        fuse(graph, root, tree_root, &nodes, &inputs, names)?;
        fused += 1;
    }

    if fused > 0 {
        debug!(scope = %graph.node_label(root), fused, "flatten_trees");
    }
    Ok(fused)
}

/// The single consumer port of `node`'s output, if there is exactly one.
fn single_consumer(graph: &Graph, node: NodeId) -> Option<PortId> {
    let out = *graph[node].east().first()?;
    match graph[out].outgoing() {
        [e] => match graph[*e].dsts() {
            [dst] => Some(*dst),
            _ => None,
        },
        _ => None,
    }
}

/// Follow one-to-one wires downstream while the consumer is reducible.
fn root_of_tree(graph: &Graph, candidates: &IndexSet<NodeId>, start: NodeId) -> NodeId {
    let mut seen = IndexSet::new();
    let mut node = start;
    seen.insert(node);
    while let Some(dst) = single_consumer(graph, node) {
        let next = graph[dst].node();
        if !candidates.contains(&next) || !seen.insert(next) {
            break;
        }
        node = next;
    }
    node
}

/// Pending work of the tree walk.
enum Step {
    Visit(NodeId),
    Wire { port: PortId, edge: Option<EdgeId> },
}

/// Pre-order walk from the tree root through one-to-one reducible inputs.
/// Iterative: chains may be arbitrarily deep.
fn collect(
    graph: &Graph,
    candidates: &IndexSet<NodeId>,
    tree_root: NodeId,
) -> (IndexSet<NodeId>, Vec<TreeInput>) {
    let mut nodes = IndexSet::new();
    let mut inputs = Vec::new();
    let mut stack = vec![Step::Visit(tree_root)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Visit(node) => {
                nodes.insert(node);
                let mut wires = Vec::new();
                for &port in graph[node].west() {
                    let incoming = graph[port].incoming();
                    if incoming.is_empty() {
                        wires.push(Step::Wire { port, edge: None });
                    }
                    for &e in incoming {
                        wires.push(Step::Wire { port, edge: Some(e) });
                    }
                }
                stack.extend(wires.into_iter().rev());
            }
            Step::Wire { port, edge: None } => inputs.push(TreeInput { port, edge: None }),
            Step::Wire { port, edge: Some(e) } => {
                // decided on pop: earlier operands may already own the producer
                let producer = match graph[e].srcs() {
                    [src] => {
                        let producer = graph[*src].node();
                        let absorbable = candidates.contains(&producer)
                            && !nodes.contains(&producer)
                            && single_consumer(graph, producer) == Some(port);
                        absorbable.then_some(producer)
                    }
                    _ => None,
                };
                match producer {
                    Some(producer) => stack.push(Step::Visit(producer)),
                    None => inputs.push(TreeInput { port, edge: Some(e) }),
                }
            }
        }
    }
    (nodes, inputs)
}

fn input_width(graph: &Graph, input: &TreeInput) -> Option<u32> {
    input
        .edge
        .and_then(|e| graph[e].origin.as_ref())
        .and_then(Origin::width)
        .or_else(|| graph[input.port].origin.as_ref().and_then(Origin::width))
        .filter(|&w| w > 0)
}

/// Port names for the fused inputs, `None` when widths are only partly known.
fn input_names(graph: &Graph, inputs: &[TreeInput]) -> Option<Vec<String>> {
    let widths: Vec<Option<u32>> = inputs.iter().map(|i| input_width(graph, i)).collect();
    let n = widths.len();
    if widths.iter().all(Option::is_some) {
        // u64: operand widths may sum past u32::MAX
        let mut lo: u64 = widths.iter().flatten().map(|&w| u64::from(w)).sum();
        let mut names = Vec::with_capacity(n);
        for w in widths.into_iter().flatten().map(u64::from) {
            lo -= w;
            let hi = lo + w - 1;
            names.push(if hi == lo {
                format!("[{}]", lo)
            } else {
                format!("[{}:{}]", hi, lo)
            });
        }
        Some(names)
    } else if widths.iter().all(Option::is_none) {
        Some((0..n).map(|i| format!("[{}]", n - 1 - i)).collect())
    } else {
        None
    }
}

fn fuse(
    graph: &mut Graph,
    root: NodeId,
    tree_root: NodeId,
    nodes: &IndexSet<NodeId>,
    inputs: &[TreeInput],
    names: Vec<String>,
) -> Result<(), GraphError> {
    let (name, class, constraints) = {
        let n = &graph[tree_root];
        (n.name.clone(), n.class.clone(), n.port_constraints)
    };
    let origins: Vec<Origin> = nodes
        .iter()
        .filter_map(|&n| graph[n].origin.clone())
        .collect();

    let new = graph.add_node_with(root, name.as_deref(), constraints);
    graph[new].class = class;
    graph[new].origin = Some(Origin::Fused(origins));

    let old_out = graph[tree_root].east()[0];
    let out = graph.add_port(new, None, PortDirection::Output, PortSide::East);
    graph[out].origin = graph[old_out].origin.clone();
    for e in graph[old_out].outgoing().to_vec() {
        graph.replace_source(e, old_out, out)?;
    }

    for (input, name) in inputs.iter().zip(names) {
        let port = graph.add_port(new, Some(name.as_str()), PortDirection::Input, PortSide::West);
        graph[port].origin = graph[input.port].origin.clone();
        if let Some(e) = input.edge {
            graph.replace_target(e, input.port, port)?;
        }
    }

    trace!(
        root = %graph.node_label(tree_root),
        nodes = nodes.len(),
        inputs = inputs.len(),
        "tree fused"
    );
    for &n in nodes {
        graph.remove_node(n);
    }
    Ok(())
}
