// reduce_assignments.rs — Dead-connection elision
//
// An assignment node that only copies one named signal into another (no
// sub-indexing, one input, one output) carries no information in a schematic.
// Each such node is replaced by direct wires from its upstream drivers to all
// of its downstream readers.
//
// Preconditions: `root` is a live node.
// Postconditions: no child of any node in the subtree is an identity
//                 assignment; every driver that reached a reader through an
//                 elided node reaches it directly.
// Failure modes: `GraphError` only on a corrupted graph.
// Side effects: mutates the graph.

use indexmap::IndexSet;
use tracing::{debug, trace};

use crate::arena::{NodeId, PortId};
use crate::graph::{Graph, GraphError, PortSide};
use crate::origin::Origin;

/// Identity assignment with exactly one input and one output port.
pub fn is_pass_through(graph: &Graph, node: NodeId) -> bool {
    let n = &graph[node];
    let identity = matches!(&n.origin, Some(Origin::Assignment(a)) if a.is_identity());
    identity
        && n.children().is_empty()
        && n.west().len() == 1
        && n.east().len() == 1
        && n.ports(PortSide::North).is_empty()
        && n.ports(PortSide::South).is_empty()
        && graph[n.west()[0]].is_leaf()
        && graph[n.east()[0]].is_leaf()
}

/// Returns the number of elided nodes in the subtree.
pub fn reduce_useless_assignments(graph: &mut Graph, root: NodeId) -> Result<usize, GraphError> {
    let mut reduced = 0;
    for child in graph[root].children().to_vec() {
        if !graph[child].children().is_empty() {
            reduced += reduce_useless_assignments(graph, child)?;
        }
    }

    for child in graph[root].children().to_vec() {
        if !is_pass_through(graph, child) {
            continue;
        }
        elide(graph, root, child)?;
        reduced += 1;
    }

    if reduced > 0 {
        debug!(scope = %graph.node_label(root), reduced, "reduce_useless_assignments");
    }
    Ok(reduced)
}

fn elide(graph: &mut Graph, root: NodeId, node: NodeId) -> Result<(), GraphError> {
    let input = graph[node].west()[0];
    let output = graph[node].east()[0];

    let mut downstream: IndexSet<PortId> = IndexSet::new();
    for e in graph[output].outgoing().to_vec() {
        downstream.extend(graph[e].dsts().iter().copied());
        graph.detach_source(e, output)?;
    }
    // a wire looping back into the node goes away with it
    downstream.shift_remove(&input);

    let mut upstream = Vec::new();
    for e in graph[input].incoming().to_vec() {
        let edge = &graph[e];
        upstream.push((edge.srcs().to_vec(), edge.name.clone(), edge.origin.clone()));
        graph.detach_target(e, input)?;
    }

    trace!(
        node = %graph.node_label(node),
        upstream = upstream.len(),
        downstream = downstream.len(),
        "elide pass-through"
    );

    graph.remove_node(node);

    if downstream.is_empty() {
        return Ok(());
    }
    let dsts: Vec<PortId> = downstream.into_iter().collect();
    for (srcs, name, origin) in upstream {
        graph.add_hyper_edge(root, srcs, dsts.clone(), name, origin)?;
    }
    Ok(())
}
