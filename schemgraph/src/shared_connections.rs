// shared_connections.rs — Shared-connection reduction
//
// Two bundles wired field-by-field (a.valid -> b.valid, a.data -> b.data, ...)
// are drawn as one wire between the bundles. For every bundle port, leaves
// connected by exactly one one-to-one wire to a same-named leaf of another
// bundle are counted per target bundle. When the best target accounts for at
// least half of the bundle's leaves (but not exactly one of two), those field
// wires and field ports are removed on both sides and replaced by one wire
// between the bundles. Remaining fields keep their own wires.
//
// Preconditions: none.
// Postconditions: reduced bundles are marked; a marked bundle is never
//                 reduced again.
// Failure modes: `GraphError` only on a corrupted graph.
// Side effects: mutates the graph.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::arena::{EdgeId, NodeId, PortId};
use crate::graph::{EndRole, Graph, GraphError};

/// Returns the number of reduced bundles in the subtree.
pub fn resolve_shared_connections(graph: &mut Graph, root: NodeId) -> Result<usize, GraphError> {
    let mut pinned = IndexSet::new();
    for node in graph.descendants(root) {
        if let Some(body) = graph[node].shares_body_with() {
            pinned.insert(node);
            pinned.insert(body);
        }
    }
    resolve_in(graph, root, &pinned)
}

fn resolve_in(graph: &mut Graph, root: NodeId, pinned: &IndexSet<NodeId>) -> Result<usize, GraphError> {
    let mut reduced = 0;
    for child in graph[root].children().to_vec() {
        reduced += resolve_in(graph, child, pinned)?;
    }

    for child in graph[root].children().to_vec() {
        if pinned.contains(&child) {
            continue;
        }
        let ports: Vec<PortId> = graph.iter_ports(child).collect();
        for port in ports {
            reduced += try_reduce(graph, port, pinned)?;
        }
    }

    if reduced > 0 {
        debug!(scope = %graph.node_label(root), reduced, "resolve_shared_connections");
    }
    Ok(reduced)
}

/// Field wires of one bundle, grouped by the bundle at their far end.
type Targets = IndexMap<PortId, Vec<(PortId, EdgeId)>>;

fn try_reduce(graph: &mut Graph, port: PortId, pinned: &IndexSet<NodeId>) -> Result<usize, GraphError> {
    if graph.port(port).map_or(true, |p| p.is_leaf()) {
        return Ok(0);
    }
    let mut reduced = 0;
    for child in graph[port].children().to_vec() {
        reduced += try_reduce(graph, child, pinned)?;
    }
    if graph[port].is_reduced() {
        return Ok(reduced);
    }

    let mut targets = Targets::new();
    collect_direct(graph, port, pinned, &mut targets);
    let Some((target, wires)) = best_target(&targets) else {
        return Ok(reduced);
    };

    let total = graph.leaf_count(port);
    let cnt = wires.len();
    if cnt * 2 < total || (cnt == 1 && total == 2) {
        trace!(port = %graph.port_label(port), cnt, total, "too few shared wires");
        return Ok(reduced);
    }

    // orientation and scope come from the field wires being replaced
    let (leaf, e) = wires[0];
    let scope = graph[e].scope();
    let port_is_source = graph[e].srcs().contains(&leaf);
    let (src, dst) = if port_is_source {
        (port, target)
    } else {
        (target, port)
    };
    if graph.check_end(scope, src, EndRole::Source).is_err()
        || graph.check_end(scope, dst, EndRole::Destination).is_err()
    {
        trace!(port = %graph.port_label(port), "bundle directions do not allow one wire");
        return Ok(reduced);
    }

    for &(leaf, e) in &wires {
        let far = far_end(graph, e, leaf);
        graph.remove_edge(e);
        graph.remove_port(leaf);
        if let Some(far) = far {
            graph.remove_port(far);
        }
    }
    graph.add_edge(scope, src, dst, None, None)?;
    graph.mark_reduced(port);
    graph.mark_reduced(target);
    trace!(
        port = %graph.port_label(port),
        target = %graph.port_label(target),
        wires = cnt,
        "bundle wires merged"
    );
    Ok(reduced + 1)
}

/// First target with the most wires.
fn best_target(targets: &Targets) -> Option<(PortId, Vec<(PortId, EdgeId)>)> {
    let mut best: Option<(&PortId, &Vec<(PortId, EdgeId)>)> = None;
    for (target, wires) in targets {
        if best.map_or(true, |(_, b)| wires.len() > b.len()) {
            best = Some((target, wires));
        }
    }
    best.map(|(t, w)| (*t, w.clone()))
}

fn far_end(graph: &Graph, e: EdgeId, leaf: PortId) -> Option<PortId> {
    let edge = &graph[e];
    match (edge.srcs(), edge.dsts()) {
        ([s], [d]) if *s == leaf => Some(*d),
        ([s], [d]) if *d == leaf => Some(*s),
        _ => None,
    }
}

/// Register every leaf under `port` that has exactly one one-to-one wire to a
/// same-named leaf of another bundle.
fn collect_direct(graph: &Graph, port: PortId, pinned: &IndexSet<NodeId>, targets: &mut Targets) {
    let p = &graph[port];
    if !p.is_leaf() {
        for &child in p.children() {
            collect_direct(graph, child, pinned, targets);
        }
        return;
    }
    if p.edge_count() != 1 {
        return;
    }
    let Some(e) = p.edges().next() else {
        return;
    };
    let Some(far) = far_end(graph, e, port) else {
        return;
    };
    if graph[far].name != p.name || pinned.contains(&graph[far].node()) {
        return;
    }
    if let Some(bundle) = graph[far].parent() {
        targets.entry(bundle).or_default().push((port, e));
    }
}
