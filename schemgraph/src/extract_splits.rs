// extract_splits.rs — Slice fusion
//
// Sibling nodes that each statically index one sub-range of the same source
// signal are fused into a single SLICE node with one input and one output per
// sub-range, so a bus split into fields is drawn as one fan-out block.
//
//   a = sig[7:4]        SLICE(sig) -> [7:4], [3:0]
//   b = sig[3:0]   =>
//
// Grouping is by source signal within one container. Members are fused when
// they use equal-width, aligned, distinct sub-ranges that exactly cover the
// signal and are all fed by the same single-driver edge. Members of another
// width are left as ordinary index nodes on the same feed. Outputs are
// ordered most-significant sub-range first.
//
// Preconditions: index nodes carry an `Origin::Index` and have the data input
//                as their first west port, any index-value inputs after it.
// Postconditions: no fusible group remains; constant helper nodes that fed
//                 only fused members are deleted.
// Failure modes: out-of-range or mismatched members are excluded (W0301);
//                groups with no exact cover are skipped (W0302).
// Side effects: mutates the graph.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::arena::{EdgeId, NodeId, PortId};
use crate::diag::{codes, Diagnostic};
use crate::graph::{Graph, GraphError, PortDirection, PortSide};
use crate::origin::{BitRange, IndexValue, Origin, Signal};

/// One fusible member: the index node and its static sub-range.
#[derive(Debug, Clone, Copy)]
struct SlicePart {
    node: NodeId,
    range: BitRange,
}

/// Static index of `node` on its source signal, if it is an index node with
/// the expected port shape.
fn index_of(graph: &Graph, node: NodeId) -> Option<(&Signal, &IndexValue)> {
    let n = &graph[node];
    let Some(Origin::Index(op)) = &n.origin else {
        return None;
    };
    if n.west().is_empty() || n.east().len() != 1 || !n.children().is_empty() {
        return None;
    }
    Some((&op.src, &op.index))
}

/// Returns the number of SLICE nodes created in the subtree.
pub fn extract_splits(
    graph: &mut Graph,
    root: NodeId,
    diags: &mut Vec<Diagnostic>,
) -> Result<usize, GraphError> {
    let mut fused = 0;
    for child in graph[root].children().to_vec() {
        if !graph[child].children().is_empty() {
            fused += extract_splits(graph, child, diags)?;
        }
    }

    let mut groups: IndexMap<Signal, Vec<NodeId>> = IndexMap::new();
    for &child in graph[root].children() {
        if let Some((src, IndexValue::Static(_))) = index_of(graph, child) {
            groups.entry(src.clone()).or_default().push(child);
        }
    }

    for (signal, members) in groups {
        if members.len() < 2 {
            continue;
        }
        let Some(parts) = check_group(graph, &signal, &members, diags) else {
            continue;
        };
        let Some(feed) = common_feed(graph, &parts) else {
            trace!(signal = %signal.name, "slice members not fed by one driver");
            continue;
        };
        fuse(graph, root, &signal, parts, feed)?;
        fused += 1;
    }

    if fused > 0 {
        debug!(scope = %graph.node_label(root), fused, "extract_splits");
    }
    Ok(fused)
}

/// Validate sub-ranges; returns the fusible parts sorted most-significant first.
fn check_group(
    graph: &Graph,
    signal: &Signal,
    members: &[NodeId],
    diags: &mut Vec<Diagnostic>,
) -> Option<Vec<SlicePart>> {
    let Some(width) = signal.width else {
        diags.push(
            Diagnostic::warning(format!(
                "slices of '{}' not fused: signal width unknown",
                signal.name
            ))
            .with_code(codes::W0300_SLICE_UNRESOLVED_INDEX)
            .with_subject(signal.name.clone()),
        );
        return None;
    };

    // members bucketed by the number of items their width splits the signal into
    let mut by_items: IndexMap<u64, Vec<SlicePart>> = IndexMap::new();
    for &node in members {
        let Some((_, IndexValue::Static(range))) = index_of(graph, node) else {
            continue;
        };
        let range = *range;
        let slice_w = range.width();
        let tiles = range.hi < width && slice_w > 0 && u64::from(width) % slice_w == 0;
        if !tiles || u64::from(range.lo) % slice_w != 0 {
            diags.push(
                Diagnostic::warning(format!(
                    "slice {} of '{}' does not tile a {}-bit signal",
                    range.label(),
                    signal.name,
                    width
                ))
                .with_code(codes::W0301_SLICE_ITEM_MISMATCH)
                .with_subject(graph.node_label(node)),
            );
            continue;
        }
        by_items
            .entry(u64::from(width) / slice_w)
            .or_default()
            .push(SlicePart { node, range });
    }
    for parts in by_items.values_mut() {
        parts.sort_by(|a, b| b.range.cmp(&a.range));
    }

    // the first exact cover is fused; members of other widths stay as they are
    let chosen = by_items
        .iter()
        .position(|(&items, parts)| covers(items, parts))
        .or_else(|| {
            let largest = by_items.values().map(Vec::len).max()?;
            by_items.values().position(|parts| parts.len() == largest)
        })?;
    let (items, parts) = by_items.shift_remove_index(chosen)?;
    for stray in by_items.values().flatten() {
        diags.push(
            Diagnostic::warning(format!(
                "slice {} of '{}' splits into {} items, group uses {}",
                stray.range.label(),
                signal.name,
                u64::from(width) / stray.range.width(),
                items
            ))
            .with_code(codes::W0301_SLICE_ITEM_MISMATCH)
            .with_subject(graph.node_label(stray.node)),
        );
    }

    if !covers(items, &parts) {
        if parts.len() >= 2 {
            diags.push(
                Diagnostic::warning(format!(
                    "slices of '{}' cover {} of {} items, not fused",
                    signal.name,
                    parts.len(),
                    items
                ))
                .with_code(codes::W0302_SLICE_INCOMPLETE)
                .with_subject(signal.name.clone())
                .with_hint("every sub-range must be indexed exactly once"),
            );
        }
        return None;
    }
    Some(parts)
}

/// Sorted, pairwise distinct parts numbering exactly `items`.
fn covers(items: u64, parts: &[SlicePart]) -> bool {
    parts.len() as u64 == items && parts.windows(2).all(|w| w[0].range != w[1].range)
}

/// The edge feeding every member's data input, with its single source.
fn common_feed(graph: &Graph, parts: &[SlicePart]) -> Option<(EdgeId, PortId)> {
    let mut feed = None;
    for part in parts {
        let data = graph[part.node].west()[0];
        let incoming = graph[data].incoming();
        if incoming.len() != 1 {
            return None;
        }
        let e = incoming[0];
        match feed {
            None => feed = Some(e),
            Some(f) if f != e => return None,
            Some(_) => {}
        }
    }
    let e = feed?;
    match graph[e].srcs() {
        [src] => Some((e, *src)),
        _ => None,
    }
}

fn fuse(
    graph: &mut Graph,
    root: NodeId,
    signal: &Signal,
    parts: Vec<SlicePart>,
    (feed, src): (EdgeId, PortId),
) -> Result<(), GraphError> {
    let first = parts[0].node;
    let class = graph[first].class.clone();
    let origins: Vec<Origin> = parts
        .iter()
        .filter_map(|p| graph[p.node].origin.clone())
        .collect();

    let slice = graph.add_node(root, Some("SLICE"));
    graph[slice].class = class;
    graph[slice].origin = Some(Origin::Fused(origins));
    let input = graph.add_port(slice, None, PortDirection::Input, PortSide::West);
    graph[input].origin = graph[src].origin.clone();

    // attach before detaching members so the feed never runs empty
    graph.add_target(feed, input)?;

    for part in &parts {
        let old_in = graph[part.node].west()[0];
        let old_out = graph[part.node].east()[0];
        let out = graph.add_port(
            slice,
            Some(part.range.label().as_str()),
            PortDirection::Output,
            PortSide::East,
        );
        graph[out].origin = graph[old_out].origin.clone();

        graph.detach_target(feed, old_in)?;
        for e in graph[old_out].outgoing().to_vec() {
            graph.replace_source(e, old_out, out)?;
        }

        let helpers = detach_index_inputs(graph, part.node)?;
        graph.remove_node(part.node);
        for helper in helpers {
            remove_if_unreferenced(graph, root, helper);
        }
    }

    trace!(signal = %signal.name, outputs = parts.len(), "slice fused");
    Ok(())
}

/// Disconnect index-value inputs; returns the nodes that drove them.
fn detach_index_inputs(graph: &mut Graph, node: NodeId) -> Result<Vec<NodeId>, GraphError> {
    let mut helpers = Vec::new();
    for port in graph[node].west()[1..].to_vec() {
        for e in graph[port].incoming().to_vec() {
            for &s in graph[e].srcs() {
                helpers.push(graph[s].node());
            }
            graph.detach_target(e, port)?;
        }
    }
    Ok(helpers)
}

/// Delete a constant helper node once none of its outputs is read.
fn remove_if_unreferenced(graph: &mut Graph, root: NodeId, helper: NodeId) {
    let Some(n) = graph.node(helper) else {
        return;
    };
    if n.parent() != Some(root) || !matches!(n.origin, Some(Origin::Const(_))) {
        return;
    }
    let used = graph
        .iter_ports(helper)
        .any(|p| !graph[p].outgoing().is_empty());
    if !used {
        graph.remove_node(helper);
    }
}
