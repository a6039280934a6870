// merge_splits.rs — Interface-level split/concat merging
//
// After slice fusion, a structured interface whose every field is sliced (or
// concatenated) separately still shows one SLICE/CONCAT per field. When those
// nodes together touch every leaf of one interface port, they are merged into
// a single node carrying a copy of the interface on its main side and one
// copy per split item on the other side.
//
// Registration: a SLICE with one input wire, or a CONCAT with one output wire,
// whose far end is a single sub-port of some interface. Nodes are grouped by
// (top-level interface port, kind). A group qualifies when it has more than one
// member, the members touch distinct leaves, their count equals the
// interface's leaf count, and all split into the same number of items.
//
// Wiring of the merged node, leaf j being the j-th leaf of the interface:
//   SLICE:  main leaf j <- interface leaf j; member output t -> copy k-1-t
//   CONCAT: member input t -> copy t; main leaf j -> interface leaf j
//
// Preconditions: SLICE/CONCAT nodes are named so and have one main port.
// Postconditions: merged members are deleted; non-qualifying groups are
//                 untouched.
// Failure modes: qualifying groups with differing item counts → W0320.
// Side effects: mutates the graph.

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::arena::{EdgeId, NodeId, PortId};
use crate::diag::{codes, Diagnostic};
use crate::graph::{Graph, GraphError, PortDirection, PortSide};
use crate::origin::Origin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Slice,
    Concat,
}

impl Kind {
    fn of(graph: &Graph, node: NodeId) -> Option<Kind> {
        match graph[node].name.as_deref() {
            Some("SLICE") => Some(Kind::Slice),
            Some("CONCAT") => Some(Kind::Concat),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Slice => "SLICE",
            Kind::Concat => "CONCAT",
        }
    }
}

/// One registered node: its main wire and the interface leaf at the far end.
#[derive(Debug, Clone, Copy)]
struct Member {
    node: NodeId,
    main_port: PortId,
    edge: EdgeId,
    far: PortId,
}

/// Register `node` if it is a SLICE/CONCAT wired to one interface sub-port.
fn register(graph: &Graph, node: NodeId) -> Option<(Kind, Member)> {
    let kind = Kind::of(graph, node)?;
    let n = &graph[node];
    if !n.children().is_empty() {
        return None;
    }
    let (main_port, edge, far) = match kind {
        Kind::Slice => {
            let [port] = n.west() else { return None };
            let [e] = graph[*port].incoming() else { return None };
            let [far] = graph[*e].srcs() else { return None };
            (*port, *e, *far)
        }
        Kind::Concat => {
            let [port] = n.east() else { return None };
            let [e] = graph[*port].outgoing() else { return None };
            let [far] = graph[*e].dsts() else { return None };
            (*port, *e, *far)
        }
    };
    // only sub-ports of structured interfaces
    graph[far].parent()?;
    Some((
        kind,
        Member {
            node,
            main_port,
            edge,
            far,
        },
    ))
}

/// Split items of a member: outputs of a SLICE, inputs of a CONCAT.
fn items(graph: &Graph, kind: Kind, node: NodeId) -> Vec<PortId> {
    match kind {
        Kind::Slice => graph[node].east().to_vec(),
        Kind::Concat => graph[node].west().to_vec(),
    }
}

/// Returns the number of merged interface groups in the subtree.
pub fn merge_splits_on_interfaces(
    graph: &mut Graph,
    root: NodeId,
    diags: &mut Vec<Diagnostic>,
) -> Result<usize, GraphError> {
    let mut merged = 0;
    for child in graph[root].children().to_vec() {
        if !graph[child].children().is_empty() {
            merged += merge_splits_on_interfaces(graph, child, diags)?;
        }
    }

    let mut groups: IndexMap<(PortId, Kind), Vec<Member>> = IndexMap::new();
    for &child in graph[root].children() {
        if let Some((kind, member)) = register(graph, child) {
            let intf = graph.root_port(member.far);
            groups.entry((intf, kind)).or_default().push(member);
        }
    }

    for ((intf, kind), mut members) in groups {
        let leaves = graph.leaf_ports(intf);
        if members.len() <= 1 || members.len() != leaves.len() {
            continue;
        }
        let position = |p: PortId| leaves.iter().position(|&l| l == p);
        let Some(mut keyed) = members
            .iter()
            .map(|m| position(m.far).map(|pos| (pos, *m)))
            .collect::<Option<Vec<_>>>()
        else {
            continue;
        };
        keyed.sort_by_key(|(pos, _)| *pos);
        if keyed.windows(2).any(|w| w[0].0 == w[1].0) {
            trace!(interface = %graph.port_label(intf), "members share a leaf");
            continue;
        }
        members = keyed.into_iter().map(|(_, m)| m).collect();

        let k = items(graph, kind, members[0].node).len();
        if k == 0 || members.iter().any(|m| items(graph, kind, m.node).len() != k) {
            diags.push(
                Diagnostic::warning(format!(
                    "{} nodes on interface {} split into different item counts, not merged",
                    kind.name(),
                    graph.port_label(intf)
                ))
                .with_code(codes::W0320_INTERFACE_FIELD_MISMATCH)
                .with_subject(graph.port_label(intf)),
            );
            continue;
        }

        merge(graph, root, intf, kind, &members, k)?;
        merged += 1;
    }

    if merged > 0 {
        debug!(scope = %graph.node_label(root), merged, "merge_splits_on_interfaces");
    }
    Ok(merged)
}

/// Copy the port tree of `template` onto `node` with a fixed direction.
/// `Some("")` leaves the copied top port unnamed.
fn copy_port(
    graph: &mut Graph,
    node: NodeId,
    parent: Option<PortId>,
    template: PortId,
    name: Option<&str>,
    direction: PortDirection,
    side: PortSide,
) -> PortId {
    let (template_name, origin, children) = {
        let t = &graph[template];
        (t.name.clone(), t.origin.clone(), t.children().to_vec())
    };
    let name = match name {
        Some("") => None,
        Some(name) => Some(name.to_owned()),
        None => template_name,
    };
    let port = match parent {
        Some(parent) => graph.add_sub_port(parent, name.as_deref(), direction),
        None => graph.add_port(node, name.as_deref(), direction, side),
    };
    graph[port].origin = origin;
    for child in children {
        copy_port(graph, node, Some(port), child, None, direction, side);
    }
    port
}

fn merge(
    graph: &mut Graph,
    root: NodeId,
    intf: PortId,
    kind: Kind,
    members: &[Member],
    k: usize,
) -> Result<(), GraphError> {
    let origins: Vec<Origin> = members
        .iter()
        .filter_map(|m| graph[m.node].origin.clone())
        .collect();
    let new = graph.add_node(root, Some(kind.name()));
    graph[new].class = Some("Operator".into());
    graph[new].origin = Some(Origin::Fused(origins));

    let (main, copies) = match kind {
        Kind::Slice => {
            let main = copy_port(graph, new, None, intf, Some(""), PortDirection::Input, PortSide::West);
            let copies: Vec<PortId> = (0..k)
                .map(|i| {
                    let name = format!("[{i}]");
                    copy_port(graph, new, None, intf, Some(&name), PortDirection::Output, PortSide::East)
                })
                .collect();
            (main, copies)
        }
        Kind::Concat => {
            let copies: Vec<PortId> = (0..k)
                .map(|i| {
                    let name = format!("[{i}]");
                    copy_port(graph, new, None, intf, Some(&name), PortDirection::Input, PortSide::West)
                })
                .collect();
            let main = copy_port(graph, new, None, intf, Some(""), PortDirection::Output, PortSide::East);
            (main, copies)
        }
    };
    let main_leaves = graph.leaf_ports(main);
    let copy_leaves: Vec<Vec<PortId>> = copies.iter().map(|&c| graph.leaf_ports(c)).collect();

    for (j, m) in members.iter().enumerate() {
        let old_items = items(graph, kind, m.node);
        match kind {
            Kind::Slice => {
                graph.replace_target(m.edge, m.main_port, main_leaves[j])?;
                for (t, old) in old_items.into_iter().enumerate() {
                    let new_port = copy_leaves[k - 1 - t][j];
                    for e in graph[old].outgoing().to_vec() {
                        graph.replace_source(e, old, new_port)?;
                    }
                }
            }
            Kind::Concat => {
                graph.replace_source(m.edge, m.main_port, main_leaves[j])?;
                for (t, old) in old_items.into_iter().enumerate() {
                    let new_port = copy_leaves[t][j];
                    for e in graph[old].incoming().to_vec() {
                        graph.replace_target(e, old, new_port)?;
                    }
                }
            }
        }
        trace!(member = %graph.node_label(m.node), leaf = j, "reconnected");
        graph.remove_node(m.node);
    }
    Ok(())
}
