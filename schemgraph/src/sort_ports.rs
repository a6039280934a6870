// sort_ports.rs — Statement port sorting
//
// Ports of statement nodes (assignments, if/switch blocks) are created in
// whatever order the statement mentions its signals. Sorting them by signal
// name gives identical drawings for equivalent statements.

use tracing::debug;

use crate::arena::{NodeId, PortId};
use crate::graph::{Graph, GraphError, PortSide};

/// Returns the number of nodes whose port order changed.
pub fn sort_statement_ports(graph: &mut Graph, root: NodeId) -> Result<usize, GraphError> {
    let mut changed = 0;
    for node in graph.descendants(root) {
        if !graph[node].origin.as_ref().is_some_and(|o| o.is_statement()) {
            continue;
        }
        let mut touched = false;
        for side in [PortSide::North, PortSide::East, PortSide::South, PortSide::West] {
            let current = graph[node].ports(side).to_vec();
            let sorted = sorted_by_signal(graph, &current);
            if sorted != current {
                graph.reorder_side(node, side, sorted)?;
                touched = true;
            }
        }
        if touched {
            changed += 1;
        }
    }
    if changed > 0 {
        debug!(scope = %graph.node_label(root), changed, "sort_statement_ports");
    }
    Ok(changed)
}

/// Signal ports by (name, id); ports without a signal origin follow in their
/// original order.
fn sorted_by_signal(graph: &Graph, ports: &[PortId]) -> Vec<PortId> {
    let mut sorted = ports.to_vec();
    sorted.sort_by(|&a, &b| {
        let ka = graph[a].origin.as_ref().and_then(|o| o.signal()).map(|s| s.sort_key());
        let kb = graph[b].origin.as_ref().and_then(|o| o.signal()).map(|s| s.sort_key());
        match (ka, kb) {
            (Some(ka), Some(kb)) => ka.cmp(&kb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PortDirection;
    use crate::origin::{Origin, Signal};

    #[test]
    fn statement_ports_sorted_by_signal_name() {
        let mut g = Graph::new();
        let top = g.add_root(Some("top"));
        let stm = g.add_node(top, Some("IF"));
        g[stm].origin = Some(Origin::Statement("if".into()));
        let mut add = |name: Option<&str>, id: u32| {
            let p = g.add_port(stm, name, PortDirection::Input, PortSide::West);
            if let Some(name) = name {
                g[p].origin = Some(Origin::Signal(Signal::new(id, name)));
            }
            p
        };
        let c = add(Some("c"), 0);
        let anon = add(None, 9);
        let a = add(Some("a"), 1);
        let b = add(Some("b"), 2);
        assert_eq!(sort_statement_ports(&mut g, top).unwrap(), 1);
        assert_eq!(g[stm].west(), &[a, b, c, anon]);
        assert_eq!(sort_statement_ports(&mut g, top).unwrap(), 0);
    }

    #[test]
    fn operator_ports_keep_their_order() {
        let mut g = Graph::new();
        let top = g.add_root(Some("top"));
        let op = g.add_node(top, Some("ADD"));
        g[op].origin = Some(Origin::Operator("ADD".into()));
        let b = g.add_port(op, Some("b"), PortDirection::Input, PortSide::West);
        g[b].origin = Some(Origin::Signal(Signal::new(1, "b")));
        let a = g.add_port(op, Some("a"), PortDirection::Input, PortSide::West);
        g[a].origin = Some(Origin::Signal(Signal::new(0, "a")));
        assert_eq!(sort_statement_ports(&mut g, top).unwrap(), 0);
        assert_eq!(g[op].west(), &[b, a]);
    }
}
