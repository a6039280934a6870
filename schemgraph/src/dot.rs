// dot.rs — Graphviz DOT output for layout graphs
//
// Transforms a layout subtree into DOT for debugging canonicalization
// results. Nodes with children become clusters whose own ports are drawn as
// small plaintext nodes; leaf nodes are boxes with edges attached directly.
// Hyperedges with several sources or targets fan through a junction point.
// A node borrowing another node's body is drawn dashed, with a dashed link to
// the lender.
//
// Preconditions: `root` is a live node of `graph`.
// Postconditions: returns a DOT string; identifiers depend only on traversal
//                 order, so identical graphs give identical text.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::fmt::Write;

use indexmap::IndexMap;

use crate::arena::{NodeId, PortId};
use crate::graph::{Graph, NodeKind};
use crate::origin::Origin;

/// Emit the subtree under `root` as a Graphviz DOT string.
pub fn emit_dot(graph: &Graph, root: NodeId) -> String {
    let numbering: IndexMap<NodeId, usize> = graph
        .descendants(root)
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, i))
        .collect();
    let ctx = DotCtx { graph, numbering };

    let mut buf = String::new();
    writeln!(buf, "digraph {} {{", sanitize(graph[root].name_or_unnamed())).unwrap();
    writeln!(buf, "    rankdir=LR;").unwrap();
    writeln!(buf, "    compound=true;").unwrap();
    writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];").unwrap();
    writeln!(buf, "    edge [fontname=\"Helvetica\", fontsize=9];").unwrap();
    ctx.write_node(&mut buf, root, "    ");
    writeln!(buf, "}}").unwrap();
    buf
}

struct DotCtx<'g> {
    graph: &'g Graph,
    /// Pre-order position of each node; the basis of DOT identifiers.
    numbering: IndexMap<NodeId, usize>,
}

impl DotCtx<'_> {
    fn node_id(&self, node: NodeId) -> String {
        format!("n{}", self.numbering.get(&node).copied().unwrap_or(usize::MAX))
    }

    fn is_cluster(&self, node: NodeId) -> bool {
        !self.graph[node].children().is_empty() || self.graph[node].parent().is_none()
    }

    /// DOT endpoint of a port: a port node inside a cluster, or the owning
    /// leaf node itself.
    fn endpoint(&self, port: PortId) -> String {
        let owner = self.graph[port].node();
        if self.is_cluster(owner) {
            let pos = self
                .graph
                .flat_ports(owner)
                .iter()
                .position(|&p| p == port)
                .unwrap_or(0);
            format!("{}_p{}", self.node_id(owner), pos)
        } else {
            self.node_id(owner)
        }
    }

    fn port_name(&self, port: PortId) -> String {
        let label = self.graph.port_label(port);
        match label.split_once('.') {
            Some((_, rest)) => rest.to_owned(),
            None => label,
        }
    }

    fn write_node(&self, buf: &mut String, node: NodeId, indent: &str) {
        let g = self.graph;
        let n = &g[node];
        let id = self.node_id(node);

        if !self.is_cluster(node) {
            writeln!(buf, "{indent}{id} [{}];", self.node_attrs(node)).unwrap();
            return;
        }

        writeln!(buf, "{indent}subgraph cluster_{id} {{").unwrap();
        let inner = format!("{indent}    ");
        writeln!(buf, "{inner}label=\"{}\";", escape(&self.node_title(node))).unwrap();
        writeln!(buf, "{inner}style=rounded;").unwrap();
        writeln!(buf, "{inner}color=gray50;").unwrap();

        for (pos, p) in g.flat_ports(node).into_iter().enumerate() {
            writeln!(
                buf,
                "{inner}{id}_p{pos} [shape=plaintext, fontsize=8, label=\"{}\"];",
                escape(&self.port_name(p))
            )
            .unwrap();
        }
        for &child in n.children() {
            self.write_node(buf, child, &inner);
        }
        for &child in n.children() {
            if let Some(link) = self.body_link(child) {
                writeln!(buf, "{inner}{link}").unwrap();
            }
        }

        if !n.edges().is_empty() {
            writeln!(buf).unwrap();
        }
        for (k, &e) in n.edges().iter().enumerate() {
            let edge = &g[e];
            let label = edge
                .name
                .as_deref()
                .map(|name| format!("label=\"{}\"", escape(name)));
            if let ([src], [dst]) = (edge.srcs(), edge.dsts()) {
                let (src, dst) = (self.endpoint(*src), self.endpoint(*dst));
                match &label {
                    Some(label) => writeln!(buf, "{inner}{src} -> {dst} [{label}];").unwrap(),
                    None => writeln!(buf, "{inner}{src} -> {dst};").unwrap(),
                }
                continue;
            }
            let junction = format!("{id}_e{k}");
            match &label {
                Some(label) => writeln!(buf, "{inner}{junction} [shape=point, {label}];").unwrap(),
                None => writeln!(buf, "{inner}{junction} [shape=point];").unwrap(),
            }
            for &src in edge.srcs() {
                writeln!(buf, "{inner}{} -> {junction} [arrowhead=none];", self.endpoint(src)).unwrap();
            }
            for &dst in edge.dsts() {
                writeln!(buf, "{inner}{junction} -> {};", self.endpoint(dst)).unwrap();
            }
        }
        writeln!(buf, "{indent}}}").unwrap();
    }

    /// Dashed link from a node borrowing a body to the node lending it.
    fn body_link(&self, node: NodeId) -> Option<String> {
        let body = self.graph[node].shares_body_with()?;
        let (from, lender) = (self.node_id(node), self.node_id(body));
        let style = "style=dashed, color=gray50, arrowhead=empty, label=\"body\"";
        if !self.is_cluster(body) {
            return Some(format!("{from} -> {lender} [{style}];"));
        }
        // clusters are reached through one of their port nodes
        if self.graph.flat_ports(body).is_empty() {
            return None;
        }
        Some(format!("{from} -> {lender}_p0 [{style}, lhead=cluster_{lender}];"))
    }

    fn node_title(&self, node: NodeId) -> String {
        let n = &self.graph[node];
        let mut title = n.name_or_unnamed().to_owned();
        if let Some(body) = n.shares_body_with() {
            write!(title, " (shares {})", self.graph.node_label(body)).unwrap();
        }
        title
    }

    /// Return DOT attributes for a leaf node.
    fn node_attrs(&self, node: NodeId) -> String {
        let n = &self.graph[node];
        let (shape, color) = match (&n.kind, &n.origin) {
            (NodeKind::ExternalPort(_), _) => ("cds", "lightsalmon"),
            (_, Some(Origin::Const(_))) => ("plaintext", "white"),
            (_, Some(Origin::Statement(_) | Origin::Assignment(_))) => ("box", "lightgreen"),
            (_, Some(Origin::Fused(_))) => ("trapezium", "lightyellow"),
            (_, Some(Origin::Operator(_) | Origin::Index(_))) => ("ellipse", "lightblue"),
            _ => ("box", "lightblue"),
        };
        let mut label = self.node_title(node);
        if let Some(text) = &n.body_text {
            write!(label, "\\n{}", text).unwrap();
        }
        let style = if n.shares_body_with().is_some() {
            "filled,dashed"
        } else {
            "filled"
        };
        format!("shape={shape}, style=\"{style}\", fillcolor={color}, label=\"{}\"", escape(&label))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Sanitize a name to valid DOT identifier characters.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn escape(text: &str) -> String {
    text.replace('"', "\\\"")
}
