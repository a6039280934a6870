// graph.rs — Hierarchical layout graph: nodes, ports and hyperedges
//
// Nodes own four side-ordered port lists and a list of child nodes. Ports may
// carry sub-ports (bundles mirroring hierarchical interfaces). Edges are
// hyperedges owned by the node whose interior they run through; every
// endpoint is checked against the hierarchy-crossing direction rule on attach.
//
// Preconditions: none.
// Postconditions: every live edge has non-empty `srcs` and `dsts`, each
//                 endpoint satisfies the direction rule for the edge's scope,
//                 and every port lists exactly the edges that reference it.
// Failure modes: direction/scope violations → `GraphError` (invariant
//                violation, never recoverable); stale handles through `Index`
//                → panic.
// Side effects: none.

use std::fmt;
use std::fmt::Write as _;
use std::ops::{Index, IndexMut};

use indexmap::IndexSet;

use crate::arena::{Arena, EdgeId, NodeId, PortId};
use crate::origin::Origin;

// ── Enumerations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    pub fn opposite(self) -> Self {
        match self {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortDirection::Input => "INPUT",
            PortDirection::Output => "OUTPUT",
        }
    }

    /// Conventional side: inputs on the west, outputs on the east.
    pub fn default_side(self) -> PortSide {
        match self {
            PortDirection::Input => PortSide::West,
            PortDirection::Output => PortSide::East,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortSide {
    North,
    East,
    South,
    West,
}

impl PortSide {
    pub fn opposite(self) -> Self {
        match self {
            PortSide::North => PortSide::South,
            PortSide::East => PortSide::West,
            PortSide::South => PortSide::North,
            PortSide::West => PortSide::East,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortSide::North => "NORTH",
            PortSide::East => "EAST",
            PortSide::South => "SOUTH",
            PortSide::West => "WEST",
        }
    }
}

/// Port placement policy handed to the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortConstraints {
    Undefined,
    Free,
    FixedSide,
    #[default]
    FixedOrder,
    FixedRatio,
    FixedPos,
}

impl PortConstraints {
    /// Order-fixed nodes need an `index` on every port.
    pub fn is_order_fixed(self) -> bool {
        matches!(
            self,
            PortConstraints::FixedOrder | PortConstraints::FixedRatio | PortConstraints::FixedPos
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PortConstraints::Undefined => "UNDEFINED",
            PortConstraints::Free => "FREE",
            PortConstraints::FixedSide => "FIXED_SIDE",
            PortConstraints::FixedOrder => "FIXED_ORDER",
            PortConstraints::FixedRatio => "FIXED_RATIO",
            PortConstraints::FixedPos => "FIXED_POS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Normal,
    /// An interface port of the parent drawn as a standalone node.
    ExternalPort(PortDirection),
}

/// Which end of an edge a port is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndRole {
    Source,
    Destination,
}

impl fmt::Display for EndRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndRole::Source => write!(f, "source"),
            EndRole::Destination => write!(f, "destination"),
        }
    }
}

// ── Elements ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Node {
    pub name: Option<String>,
    /// Opaque class tag (e.g. `Operator`, `Module`).
    pub class: Option<String>,
    pub origin: Option<Origin>,
    pub body_text: Option<String>,
    pub kind: NodeKind,
    pub port_constraints: PortConstraints,
    parent: Option<NodeId>,
    north: Vec<PortId>,
    east: Vec<PortId>,
    south: Vec<PortId>,
    west: Vec<PortId>,
    children: Vec<NodeId>,
    edges: IndexSet<EdgeId>,
    shares_body_with: Option<NodeId>,
}

impl Node {
    fn new(parent: Option<NodeId>, name: Option<&str>, constraints: PortConstraints) -> Self {
        Self {
            name: name.map(str::to_owned),
            class: None,
            origin: None,
            body_text: None,
            kind: NodeKind::Normal,
            port_constraints: constraints,
            parent,
            north: Vec::new(),
            east: Vec::new(),
            south: Vec::new(),
            west: Vec::new(),
            children: Vec::new(),
            edges: IndexSet::new(),
            shares_body_with: None,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Edges running through the interior of this node, in creation order.
    pub fn edges(&self) -> &IndexSet<EdgeId> {
        &self.edges
    }

    pub fn ports(&self, side: PortSide) -> &[PortId] {
        match side {
            PortSide::North => &self.north,
            PortSide::East => &self.east,
            PortSide::South => &self.south,
            PortSide::West => &self.west,
        }
    }

    fn ports_mut(&mut self, side: PortSide) -> &mut Vec<PortId> {
        match side {
            PortSide::North => &mut self.north,
            PortSide::East => &mut self.east,
            PortSide::South => &mut self.south,
            PortSide::West => &mut self.west,
        }
    }

    pub fn west(&self) -> &[PortId] {
        &self.west
    }

    pub fn east(&self) -> &[PortId] {
        &self.east
    }

    pub fn shares_body_with(&self) -> Option<NodeId> {
        self.shares_body_with
    }

    pub fn name_or_unnamed(&self) -> &str {
        self.name.as_deref().unwrap_or("<Unnamed>")
    }
}

#[derive(Debug, Clone)]
pub struct Port {
    pub name: Option<String>,
    pub origin: Option<Origin>,
    pub direction: PortDirection,
    pub side: PortSide,
    /// Position in the clockwise order, set by `assign_port_indices`.
    pub index: Option<u32>,
    node: NodeId,
    parent: Option<PortId>,
    children: Vec<PortId>,
    incoming: Vec<EdgeId>,
    outgoing: Vec<EdgeId>,
    reduced: bool,
}

impl Port {
    /// The node this port belongs to (also for sub-ports).
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Parent port of a sub-port; `None` for ports placed directly on a node.
    pub fn parent(&self) -> Option<PortId> {
        self.parent
    }

    pub fn children(&self) -> &[PortId] {
        &self.children
    }

    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    /// Incoming edges followed by outgoing edges.
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.incoming.iter().chain(self.outgoing.iter()).copied()
    }

    pub fn edge_count(&self) -> usize {
        self.incoming.len() + self.outgoing.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Set once a bundle-level wire replaced this port's per-field wires.
    pub fn is_reduced(&self) -> bool {
        self.reduced
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub name: Option<String>,
    pub origin: Option<Origin>,
    scope: NodeId,
    srcs: Vec<PortId>,
    dsts: Vec<PortId>,
}

impl Edge {
    /// Lowest common container of the edge's endpoints.
    pub fn scope(&self) -> NodeId {
        self.scope
    }

    pub fn srcs(&self) -> &[PortId] {
        &self.srcs
    }

    pub fn dsts(&self) -> &[PortId] {
        &self.dsts
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Structural invariant violations. Always a builder or pass bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    DirectionMismatch {
        port: String,
        role: EndRole,
        expected: PortDirection,
        found: PortDirection,
    },
    OutOfScope {
        port: String,
        scope: String,
    },
    EmptyEdge {
        scope: String,
    },
    NotAttached {
        port: String,
        role: EndRole,
    },
    SharedBodyHasChildren {
        node: String,
    },
    StaleHandle {
        what: String,
    },
    Structure {
        message: String,
    },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphError::DirectionMismatch {
                port,
                role,
                expected,
                found,
            } => write!(
                f,
                "port {} used as edge {} must be {}, found {}",
                port,
                role,
                expected.as_str(),
                found.as_str()
            ),
            GraphError::OutOfScope { port, scope } => {
                write!(f, "port {} is not on {} or one of its children", port, scope)
            }
            GraphError::EmptyEdge { scope } => {
                write!(f, "edge in {} needs at least one source and one destination", scope)
            }
            GraphError::NotAttached { port, role } => {
                write!(f, "port {} is not a {} of the edge", port, role)
            }
            GraphError::SharedBodyHasChildren { node } => {
                write!(f, "node {} shares a body but has children of its own", node)
            }
            GraphError::StaleHandle { what } => write!(f, "stale handle: {}", what),
            GraphError::Structure { message } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for GraphError {}

// ── Graph ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Arena<NodeId, Node>,
    ports: Arena<PortId, Port>,
    edges: Arena<EdgeId, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(id)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ── Construction ──

    /// Create a top-level node.
    pub fn add_root(&mut self, name: Option<&str>) -> NodeId {
        self.nodes
            .insert(Node::new(None, name, PortConstraints::default()))
    }

    pub fn add_node(&mut self, parent: NodeId, name: Option<&str>) -> NodeId {
        self.add_node_with(parent, name, PortConstraints::default())
    }

    pub fn add_node_with(
        &mut self,
        parent: NodeId,
        name: Option<&str>,
        constraints: PortConstraints,
    ) -> NodeId {
        let id = self.nodes.insert(Node::new(Some(parent), name, constraints));
        self[parent].children.push(id);
        id
    }

    pub fn add_port(
        &mut self,
        node: NodeId,
        name: Option<&str>,
        direction: PortDirection,
        side: PortSide,
    ) -> PortId {
        let id = self.ports.insert(Port {
            name: name.map(str::to_owned),
            origin: None,
            direction,
            side,
            index: None,
            node,
            parent: None,
            children: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            reduced: false,
        });
        self[node].ports_mut(side).push(id);
        id
    }

    /// Add a sub-port to a bundle; the side is inherited from the parent.
    pub fn add_sub_port(
        &mut self,
        parent: PortId,
        name: Option<&str>,
        direction: PortDirection,
    ) -> PortId {
        let (node, side) = {
            let p = &self[parent];
            (p.node, p.side)
        };
        let id = self.ports.insert(Port {
            name: name.map(str::to_owned),
            origin: None,
            direction,
            side,
            index: None,
            node,
            parent: Some(parent),
            children: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            reduced: false,
        });
        self[parent].children.push(id);
        id
    }

    pub fn add_edge(
        &mut self,
        scope: NodeId,
        src: PortId,
        dst: PortId,
        name: Option<String>,
        origin: Option<Origin>,
    ) -> Result<EdgeId, GraphError> {
        self.add_hyper_edge(scope, vec![src], vec![dst], name, origin)
    }

    pub fn add_hyper_edge(
        &mut self,
        scope: NodeId,
        srcs: Vec<PortId>,
        dsts: Vec<PortId>,
        name: Option<String>,
        origin: Option<Origin>,
    ) -> Result<EdgeId, GraphError> {
        if self.node(scope).is_none() {
            return Err(GraphError::StaleHandle {
                what: format!("{scope:?}"),
            });
        }
        if srcs.is_empty() || dsts.is_empty() {
            return Err(GraphError::EmptyEdge {
                scope: self.node_label(scope),
            });
        }
        for &src in &srcs {
            self.check_end(scope, src, EndRole::Source)?;
        }
        for &dst in &dsts {
            self.check_end(scope, dst, EndRole::Destination)?;
        }
        let id = self.edges.insert(Edge {
            name,
            origin,
            scope,
            srcs: srcs.clone(),
            dsts: dsts.clone(),
        });
        for src in srcs {
            self[src].outgoing.push(id);
        }
        for dst in dsts {
            self[dst].incoming.push(id);
        }
        self[scope].edges.insert(id);
        Ok(id)
    }

    /// Hierarchy-crossing direction rule.
    ///
    /// A port of the scope itself is seen from the inside, so its direction
    /// flips: an INPUT drives into the scope, an OUTPUT is driven from it.
    /// A port of a direct child is seen from the outside.
    pub fn check_end(&self, scope: NodeId, port: PortId, role: EndRole) -> Result<(), GraphError> {
        let p = self.port(port).ok_or_else(|| GraphError::StaleHandle {
            what: format!("{port:?}"),
        })?;
        let expected = if p.node == scope {
            match role {
                EndRole::Source => PortDirection::Input,
                EndRole::Destination => PortDirection::Output,
            }
        } else if self.node(p.node).and_then(|n| n.parent) == Some(scope) {
            match role {
                EndRole::Source => PortDirection::Output,
                EndRole::Destination => PortDirection::Input,
            }
        } else {
            return Err(GraphError::OutOfScope {
                port: self.port_label(port),
                scope: self.node_label(scope),
            });
        };
        if p.direction != expected {
            return Err(GraphError::DirectionMismatch {
                port: self.port_label(port),
                role,
                expected,
                found: p.direction,
            });
        }
        Ok(())
    }

    /// Borrow the body of `body` for `node` instead of duplicating children.
    pub fn set_shared_body(&mut self, node: NodeId, body: NodeId) -> Result<(), GraphError> {
        if !self[node].children.is_empty() {
            return Err(GraphError::SharedBodyHasChildren {
                node: self.node_label(node),
            });
        }
        if self[body].shares_body_with.is_some() {
            return Err(GraphError::Structure {
                message: format!(
                    "{} borrows its body, it cannot lend one to {}",
                    self.node_label(body),
                    self.node_label(node)
                ),
            });
        }
        self[node].shares_body_with = Some(body);
        Ok(())
    }

    // ── Edge mutation ──

    /// Detach an edge from every port and its scope. Removing an edge that is
    /// already gone is a no-op; returns whether anything was removed.
    pub fn remove_edge(&mut self, edge: EdgeId) -> bool {
        let Some(e) = self.edges.remove(edge) else {
            return false;
        };
        for src in e.srcs {
            if let Some(p) = self.ports.get_mut(src) {
                remove_first(&mut p.outgoing, edge);
            }
        }
        for dst in e.dsts {
            if let Some(p) = self.ports.get_mut(dst) {
                remove_first(&mut p.incoming, edge);
            }
        }
        if let Some(n) = self.nodes.get_mut(e.scope) {
            n.edges.shift_remove(&edge);
        }
        true
    }

    /// Remove one destination; an edge left without destinations is removed.
    /// Returns whether the edge is still alive.
    pub fn detach_target(&mut self, edge: EdgeId, port: PortId) -> Result<bool, GraphError> {
        let e = self.edge_mut_checked(edge)?;
        if !remove_first(&mut e.dsts, port) {
            return Err(GraphError::NotAttached {
                port: self.port_label(port),
                role: EndRole::Destination,
            });
        }
        let empty = e.dsts.is_empty();
        if let Some(p) = self.ports.get_mut(port) {
            remove_first(&mut p.incoming, edge);
        }
        if empty {
            self.remove_edge(edge);
        }
        Ok(!empty)
    }

    /// Remove one source; an edge left without sources is removed.
    /// Returns whether the edge is still alive.
    pub fn detach_source(&mut self, edge: EdgeId, port: PortId) -> Result<bool, GraphError> {
        let e = self.edge_mut_checked(edge)?;
        if !remove_first(&mut e.srcs, port) {
            return Err(GraphError::NotAttached {
                port: self.port_label(port),
                role: EndRole::Source,
            });
        }
        let empty = e.srcs.is_empty();
        if let Some(p) = self.ports.get_mut(port) {
            remove_first(&mut p.outgoing, edge);
        }
        if empty {
            self.remove_edge(edge);
        }
        Ok(!empty)
    }

    pub fn add_target(&mut self, edge: EdgeId, port: PortId) -> Result<(), GraphError> {
        let scope = self.edge_checked(edge)?.scope;
        self.check_end(scope, port, EndRole::Destination)?;
        self[edge].dsts.push(port);
        self[port].incoming.push(edge);
        Ok(())
    }

    pub fn add_source(&mut self, edge: EdgeId, port: PortId) -> Result<(), GraphError> {
        let scope = self.edge_checked(edge)?.scope;
        self.check_end(scope, port, EndRole::Source)?;
        self[edge].srcs.push(port);
        self[port].outgoing.push(edge);
        Ok(())
    }

    /// Swap destination `old` for `new` in place, keeping list order.
    pub fn replace_target(&mut self, edge: EdgeId, old: PortId, new: PortId) -> Result<(), GraphError> {
        let scope = self.edge_checked(edge)?.scope;
        self.check_end(scope, new, EndRole::Destination)?;
        let Some(pos) = self[edge].dsts.iter().position(|&p| p == old) else {
            return Err(GraphError::NotAttached {
                port: self.port_label(old),
                role: EndRole::Destination,
            });
        };
        self[edge].dsts[pos] = new;
        if let Some(p) = self.ports.get_mut(old) {
            remove_first(&mut p.incoming, edge);
        }
        self[new].incoming.push(edge);
        Ok(())
    }

    /// Swap source `old` for `new` in place, keeping list order.
    pub fn replace_source(&mut self, edge: EdgeId, old: PortId, new: PortId) -> Result<(), GraphError> {
        let scope = self.edge_checked(edge)?.scope;
        self.check_end(scope, new, EndRole::Source)?;
        let Some(pos) = self[edge].srcs.iter().position(|&p| p == old) else {
            return Err(GraphError::NotAttached {
                port: self.port_label(old),
                role: EndRole::Source,
            });
        };
        self[edge].srcs[pos] = new;
        if let Some(p) = self.ports.get_mut(old) {
            remove_first(&mut p.outgoing, edge);
        }
        self[new].outgoing.push(edge);
        Ok(())
    }

    // ── Removal ──

    /// Delete a port, its sub-ports and its attachment to every edge.
    pub fn remove_port(&mut self, port: PortId) {
        let Some(p) = self.ports.get(port) else {
            return;
        };
        let children = p.children.clone();
        let incoming = p.incoming.clone();
        let outgoing = p.outgoing.clone();
        for child in children {
            self.remove_port(child);
        }
        for e in incoming {
            // the edge may already be gone when this port appeared twice
            let _ = self.detach_target(e, port);
        }
        for e in outgoing {
            let _ = self.detach_source(e, port);
        }
        let Some(p) = self.ports.remove(port) else {
            return;
        };
        match p.parent {
            Some(parent) => {
                if let Some(pp) = self.ports.get_mut(parent) {
                    pp.children.retain(|&c| c != port);
                }
            }
            None => {
                if let Some(n) = self.nodes.get_mut(p.node) {
                    n.ports_mut(p.side).retain(|&c| c != port);
                }
            }
        }
    }

    /// Delete a node with its subtree, its ports and every edge that loses
    /// all of its sources or destinations as a result.
    pub fn remove_node(&mut self, node: NodeId) {
        let Some(n) = self.nodes.get(node) else {
            return;
        };
        let children = n.children.clone();
        let ports: Vec<PortId> = [PortSide::North, PortSide::East, PortSide::South, PortSide::West]
            .into_iter()
            .flat_map(|side| n.ports(side).to_vec())
            .collect();
        for child in children {
            self.remove_node(child);
        }
        for port in ports {
            self.remove_port(port);
        }
        let leftover = self[node].edges.clone();
        for e in leftover {
            self.remove_edge(e);
        }
        if let Some(n) = self.nodes.remove(node) {
            if let Some(parent) = n.parent {
                if let Some(pn) = self.nodes.get_mut(parent) {
                    pn.children.retain(|&c| c != node);
                }
            }
        }
    }

    // ── Ports ──

    /// Top-level ports clockwise from the top-left corner: north, east,
    /// south reversed, west reversed.
    pub fn iter_ports(&self, node: NodeId) -> impl Iterator<Item = PortId> + '_ {
        let n = &self[node];
        n.north
            .iter()
            .chain(n.east.iter())
            .chain(n.south.iter().rev())
            .chain(n.west.iter().rev())
            .copied()
    }

    /// All ports of a node with bundles expanded: each side is flattened in
    /// pre-order, then sides are chained clockwise with south and west
    /// reversed. This is the order layout indices are assigned in.
    pub fn flat_ports(&self, node: NodeId) -> Vec<PortId> {
        let n = &self[node];
        let mut out = Vec::new();
        for side in [PortSide::North, PortSide::East, PortSide::South, PortSide::West] {
            let mut flat = Vec::new();
            for &p in n.ports(side) {
                self.flatten_port(p, &mut flat);
            }
            if matches!(side, PortSide::South | PortSide::West) {
                flat.reverse();
            }
            out.extend(flat);
        }
        out
    }

    fn flatten_port(&self, port: PortId, out: &mut Vec<PortId>) {
        out.push(port);
        for &c in &self[port].children {
            self.flatten_port(c, out);
        }
    }

    /// Leaf descendants of a port in pre-order (the port itself if a leaf).
    pub fn leaf_ports(&self, port: PortId) -> Vec<PortId> {
        let mut out = Vec::new();
        self.collect_leaves(port, &mut out);
        out
    }

    fn collect_leaves(&self, port: PortId, out: &mut Vec<PortId>) {
        let p = &self[port];
        if p.children.is_empty() {
            out.push(port);
        } else {
            for &c in &p.children {
                self.collect_leaves(c, out);
            }
        }
    }

    pub fn leaf_count(&self, port: PortId) -> usize {
        let p = &self[port];
        if p.children.is_empty() {
            1
        } else {
            p.children.iter().map(|&c| self.leaf_count(c)).sum()
        }
    }

    /// Top-most port containing `port`.
    pub fn root_port(&self, port: PortId) -> PortId {
        let mut cur = port;
        while let Some(parent) = self[cur].parent {
            cur = parent;
        }
        cur
    }

    /// Nesting depth; 0 for ports placed directly on a node.
    pub fn port_level(&self, port: PortId) -> u32 {
        let mut level = 0;
        let mut cur = port;
        while let Some(parent) = self[cur].parent {
            level += 1;
            cur = parent;
        }
        level
    }

    /// Replace the order of one side; `order` must be a permutation.
    pub fn reorder_side(&mut self, node: NodeId, side: PortSide, order: Vec<PortId>) -> Result<(), GraphError> {
        let current = self[node].ports(side);
        let mut a = current.to_vec();
        let mut b = order.clone();
        a.sort();
        b.sort();
        if a != b {
            return Err(GraphError::Structure {
                message: format!(
                    "new {} port order of {} is not a permutation",
                    side.as_str(),
                    self.node_label(node)
                ),
            });
        }
        *self[node].ports_mut(side) = order;
        Ok(())
    }

    pub(crate) fn mark_reduced(&mut self, port: PortId) {
        self[port].reduced = true;
    }

    /// Set `index` on every port of order-fixed nodes (clockwise, bundles
    /// expanded) and clear it elsewhere, for the whole subtree.
    pub fn assign_port_indices(&mut self, root: NodeId) {
        let fixed = self[root].port_constraints.is_order_fixed();
        for (i, p) in self.flat_ports(root).into_iter().enumerate() {
            self[p].index = if fixed { Some(i as u32) } else { None };
        }
        for child in self[root].children.clone() {
            self.assign_port_indices(child);
        }
    }

    // ── Traversal ──

    /// Subtree rooted at `root` in pre-order (own children only).
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            out.push(n);
            for &c in self[n].children.iter().rev() {
                stack.push(c);
            }
        }
        out
    }

    // ── Labels ──

    pub fn node_label(&self, node: NodeId) -> String {
        match self.node(node) {
            Some(n) => n.name_or_unnamed().to_owned(),
            None => format!("<stale {node:?}>"),
        }
    }

    /// `node.port.sub`; unnamed ports show their position as `[i]`.
    pub fn port_label(&self, port: PortId) -> String {
        let Some(p) = self.port(port) else {
            return format!("<stale {port:?}>");
        };
        let mut names = Vec::new();
        let mut cur = port;
        let mut cur_port = p;
        loop {
            let name = match &cur_port.name {
                Some(name) if !name.is_empty() => name.clone(),
                _ => {
                    let siblings = match cur_port.parent {
                        Some(parent) => self[parent].children.as_slice(),
                        None => self[cur_port.node].ports(cur_port.side),
                    };
                    let i = siblings.iter().position(|&s| s == cur).unwrap_or(0);
                    format!("[{i}]")
                }
            };
            names.push(name);
            match cur_port.parent {
                Some(parent) => {
                    cur = parent;
                    cur_port = &self[parent];
                }
                None => break,
            }
        }
        names.push(self.node_label(p.node));
        names.reverse();
        names.join(".")
    }

    /// Indented text dump of a subtree: ports, children, then edges.
    pub fn dump(&self, root: NodeId) -> String {
        let mut buf = String::new();
        self.dump_node(&mut buf, root, 0);
        buf
    }

    fn dump_node(&self, buf: &mut String, node: NodeId, depth: usize) {
        let n = &self[node];
        let indent = "  ".repeat(depth);
        write!(buf, "{indent}node {}", n.name_or_unnamed()).unwrap();
        if let Some(class) = &n.class {
            write!(buf, " : {class}").unwrap();
        }
        if let Some(body) = n.shares_body_with {
            write!(buf, " (shares {})", self.node_label(body)).unwrap();
        }
        writeln!(buf).unwrap();
        for p in self.iter_ports(node) {
            self.dump_port(buf, p, depth + 1);
        }
        for &c in &n.children {
            self.dump_node(buf, c, depth + 1);
        }
        for &e in &n.edges {
            let edge = &self[e];
            let srcs: Vec<String> = edge.srcs.iter().map(|&p| self.port_label(p)).collect();
            let dsts: Vec<String> = edge.dsts.iter().map(|&p| self.port_label(p)).collect();
            writeln!(buf, "{indent}  edge {} -> {}", srcs.join(", "), dsts.join(", ")).unwrap();
        }
    }

    fn dump_port(&self, buf: &mut String, port: PortId, depth: usize) {
        let p = &self[port];
        let indent = "  ".repeat(depth);
        writeln!(
            buf,
            "{indent}port {} {} {}",
            p.side.as_str(),
            p.direction.as_str(),
            p.name.as_deref().unwrap_or("")
        )
        .unwrap();
        for &c in &p.children {
            self.dump_port(buf, c, depth + 1);
        }
    }

    fn edge_checked(&self, edge: EdgeId) -> Result<&Edge, GraphError> {
        self.edges.get(edge).ok_or_else(|| GraphError::StaleHandle {
            what: format!("{edge:?}"),
        })
    }

    fn edge_mut_checked(&mut self, edge: EdgeId) -> Result<&mut Edge, GraphError> {
        self.edges.get_mut(edge).ok_or_else(|| GraphError::StaleHandle {
            what: format!("{edge:?}"),
        })
    }
}

fn remove_first<T: PartialEq>(list: &mut Vec<T>, item: T) -> bool {
    match list.iter().position(|x| *x == item) {
        Some(pos) => {
            list.remove(pos);
            true
        }
        None => false,
    }
}

// ── Indexing ────────────────────────────────────────────────────────────────

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.nodes
            .get(id)
            .unwrap_or_else(|| panic!("stale node handle {id:?}"))
    }
}

impl IndexMut<NodeId> for Graph {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale node handle {id:?}"))
    }
}

impl Index<PortId> for Graph {
    type Output = Port;

    fn index(&self, id: PortId) -> &Port {
        self.ports
            .get(id)
            .unwrap_or_else(|| panic!("stale port handle {id:?}"))
    }
}

impl IndexMut<PortId> for Graph {
    fn index_mut(&mut self, id: PortId) -> &mut Port {
        self.ports
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale port handle {id:?}"))
    }
}

impl Index<EdgeId> for Graph {
    type Output = Edge;

    fn index(&self, id: EdgeId) -> &Edge {
        self.edges
            .get(id)
            .unwrap_or_else(|| panic!("stale edge handle {id:?}"))
    }
}

impl IndexMut<EdgeId> for Graph {
    fn index_mut(&mut self, id: EdgeId) -> &mut Edge {
        self.edges
            .get_mut(id)
            .unwrap_or_else(|| panic!("stale edge handle {id:?}"))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
