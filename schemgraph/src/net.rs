// net.rs — Net aggregation: drivers and endpoints keyed by signal
//
// A builder walking a design records, per container node, which ports drive
// and which ports read each signal. Aliasing two signals merges their nets.
// Once the container is complete, `apply_connections` materializes one
// hyperedge per net.
//
// Nets are kept in creation order and merged with an explicit union-find
// (parent links, no path compression). The survivor of a merge is the net
// with the lower sequence number; its driver, endpoint and key lists come
// first in the merged net.
//
// Preconditions: all ports passed in belong to the container or its direct
//                children.
// Postconditions: `apply_connections` emits edges in ascending sequence
//                 number; within an edge, ports keep first-added order.
// Failure modes: direction rule violation → `GraphError`; nets missing a
//                driver or an endpoint → `UnresolvedNet` in the report.
// Side effects: `apply_connections` adds edges to the graph.

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, trace};

use crate::arena::{EdgeId, NodeId, PortId};
use crate::diag::{codes, Diagnostic};
use crate::graph::{EndRole, Graph, GraphError};
use crate::origin::{Origin, Signal};

/// Handle to a net of one `NetCtxs`. Always refers to a representative
/// after being returned from a `NetCtxs` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetRef(usize);

impl NetRef {
    /// Creation order of the net.
    pub fn seq(self) -> usize {
        self.0
    }
}

/// What a driver or endpoint refers to.
#[derive(Debug, Clone)]
pub enum NetTerminal {
    Port(PortId),
    /// Another signal: its net is merged into this one.
    Signal(Signal),
}

#[derive(Debug)]
struct Net {
    keys: Vec<Signal>,
    drivers: IndexSet<PortId>,
    endpoints: IndexSet<PortId>,
    merged_into: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnresolvedKind {
    /// Readers but nothing driving them.
    NoDriver,
    /// Driven but never read.
    NoEndpoint,
}

#[derive(Debug, Clone)]
pub struct UnresolvedNet {
    pub signal: Signal,
    pub kind: UnresolvedKind,
    /// The ports present on the net (endpoints or drivers).
    pub ports: Vec<PortId>,
}

impl UnresolvedNet {
    pub fn to_diagnostic(&self, graph: &Graph) -> Diagnostic {
        let diag = match self.kind {
            UnresolvedKind::NoDriver => Diagnostic::error(format!(
                "net '{}' has endpoints but no driver",
                self.signal.name
            ))
            .with_code(codes::E0201_NET_WITHOUT_DRIVER),
            UnresolvedKind::NoEndpoint => Diagnostic::warning(format!(
                "net '{}' is driven but has no endpoint",
                self.signal.name
            ))
            .with_code(codes::W0202_NET_WITHOUT_ENDPOINT),
        };
        self.ports
            .iter()
            .fold(diag.with_subject(self.signal.name.clone()), |d, &p| {
                d.with_related(graph.port_label(p))
            })
    }
}

#[derive(Debug, Default)]
pub struct NetReport {
    pub edges: Vec<EdgeId>,
    pub unresolved: Vec<UnresolvedNet>,
}

/// All nets of one container node.
#[derive(Debug)]
pub struct NetCtxs {
    scope: NodeId,
    nets: Vec<Net>,
    by_key: IndexMap<Signal, usize>,
}

impl NetCtxs {
    pub fn new(scope: NodeId) -> Self {
        Self {
            scope,
            nets: Vec::new(),
            by_key: IndexMap::new(),
        }
    }

    pub fn scope(&self) -> NodeId {
        self.scope
    }

    fn find(&self, mut net: usize) -> usize {
        while let Some(parent) = self.nets[net].merged_into {
            net = parent;
        }
        net
    }

    /// Net of `signal`, created on first use. The flag reports whether the
    /// net existed before.
    pub fn get_or_create(&mut self, signal: &Signal) -> (NetRef, bool) {
        if let Some(&net) = self.by_key.get(signal) {
            return (NetRef(self.find(net)), true);
        }
        let net = self.nets.len();
        self.nets.push(Net {
            keys: vec![signal.clone()],
            drivers: IndexSet::new(),
            endpoints: IndexSet::new(),
            merged_into: None,
        });
        self.by_key.insert(signal.clone(), net);
        (NetRef(net), false)
    }

    /// Current representative of `signal`'s net, if it has one.
    pub fn resolve(&self, signal: &Signal) -> Option<NetRef> {
        self.by_key.get(signal).map(|&n| NetRef(self.find(n)))
    }

    pub fn add_driver(
        &mut self,
        graph: &Graph,
        net: NetRef,
        terminal: NetTerminal,
    ) -> Result<NetRef, GraphError> {
        match terminal {
            NetTerminal::Port(port) => {
                graph.check_end(self.scope, port, EndRole::Source)?;
                let root = self.find(net.0);
                self.nets[root].drivers.insert(port);
                Ok(NetRef(root))
            }
            NetTerminal::Signal(signal) => {
                let (other, _) = self.get_or_create(&signal);
                Ok(self.join(net, other))
            }
        }
    }

    pub fn add_endpoint(
        &mut self,
        graph: &Graph,
        net: NetRef,
        terminal: NetTerminal,
    ) -> Result<NetRef, GraphError> {
        match terminal {
            NetTerminal::Port(port) => {
                graph.check_end(self.scope, port, EndRole::Destination)?;
                let root = self.find(net.0);
                self.nets[root].endpoints.insert(port);
                Ok(NetRef(root))
            }
            NetTerminal::Signal(signal) => {
                let (other, _) = self.get_or_create(&signal);
                Ok(self.join(net, other))
            }
        }
    }

    /// Merge two nets; the one created first survives.
    pub fn join(&mut self, a: NetRef, b: NetRef) -> NetRef {
        let ra = self.find(a.0);
        let rb = self.find(b.0);
        if ra == rb {
            return NetRef(ra);
        }
        let (survivor, merged) = if ra < rb { (ra, rb) } else { (rb, ra) };
        let taken = Net {
            keys: std::mem::take(&mut self.nets[merged].keys),
            drivers: std::mem::take(&mut self.nets[merged].drivers),
            endpoints: std::mem::take(&mut self.nets[merged].endpoints),
            merged_into: Some(survivor),
        };
        self.nets[merged].merged_into = Some(survivor);
        let target = &mut self.nets[survivor];
        target.keys.extend(taken.keys);
        target.drivers.extend(taken.drivers);
        target.endpoints.extend(taken.endpoints);
        trace!(survivor, merged, "nets joined");
        NetRef(survivor)
    }

    pub fn keys(&self, net: NetRef) -> &[Signal] {
        &self.nets[self.find(net.0)].keys
    }

    pub fn drivers(&self, net: NetRef) -> impl Iterator<Item = PortId> + '_ {
        self.nets[self.find(net.0)].drivers.iter().copied()
    }

    pub fn endpoints(&self, net: NetRef) -> impl Iterator<Item = PortId> + '_ {
        self.nets[self.find(net.0)].endpoints.iter().copied()
    }

    /// Number of distinct nets after merging.
    pub fn len(&self) -> usize {
        self.nets.iter().filter(|n| n.merged_into.is_none()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.nets.is_empty()
    }

    /// Emit one hyperedge per net, in ascending sequence number.
    pub fn apply_connections(&self, graph: &mut Graph) -> Result<NetReport, GraphError> {
        let mut report = NetReport::default();
        for net in self.nets.iter().filter(|n| n.merged_into.is_none()) {
            let Some(first) = net.keys.first() else {
                continue;
            };
            match (net.drivers.is_empty(), net.endpoints.is_empty()) {
                (true, true) => continue,
                (true, false) => {
                    report.unresolved.push(UnresolvedNet {
                        signal: first.clone(),
                        kind: UnresolvedKind::NoDriver,
                        ports: net.endpoints.iter().copied().collect(),
                    });
                    continue;
                }
                (false, true) => {
                    report.unresolved.push(UnresolvedNet {
                        signal: first.clone(),
                        kind: UnresolvedKind::NoEndpoint,
                        ports: net.drivers.iter().copied().collect(),
                    });
                    continue;
                }
                (false, false) => {}
            }
            let origin = if net.keys.len() == 1 {
                Origin::Signal(first.clone())
            } else {
                Origin::AliasGroup(net.keys.clone())
            };
            let edge = graph.add_hyper_edge(
                self.scope,
                net.drivers.iter().copied().collect(),
                net.endpoints.iter().copied().collect(),
                Some(first.name.clone()),
                Some(origin),
            )?;
            report.edges.push(edge);
        }
        debug!(
            scope = %graph.node_label(self.scope),
            edges = report.edges.len(),
            unresolved = report.unresolved.len(),
            "nets applied"
        );
        Ok(report)
    }
}
