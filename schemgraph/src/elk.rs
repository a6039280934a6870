// elk.rs — ELK-compatible JSON export of a layout graph
//
// Serializes a canonicalized subtree into the nested node/port/edge document
// consumed by ELK-based schematic viewers. Ids are assigned through an
// `IdStore` in three sweeps (all nodes, then all ports, then edges per scope
// as they are emitted), so structurally identical graphs produce identical
// documents. Bundled ports are flattened; `hwMeta.level` keeps the nesting.
//
// Nodes sharing a body are emitted with the borrowed subtree under their own
// path prefix. The body's own interface ports are aliased to the borrower's
// ports so inner edges attach to the borrower.
//
// Preconditions: `root` is live; borrowers and their bodies have matching
//                port structures.
// Postconditions: every exported element has a unique id; the top node
//                 carries `maxId`.
// Failure modes: diverging shared-body interfaces → `GraphError::Structure`.
// Side effects: assigns `Port::index` for the whole subtree.

use serde::Serialize;
use tracing::debug;

use crate::arena::{NodeId, PortId};
use crate::graph::{Graph, GraphError, NodeKind};
use crate::id::{IdStore, Item};
use crate::pipeline::sha256;
use crate::view::{NodeView, PathPrefix};

// ── Document types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElkNode {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub hw_meta: NodeMeta,
    pub properties: NodeProperties,
    pub ports: Vec<ElkPort>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ElkNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<ElkEdge>,
    #[serde(rename = "_shared", skip_serializing_if = "is_false")]
    pub shared: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub name: Option<String>,
    pub cls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_id: Option<u32>,
    #[serde(skip_serializing_if = "is_false")]
    pub is_external_port: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeProperties {
    #[serde(rename = "org.eclipse.elk.portConstraints")]
    pub port_constraints: &'static str,
    #[serde(rename = "org.eclipse.elk.randomSeed")]
    pub random_seed: u32,
    #[serde(rename = "org.eclipse.elk.layered.mergeEdges")]
    pub merge_edges: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElkPort {
    pub id: String,
    pub hw_meta: PortMeta,
    pub direction: &'static str,
    pub properties: PortProperties,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortMeta {
    pub level: u32,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortProperties {
    pub side: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Hyperedge; every end is a `[nodeId, portId]` pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElkEdge {
    pub id: String,
    pub sources: Vec<[String; 2]>,
    pub targets: Vec<[String; 2]>,
    pub hw_meta: EdgeMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeMeta {
    pub name: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

// ── Export ─────────────────────────────────────────────────────────────────

/// Build the ELK document of the subtree under `root`.
pub fn to_elk(graph: &mut Graph, root: NodeId) -> Result<ElkNode, GraphError> {
    graph.assign_port_indices(root);
    let graph = &*graph;
    let mut ids = IdStore::new();
    let top = NodeView::root(root);

    register_nodes(graph, &top, &mut ids);
    register_ports(graph, &top, &mut ids)?;
    let mut doc = node_json(graph, &top, &mut ids, true)?;
    doc.hw_meta.max_id = ids.max_id();
    debug!(ids = ids.len(), "elk document built");
    Ok(doc)
}

fn register_nodes(graph: &Graph, view: &NodeView, ids: &mut IdStore) {
    ids.register(&view.prefix, Item::Node(view.node));
    for child in view.children(graph) {
        register_nodes(graph, &child, ids);
    }
}

fn register_ports(graph: &Graph, view: &NodeView, ids: &mut IdStore) -> Result<(), GraphError> {
    let own = graph.flat_ports(view.node);
    for &p in &own {
        ids.register(&view.prefix, Item::Port(p));
    }
    if view.is_shared(graph) {
        let body = view.body(graph);
        let lent = graph.flat_ports(body);
        if lent.len() != own.len() {
            return Err(GraphError::Structure {
                message: format!(
                    "{} borrows the body of {} but their interfaces differ",
                    graph.node_label(view.node),
                    graph.node_label(body)
                ),
            });
        }
        let inner = view.inner_prefix(graph);
        for (&b, &p) in lent.iter().zip(&own) {
            let id = ids.require(&view.prefix, Item::Port(p))?;
            ids.alias(&inner, Item::Port(b), id)?;
        }
    }
    for child in view.children(graph) {
        register_ports(graph, &child, ids)?;
    }
    Ok(())
}

fn node_json(
    graph: &Graph,
    view: &NodeView,
    ids: &mut IdStore,
    is_top: bool,
) -> Result<ElkNode, GraphError> {
    let n = &graph[view.node];
    let id = ids.require(&view.prefix, Item::Node(view.node))?;

    let ports = graph
        .flat_ports(view.node)
        .into_iter()
        .map(|p| port_json(graph, &view.prefix, p, ids))
        .collect::<Result<Vec<_>, _>>()?;

    let mut children = view
        .children(graph)
        .iter()
        .map(|child| node_json(graph, child, ids, false))
        .collect::<Result<Vec<_>, _>>()?;
    children.sort_by_key(|c| c.id.as_deref().and_then(|s| s.parse::<u32>().ok()));

    let body = view.body(graph);
    let inner = view.inner_prefix(graph);
    let mut edges = Vec::new();
    for &e in graph[body].edges() {
        let edge = &graph[e];
        let eid = ids.register(&inner, Item::Edge(e));
        let end = |p: PortId| -> Result<[String; 2], GraphError> {
            let owner = graph[p].node();
            let node_id = if owner == body {
                id
            } else {
                ids.require(&inner, Item::Node(owner))?
            };
            let port_id = ids.require(&inner, Item::Port(p))?;
            Ok([node_id.to_string(), port_id.to_string()])
        };
        edges.push(ElkEdge {
            id: eid.to_string(),
            sources: edge.srcs().iter().map(|&p| end(p)).collect::<Result<_, _>>()?,
            targets: edge.dsts().iter().map(|&p| end(p)).collect::<Result<_, _>>()?,
            hw_meta: EdgeMeta {
                name: edge.name.clone(),
            },
        });
    }

    Ok(ElkNode {
        id: (!is_top).then(|| id.to_string()),
        hw_meta: NodeMeta {
            name: n.name.clone(),
            cls: n.class.clone(),
            body_text: n.body_text.clone(),
            max_id: None,
            is_external_port: matches!(n.kind, NodeKind::ExternalPort(_)),
        },
        properties: NodeProperties {
            port_constraints: n.port_constraints.as_str(),
            random_seed: 0,
            merge_edges: 1,
        },
        ports,
        children,
        edges,
        shared: view.is_shared(graph),
    })
}

fn port_json(
    graph: &Graph,
    prefix: &PathPrefix,
    port: PortId,
    ids: &IdStore,
) -> Result<ElkPort, GraphError> {
    let p = &graph[port];
    Ok(ElkPort {
        id: ids.require(prefix, Item::Port(port))?.to_string(),
        hw_meta: PortMeta {
            level: graph.port_level(port),
            name: p.name.clone(),
        },
        direction: p.direction.as_str(),
        properties: PortProperties {
            side: p.side.as_str(),
            index: p.index,
        },
    })
}

// ── Output ─────────────────────────────────────────────────────────────────

pub fn to_json(doc: &ElkNode, pretty: bool) -> Result<String, serde_json::Error> {
    if pretty {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    }
}

/// SHA-256 hex digest of the compact document.
pub fn fingerprint(doc: &ElkNode) -> Result<String, serde_json::Error> {
    let json = to_json(doc, false)?;
    Ok(sha256(json.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

// ── Tests ──────────────────────────────────────────────────────────────────
