// design.rs — JSON design description and layout-graph builder
//
// A design is a list of modules. Each module declares its interface ports
// (possibly bundles of fields), internal signals, cells (assignments, index
// operations, operators, constants, statements) and instances of other
// modules. Building walks the hierarchy from the top module, creates one
// node per cell and instance, and resolves signals to hyperedges through one
// `NetCtxs` per container.
//
// Preconditions: module names are unique; instance connections name leaf
//                ports by dotted path (`bus.valid`).
// Postconditions: every container's nets are materialized; unresolved nets
//                 are reported as diagnostics, not edges. Instances of
//                 modules without cells or instances are opaque: only their
//                 interface is drawn.
// Failure modes: unknown module/signal/port, recursive instantiation,
//                malformed cells, direction rule violations → `DesignError`.
// Side effects: `load_design` reads one file.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::arena::{NodeId, PortId};
use crate::diag::{codes, Diagnostic};
use crate::graph::{Graph, GraphError, NodeKind, PortDirection};
use crate::net::{NetCtxs, NetTerminal};
use crate::origin::{Assignment, BitRange, Const, IndexOp, IndexValue, Operand, Origin, Signal};

// ── Description types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignDoc {
    /// Name of the module drawn as the root node.
    pub top: String,
    pub modules: Vec<ModuleDoc>,
    /// Draw the top module's interface as standalone external-port nodes.
    #[serde(default)]
    pub external_ports: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDoc {
    pub name: String,
    #[serde(default)]
    pub ports: Vec<PortDoc>,
    #[serde(default)]
    pub signals: Vec<SignalDoc>,
    /// Pairs of signals that are electrically the same net.
    #[serde(default)]
    pub aliases: Vec<[String; 2]>,
    #[serde(default)]
    pub cells: Vec<CellDoc>,
    #[serde(default)]
    pub instances: Vec<InstanceDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDoc {
    pub name: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectionDoc {
    Input,
    Output,
}

impl From<DirectionDoc> for PortDirection {
    fn from(d: DirectionDoc) -> Self {
        match d {
            DirectionDoc::Input => PortDirection::Input,
            DirectionDoc::Output => PortDirection::Output,
        }
    }
}

/// Interface port. A port with `fields` is a bundle; only leaves carry
/// signals. A leaf without `signal` is bound to the implicit signal named by
/// its dotted path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDoc {
    pub name: String,
    pub direction: DirectionDoc,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub signal: Option<String>,
    #[serde(default)]
    pub fields: Vec<PortDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellOp {
    /// `out = in`, optionally into a `[hi, lo]` sub-range of `out`.
    Assign {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<[u32; 2]>,
    },
    /// `out = in[hi:lo]`
    Index { hi: u32, lo: u32 },
    /// `out = in[idx]` with the index as second input.
    IndexDynamic,
    Operator { name: String },
    Constant { value: String },
    Statement { statement: String },
}

/// A cell pin: a bare signal name, or a named port bound to a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PinDoc {
    Signal(String),
    Named { name: String, signal: String },
}

impl PinDoc {
    pub fn name(&self) -> Option<&str> {
        match self {
            PinDoc::Signal(_) => None,
            PinDoc::Named { name, .. } => Some(name),
        }
    }

    pub fn signal(&self) -> &str {
        match self {
            PinDoc::Signal(s) | PinDoc::Named { signal: s, .. } => s,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDoc {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    pub op: CellOp,
    #[serde(default)]
    pub inputs: Vec<PinDoc>,
    #[serde(default)]
    pub outputs: Vec<PinDoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceDoc {
    pub name: String,
    pub module: String,
    /// Leaf port path → signal of the instantiating module.
    #[serde(default)]
    pub connections: IndexMap<String, String>,
    /// Borrow the body of an earlier instance of the same module.
    #[serde(default)]
    pub share_body: bool,
}

// ── Errors ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum DesignError {
    Io { path: PathBuf, source: std::io::Error },
    Json(serde_json::Error),
    UnknownModule { name: String },
    UnknownSignal { module: String, signal: String },
    UnknownPort { instance: String, port: String },
    Recursive { module: String },
    Invalid { module: String, message: String },
    Graph(GraphError),
}

impl fmt::Display for DesignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DesignError::Io { path, source } => {
                write!(f, "cannot read '{}': {}", path.display(), source)
            }
            DesignError::Json(e) => write!(f, "invalid design description: {}", e),
            DesignError::UnknownModule { name } => write!(f, "unknown module '{}'", name),
            DesignError::UnknownSignal { module, signal } => {
                write!(f, "unknown signal '{}' in module '{}'", signal, module)
            }
            DesignError::UnknownPort { instance, port } => {
                write!(f, "instance '{}' has no leaf port '{}'", instance, port)
            }
            DesignError::Recursive { module } => {
                write!(f, "module '{}' instantiates itself", module)
            }
            DesignError::Invalid { module, message } => {
                write!(f, "in module '{}': {}", module, message)
            }
            DesignError::Graph(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for DesignError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DesignError::Io { source, .. } => Some(source),
            DesignError::Json(e) => Some(e),
            DesignError::Graph(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GraphError> for DesignError {
    fn from(e: GraphError) -> Self {
        DesignError::Graph(e)
    }
}

impl From<serde_json::Error> for DesignError {
    fn from(e: serde_json::Error) -> Self {
        DesignError::Json(e)
    }
}

// ── Loading ────────────────────────────────────────────────────────────────

pub fn parse_design(text: &str) -> Result<DesignDoc, DesignError> {
    Ok(serde_json::from_str(text)?)
}

pub fn load_design(path: &Path) -> Result<DesignDoc, DesignError> {
    let text = std::fs::read_to_string(path).map_err(|source| DesignError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_design(&text)
}

/// A built layout graph with the diagnostics collected while resolving nets.
#[derive(Debug)]
pub struct BuiltDesign {
    pub graph: Graph,
    pub root: NodeId,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn build_graph(doc: &DesignDoc) -> Result<BuiltDesign, DesignError> {
    let mut builder = Builder {
        modules: doc.modules.iter().map(|m| (m.name.as_str(), m)).collect(),
        graph: Graph::new(),
        next_signal: 0,
        bodies: IndexMap::new(),
        stack: Vec::new(),
        diagnostics: Vec::new(),
    };
    let top = builder.module(&doc.top)?;
    let root = builder.graph.add_root(Some(&top.name));
    builder.graph[root].class = Some("Module".into());
    builder.graph[root].origin = Some(Origin::Component(top.name.clone()));

    let leaves = if doc.external_ports {
        builder.add_external_ports(root, &top.ports)
    } else {
        builder.add_interface(root, &top.ports)
    };
    builder.build_module(root, top, &leaves)?;

    debug!(
        nodes = builder.graph.node_count(),
        ports = builder.graph.port_count(),
        edges = builder.graph.edge_count(),
        "design built"
    );
    Ok(BuiltDesign {
        graph: builder.graph,
        root,
        diagnostics: builder.diagnostics,
    })
}

// ── Builder ────────────────────────────────────────────────────────────────

/// A leaf interface port and the description it was built from.
struct Leaf<'a> {
    path: String,
    doc: &'a PortDoc,
    port: PortId,
}

struct Builder<'a> {
    modules: IndexMap<&'a str, &'a ModuleDoc>,
    graph: Graph,
    next_signal: u32,
    /// First fully built instance per module, lent to `share_body` instances.
    bodies: IndexMap<&'a str, NodeId>,
    stack: Vec<&'a str>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Builder<'a> {
    fn module(&self, name: &str) -> Result<&'a ModuleDoc, DesignError> {
        self.modules
            .get(name)
            .copied()
            .ok_or_else(|| DesignError::UnknownModule { name: name.to_owned() })
    }

    fn new_signal(&mut self, name: &str, width: Option<u32>, hidden: bool) -> Signal {
        let mut s = Signal::new(self.next_signal, name);
        self.next_signal += 1;
        s.width = width;
        s.hidden = hidden;
        s
    }

    /// Ports of `node` mirroring `ports`; returns the leaves in pre-order.
    fn add_interface(&mut self, node: NodeId, ports: &'a [PortDoc]) -> Vec<Leaf<'a>> {
        let mut leaves = Vec::new();
        for doc in ports {
            let dir = PortDirection::from(doc.direction);
            let port = self
                .graph
                .add_port(node, Some(&doc.name), dir, dir.default_side());
            self.add_fields(port, doc, doc.name.clone(), false, &mut leaves);
        }
        leaves
    }

    /// One external-port node per interface port, with directions flipped so
    /// the node drives (or reads) the net from inside the container.
    fn add_external_ports(&mut self, container: NodeId, ports: &'a [PortDoc]) -> Vec<Leaf<'a>> {
        let mut leaves = Vec::new();
        for doc in ports {
            let dir = PortDirection::from(doc.direction);
            let node = self.graph.add_node(container, Some(&doc.name));
            self.graph[node].kind = NodeKind::ExternalPort(dir);
            let inner = dir.opposite();
            let port = self
                .graph
                .add_port(node, Some(&doc.name), inner, inner.default_side());
            self.add_fields(port, doc, doc.name.clone(), true, &mut leaves);
        }
        leaves
    }

    fn add_fields(
        &mut self,
        port: PortId,
        doc: &'a PortDoc,
        path: String,
        flip: bool,
        leaves: &mut Vec<Leaf<'a>>,
    ) {
        if doc.fields.is_empty() {
            leaves.push(Leaf { path, doc, port });
            return;
        }
        for field in &doc.fields {
            let mut dir = PortDirection::from(field.direction);
            if flip {
                dir = dir.opposite();
            }
            let sub = self.graph.add_sub_port(port, Some(&field.name), dir);
            self.add_fields(sub, field, format!("{}.{}", path, field.name), flip, leaves);
        }
    }

    /// A port drives a net of `container` when it feeds data into it: an
    /// input of the container itself, or an output of one of its children.
    fn is_driver(&self, container: NodeId, port: PortId) -> bool {
        let p = &self.graph[port];
        (p.node() == container) == (p.direction == PortDirection::Input)
    }

    fn connect(
        &mut self,
        ctx: &mut NetCtxs,
        signal: &Signal,
        port: PortId,
    ) -> Result<(), DesignError> {
        self.graph[port].origin = Some(Origin::Signal(signal.clone()));
        let (net, _) = ctx.get_or_create(signal);
        if self.is_driver(ctx.scope(), port) {
            ctx.add_driver(&self.graph, net, NetTerminal::Port(port))?;
        } else {
            ctx.add_endpoint(&self.graph, net, NetTerminal::Port(port))?;
        }
        Ok(())
    }

    fn build_module(
        &mut self,
        container: NodeId,
        module: &'a ModuleDoc,
        leaves: &[Leaf<'a>],
    ) -> Result<(), DesignError> {
        if self.stack.contains(&module.name.as_str()) {
            return Err(DesignError::Recursive {
                module: module.name.clone(),
            });
        }
        if module.cells.is_empty()
            && module.instances.is_empty()
            && self.graph[container].parent().is_some()
        {
            // black box: only the interface is drawn
            trace!(module = %module.name, "opaque module");
            return Ok(());
        }
        self.stack.push(&module.name);
        trace!(module = %module.name, "building module body");

        let mut scope = ModuleScope {
            module,
            signals: IndexMap::new(),
            ctx: NetCtxs::new(container),
        };
        for s in &module.signals {
            let sig = self.new_signal(&s.name, s.width, s.hidden);
            scope.signals.insert(s.name.clone(), sig);
        }

        for leaf in leaves {
            let name = leaf.doc.signal.clone().unwrap_or_else(|| leaf.path.clone());
            let signal = match scope.signals.get(&name) {
                Some(s) => s.clone(),
                None => {
                    let s = self.new_signal(&name, leaf.doc.width, false);
                    scope.signals.insert(name, s.clone());
                    s
                }
            };
            self.connect(&mut scope.ctx, &signal, leaf.port)?;
        }

        for [a, b] in &module.aliases {
            let a = scope.signal(a)?;
            let b = scope.signal(b)?;
            let (net, _) = scope.ctx.get_or_create(&a);
            scope
                .ctx
                .add_driver(&self.graph, net, NetTerminal::Signal(b))?;
        }

        for cell in &module.cells {
            self.add_cell(container, &mut scope, cell)?;
        }
        for inst in &module.instances {
            self.add_instance(container, &mut scope, inst)?;
        }

        let report = scope.ctx.apply_connections(&mut self.graph)?;
        for net in &report.unresolved {
            self.diagnostics.push(net.to_diagnostic(&self.graph));
        }
        self.stack.pop();
        Ok(())
    }

    /// Warn about a static index reaching past a signal of known width.
    fn check_range(&mut self, module: &str, signal: &Signal, range: BitRange) {
        let Some(width) = signal.width else {
            return;
        };
        if range.hi < width {
            return;
        }
        self.diagnostics.push(
            Diagnostic::warning(format!(
                "index {} exceeds {}-bit signal '{}'",
                range.label(),
                width,
                signal.name
            ))
            .with_code(codes::W0303_INDEX_OUT_OF_RANGE)
            .with_subject(format!("{}.{}", module, signal.name)),
        );
    }

    fn add_cell(
        &mut self,
        container: NodeId,
        scope: &mut ModuleScope<'a>,
        cell: &'a CellDoc,
    ) -> Result<(), DesignError> {
        let invalid = |message: String| DesignError::Invalid {
            module: scope.module.name.clone(),
            message,
        };
        let expect_pins = |inputs: usize, outputs: usize, what: &str| {
            if cell.inputs.len() == inputs && cell.outputs.len() == outputs {
                Ok(())
            } else {
                Err(invalid(format!(
                    "{} cell needs {} input(s) and {} output(s)",
                    what, inputs, outputs
                )))
            }
        };

        let (default_name, class, origin, body_text) = match &cell.op {
            CellOp::Assign { index } => {
                expect_pins(1, 1, "assign")?;
                let dst = scope.signal(cell.outputs[0].signal())?;
                let indexes = match index {
                    Some([hi, lo]) if hi < lo => {
                        return Err(invalid(format!("inverted range [{}:{}]", hi, lo)))
                    }
                    Some([hi, lo]) => {
                        let range = BitRange::new(*hi, *lo);
                        self.check_range(&scope.module.name, &dst, range);
                        vec![IndexValue::Static(range)]
                    }
                    None => Vec::new(),
                };
                let origin = Origin::Assignment(Assignment {
                    src: Operand::Signal(scope.signal(cell.inputs[0].signal())?),
                    dst,
                    indexes,
                });
                ("ASSIGN".to_owned(), "Assignment", origin, None)
            }
            CellOp::Index { hi, lo } => {
                if cell.inputs.is_empty() || cell.outputs.len() != 1 {
                    return Err(invalid("index cell needs a data input and one output".into()));
                }
                if hi < lo {
                    return Err(invalid(format!("inverted range [{}:{}]", hi, lo)));
                }
                let src = scope.signal(cell.inputs[0].signal())?;
                let range = BitRange::new(*hi, *lo);
                self.check_range(&scope.module.name, &src, range);
                let origin = Origin::Index(IndexOp {
                    src,
                    index: IndexValue::Static(range),
                });
                ("INDEX".to_owned(), "Operator", origin, None)
            }
            CellOp::IndexDynamic => {
                expect_pins(2, 1, "dynamic index")?;
                let origin = Origin::Index(IndexOp {
                    src: scope.signal(cell.inputs[0].signal())?,
                    index: IndexValue::Dynamic,
                });
                ("INDEX".to_owned(), "Operator", origin, None)
            }
            CellOp::Operator { name } => {
                if cell.outputs.is_empty() {
                    return Err(invalid(format!("operator {} has no output", name)));
                }
                (name.clone(), "Operator", Origin::Operator(name.clone()), None)
            }
            CellOp::Constant { value } => {
                expect_pins(0, 1, "constant")?;
                let width = scope.signal(cell.outputs[0].signal())?.width;
                let origin = Origin::Const(Const::new(value.clone(), width));
                ("CONST".to_owned(), "Constant", origin, Some(value.clone()))
            }
            CellOp::Statement { statement } => (
                statement.to_uppercase(),
                "Statement",
                Origin::Statement(statement.clone()),
                None,
            ),
        };

        let name = cell.name.clone().unwrap_or(default_name);
        let node = self.graph.add_node(container, Some(&name));
        let n = &mut self.graph[node];
        n.class = Some(cell.class.clone().unwrap_or_else(|| class.to_owned()));
        n.origin = Some(origin);
        n.body_text = body_text;

        for (pins, dir) in [
            (&cell.inputs, PortDirection::Input),
            (&cell.outputs, PortDirection::Output),
        ] {
            for pin in pins {
                let signal = scope.signal(pin.signal())?;
                let port = self
                    .graph
                    .add_port(node, pin.name(), dir, dir.default_side());
                self.connect(&mut scope.ctx, &signal, port)?;
            }
        }
        Ok(())
    }

    fn add_instance(
        &mut self,
        container: NodeId,
        scope: &mut ModuleScope<'a>,
        inst: &'a InstanceDoc,
    ) -> Result<(), DesignError> {
        let sub = self.module(&inst.module)?;
        let node = self.graph.add_node(container, Some(&inst.name));
        self.graph[node].class = Some("Module".into());
        self.graph[node].origin = Some(Origin::Component(sub.name.clone()));
        let leaves = self.add_interface(node, &sub.ports);

        for (path, signal) in &inst.connections {
            let leaf = leaves
                .iter()
                .find(|l| &l.path == path)
                .ok_or_else(|| DesignError::UnknownPort {
                    instance: inst.name.clone(),
                    port: path.clone(),
                })?;
            let signal = scope.signal(signal)?;
            self.connect(&mut scope.ctx, &signal, leaf.port)?;
        }

        match self.bodies.get(sub.name.as_str()).copied() {
            Some(body) if inst.share_body => {
                trace!(instance = %inst.name, module = %sub.name, "sharing body");
                self.graph.set_shared_body(node, body)?;
            }
            _ => {
                self.build_module(node, sub, &leaves)?;
                self.bodies.entry(sub.name.as_str()).or_insert(node);
            }
        }
        Ok(())
    }
}

/// Per-module build state: the signal table and the container's nets.
struct ModuleScope<'a> {
    module: &'a ModuleDoc,
    signals: IndexMap<String, Signal>,
    ctx: NetCtxs,
}

impl ModuleScope<'_> {
    fn signal(&self, name: &str) -> Result<Signal, DesignError> {
        self.signals
            .get(name)
            .cloned()
            .ok_or_else(|| DesignError::UnknownSignal {
                module: self.module.name.clone(),
                signal: name.to_owned(),
            })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PASS_THROUGH: &str = r#"{
        "top": "top",
        "modules": [{
            "name": "top",
            "ports": [
                {"name": "a", "direction": "input", "width": 8},
                {"name": "y", "direction": "output", "width": 8}
            ],
            "signals": [{"name": "t", "width": 8}],
            "cells": [
                {"op": {"kind": "assign"}, "inputs": ["a"], "outputs": ["t"]},
                {"op": {"kind": "operator", "name": "NOT"}, "inputs": ["t"], "outputs": ["y"]}
            ]
        }]
    }"#;

    #[test]
    fn cells_are_wired_through_nets() {
        let doc = parse_design(PASS_THROUGH).unwrap();
        let built = build_graph(&doc).unwrap();
        assert!(built.diagnostics.is_empty());
        let expected = [
            "node top : Module",
            "  port EAST OUTPUT y",
            "  port WEST INPUT a",
            "  node ASSIGN : Assignment",
            "    port EAST OUTPUT ",
            "    port WEST INPUT ",
            "  node NOT : Operator",
            "    port EAST OUTPUT ",
            "    port WEST INPUT ",
            "  edge top.a -> ASSIGN.[0]",
            "  edge NOT.[0] -> top.y",
            "  edge ASSIGN.[0] -> NOT.[0]",
            "",
        ]
        .join("\n");
        assert_eq!(built.graph.dump(built.root), expected);
    }

    #[test]
    fn unknown_signal_is_reported() {
        let text = PASS_THROUGH.replace(r#""outputs": ["y"]"#, r#""outputs": ["z"]"#);
        let err = build_graph(&parse_design(&text).unwrap()).unwrap_err();
        assert!(matches!(err, DesignError::UnknownSignal { ref signal, .. } if signal == "z"));
    }

    #[test]
    fn undriven_net_becomes_diagnostic() {
        let doc = parse_design(
            r#"{"top": "top", "modules": [{
                "name": "top",
                "ports": [{"name": "y", "direction": "output"}],
                "signals": [{"name": "floating"}],
                "cells": [{"op": {"kind": "operator", "name": "NOT"},
                           "inputs": ["floating"], "outputs": ["y"]}]
            }]}"#,
        )
        .unwrap();
        let built = build_graph(&doc).unwrap();
        assert_eq!(built.diagnostics.len(), 1);
        assert_eq!(built.diagnostics[0].code, Some(codes::E0201_NET_WITHOUT_DRIVER));
        assert!(built.diagnostics[0].is_error());
    }

    #[test]
    fn index_past_signal_width_is_reported() {
        let doc = parse_design(
            r#"{"top": "top", "modules": [{
                "name": "top",
                "ports": [{"name": "a", "direction": "input", "width": 8},
                          {"name": "y", "direction": "output"}],
                "cells": [{"op": {"kind": "index", "hi": 4294967295, "lo": 0},
                           "inputs": ["a"], "outputs": ["y"]}]
            }]}"#,
        )
        .unwrap();
        let built = build_graph(&doc).unwrap();
        assert_eq!(built.diagnostics.len(), 1);
        assert_eq!(built.diagnostics[0].code, Some(codes::W0303_INDEX_OUT_OF_RANGE));
        assert_eq!(built.diagnostics[0].subject.as_deref(), Some("top.a"));
        assert!(!built.diagnostics[0].is_error());
    }

    #[test]
    fn shared_instances_borrow_the_first_body() {
        let doc = parse_design(
            r#"{"top": "top", "modules": [
                {"name": "inv",
                 "ports": [{"name": "i", "direction": "input"}, {"name": "o", "direction": "output"}],
                 "cells": [{"op": {"kind": "operator", "name": "NOT"}, "inputs": ["i"], "outputs": ["o"]}]},
                {"name": "top",
                 "ports": [{"name": "a", "direction": "input"}, {"name": "y", "direction": "output"}],
                 "signals": [{"name": "m"}],
                 "instances": [
                    {"name": "u0", "module": "inv", "connections": {"i": "a", "o": "m"}},
                    {"name": "u1", "module": "inv", "connections": {"i": "m", "o": "y"}, "share_body": true}
                 ]}
            ]}"#,
        )
        .unwrap();
        let built = build_graph(&doc).unwrap();
        let g = &built.graph;
        let [u0, u1] = [g[built.root].children()[0], g[built.root].children()[1]];
        assert_eq!(g[u0].children().len(), 1);
        assert!(g[u1].children().is_empty());
        assert_eq!(g[u1].shares_body_with(), Some(u0));
        assert_eq!(g[built.root].edges().len(), 3);
    }

    #[test]
    fn bundle_fields_connect_by_path() {
        let doc = parse_design(
            r#"{"top": "top", "modules": [
                {"name": "sink",
                 "ports": [{"name": "s", "direction": "input", "fields": [
                    {"name": "valid", "direction": "input"},
                    {"name": "ready", "direction": "output"}]}]},
                {"name": "top",
                 "signals": [{"name": "v"}, {"name": "r"}],
                 "cells": [
                    {"op": {"kind": "constant", "value": "1"}, "outputs": ["v"]},
                    {"op": {"kind": "operator", "name": "NOT"}, "inputs": ["r"], "outputs": [{"name": "q", "signal": "v"}]}
                 ],
                 "instances": [{"name": "u", "module": "sink",
                                "connections": {"s.valid": "v", "s.ready": "r"}}]}
            ]}"#,
        )
        .unwrap();
        let built = build_graph(&doc).unwrap();
        let g = &built.graph;
        let u = g[built.root].children()[2];
        let s = g[u].west()[0];
        assert_eq!(g.leaf_count(s), 2);
        let ready = g[s].children()[1];
        assert_eq!(g[ready].direction, PortDirection::Output);
        assert_eq!(g[ready].outgoing().len(), 1);
        let konst = g[built.root].children()[0];
        assert_eq!(g[konst].body_text.as_deref(), Some("1"));
    }

    #[test]
    fn external_ports_are_nodes() {
        let mut doc = parse_design(PASS_THROUGH).unwrap();
        doc.external_ports = true;
        let built = build_graph(&doc).unwrap();
        let g = &built.graph;
        assert!(g[built.root].west().is_empty());
        let a = g[built.root].children()[0];
        assert_eq!(g[a].kind, NodeKind::ExternalPort(PortDirection::Input));
        assert_eq!(g[g[a].east()[0]].direction, PortDirection::Output);
        assert!(built.diagnostics.is_empty());
    }

    #[test]
    fn opaque_instances_report_nothing() {
        let doc = parse_design(
            r#"{"top": "top", "modules": [
                {"name": "blackbox",
                 "ports": [{"name": "i", "direction": "input"}, {"name": "o", "direction": "output"}]},
                {"name": "top",
                 "ports": [{"name": "a", "direction": "input"}, {"name": "y", "direction": "output"}],
                 "instances": [{"name": "u", "module": "blackbox", "connections": {"i": "a", "o": "y"}}]}
            ]}"#,
        )
        .unwrap();
        let built = build_graph(&doc).unwrap();
        assert!(built.diagnostics.is_empty());
        let u = built.graph[built.root].children()[0];
        assert!(built.graph[u].edges().is_empty());
        assert_eq!(built.graph[built.root].edges().len(), 2);
    }

    #[test]
    fn self_instantiation_is_rejected() {
        let doc = parse_design(
            r#"{"top": "top", "modules": [
                {"name": "top", "instances": [{"name": "again", "module": "top"}]}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(
            build_graph(&doc),
            Err(DesignError::Recursive { .. })
        ));
    }
}
