// view.rs — Path-qualified views over nodes with shared bodies
//
// A node that shares its body with another node has no children of its own.
// Walking the hierarchy through `NodeView` substitutes the borrowed subtree and
// extends the path prefix with the borrowing node, so every element of the
// borrowed subtree gets a distinct, path-qualified identity per borrower.
//
// Preconditions: nodes with `shares_body_with` set have no own children.
// Postconditions: none (read-only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::arena::NodeId;
use crate::graph::Graph;

/// Chain of borrowing nodes leading to a borrowed element; empty at the top.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathPrefix(Vec<NodeId>);

impl PathPrefix {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, node: NodeId) -> Self {
        let mut path = self.0.clone();
        path.push(node);
        Self(path)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.0
    }
}

impl fmt::Display for PathPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, n) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{n:?}")?;
        }
        Ok(())
    }
}

/// A node seen under a path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeView {
    pub node: NodeId,
    pub prefix: PathPrefix,
}

impl NodeView {
    pub fn root(node: NodeId) -> Self {
        Self {
            node,
            prefix: PathPrefix::root(),
        }
    }

    /// Node whose children and edges this view exposes.
    pub fn body(&self, graph: &Graph) -> NodeId {
        graph[self.node].shares_body_with().unwrap_or(self.node)
    }

    pub fn is_shared(&self, graph: &Graph) -> bool {
        graph[self.node].shares_body_with().is_some()
    }

    /// Prefix under which the body's children, edges and inner ports resolve.
    pub fn inner_prefix(&self, graph: &Graph) -> PathPrefix {
        if self.is_shared(graph) {
            self.prefix.child(self.node)
        } else {
            self.prefix.clone()
        }
    }

    /// Effective children: own children, or the borrowed body's children
    /// under the extended prefix.
    pub fn children(&self, graph: &Graph) -> Vec<NodeView> {
        let prefix = self.inner_prefix(graph);
        graph[self.body(graph)]
            .children()
            .iter()
            .map(|&node| NodeView {
                node,
                prefix: prefix.clone(),
            })
            .collect()
    }
}
