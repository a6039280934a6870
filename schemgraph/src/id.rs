// id.rs — Dense, deterministic integer identities for exported elements
//
// Ids are handed out in first-registration order, so a traversal that visits
// nodes, then ports, then edges in a fixed order yields identical ids for
// structurally identical graphs. Keys may be qualified by a path prefix so the
// same arena element reached through different shared-body borrowers gets
// distinct ids.
//
// Preconditions: none.
// Postconditions: ids are dense in `0..len()`; `register` is idempotent.
// Failure modes: lookup of an unregistered key → `GraphError::Structure`
//                (`require`) or panic (`Index`).
// Side effects: none.

use std::ops::Index;

use indexmap::IndexMap;

use crate::arena::{EdgeId, NodeId, PortId};
use crate::graph::GraphError;
use crate::view::PathPrefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Item {
    Node(NodeId),
    Port(PortId),
    Edge(EdgeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdKey {
    pub prefix: PathPrefix,
    pub item: Item,
}

impl IdKey {
    pub fn new(prefix: &PathPrefix, item: Item) -> Self {
        Self {
            prefix: prefix.clone(),
            item,
        }
    }
}

#[derive(Debug, Default)]
pub struct IdStore {
    ids: IndexMap<IdKey, u32>,
    next: u32,
}

impl IdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of `item` under `prefix`, allocating the next one on first sight.
    pub fn register(&mut self, prefix: &PathPrefix, item: Item) -> u32 {
        let key = IdKey::new(prefix, item);
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.next;
        self.next += 1;
        self.ids.insert(key, id);
        id
    }

    /// Make `item` under `prefix` resolve to an already allocated id.
    pub fn alias(&mut self, prefix: &PathPrefix, item: Item, id: u32) -> Result<(), GraphError> {
        let key = IdKey::new(prefix, item);
        match self.ids.get(&key) {
            Some(&existing) if existing != id => Err(GraphError::Structure {
                message: format!(
                    "{:?} under '{}' already has id {}, cannot alias to {}",
                    item, prefix, existing, id
                ),
            }),
            _ => {
                self.ids.insert(key, id);
                Ok(())
            }
        }
    }

    pub fn get(&self, prefix: &PathPrefix, item: Item) -> Option<u32> {
        self.ids.get(&IdKey::new(prefix, item)).copied()
    }

    pub fn require(&self, prefix: &PathPrefix, item: Item) -> Result<u32, GraphError> {
        self.get(prefix, item).ok_or_else(|| GraphError::Structure {
            message: format!("{:?} under '{}' was never registered", item, prefix),
        })
    }

    /// Highest allocated id; `None` while the store is empty.
    pub fn max_id(&self) -> Option<u32> {
        self.next.checked_sub(1)
    }

    /// Number of allocated ids (aliases excluded).
    pub fn len(&self) -> usize {
        self.next as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

impl Index<&IdKey> for IdStore {
    type Output = u32;

    fn index(&self, key: &IdKey) -> &u32 {
        self.ids
            .get(key)
            .unwrap_or_else(|| panic!("unregistered id key {:?}", key))
    }
}
