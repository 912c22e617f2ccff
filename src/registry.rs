use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::metadata::MetadataStore;
use crate::{Node, NodeId, Result, StorageError};

/// The fixed, ordered set of storage nodes.
///
/// Built once at startup and read-only afterwards. Load figures are not
/// cached: every [`load_of`](NodeRegistry::load_of) call asks the metadata
/// store, so they include chunks written by concurrent uploads.
pub struct NodeRegistry {
    nodes: Vec<Node>,
    metadata: Arc<dyn MetadataStore>,
}

impl NodeRegistry {
    pub fn new(nodes: Vec<Node>, metadata: Arc<dyn MetadataStore>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(StorageError::Config("at least one storage node is required".to_string()));
        }

        let mut ids = HashSet::new();
        let mut roots = HashSet::new();
        for node in &nodes {
            if !ids.insert(&node.id) {
                return Err(StorageError::Config(format!("duplicate node id '{}'", node.id)));
            }
            if !roots.insert(&node.root) {
                return Err(StorageError::Config(format!(
                    "node '{}' reuses storage root {}",
                    node.id,
                    node.root.display()
                )));
            }
        }
        if nodes.len() == 1 {
            warn!("only one storage node configured; primary and replica copies will share it");
        }

        Ok(Self { nodes, metadata })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Round-robin pick: `sequence mod node_count`.
    pub fn node_at(&self, sequence: u64) -> &Node {
        let slot = (sequence % self.nodes.len() as u64) as usize;
        &self.nodes[slot]
    }

    /// Number of primary copies currently recorded on `node`.
    pub async fn load_of(&self, node: &NodeId) -> Result<u64> {
        self.metadata.count_primary_chunks_by_node(node).await
    }

    /// Which node owns `path`. The deepest matching root wins when roots nest.
    pub fn location_of(&self, path: &Path) -> Option<&NodeId> {
        self.nodes
            .iter()
            .filter(|node| path.starts_with(&node.root))
            .max_by_key(|node| node.root.components().count())
            .map(|node| &node.id)
    }

    /// Node pairs handed out to successive chunks of one upload, starting from
    /// `start`. Chunk `n` gets `(node_at(start + n), node_at(start + n + 1))`.
    pub fn rotation(&self, start: u64) -> Rotation<'_> {
        Rotation {
            registry: self,
            sequence: start,
        }
    }
}

/// Per-upload placement counter. Never shared between uploads.
pub struct Rotation<'a> {
    registry: &'a NodeRegistry,
    sequence: u64,
}

impl<'a> Rotation<'a> {
    /// Primary takes the current sequence value, replica the next one.
    pub fn next_pair(&mut self) -> (&'a Node, &'a Node) {
        let primary = self.registry.node_at(self.sequence);
        self.sequence += 1;
        let replica = self.registry.node_at(self.sequence);
        (primary, replica)
    }
}

impl<'a> Iterator for Rotation<'a> {
    type Item = (&'a Node, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_pair())
    }
}
