use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use parking_lot::RwLock;

use archgraph_core::{Edge, EdgeType, Node, NodeKind, Result};

use crate::store::Store;

/// In-memory semantic graph with write-through persistence.
///
/// Owns the node table and both adjacency indexes; every mutator takes the
/// exclusive lock, every reader the shared one, and all returned collections
/// are copies. The store is only ever called while the exclusive lock is
/// held, so its writes are serialized by construction.
pub struct SemanticGraph {
    inner: RwLock<GraphInner>,
    store: Option<Store>,
}

#[derive(Default)]
struct GraphInner {
    nodes: HashMap<String, Node>,
    edges_from: HashMap<String, Vec<Edge>>,
    edges_to: HashMap<String, Vec<Edge>>,
}

impl GraphInner {
    /// Inserts into both indexes unless the (source, target, type) triple is
    /// already present. Returns whether the edge was genuinely new.
    fn insert_edge(&mut self, edge: Edge) -> bool {
        if let Some(existing) = self.edges_from.get(&edge.source_id) {
            if existing
                .iter()
                .any(|e| e.target_id == edge.target_id && e.edge_type == edge.edge_type)
            {
                return false;
            }
        }
        self.edges_from
            .entry(edge.source_id.clone())
            .or_default()
            .push(edge.clone());
        self.edges_to
            .entry(edge.target_id.clone())
            .or_default()
            .push(edge);
        true
    }

    fn remove_forward_edges(&mut self, source_id: &str, target_id: &str) {
        if let Some(edges) = self.edges_from.get_mut(source_id) {
            edges.retain(|e| e.target_id != target_id);
            if edges.is_empty() {
                self.edges_from.remove(source_id);
            }
        }
    }

    fn remove_reverse_edges(&mut self, target_id: &str, source_id: &str) {
        if let Some(edges) = self.edges_to.get_mut(target_id) {
            edges.retain(|e| e.source_id != source_id);
            if edges.is_empty() {
                self.edges_to.remove(target_id);
            }
        }
    }
}

impl SemanticGraph {
    /// Builds a graph backed by `store`, loading its full contents through
    /// internal helpers that skip write-back.
    pub fn open(store: Store) -> Result<Self> {
        let (nodes, edges) = store.load_all()?;
        let mut inner = GraphInner::default();
        for node in nodes {
            inner.nodes.insert(node.id.clone(), node);
        }
        for edge in edges {
            inner.insert_edge(edge);
        }
        Ok(Self {
            inner: RwLock::new(inner),
            store: Some(store),
        })
    }

    /// An unpersisted graph, for tests and one-shot analysis.
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(GraphInner::default()),
            store: None,
        }
    }

    /// Upserts the node and writes it through to the store.
    pub fn add_node(&self, node: Node) -> Result<()> {
        let mut inner = self.inner.write();
        if let Some(store) = &self.store {
            store.save_node(&node)?;
        }
        inner.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Removes the node and every edge with it on either side, in memory and
    /// in the store. Silently returns if the id is absent.
    pub fn remove_node(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.nodes.remove(id).is_none() {
            return Ok(());
        }

        if let Some(outgoing) = inner.edges_from.remove(id) {
            for edge in outgoing {
                inner.remove_reverse_edges(&edge.target_id, id);
            }
        }
        if let Some(incoming) = inner.edges_to.remove(id) {
            for edge in incoming {
                inner.remove_forward_edges(&edge.source_id, id);
            }
        }

        if let Some(store) = &self.store {
            store.delete_node(id)?;
        }
        Ok(())
    }

    /// Adds a directed edge; duplicate (source, target, type) triples are
    /// no-ops. The endpoints need not exist — dangling edges are first-class.
    pub fn add_edge(&self, source_id: &str, target_id: &str, edge_type: EdgeType) -> Result<()> {
        let mut inner = self.inner.write();
        let edge = Edge::new(source_id, target_id, edge_type);
        if inner.insert_edge(edge.clone()) {
            if let Some(store) = &self.store {
                store.save_edge(&edge)?;
            }
        }
        Ok(())
    }

    pub fn get_node(&self, id: &str) -> Option<Node> {
        self.inner.read().nodes.get(id).cloned()
    }

    pub fn get_all_nodes(&self) -> Vec<Node> {
        self.inner.read().nodes.values().cloned().collect()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<Node> {
        self.inner
            .read()
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .cloned()
            .collect()
    }

    pub fn edges_from(&self, source_id: &str) -> Vec<Edge> {
        self.inner
            .read()
            .edges_from
            .get(source_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn edges_to(&self, target_id: &str) -> Vec<Edge> {
        self.inner
            .read()
            .edges_to
            .get(target_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().nodes.len()
    }

    /// Reverse breadth-first search from `code_id` along the semantic
    /// depends-on edges (IMPLEMENTED_BY, DEFINES, CALLS), collecting the
    /// Feature and Requirement ids that transitively depend on the node.
    /// IMPORTS is deliberately excluded so an importing file does not drag
    /// its own upstream requirements into an unrelated change.
    pub fn blast_radius(&self, code_id: &str) -> (Vec<String>, Vec<String>) {
        let inner = self.inner.read();

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut features: BTreeSet<String> = BTreeSet::new();
        let mut requirements: BTreeSet<String> = BTreeSet::new();

        visited.insert(code_id.to_string());
        queue.push_back(code_id.to_string());

        while let Some(current) = queue.pop_front() {
            let Some(incoming) = inner.edges_to.get(&current) else {
                continue;
            };
            for edge in incoming {
                if visited.contains(&edge.source_id) {
                    continue;
                }
                let Some(source) = inner.nodes.get(&edge.source_id) else {
                    continue;
                };
                if !matches!(
                    edge.edge_type,
                    EdgeType::ImplementedBy | EdgeType::Defines | EdgeType::Calls
                ) {
                    continue;
                }

                visited.insert(edge.source_id.clone());
                queue.push_back(edge.source_id.clone());

                match source.kind {
                    NodeKind::Feature => {
                        features.insert(source.id.clone());
                    }
                    NodeKind::Requirement => {
                        requirements.insert(source.id.clone());
                    }
                    _ => {}
                }
            }
        }

        (
            features.into_iter().collect(),
            requirements.into_iter().collect(),
        )
    }

    /// Wipes the in-memory state. The store is not emptied — this exists for
    /// tests that reuse a graph instance.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        *inner = GraphInner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(id: &str) -> Node {
        Node::new(id, NodeKind::Code)
    }

    #[test]
    fn adjacency_stays_symmetric() {
        let g = SemanticGraph::in_memory();
        g.add_node(code("a")).unwrap();
        g.add_node(code("b")).unwrap();
        g.add_node(code("c")).unwrap();
        g.add_edge("a", "b", EdgeType::Imports).unwrap();
        g.add_edge("b", "c", EdgeType::Imports).unwrap();
        g.add_edge("c", "a", EdgeType::Calls).unwrap();

        let inner = g.inner.read();
        for edges in inner.edges_from.values() {
            for e in edges {
                let reverse = inner.edges_to.get(&e.target_id).unwrap();
                assert!(reverse.contains(e));
            }
        }
        for edges in inner.edges_to.values() {
            for e in edges {
                let forward = inner.edges_from.get(&e.source_id).unwrap();
                assert!(forward.contains(e));
            }
        }
    }

    #[test]
    fn duplicate_edges_are_suppressed() {
        let g = SemanticGraph::in_memory();
        g.add_edge("a", "b", EdgeType::Imports).unwrap();
        g.add_edge("a", "b", EdgeType::Imports).unwrap();
        g.add_edge("a", "b", EdgeType::Calls).unwrap();

        assert_eq!(g.edges_from("a").len(), 2);
        assert_eq!(g.edges_to("b").len(), 2);
    }

    #[test]
    fn remove_node_cascades_both_directions() {
        let g = SemanticGraph::in_memory();
        g.add_node(code("n1")).unwrap();
        g.add_node(code("n2")).unwrap();
        g.add_edge("n1", "n2", EdgeType::Imports).unwrap();
        g.add_edge("n2", "n1", EdgeType::Calls).unwrap();

        g.remove_node("n1").unwrap();

        assert!(g.get_node("n1").is_none());
        assert!(g.edges_to("n2").is_empty());
        assert!(g.edges_from("n2").is_empty());
        // absent id is a no-op
        g.remove_node("n1").unwrap();
    }

    #[test]
    fn blast_radius_follows_semantic_edges_only() {
        let g = SemanticGraph::in_memory();
        g.add_node(code("file:code")).unwrap();
        g.add_node(Node::new("req:R", NodeKind::Requirement)).unwrap();
        g.add_node(Node::new("feat:F", NodeKind::Feature)).unwrap();
        g.add_node(Node::new("stepdef:S", NodeKind::StepDefinition))
            .unwrap();
        g.add_node(code("importer.ts")).unwrap();

        g.add_edge("req:R", "file:code", EdgeType::ImplementedBy)
            .unwrap();
        g.add_edge("feat:F", "file:code", EdgeType::ImplementedBy)
            .unwrap();
        g.add_edge("stepdef:S", "file:code", EdgeType::Calls).unwrap();
        // imports must not pull the importer's upstream in
        g.add_edge("importer.ts", "file:code", EdgeType::Imports)
            .unwrap();
        g.add_edge("req:unrelated", "importer.ts", EdgeType::ImplementedBy)
            .unwrap();

        let (features, requirements) = g.blast_radius("file:code");
        assert_eq!(features, vec!["feat:F".to_string()]);
        assert_eq!(requirements, vec!["req:R".to_string()]);
    }

    #[test]
    fn blast_radius_transits_intermediate_nodes() {
        let g = SemanticGraph::in_memory();
        g.add_node(code("leaf")).unwrap();
        g.add_node(code("mid")).unwrap();
        g.add_node(Node::new("req:deep", NodeKind::Requirement))
            .unwrap();

        g.add_edge("mid", "leaf", EdgeType::Calls).unwrap();
        g.add_edge("req:deep", "mid", EdgeType::ImplementedBy)
            .unwrap();

        let (_, requirements) = g.blast_radius("leaf");
        assert_eq!(requirements, vec!["req:deep".to_string()]);
    }

    #[test]
    fn clear_resets_memory_only() {
        let g = SemanticGraph::in_memory();
        g.add_node(code("a")).unwrap();
        g.add_edge("a", "b", EdgeType::Imports).unwrap();
        g.clear();
        assert_eq!(g.node_count(), 0);
        assert!(g.edges_from("a").is_empty());
    }
}
