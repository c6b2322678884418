use std::fs;
use std::path::Path;
use std::str::FromStr;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::warn;

use archgraph_core::{ArchGraphError, Edge, EdgeType, Node, NodeKind, Result};

const DB_FILE: &str = "graph.db";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    kind TEXT,
    properties TEXT,
    metadata TEXT
);
CREATE TABLE IF NOT EXISTS edges (
    source_id TEXT,
    target_id TEXT,
    type TEXT,
    PRIMARY KEY (source_id, target_id, type)
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
";

/// Durable storage for nodes and edges, one SQLite file per workspace.
///
/// The graph serializes writes behind its own lock; the connection mutex here
/// only protects against interleaved statements on the shared handle.
pub struct Store {
    conn: Mutex<Connection>,
}

fn store_err(e: rusqlite::Error) -> ArchGraphError {
    ArchGraphError::Store(e.to_string())
}

impl Store {
    /// Creates `dir` if missing, opens `graph.db` inside it and applies the
    /// schema idempotently.
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(DB_FILE)).map_err(store_err)?;
        conn.execute_batch(SCHEMA).map_err(store_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Upsert by id: kind, properties and metadata are replaced atomically.
    pub fn save_node(&self, node: &Node) -> Result<()> {
        let properties = serde_json::to_string(&node.properties)?;
        let metadata = serde_json::to_string(&node.metadata)?;
        self.conn
            .lock()
            .execute(
                "INSERT INTO nodes (id, kind, properties, metadata)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                     kind = excluded.kind,
                     properties = excluded.properties,
                     metadata = excluded.metadata",
                params![node.id, node.kind.to_string(), properties, metadata],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Removes the node row and every edge row touching it, in a single
    /// transaction.
    pub fn delete_node(&self, id: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(store_err)?;
        tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])
            .map_err(store_err)?;
        tx.execute(
            "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
            params![id],
        )
        .map_err(store_err)?;
        tx.commit().map_err(store_err)?;
        Ok(())
    }

    /// Insert-or-ignore on the (source, target, type) primary key.
    pub fn save_edge(&self, edge: &Edge) -> Result<()> {
        self.conn
            .lock()
            .execute(
                "INSERT OR IGNORE INTO edges (source_id, target_id, type)
                 VALUES (?1, ?2, ?3)",
                params![edge.source_id, edge.target_id, edge.edge_type.to_string()],
            )
            .map_err(store_err)?;
        Ok(())
    }

    /// Returns every node and edge. Rows with unreadable JSON blobs get empty
    /// property maps instead of aborting the load; rows with unknown kind or
    /// type strings are skipped with a warning.
    pub fn load_all(&self) -> Result<(Vec<Node>, Vec<Edge>)> {
        let conn = self.conn.lock();

        let mut nodes = Vec::new();
        let mut stmt = conn
            .prepare("SELECT id, kind, properties, metadata FROM nodes")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(store_err)?;
        for row in rows {
            let (id, kind, properties, metadata) = row.map_err(store_err)?;
            let kind = match NodeKind::from_str(&kind) {
                Ok(kind) => kind,
                Err(e) => {
                    warn!(id = %id, error = %e, "skipping persisted node");
                    continue;
                }
            };
            nodes.push(Node {
                id,
                kind,
                properties: serde_json::from_str(&properties).unwrap_or_default(),
                metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            });
        }

        let mut edges = Vec::new();
        let mut stmt = conn
            .prepare("SELECT source_id, target_id, type FROM edges")
            .map_err(store_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(store_err)?;
        for row in rows {
            let (source_id, target_id, edge_type) = row.map_err(store_err)?;
            let edge_type = match EdgeType::from_str(&edge_type) {
                Ok(ty) => ty,
                Err(e) => {
                    warn!(source = %source_id, target = %target_id, error = %e, "skipping persisted edge");
                    continue;
                }
            };
            edges.push(Edge {
                source_id,
                target_id,
                edge_type,
            });
        }

        Ok((nodes, edges))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archgraph_core::NodeKind;
    use tempfile::TempDir;

    fn sample_node(id: &str) -> Node {
        Node::new(id, NodeKind::Code)
            .with_metadata("layer", "domain")
            .with_metadata("language", "typescript")
    }

    #[test]
    fn open_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        drop(store);
        // Second open re-applies the schema on the existing file.
        Store::open(dir.path()).unwrap();
    }

    #[test]
    fn save_node_upserts() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.save_node(&sample_node("a.ts")).unwrap();
        let updated = Node::new("a.ts", NodeKind::Code).with_metadata("layer", "application");
        store.save_node(&updated).unwrap();

        let (nodes, _) = store.load_all().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].meta_str("layer"), Some("application"));
        assert_eq!(nodes[0].meta_str("language"), None);
    }

    #[test]
    fn save_edge_ignores_duplicates() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let edge = Edge::new("a", "b", EdgeType::Imports);
        store.save_edge(&edge).unwrap();
        store.save_edge(&edge).unwrap();

        let (_, edges) = store.load_all().unwrap();
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn delete_node_cascades_to_edges() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();

        store.save_node(&sample_node("a")).unwrap();
        store.save_node(&sample_node("b")).unwrap();
        store.save_edge(&Edge::new("a", "b", EdgeType::Imports)).unwrap();
        store.save_edge(&Edge::new("b", "a", EdgeType::Calls)).unwrap();

        store.delete_node("a").unwrap();

        let (nodes, edges) = store.load_all().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "b");
        assert!(edges.is_empty());
    }

    #[test]
    fn corrupt_json_loads_as_empty_maps() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path()).unwrap();
        store
            .conn
            .lock()
            .execute(
                "INSERT INTO nodes (id, kind, properties, metadata)
                 VALUES ('n', 'Code', 'not-json', '{broken')",
                [],
            )
            .unwrap();

        let (nodes, _) = store.load_all().unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(nodes[0].properties.is_empty());
        assert!(nodes[0].metadata.is_empty());
    }

    #[test]
    fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store
                .save_node(&Node::new("n1", NodeKind::Code).with_metadata("foo", "bar"))
                .unwrap();
            store
                .save_edge(&Edge::new("n1", "n2", EdgeType::Imports))
                .unwrap();
        }

        let store = Store::open(dir.path()).unwrap();
        let (nodes, edges) = store.load_all().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].meta_str("foo"), Some("bar"));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target_id, "n2");
    }
}
