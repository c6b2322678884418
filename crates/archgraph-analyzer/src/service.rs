use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use archgraph_core::{
    AnalyzerConfig, EdgeType, Node, NodeKind, RequirementProps, Result, Violation,
};
use archgraph_graph::{SemanticGraph, Store};

use crate::analyzer::Analyzer;
use crate::watcher::{crawl, FileWatcher};

/// One row of the traceability matrix: a requirement, the code that
/// implements it, and the tests or scenarios that verify it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceabilityEntry {
    pub requirement_id: String,
    pub code: Vec<String>,
    pub verifiers: Vec<String>,
}

/// The language-agnostic query surface over a workspace: the contracts an
/// RPC or CLI shell would expose, with no transport attached.
pub struct WorkspaceService {
    root: PathBuf,
    analyzer: Arc<Analyzer>,
    config: AnalyzerConfig,
}

impl WorkspaceService {
    pub fn new(root: impl Into<PathBuf>, analyzer: Arc<Analyzer>, config: AnalyzerConfig) -> Self {
        Self {
            root: root.into(),
            analyzer,
            config,
        }
    }

    /// Full bootstrap for a workspace root: configuration, persistent store,
    /// graph load, initial crawl, step indexing, and the background watcher.
    pub fn open(root: &Path) -> Result<(Self, FileWatcher)> {
        let config = AnalyzerConfig::load(root)?;
        let store = Store::open(&root.join(&config.persistence_dir))?;
        let graph = Arc::new(SemanticGraph::open(store)?);
        let analyzer = Arc::new(Analyzer::new(graph));

        crawl(root, &analyzer, &config);
        analyzer.index_step_definitions()?;

        let watcher = FileWatcher::start(root, Arc::clone(&analyzer), &config)?;
        info!(root = %root.display(), nodes = analyzer.graph().node_count(), "workspace ready");

        Ok((Self::new(root, analyzer, config), watcher))
    }

    pub fn analyzer(&self) -> &Arc<Analyzer> {
        &self.analyzer
    }

    pub fn graph(&self) -> &Arc<SemanticGraph> {
        self.analyzer.graph()
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Impact of changing a code node: the features and requirements that
    /// transitively depend on it.
    pub fn blast_radius(&self, code_id: &str) -> serde_json::Value {
        let (features, requirements) = self.graph().blast_radius(code_id);
        json!({
            "code_id": code_id,
            "impacted_features": features,
            "impacted_requirements": requirements,
        })
    }

    /// Ensures a Requirement node exists (creating a placeholder if not) and
    /// records that `file_path` implements it.
    pub fn link_requirement(&self, file_path: &str, req_id: &str) -> Result<()> {
        if self.graph().get_node(req_id).is_none() {
            let props = RequirementProps {
                title: "Manually linked requirement".to_string(),
                ..Default::default()
            };
            let mut node = Node::new(req_id, NodeKind::Requirement);
            node.properties = props.into_properties();
            self.graph().add_node(node)?;
        }
        self.graph()
            .add_edge(req_id, file_path, EdgeType::ImplementedBy)
    }

    /// Creates the directory skeleton for a new feature. Side effect only;
    /// the graph picks the directories up through the watcher as files land.
    pub fn scaffold_feature(&self, name: &str, description: &str) -> Result<String> {
        let feature = name.to_lowercase();
        let base = self.root.join("src");
        let dirs = [
            base.join("domain").join(&feature).join("ports"),
            base.join("application").join(&feature),
            base.join("infrastructure").join("adapters"),
        ];
        for dir in &dirs {
            fs::create_dir_all(dir)?;
        }
        Ok(format!("Scaffolded feature '{}': {}", name, description))
    }

    pub fn index_step_definitions(&self) -> Result<()> {
        self.analyzer.index_step_definitions()
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.analyzer.find_violations()
    }

    pub fn status(&self) -> serde_json::Value {
        json!({
            "node_count": self.graph().node_count(),
            "status": "healthy",
        })
    }

    /// Markdown inventory of the graph, for humans.
    pub fn live_docs(&self) -> String {
        let mut nodes = self.graph().get_all_nodes();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut out = String::from("# Live Docs\n\n## Nodes\n");
        for node in nodes {
            out.push_str(&format!("- **{}** ({})\n", node.id, node.kind));
        }
        out
    }

    /// For each requirement: what implements it (forward IMPLEMENTED_BY) and
    /// what verifies it (reverse VERIFIES).
    pub fn traceability_matrix(&self) -> Vec<TraceabilityEntry> {
        let mut requirements = self.graph().nodes_of_kind(NodeKind::Requirement);
        requirements.sort_by(|a, b| a.id.cmp(&b.id));

        requirements
            .into_iter()
            .map(|req| {
                let code = self
                    .graph()
                    .edges_from(&req.id)
                    .into_iter()
                    .filter(|e| e.edge_type == EdgeType::ImplementedBy)
                    .map(|e| e.target_id)
                    .collect();
                let verifiers = self
                    .graph()
                    .edges_to(&req.id)
                    .into_iter()
                    .filter(|e| e.edge_type == EdgeType::Verifies)
                    .map(|e| e.source_id)
                    .collect();
                TraceabilityEntry {
                    requirement_id: req.id,
                    code,
                    verifiers,
                }
            })
            .collect()
    }
}
