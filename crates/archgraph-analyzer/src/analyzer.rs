use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use archgraph_core::{
    gherkin_feature_id, gherkin_scenario_id, step_definition_id, EdgeType, Node, NodeKind, Result,
    Severity, Violation, ViolationKind,
};
use archgraph_graph::SemanticGraph;
use archgraph_parser::{parse_gherkin, parse_imports, parse_step_definitions, Language};

use crate::matcher::{clean_step_text, StepMatcher};
use crate::resolver::ImportResolver;

/// Orchestrates per-file analysis: parse, classify, upsert nodes and edges,
/// and derive violations over the resulting graph.
///
/// Mutating entry points are serialized by construction (single watcher loop
/// or single crawl task); the resolver caches carry their own locks in case a
/// caller fans out anyway.
pub struct Analyzer {
    graph: Arc<SemanticGraph>,
    resolver: ImportResolver,
    matcher: StepMatcher,
}

/// First path-substring match wins; `/api/` counts as the interface layer.
pub fn detect_layer(path: &str) -> Option<&'static str> {
    if path.contains("/domain/") {
        Some("domain")
    } else if path.contains("/application/") {
        Some("application")
    } else if path.contains("/infrastructure/") {
        Some("infrastructure")
    } else if path.contains("/interface/") || path.contains("/api/") {
        Some("interface")
    } else {
        None
    }
}

impl Analyzer {
    pub fn new(graph: Arc<SemanticGraph>) -> Self {
        Self {
            graph,
            resolver: ImportResolver::new(),
            matcher: StepMatcher::new(),
        }
    }

    pub fn graph(&self) -> &Arc<SemanticGraph> {
        &self.graph
    }

    /// Analyzes a single file. Module manifests update the resolver caches,
    /// `.feature` files take the Gherkin path, everything else becomes a Code
    /// node with import edges and, on test-bearing paths, step definitions.
    pub fn analyze_file(&self, path: &str, content: &str) -> Result<()> {
        let basename = Path::new(path)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if basename == "tsconfig.json" {
            self.resolver.load_tsconfig(path, content);
            return Ok(());
        }
        if basename == "go.mod" {
            self.resolver.load_gomod(path, content);
            return Ok(());
        }

        if path.ends_with(".feature") {
            return self.analyze_gherkin(path, content);
        }

        let layer = detect_layer(path);
        let lang = Language::detect(path);

        if lang == Language::Unknown {
            // Only layered files are worth a node without a parser.
            if let Some(layer) = layer {
                self.graph.add_node(
                    Node::new(path, NodeKind::Code)
                        .with_metadata("layer", layer)
                        .with_metadata("language", "unknown"),
                )?;
            }
            return Ok(());
        }

        let mut node = Node::new(path, NodeKind::Code).with_metadata("language", lang.as_str());
        if let Some(layer) = layer {
            node = node.with_metadata("layer", layer);
        }
        self.graph.add_node(node)?;

        for import in parse_imports(content, lang) {
            let target = self.resolver.resolve(path, &import, lang);
            // The target node may not exist yet; dangling edges are allowed.
            self.graph.add_edge(path, &target, EdgeType::Imports)?;
        }

        if layer == Some("interface") || path.contains("test") || path.contains("steps") {
            for def in parse_step_definitions(content, lang) {
                let step_id = step_definition_id(&def.function_name, &def.pattern);
                self.graph.add_node(
                    Node::new(&step_id, NodeKind::StepDefinition)
                        .with_property("pattern", def.pattern)
                        .with_property("function_name", def.function_name)
                        .with_property("filepath", path)
                        .with_property("line", def.line),
                )?;
                self.graph.add_edge(&step_id, path, EdgeType::Calls)?;
            }
        }

        debug!(path, language = lang.as_str(), "analyzed");
        Ok(())
    }

    fn analyze_gherkin(&self, path: &str, content: &str) -> Result<()> {
        let feature = parse_gherkin(content);

        let feature_id = gherkin_feature_id(&feature.name);
        self.graph.add_node(
            Node::new(&feature_id, NodeKind::GherkinFeature)
                .with_property("name", feature.name.clone())
                .with_property("file", path),
        )?;

        for scenario in feature.scenarios {
            let scenario_id = gherkin_scenario_id(&scenario.name);
            self.graph.add_node(
                Node::new(&scenario_id, NodeKind::GherkinScenario)
                    .with_property("name", scenario.name)
                    .with_property("file", path)
                    .with_property("steps_hash", scenario.steps_hash)
                    .with_property("line", scenario.line)
                    .with_property("steps", scenario.steps),
            )?;
        }
        Ok(())
    }

    /// Links scenarios to the step definitions that execute their steps.
    /// Only adds edges; obsolete links disappear with their endpoints.
    pub fn index_step_definitions(&self) -> Result<()> {
        let scenarios = self.graph.nodes_of_kind(NodeKind::GherkinScenario);
        let step_defs = self.graph.nodes_of_kind(NodeKind::StepDefinition);

        for scenario in &scenarios {
            let Some(steps) = scenario.prop_string_list("steps") else {
                continue;
            };
            for step in &steps {
                let cleaned = clean_step_text(step);
                for def in &step_defs {
                    let Some(pattern) = def.prop_str("pattern") else {
                        continue;
                    };
                    if self.matcher.matches(&cleaned, pattern) {
                        self.graph
                            .add_edge(&scenario.id, &def.id, EdgeType::Executes)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Import targets are filename-level: a resolved id usually lacks the
    /// extension the analyzed file carries, so the layer lookup probes the
    /// known source extensions before declaring a target dangling.
    fn lookup_import_target(&self, target_id: &str) -> Option<Node> {
        if let Some(node) = self.graph.get_node(target_id) {
            return Some(node);
        }
        for ext in ["ts", "tsx", "go", "py", "rs", "php", "java"] {
            if let Some(node) = self.graph.get_node(&format!("{}.{}", target_id, ext)) {
                return Some(node);
            }
        }
        None
    }

    /// Two passes over the graph: architectural layer rules over `IMPORTS`
    /// edges, then BDD drift over scenario steps.
    pub fn find_violations(&self) -> Vec<Violation> {
        let mut violations = Vec::new();

        for node in self.graph.nodes_of_kind(NodeKind::Code) {
            let Some(layer) = node.meta_str("layer") else {
                continue;
            };

            for edge in self.graph.edges_from(&node.id) {
                if edge.edge_type != EdgeType::Imports {
                    continue;
                }

                let Some(target) = self.lookup_import_target(&edge.target_id) else {
                    // Dangling target: judged by its id alone.
                    if layer == "domain" && edge.target_id.contains("infrastructure") {
                        violations.push(Violation {
                            severity: Severity::Critical,
                            kind: ViolationKind::ArchLayerViolation,
                            message: format!(
                                "Domain rule broken: '{}' imports '{}' (infrastructure).",
                                node.id, edge.target_id
                            ),
                            file: node.id.clone(),
                            line: None,
                        });
                    }
                    continue;
                };

                let Some(target_layer) = target.meta_str("layer") else {
                    continue;
                };

                if layer == "domain"
                    && (target_layer == "infrastructure" || target_layer == "application")
                {
                    violations.push(Violation {
                        severity: Severity::Critical,
                        kind: ViolationKind::ArchLayerViolation,
                        message: format!(
                            "Domain rule broken: '{}' imports '{}' ({}).",
                            node.id, target.id, target_layer
                        ),
                        file: node.id.clone(),
                        line: None,
                    });
                }
                if layer == "application" && target_layer == "infrastructure" {
                    violations.push(Violation {
                        severity: Severity::Warning,
                        kind: ViolationKind::ArchLayerViolation,
                        message: format!(
                            "Application alert: '{}' imports '{}' (infrastructure); should use ports.",
                            node.id, target.id
                        ),
                        file: node.id.clone(),
                        line: None,
                    });
                }
            }
        }

        let scenarios = self.graph.nodes_of_kind(NodeKind::GherkinScenario);
        let step_defs = self.graph.nodes_of_kind(NodeKind::StepDefinition);

        for scenario in &scenarios {
            let Some(steps) = scenario.prop_string_list("steps") else {
                continue;
            };
            let Some(file) = scenario.prop_str("file") else {
                continue;
            };

            for step in &steps {
                let cleaned = clean_step_text(step);
                let matched = step_defs.iter().any(|def| {
                    def.prop_str("pattern")
                        .is_some_and(|pattern| self.matcher.matches(&cleaned, pattern))
                });

                if !matched {
                    violations.push(Violation {
                        severity: Severity::Warning,
                        kind: ViolationKind::BddDrift,
                        message: format!(
                            "BDD drift: step '{}' in '{}' has no matching step definition.",
                            step, scenario.id
                        ),
                        file: file.to_string(),
                        line: scenario.prop_u32("line"),
                    });
                }
            }
        }

        violations
    }
}
