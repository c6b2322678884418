use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Open property bag carried by every node. Values are arbitrary JSON.
pub type PropertyMap = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Code,
    Requirement,
    Feature,
    Test,
    GherkinFeature,
    GherkinScenario,
    StepDefinition,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Code => "Code",
            NodeKind::Requirement => "Requirement",
            NodeKind::Feature => "Feature",
            NodeKind::Test => "Test",
            NodeKind::GherkinFeature => "GherkinFeature",
            NodeKind::GherkinScenario => "GherkinScenario",
            NodeKind::StepDefinition => "StepDefinition",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Code" => Ok(NodeKind::Code),
            "Requirement" => Ok(NodeKind::Requirement),
            "Feature" => Ok(NodeKind::Feature),
            "Test" => Ok(NodeKind::Test),
            "GherkinFeature" => Ok(NodeKind::GherkinFeature),
            "GherkinScenario" => Ok(NodeKind::GherkinScenario),
            "StepDefinition" => Ok(NodeKind::StepDefinition),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    /// Requirement -> Feature
    Defines,
    /// Feature -> Code, Requirement -> Code
    ImplementedBy,
    /// Test/Scenario -> Requirement
    Verifies,
    /// GherkinScenario -> StepDefinition
    Executes,
    /// StepDefinition -> Code
    Calls,
    /// Requirement -> GherkinFeature
    DescribedBy,
    /// Code -> Code
    Imports,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeType::Defines => "DEFINES",
            EdgeType::ImplementedBy => "IMPLEMENTED_BY",
            EdgeType::Verifies => "VERIFIES",
            EdgeType::Executes => "EXECUTES",
            EdgeType::Calls => "CALLS",
            EdgeType::DescribedBy => "DESCRIBED_BY",
            EdgeType::Imports => "IMPORTS",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEFINES" => Ok(EdgeType::Defines),
            "IMPLEMENTED_BY" => Ok(EdgeType::ImplementedBy),
            "VERIFIES" => Ok(EdgeType::Verifies),
            "EXECUTES" => Ok(EdgeType::Executes),
            "CALLS" => Ok(EdgeType::Calls),
            "DESCRIBED_BY" => Ok(EdgeType::DescribedBy),
            "IMPORTS" => Ok(EdgeType::Imports),
            other => Err(format!("unknown edge type: {}", other)),
        }
    }
}

/// A single entity in the semantic graph: a code file, a requirement, a
/// feature, a Gherkin scenario, or a step definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: PropertyMap,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: PropertyMap,
}

impl Node {
    pub fn new<S: Into<String>>(id: S, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_property<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checked string read from `properties`; `None` on absence or type
    /// mismatch so that consumers can skip malformed nodes.
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    pub fn prop_u32(&self, key: &str) -> Option<u32> {
        self.properties
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    }

    pub fn prop_string_list(&self, key: &str) -> Option<Vec<String>> {
        let items = self.properties.get(key)?.as_array()?;
        items
            .iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect()
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// A directed relationship between two nodes. The (source, target, type)
/// triple is unique; edges are inserted or removed, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new<S: Into<String>, T: Into<String>>(source: S, target: T, edge_type: EdgeType) -> Self {
        Self {
            source_id: source.into(),
            target_id: target.into(),
            edge_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationKind {
    ArchLayerViolation,
    BddDrift,
}

/// A detected issue: an architectural layering breach or a Gherkin step
/// without an executable step definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub severity: Severity,
    pub kind: ViolationKind,
    pub message: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Standard properties for a Requirement node created through the query
/// surface. Stored in the node's open property bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementProps {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub priority: String,
    #[serde(default)]
    pub external_link: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

impl RequirementProps {
    pub fn into_properties(self) -> PropertyMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => PropertyMap::new(),
        }
    }
}

/// Stable id for a Gherkin feature node.
pub fn gherkin_feature_id(name: &str) -> String {
    format!("gh:feat:{}", name.replace(' ', "_"))
}

/// Stable id for a Gherkin scenario node.
pub fn gherkin_scenario_id(name: &str) -> String {
    format!("gh:scen:{}", name.replace(' ', "_"))
}

/// Stable id for a step definition node.
pub fn step_definition_id(function_name: &str, pattern: &str) -> String {
    format!("stepdef:{}:{}", function_name, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_type_round_trips_through_wire_strings() {
        for ty in [
            EdgeType::Defines,
            EdgeType::ImplementedBy,
            EdgeType::Verifies,
            EdgeType::Executes,
            EdgeType::Calls,
            EdgeType::DescribedBy,
            EdgeType::Imports,
        ] {
            assert_eq!(ty.to_string().parse::<EdgeType>(), Ok(ty));
        }
        assert_eq!(EdgeType::ImplementedBy.to_string(), "IMPLEMENTED_BY");
    }

    #[test]
    fn node_kind_round_trips() {
        for kind in [
            NodeKind::Code,
            NodeKind::Requirement,
            NodeKind::Feature,
            NodeKind::Test,
            NodeKind::GherkinFeature,
            NodeKind::GherkinScenario,
            NodeKind::StepDefinition,
        ] {
            assert_eq!(kind.to_string().parse::<NodeKind>(), Ok(kind));
        }
        assert!("Widget".parse::<NodeKind>().is_err());
    }

    #[test]
    fn checked_accessors_skip_type_mismatches() {
        let node = Node::new("n", NodeKind::GherkinScenario)
            .with_property("name", "login works")
            .with_property("line", 12u32)
            .with_property("steps", vec!["Given a user".to_string()]);

        assert_eq!(node.prop_str("name"), Some("login works"));
        assert_eq!(node.prop_u32("line"), Some(12));
        assert_eq!(
            node.prop_string_list("steps").as_deref(),
            Some(&["Given a user".to_string()][..])
        );

        // wrong types read as absent
        assert_eq!(node.prop_u32("name"), None);
        assert_eq!(node.prop_str("line"), None);
        assert_eq!(node.prop_string_list("line"), None);
    }

    #[test]
    fn id_conventions_are_stable() {
        assert_eq!(gherkin_feature_id("User Login"), "gh:feat:User_Login");
        assert_eq!(gherkin_scenario_id("Happy path"), "gh:scen:Happy_path");
        assert_eq!(
            step_definition_id("given_user", "a user named {word}"),
            "stepdef:given_user:a user named {word}"
        );
    }

    #[test]
    fn violation_serializes_with_wire_casing() {
        let v = Violation {
            severity: Severity::Critical,
            kind: ViolationKind::ArchLayerViolation,
            message: "m".into(),
            file: "f".into(),
            line: None,
        };
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["severity"], "CRITICAL");
        assert_eq!(json["kind"], "ARCH_LAYER_VIOLATION");
        assert!(json.get("line").is_none());
    }
}
