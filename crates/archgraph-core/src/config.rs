use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Workspace configuration, read from `<root>/analyzer.json`. A missing file
/// yields the full default; missing fields take their individual defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "AnalyzerConfig::default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,
    #[serde(default = "AnalyzerConfig::default_included_layers")]
    pub included_layers: Vec<String>,
    #[serde(default = "AnalyzerConfig::default_persistence_dir")]
    pub persistence_dir: String,
}

impl AnalyzerConfig {
    fn default_excluded_dirs() -> Vec<String> {
        ["node_modules", "dist", "build", ".git", "vendor"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn default_included_layers() -> Vec<String> {
        ["domain", "application", "infrastructure", "interface"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn default_persistence_dir() -> String {
        ".analyzer".to_string()
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join("analyzer.json");
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&content)?)
    }

    /// Name of the final path segment of the persistence directory, used by
    /// the watcher's ignore rules.
    pub fn persistence_dir_name(&self) -> &str {
        Path::new(&self.persistence_dir)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.persistence_dir)
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            excluded_dirs: Self::default_excluded_dirs(),
            included_layers: Self::default_included_layers(),
            persistence_dir: Self::default_persistence_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = AnalyzerConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.persistence_dir, ".analyzer");
        assert!(cfg.excluded_dirs.contains(&"node_modules".to_string()));
        assert_eq!(cfg.included_layers.len(), 4);
    }

    #[test]
    fn partial_file_keeps_field_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("analyzer.json"),
            r#"{ "persistence_dir": ".cache/graph" }"#,
        )
        .unwrap();

        let cfg = AnalyzerConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.persistence_dir, ".cache/graph");
        assert_eq!(cfg.persistence_dir_name(), "graph");
        assert!(cfg.excluded_dirs.contains(&"vendor".to_string()));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("analyzer.json"), "not json").unwrap();
        assert!(AnalyzerConfig::load(dir.path()).is_err());
    }
}
