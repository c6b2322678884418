use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Languages the extractor understands. Gherkin `.feature` files are handled
/// by the line-based reader, not a grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Go,
    Python,
    Rust,
    Php,
    Java,
    Unknown,
}

impl Language {
    /// Detection is by filename extension only.
    pub fn detect(path: &str) -> Self {
        let ext = Path::new(path).extension().and_then(|e| e.to_str());
        match ext {
            Some("ts") | Some("tsx") => Language::TypeScript,
            Some("go") => Language::Go,
            Some("py") => Language::Python,
            Some("rs") => Language::Rust,
            Some("php") => Language::Php,
            Some("java") => Language::Java,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Php => "php",
            Language::Java => "java",
            Language::Unknown => "unknown",
        }
    }

    pub(crate) fn grammar(self) -> Option<tree_sitter::Language> {
        match self {
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Php => Some(tree_sitter_php::LANGUAGE_PHP.into()),
            Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
