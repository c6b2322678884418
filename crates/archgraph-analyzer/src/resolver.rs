use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use archgraph_parser::Language;

/// The slice of `tsconfig.json` the resolver consumes.
#[derive(Debug, Clone, Default, Deserialize)]
struct TsConfigFile {
    #[serde(default, rename = "compilerOptions")]
    compiler_options: TsCompilerOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TsCompilerOptions {
    #[serde(default, rename = "baseUrl")]
    base_url: String,
    #[serde(default)]
    paths: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
struct TsConfig {
    base_url: String,
    paths: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
struct GoMod {
    module: String,
}

static GO_MODULE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"module\s+(\S+)").expect("static regex"));

/// Maps an import token plus its source file path to a canonical target id.
///
/// Module manifests (`tsconfig.json`, `go.mod`) are cached by directory as
/// the analyzer encounters them; resolution walks upward from the importing
/// file until a cache hit or the filesystem root. Both caches are lock-guarded
/// so the analyzer stays safe to call from more than one task.
#[derive(Default)]
pub struct ImportResolver {
    ts_configs: RwLock<HashMap<PathBuf, TsConfig>>,
    go_mods: RwLock<HashMap<PathBuf, GoMod>>,
}

impl ImportResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches the `compilerOptions.baseUrl` / `paths` of a tsconfig under its
    /// directory. Unparseable manifests are ignored.
    pub fn load_tsconfig(&self, path: &str, content: &str) {
        let Ok(raw) = serde_json::from_str::<TsConfigFile>(content) else {
            debug!(path, "ignoring unparseable tsconfig.json");
            return;
        };
        let dir = parent_dir(path);
        self.ts_configs.write().insert(
            PathBuf::from(dir),
            TsConfig {
                base_url: raw.compiler_options.base_url,
                paths: raw.compiler_options.paths,
            },
        );
    }

    /// Caches the `module` line of a go.mod under its directory.
    pub fn load_gomod(&self, path: &str, content: &str) {
        let Some(captures) = GO_MODULE_RE.captures(content) else {
            debug!(path, "go.mod without module line");
            return;
        };
        let dir = parent_dir(path);
        self.go_mods.write().insert(
            PathBuf::from(dir),
            GoMod {
                module: captures[1].to_string(),
            },
        );
    }

    /// Resolves `import_str` as seen from `source_path` into a target node
    /// id. Resolution failures return the raw token: the resulting dangling
    /// edge is first-class and feeds the violation heuristics.
    pub fn resolve(&self, source_path: &str, import_str: &str, lang: Language) -> String {
        let import_str = import_str.trim_matches(&['"', '\'', '`'][..]);

        match lang {
            Language::TypeScript => self.resolve_typescript(source_path, import_str),
            Language::Go => self.resolve_go(source_path, import_str),
            Language::Python => {
                if import_str.starts_with('.') {
                    join_normalized(&parent_dir(source_path), import_str)
                } else {
                    import_str.to_string()
                }
            }
            Language::Rust => import_str
                .strip_prefix("crate::")
                .unwrap_or(import_str)
                .to_string(),
            _ => {
                if import_str.starts_with('.') {
                    join_normalized(&parent_dir(source_path), import_str)
                } else {
                    import_str.to_string()
                }
            }
        }
    }

    fn resolve_typescript(&self, source_path: &str, import_str: &str) -> String {
        if import_str.starts_with('.') {
            return join_normalized(&parent_dir(source_path), import_str);
        }

        let configs = self.ts_configs.read();
        let Some((config_dir, config)) = nearest(&configs, &parent_dir(source_path)) else {
            return import_str.to_string();
        };

        for (pattern, targets) in &config.paths {
            let prefix = pattern.trim_end_matches('*');
            if !import_str.starts_with(prefix) {
                continue;
            }
            let Some(target) = targets.first() else {
                continue;
            };
            let suffix = &import_str[prefix.len()..];
            let substituted = format!("{}{}", target.trim_end_matches('*'), suffix);
            let base = if config.base_url.is_empty() {
                "."
            } else {
                config.base_url.as_str()
            };
            let joined = format!("{}/{}", base, substituted);
            return join_normalized(&config_dir.to_string_lossy(), &joined);
        }

        import_str.to_string()
    }

    fn resolve_go(&self, source_path: &str, import_str: &str) -> String {
        let mods = self.go_mods.read();
        let Some((module_dir, gomod)) = nearest(&mods, &parent_dir(source_path)) else {
            return import_str.to_string();
        };

        if let Some(rel) = import_str.strip_prefix(&gomod.module) {
            return join_normalized(&module_dir.to_string_lossy(), rel);
        }
        import_str.to_string()
    }
}

/// Walks `dir → parent(dir) → …` until a cached manifest is found.
fn nearest<'a, T>(cache: &'a HashMap<PathBuf, T>, start: &str) -> Option<(PathBuf, &'a T)> {
    let mut dir = PathBuf::from(start);
    loop {
        if let Some(entry) = cache.get(&dir) {
            return Some((dir, entry));
        }
        if !dir.pop() {
            return None;
        }
    }
}

fn parent_dir(path: &str) -> String {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lexically joins `base` and `rel`, collapsing `.` and `..` components the
/// way Go's `filepath.Join` does, so ids stay canonical.
pub(crate) fn join_normalized(base: &str, rel: &str) -> String {
    clean_path(&format!("{}/{}", base, rel))
}

pub(crate) fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&last) if last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_path_collapses_dots() {
        assert_eq!(clean_path("src/domain/../infrastructure/b"), "src/infrastructure/b");
        assert_eq!(clean_path("/a/b/./c"), "/a/b/c");
        assert_eq!(clean_path("a/.."), ".");
        assert_eq!(clean_path("../x"), "../x");
        assert_eq!(clean_path("/a/../../b"), "/b");
    }

    #[test]
    fn relative_imports_join_with_source_dir() {
        let r = ImportResolver::new();
        assert_eq!(
            r.resolve("src/domain/a.ts", "../infrastructure/b", Language::TypeScript),
            "src/infrastructure/b"
        );
        assert_eq!(
            r.resolve("src/domain/a.py", "./util", Language::Python),
            "src/domain/util"
        );
    }

    #[test]
    fn typescript_paths_mapping() {
        let r = ImportResolver::new();
        r.load_tsconfig(
            "proj/tsconfig.json",
            r#"{ "compilerOptions": { "baseUrl": "src", "paths": { "@domain/*": ["domain/*"] } } }"#,
        );

        assert_eq!(
            r.resolve("proj/src/application/svc.ts", "@domain/user", Language::TypeScript),
            "proj/src/domain/user"
        );
        // no pattern match falls back to the raw token
        assert_eq!(
            r.resolve("proj/src/application/svc.ts", "lodash", Language::TypeScript),
            "lodash"
        );
    }

    #[test]
    fn typescript_paths_without_base_url() {
        let r = ImportResolver::new();
        r.load_tsconfig(
            "proj/tsconfig.json",
            r#"{ "compilerOptions": { "paths": { "lib/*": ["vendor/lib/*"] } } }"#,
        );
        assert_eq!(
            r.resolve("proj/src/a.ts", "lib/x", Language::TypeScript),
            "proj/vendor/lib/x"
        );
    }

    #[test]
    fn go_module_prefix_resolves_into_module_dir() {
        let r = ImportResolver::new();
        r.load_gomod("proj/go.mod", "module example.com/svc\n\ngo 1.22\n");

        assert_eq!(
            r.resolve("proj/internal/a.go", "example.com/svc/internal/core", Language::Go),
            "proj/internal/core"
        );
        // outside the module path: unchanged
        assert_eq!(r.resolve("proj/internal/a.go", "fmt", Language::Go), "fmt");
    }

    #[test]
    fn rust_crate_prefix_is_stripped() {
        let r = ImportResolver::new();
        assert_eq!(
            r.resolve("src/lib.rs", "crate::domain::order", Language::Rust),
            "domain::order"
        );
        assert_eq!(
            r.resolve("src/lib.rs", "serde::Deserialize", Language::Rust),
            "serde::Deserialize"
        );
    }

    #[test]
    fn nearest_manifest_wins() {
        let r = ImportResolver::new();
        r.load_gomod("a/go.mod", "module outer\n");
        r.load_gomod("a/b/go.mod", "module outer/b\n");

        assert_eq!(
            r.resolve("a/b/c/file.go", "outer/b/pkg", Language::Go),
            "a/b/pkg"
        );
    }
}
