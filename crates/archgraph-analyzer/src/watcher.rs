use std::fs;
use std::path::{Component, Path};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::bounded;
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use archgraph_core::{AnalyzerConfig, ArchGraphError, Result};

use crate::analyzer::Analyzer;

/// Background filesystem watcher. One `notify` subscription feeds a bounded
/// event channel consumed by a single thread; create/write events re-run the
/// analyzer on the path, remove/rename events drop the node. Read and
/// analysis failures are logged and swallowed so a single broken file cannot
/// collapse the pipeline.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl FileWatcher {
    pub fn start(root: &Path, analyzer: Arc<Analyzer>, config: &AnalyzerConfig) -> Result<Self> {
        let (tx, rx) = bounded::<notify::Result<Event>>(1024);

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        })
        .map_err(|e| ArchGraphError::Watch(e.to_string()))?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| ArchGraphError::Watch(e.to_string()))?;
        info!(root = %root.display(), "watching for changes");

        let excluded = config.excluded_dirs.clone();
        let persistence = config.persistence_dir_name().to_string();
        let handle = std::thread::spawn(move || {
            for res in rx {
                match res {
                    Ok(event) => handle_event(&analyzer, &event, &excluded, &persistence),
                    Err(e) => error!(error = %e, "watch stream error"),
                }
            }
            debug!("watch loop stopped");
        });

        Ok(Self {
            watcher: Some(watcher),
            handle: Some(handle),
        })
    }

    /// Dropping the notify handle closes the event channel; the consumer
    /// thread drains it and exits.
    pub fn close(&mut self) {
        self.watcher.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

fn handle_event(analyzer: &Analyzer, event: &Event, excluded: &[String], persistence: &str) {
    for path in &event.paths {
        if is_ignored(path, excluded, persistence) {
            continue;
        }
        match event.kind {
            EventKind::Create(_) => {
                if path.is_dir() {
                    // Watches are recursive already; analyze whatever the new
                    // subtree brought with it.
                    crawl_tree(analyzer, path, excluded, persistence);
                } else {
                    analyze_path(analyzer, path);
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // A rename removes the old path; the surviving side of the
                // pair gets re-analyzed.
                if path.is_file() {
                    analyze_path(analyzer, path);
                } else {
                    remove_path(analyzer, path);
                }
            }
            EventKind::Modify(_) => {
                if path.is_file() {
                    analyze_path(analyzer, path);
                }
            }
            EventKind::Remove(_) => remove_path(analyzer, path),
            _ => {}
        }
    }
}

fn analyze_path(analyzer: &Analyzer, path: &Path) {
    let path_str = path.to_string_lossy();
    let content = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path_str, error = %e, "failed to read file");
            return;
        }
    };
    let content = String::from_utf8_lossy(&content);
    if let Err(e) = analyzer.analyze_file(&path_str, &content) {
        warn!(path = %path_str, error = %e, "failed to analyze file");
    }
}

fn remove_path(analyzer: &Analyzer, path: &Path) {
    let path_str = path.to_string_lossy();
    // Absent ids are a no-op in the graph.
    if let Err(e) = analyzer.graph().remove_node(&path_str) {
        warn!(path = %path_str, error = %e, "failed to remove node");
    }
}

/// Synchronous initial crawl: analyzes every readable file under `root`,
/// honoring the same exclusion rules as the watcher.
pub fn crawl(root: &Path, analyzer: &Analyzer, config: &AnalyzerConfig) {
    crawl_tree(
        analyzer,
        root,
        &config.excluded_dirs,
        config.persistence_dir_name(),
    );
}

fn crawl_tree(analyzer: &Analyzer, root: &Path, excluded: &[String], persistence: &str) {
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !is_ignored(entry.path(), excluded, persistence));
    for entry in walker {
        match entry {
            Ok(entry) if entry.file_type().is_file() => analyze_path(analyzer, entry.path()),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "crawl error"),
        }
    }
}

/// A path is ignored when any of its segments names an excluded directory,
/// `.git`, or the tool's own persistence directory.
fn is_ignored(path: &Path, excluded: &[String], persistence: &str) -> bool {
    path.components().any(|component| {
        let Component::Normal(name) = component else {
            return false;
        };
        let Some(name) = name.to_str() else {
            return false;
        };
        name == ".git" || name == persistence || excluded.iter().any(|e| e == name)
    })
}
