pub mod analyzer;
pub mod matcher;
pub mod resolver;
pub mod service;
pub mod watcher;

pub use analyzer::{detect_layer, Analyzer};
pub use matcher::{clean_step_text, StepMatcher};
pub use resolver::ImportResolver;
pub use service::{TraceabilityEntry, WorkspaceService};
pub use watcher::{crawl, FileWatcher};
