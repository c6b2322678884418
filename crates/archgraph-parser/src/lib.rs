pub mod gherkin;
pub mod language;
pub mod queries;

pub use gherkin::{parse_gherkin, GherkinFeature, GherkinScenario};
pub use language::Language;
pub use queries::{parse_imports, parse_step_definitions, StepDefFound};
