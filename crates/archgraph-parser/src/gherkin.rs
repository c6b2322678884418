use sha2::{Digest, Sha256};

/// A parsed `.feature` file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GherkinFeature {
    pub name: String,
    pub scenarios: Vec<GherkinScenario>,
}

/// A single scenario: its raw step lines, a short digest of them, and the
/// 1-based line of the `Scenario:` header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GherkinScenario {
    pub name: String,
    pub steps: Vec<String>,
    pub steps_hash: String,
    pub line: u32,
}

/// Line-based Gherkin reader. Blank lines, `#` comments and `@` tags are
/// skipped; anything that is not a header or step keyword is ignored, so
/// malformed files degrade to empty results instead of failing.
pub fn parse_gherkin(content: &str) -> GherkinFeature {
    let mut feature = GherkinFeature::default();
    let mut current: Option<GherkinScenario> = None;

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('@') {
            continue;
        }

        if let Some(rest) = line.strip_prefix("Feature:") {
            feature.name = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("Scenario:") {
            if let Some(scenario) = current.take() {
                feature.scenarios.push(finalize(scenario));
            }
            current = Some(GherkinScenario {
                name: rest.trim().to_string(),
                line: idx as u32 + 1,
                ..Default::default()
            });
        } else if is_step(line) {
            if let Some(scenario) = current.as_mut() {
                scenario.steps.push(line.to_string());
            }
        }
    }

    if let Some(scenario) = current.take() {
        feature.scenarios.push(finalize(scenario));
    }
    feature
}

fn is_step(line: &str) -> bool {
    matches!(
        line.split_whitespace().next(),
        Some("Given" | "When" | "Then" | "And" | "But")
    )
}

/// `steps_hash` is the first 8 hex characters of SHA-256 over the step lines
/// concatenated without a separator.
fn finalize(mut scenario: GherkinScenario) -> GherkinScenario {
    let mut hasher = Sha256::new();
    for step in &scenario.steps {
        hasher.update(step.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    scenario.steps_hash = digest[..8].to_string();
    scenario
}
