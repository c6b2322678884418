use std::collections::HashMap;

use regex::Regex;

/// Parameter types available to Cucumber expressions. Each entry maps a
/// placeholder name to the regex fragment it matches; the empty name is the
/// anonymous `{}` placeholder.
pub struct ParameterTypeRegistry {
    types: HashMap<&'static str, &'static str>,
}

impl Default for ParameterTypeRegistry {
    fn default() -> Self {
        let mut types = HashMap::new();
        types.insert("int", r"[+-]?\d+");
        types.insert("float", r"[+-]?\d*\.?\d+");
        types.insert("word", r"[^\s]+");
        types.insert("string", r#""[^"]*"|'[^']*'"#);
        types.insert("", r".*");
        Self { types }
    }
}

impl ParameterTypeRegistry {
    fn lookup(&self, name: &str) -> Option<&'static str> {
        self.types.get(name).copied()
    }
}

/// Three-tier step matcher, tried in order and short-circuited on the first
/// usable verdict:
///
/// 1. patterns containing `{` and `}` are interpreted as Cucumber
///    expressions against the registry and matched in full;
/// 2. otherwise the pattern is compiled as a regular expression;
/// 3. if compilation fails, plain substring containment decides.
pub struct StepMatcher {
    registry: ParameterTypeRegistry,
}

impl Default for StepMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl StepMatcher {
    pub fn new() -> Self {
        Self {
            registry: ParameterTypeRegistry::default(),
        }
    }

    pub fn matches(&self, text: &str, pattern: &str) -> bool {
        if pattern.contains('{') && pattern.contains('}') {
            if let Some(re) = self.compile_expression(pattern) {
                return re.is_match(text);
            }
        }

        match Regex::new(pattern) {
            Ok(re) => re.is_match(text),
            Err(_) => text.contains(pattern),
        }
    }

    /// Compiles a Cucumber expression to an anchored regex through the
    /// registry. An unknown parameter type or an unterminated placeholder
    /// means the pattern is not a usable expression; the caller falls through
    /// to the next tier.
    fn compile_expression(&self, pattern: &str) -> Option<Regex> {
        let mut compiled = String::from("^");
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            compiled.push_str(&regex::escape(literal));

            let close = tail.find('}')?;
            let name = &tail[1..close];
            let fragment = self.registry.lookup(name)?;
            compiled.push('(');
            compiled.push_str(fragment);
            compiled.push(')');

            rest = &tail[close + 1..];
        }
        compiled.push_str(&regex::escape(rest));
        compiled.push('$');

        Regex::new(&compiled).ok()
    }
}

/// Strips the leading step keyword: the first whitespace-separated token is
/// removed when more than one token is present.
pub fn clean_step_text(step: &str) -> String {
    let parts: Vec<&str> = step.split_whitespace().collect();
    if parts.len() > 1 {
        parts[1..].join(" ")
    } else {
        step.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cucumber_expressions_match_typed_parameters() {
        let m = StepMatcher::new();
        assert!(m.matches("I have 42 cucumbers", "I have {int} cucumbers"));
        assert!(m.matches("I have -3 cucumbers", "I have {int} cucumbers"));
        assert!(!m.matches("I have many cucumbers", "I have {int} cucumbers"));

        assert!(m.matches("a user named alice", "a user named {word}"));
        assert!(!m.matches("a user named alice smith", "a user named {word}"));

        assert!(m.matches(r#"I see "hello""#, "I see {string}"));
        assert!(m.matches("the price is 3.14", "the price is {float}"));
        assert!(m.matches("anything at all", "{} at all"));
    }

    #[test]
    fn cucumber_expressions_are_anchored() {
        let m = StepMatcher::new();
        assert!(!m.matches("well I have 42 cucumbers today", "I have {int} cucumbers"));
    }

    #[test]
    fn unknown_parameter_type_falls_through() {
        let m = StepMatcher::new();
        // "{color}" is not registered; as a regex it fails to compile, so the
        // substring tier decides — and the literal braces are not present.
        assert!(!m.matches("the light is red", "the light is {color}"));
        assert!(m.matches("literally {color} here", "{color}"));
    }

    #[test]
    fn regex_tier_matches_unanchored() {
        let m = StepMatcher::new();
        assert!(m.matches("a user exists", "^a user exists$"));
        assert!(m.matches("given that a user exists today", "a user exists"));
        assert!(m.matches("order 123 shipped", r"order \d+ shipped"));
    }

    #[test]
    fn substring_tier_handles_invalid_regex() {
        let m = StepMatcher::new();
        // "(" alone is an invalid regex; containment decides
        assert!(m.matches("call f(x) now", "f(x"));
        assert!(!m.matches("call g now", "f(x"));
    }

    #[test]
    fn clean_step_text_strips_keyword() {
        assert_eq!(clean_step_text("Given a user exists"), "a user exists");
        assert_eq!(clean_step_text("Then done"), "done");
        assert_eq!(clean_step_text("Given"), "Given");
    }
}
