use std::collections::HashMap;

use once_cell::sync::Lazy;
use streaming_iterator::StreamingIterator;
use tracing::warn;
use tree_sitter::{Parser, Query, QueryCursor, Tree};

use crate::language::Language;

/// A step definition discovered in source code: the pattern string handed to
/// the BDD framework, the name of the callable, and its 1-based line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDefFound {
    pub pattern: String,
    pub function_name: String,
    pub line: u32,
}

const QUOTE_CHARS: &[char] = &['"', '\'', '`'];

fn import_query_source(lang: Language) -> Option<&'static str> {
    match lang {
        Language::TypeScript => Some(
            r#"
            (import_statement source: (string (string_fragment) @path))
            (export_statement source: (string (string_fragment) @path))
            "#,
        ),
        Language::Go => Some(
            r#"
            (import_spec path: (interpreted_string_literal) @path)
            "#,
        ),
        Language::Python => Some(
            r#"
            (import_from_statement module_name: (dotted_name) @path)
            (import_statement name: (dotted_name) @path)
            "#,
        ),
        Language::Rust => Some(
            r#"
            (use_declaration argument: (scoped_identifier) @path)
            "#,
        ),
        Language::Php => Some(
            r#"
            (namespace_use_clause (qualified_name) @path)
            "#,
        ),
        Language::Java => Some(
            r#"
            (import_declaration (scoped_identifier) @path)
            "#,
        ),
        Language::Unknown => None,
    }
}

fn step_def_query_source(lang: Language) -> Option<&'static str> {
    match lang {
        // Given("...", handler) / When("...", handler)
        Language::TypeScript => Some(
            r#"
            (call_expression
                function: (identifier) @keyword
                arguments: (arguments
                    (string (string_fragment) @pattern)))
            "#,
        ),
        // godog: ctx.Step(`^regex$`, handler); keyword filtered post-capture
        Language::Go => Some(
            r#"
            (call_expression
                function: (selector_expression field: (field_identifier) @keyword)
                arguments: (argument_list
                    (raw_string_literal) @pattern))
            "#,
        ),
        // behave: @given("pattern") def step_impl(...)
        Language::Python => Some(
            r#"
            (decorated_definition
                (decorator
                    (call
                        function: (identifier) @keyword
                        arguments: (argument_list (string) @pattern)))
                definition: (function_definition name: (identifier) @method))
            "#,
        ),
        // cucumber-jvm: @Given("pattern") public void method(...)
        Language::Java => Some(
            r#"
            (method_declaration
                (modifiers
                    (annotation
                        name: (identifier) @keyword
                        arguments: (annotation_argument_list (string_literal) @pattern)))
                name: (identifier) @method)
            "#,
        ),
        Language::Rust | Language::Php | Language::Unknown => None,
    }
}

struct CompiledQueries {
    imports: Option<Query>,
    step_defs: Option<Query>,
}

fn compile(lang: Language, source: &str, what: &str) -> Option<Query> {
    let grammar = lang.grammar()?;
    match Query::new(&grammar, source) {
        Ok(query) => Some(query),
        Err(e) => {
            warn!(language = lang.as_str(), what, error = %e, "query failed to compile");
            None
        }
    }
}

// Queries are static strings compiled once per process and reused across
// every parse.
static QUERIES: Lazy<HashMap<Language, CompiledQueries>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for lang in [
        Language::TypeScript,
        Language::Go,
        Language::Python,
        Language::Rust,
        Language::Php,
        Language::Java,
    ] {
        map.insert(
            lang,
            CompiledQueries {
                imports: import_query_source(lang).and_then(|src| compile(lang, src, "imports")),
                step_defs: step_def_query_source(lang)
                    .and_then(|src| compile(lang, src, "step definitions")),
            },
        );
    }
    map
});

fn parse_tree(content: &str, lang: Language) -> Option<Tree> {
    let grammar = lang.grammar()?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    parser.parse(content, None)
}

/// Returns the import target strings of `content`, with surrounding quote and
/// backtick characters stripped. Any syntactic failure yields an empty list.
pub fn parse_imports(content: &str, lang: Language) -> Vec<String> {
    let Some(query) = QUERIES.get(&lang).and_then(|q| q.imports.as_ref()) else {
        return Vec::new();
    };
    let Some(tree) = parse_tree(content, lang) else {
        return Vec::new();
    };

    let mut imports = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), content.as_bytes());
    while let Some(m) = matches.next() {
        for capture in m.captures {
            let text = &content[capture.node.byte_range()];
            imports.push(text.trim_matches(QUOTE_CHARS).to_string());
        }
    }
    imports
}

/// Returns the step definitions declared in `content`. Patterns come back
/// with their quote characters stripped; lines are 1-based. Syntactic
/// failures yield an empty list.
pub fn parse_step_definitions(content: &str, lang: Language) -> Vec<StepDefFound> {
    let Some(query) = QUERIES.get(&lang).and_then(|q| q.step_defs.as_ref()) else {
        return Vec::new();
    };
    let Some(tree) = parse_tree(content, lang) else {
        return Vec::new();
    };

    let pattern_idx = query.capture_index_for_name("pattern");
    let keyword_idx = query.capture_index_for_name("keyword");
    let method_idx = query.capture_index_for_name("method");

    let mut results = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, tree.root_node(), content.as_bytes());
    while let Some(m) = matches.next() {
        let mut pattern = None;
        let mut keyword = None;
        let mut method = None;
        let mut line = 0u32;

        for capture in m.captures {
            let text = &content[capture.node.byte_range()];
            let idx = Some(capture.index);
            if idx == pattern_idx {
                pattern = Some(text.trim_matches(QUOTE_CHARS).to_string());
                line = capture.node.start_position().row as u32 + 1;
            } else if idx == method_idx {
                method = Some(text.to_string());
            } else if idx == keyword_idx {
                keyword = Some(text.to_string());
            }
        }

        let Some(pattern) = pattern else { continue };
        if pattern.is_empty() {
            continue;
        }
        // Go matches any selector call with a raw string argument; only the
        // godog registration methods count.
        if lang == Language::Go
            && !matches!(keyword.as_deref(), Some("Step" | "Given" | "When" | "Then"))
        {
            continue;
        }

        results.push(StepDefFound {
            pattern,
            function_name: method.or(keyword).unwrap_or_default(),
            line,
        });
    }
    results
}
