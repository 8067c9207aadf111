//! Non-parsing completion hints for editor integrations.
//!
//! Given the set of known identifiers, returns the union of keyword
//! tokens, aggregate function names, and declared identifiers. This does
//! not do contextual filtering by cursor position: callers wanting
//! "only what's valid here" must filter the result themselves.

/// Reserved keywords of the DSL grammar.
pub const KEYWORDS: &[&str] = &[
    "metric", "on", "query", "dimensions", "metrics", "where", "having", "and", "or", "not",
    "by", "true", "false",
];

/// Names recognized as aggregate functions by the syntax-to-logical
/// transform, plus the reserved `last_year` special form.
pub const FUNCTIONS: &[&str] = &["sum", "avg", "min", "max", "count", "count_distinct", "last_year"];

/// A source of declared identifiers (attributes, metrics, facts,
/// dimensions) to offer as completions alongside keywords and functions.
pub trait IdentifierSource {
    fn attributes(&self) -> Vec<String>;
    fn metrics(&self) -> Vec<String>;
    fn facts(&self) -> Vec<String>;
    fn dimensions(&self) -> Vec<String>;
}

/// Compute the completion set for a cursor position. `cursor` is accepted
/// for interface stability (future contextual filtering) but is
/// currently unused: every candidate is returned regardless of position.
pub fn completions(_cursor: usize, source: &dyn IdentifierSource) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    out.extend(KEYWORDS.iter().map(|s| s.to_string()));
    out.extend(FUNCTIONS.iter().map(|s| s.to_string()));
    out.extend(source.attributes());
    out.extend(source.metrics());
    out.extend(source.facts());
    out.extend(source.dimensions());
    out.sort();
    out.dedup();
    out
}
