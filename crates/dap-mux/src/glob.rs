//! Glob-to-regex compilation for skip patterns.
//!
//! Globs are compiled segment by segment:
//!
//! | Glob piece           | Regex                      |
//! |----------------------|----------------------------|
//! | leading `**`         | `(?:.*/)?`                 |
//! | inner `**`           | `.*/`                      |
//! | trailing `**`        | nothing (open match)       |
//! | `*` inside a segment | `[^/]*`                    |
//! | segment separator    | `/`, or `$` after the last |
//!
//! Every pattern is anchored at the start and matched case-insensitively.
//!
//! # Negation
//!
//! `!pattern` never yields a regex of its own. Its body is spliced as a
//! negative lookahead into every pattern declared *before* it:
//!
//! ```text
//! ["**/foo/**", "!**/foo/bar/**"]  =>  ^(?!(?:.*/)?foo/bar/)(?:.*/)?foo/
//! ```
//!
//! A negation listed before any positive pattern therefore has no effect.
//! Later negations carve exceptions out of earlier rules; they do not
//! override rules that come after them.

use dap_mux_core::config::PathCase;
use dap_mux_core::error::{MuxError, Result};
use fancy_regex::Regex;
use once_cell::unsync::OnceCell;
use tracing::warn;

/// Expands one literal glob character into a regex fragment.
pub type CharExpander = fn(char) -> String;

/// Escape `c` as a same-case literal.
pub fn escape_char(c: char) -> String {
    let mut buf = [0u8; 4];
    fancy_regex::escape(c.encode_utf8(&mut buf)).into_owned()
}

/// Expand `c` into a `[xX]` class when it has distinct cases.
pub fn case_insensitive_char(c: char) -> String {
    let mut lower = c.to_lowercase();
    let mut upper = c.to_uppercase();
    match (lower.next(), lower.next(), upper.next(), upper.next()) {
        (Some(l), None, Some(u), None) if l != u => {
            format!("[{}{}]", escape_char(l), escape_char(u))
        }
        _ => escape_char(c),
    }
}

/// Character expander matching the host's path case rules.
pub fn expander_for(case: PathCase) -> CharExpander {
    if case.is_insensitive() {
        case_insensitive_char
    } else {
        escape_char
    }
}

/// One compiled skip pattern.
#[derive(Debug, Clone)]
pub struct CompiledGlob {
    glob: String,
    body: String,
    regex: Regex,
}

impl CompiledGlob {
    fn new(glob: String, body: String) -> Result<Self> {
        let regex =
            Regex::new(&format!("(?i)^{}", body)).map_err(|e| MuxError::invalid_glob(&glob, e))?;
        Ok(Self { glob, body, regex })
    }

    /// The positive glob this pattern was compiled from.
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// Pattern body without the start anchor, lookaheads included.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Anchored pattern source, suitable for the runtime's blackbox list.
    pub fn source(&self) -> String {
        format!("^{}", self.body)
    }

    pub fn is_match(&self, text: &str) -> bool {
        match self.regex.is_match(text) {
            Ok(matched) => matched,
            Err(e) => {
                warn!(glob = %self.glob, error = %e, "Skip pattern evaluation failed");
                false
            }
        }
    }
}

/// Translate one positive glob into an unanchored regex body.
pub fn glob_body(glob: &str, expand: CharExpander) -> String {
    let segments: Vec<&str> = glob.split('/').collect();
    let last = segments.len() - 1;
    let mut out = String::new();

    for (i, segment) in segments.iter().enumerate() {
        if *segment == "**" {
            if i == 0 {
                out.push_str("(?:.*/)?");
            } else if i != last {
                out.push_str(".*/");
            }
            continue;
        }

        let literal = |piece: &str| piece.chars().map(expand).collect::<String>();
        if segment.contains('*') {
            let pieces: Vec<String> = segment.split('*').map(literal).collect();
            out.push_str(&pieces.join("[^/]*"));
        } else {
            out.push_str(&literal(segment));
        }

        out.push_str(if i == last { "$" } else { "/" });
    }

    out
}

/// Compile an ordered glob list. See the module docs for negation rules.
pub fn compile_globs<S: AsRef<str>>(globs: &[S], expand: CharExpander) -> Result<Vec<CompiledGlob>> {
    let mut pending: Vec<(String, String)> = Vec::new();

    for glob in globs {
        let glob = glob.as_ref();
        match glob.strip_prefix('!') {
            Some("") => warn!("Ignoring empty negated skip glob"),
            Some(negated) => {
                let exclusion = glob_body(negated, expand);
                for (_, body) in pending.iter_mut() {
                    *body = format!("(?!{}){}", exclusion, body);
                }
            }
            None => pending.push((glob.to_string(), glob_body(glob, expand))),
        }
    }

    pending
        .into_iter()
        .map(|(glob, body)| CompiledGlob::new(glob, body))
        .collect()
}

/// An ordered glob list with a lazily compiled form.
///
/// Every mutation drops the compiled patterns; the next match recompiles.
#[derive(Debug, Clone)]
pub struct GlobList {
    globs: Vec<String>,
    expand: CharExpander,
    compiled: OnceCell<Vec<CompiledGlob>>,
}

impl GlobList {
    pub fn new(globs: Vec<String>, expand: CharExpander) -> Self {
        Self {
            globs,
            expand,
            compiled: OnceCell::new(),
        }
    }

    pub fn globs(&self) -> &[String] {
        &self.globs
    }

    pub fn is_empty(&self) -> bool {
        self.globs.is_empty()
    }

    pub fn push(&mut self, glob: impl Into<String>) {
        self.globs.push(glob.into());
        self.compiled = OnceCell::new();
    }

    /// Keep only the globs for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&String) -> bool) {
        let before = self.globs.len();
        self.globs.retain(keep);
        if self.globs.len() != before {
            self.compiled = OnceCell::new();
        }
    }

    /// The compiled patterns, building them on first use.
    pub fn compiled(&self) -> &[CompiledGlob] {
        self.compiled.get_or_init(|| {
            compile_globs(&self.globs, self.expand).unwrap_or_else(|e| {
                warn!(error = %e, "Skip globs failed to compile, nothing will be skipped");
                Vec::new()
            })
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.compiled().iter().any(|glob| glob.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(globs: &[&str]) -> Vec<CompiledGlob> {
        compile_globs(globs, escape_char).unwrap()
    }

    fn matches(globs: &[CompiledGlob], text: &str) -> bool {
        globs.iter().any(|g| g.is_match(text))
    }

    #[test]
    fn test_double_star_directory() {
        let globs = compile(&["**/foo/**"]);
        assert!(matches(&globs, "file:///hello/foo/bar"));
        assert!(!matches(&globs, "file:///hello/baz/bar"));
    }

    #[test]
    fn test_negation_carves_exception() {
        let globs = compile(&["**/foo/**", "!**/foo/bar/**"]);
        assert_eq!(globs.len(), 1);
        assert!(matches(&globs, "file:///hello/foo/bin/baz"));
        assert!(!matches(&globs, "file:///hello/foo/bar/baz"));
    }

    #[test]
    fn test_file_name_is_anchored_at_end() {
        let globs = compile(&["**/foo.js"]);
        assert!(matches(&globs, "foo.js"));
        assert!(matches(&globs, "file:///hello/foo.js"));
        assert!(!matches(&globs, "file:///hello/foo.js/bar"));
        assert!(!matches(&globs, "file:///hello/xfoo.js"));
        assert!(!matches(&globs, "file:///hello/fooxjs"));
    }

    #[test]
    fn test_negation_only_affects_earlier_patterns() {
        let globs = compile(&["!**/lib/**", "**/lib/**"]);
        assert!(matches(&globs, "file:///app/lib/a.js"));

        let globs = compile(&["**/lib/**", "!**/lib/**"]);
        assert!(!matches(&globs, "file:///app/lib/a.js"));
    }

    #[test]
    fn test_empty_list_matches_nothing() {
        let globs = compile(&[]);
        assert!(globs.is_empty());
        assert!(!matches(&globs, "file:///anything.js"));
    }

    #[test]
    fn test_literal_glob_is_exact() {
        let globs = compile(&["/app/src/index.js"]);
        assert!(matches(&globs, "/app/src/index.js"));
        assert!(!matches(&globs, "/app/src/index.jsx"));
        assert!(!matches(&globs, "/app/src/indexxjs"));
        assert!(!matches(&globs, "x/app/src/index.js"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let globs = compile(&["/app/*.js"]);
        assert!(matches(&globs, "/app/main.js"));
        assert!(!matches(&globs, "/app/nested/main.js"));
    }

    #[test]
    fn test_inner_double_star_spans_directories() {
        let globs = compile(&["/app/**/test.js"]);
        assert!(matches(&globs, "/app/a/test.js"));
        assert!(matches(&globs, "/app/a/b/c/test.js"));
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let globs = compile(&["**/Vendor/**"]);
        assert!(matches(&globs, "file:///APP/vendor/x.js"));
    }

    #[test]
    fn test_case_expander_builds_classes() {
        assert_eq!(case_insensitive_char('a'), "[aA]");
        assert_eq!(case_insensitive_char('/'), "/");
        assert_eq!(case_insensitive_char('.'), escape_char('.'));
        assert_eq!(glob_body("**/a.js", case_insensitive_char), "(?:.*/)?[aA]\\.[jJ][sS]$");
    }

    #[test]
    fn test_source_is_anchored() {
        let globs = compile(&["**/node_modules/**"]);
        assert_eq!(globs[0].source(), "^(?:.*/)?node_modules/");
        assert_eq!(globs[0].glob(), "**/node_modules/**");
    }

    #[test]
    fn test_glob_list_recompiles_after_mutation() {
        let mut list = GlobList::new(vec!["**/a.js".to_string()], escape_char);
        assert!(list.is_match("/x/a.js"));
        assert!(!list.is_match("/x/b.js"));

        list.push("/x/b.js");
        assert!(list.is_match("/x/b.js"));

        list.push("!/x/a.js");
        assert!(!list.is_match("/x/a.js"));

        list.retain(|g| g != "!/x/a.js");
        assert!(list.is_match("/x/a.js"));
    }
}
