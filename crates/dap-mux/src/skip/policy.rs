//! The skip policy: which URLs the stepping engine should step over.

use crate::glob::{expander_for, CharExpander, GlobList};
use dap_mux_core::config::PathCase;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

/// Prefix marking a skip glob as targeting runtime-internal modules.
pub const NODE_INTERNALS_MARKER: &str = "<node_internals>/";

/// URL scheme the runtime uses for builtin modules.
pub const NODE_SCHEME_PREFIX: &str = "node:";

/// Blackbox pattern matching the generic internal-module shape.
pub const INTERNAL_MODULE_PATTERN: &str = r"^internal/.+\.js$";

static INTERNAL_MODULE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(INTERNAL_MODULE_PATTERN).expect("internal module pattern is valid"));

/// Current skip configuration of one target.
///
/// Evaluation order for a URL:
///
/// 1. Node-internal URLs are tested against the node-internal globs only.
/// 2. An override recorded for the normalized URL wins outright.
/// 3. Otherwise the URL is skipped iff an authored glob matches it.
#[derive(Debug, Clone)]
pub struct SkipPolicy {
    authored: GlobList,
    node_internals: Option<GlobList>,
    overrides: HashMap<String, bool>,
    builtin_modules: Option<BTreeSet<String>>,
    case_insensitive: bool,
    expand: CharExpander,
}

impl SkipPolicy {
    pub fn new(authored: Vec<String>, node_internals: Option<Vec<String>>, case: PathCase) -> Self {
        let expand = expander_for(case);
        Self {
            authored: GlobList::new(authored, expand),
            node_internals: node_internals.map(|globs| GlobList::new(globs, expand)),
            overrides: HashMap::new(),
            builtin_modules: None,
            case_insensitive: case.is_insensitive(),
            expand,
        }
    }

    /// Build a policy from user `skipFiles`, routing `<node_internals>/`
    /// entries to the node-internal list.
    pub fn from_skip_files<S: AsRef<str>>(skip_files: &[S], case: PathCase) -> Self {
        let mut authored = Vec::new();
        let mut node_internals = Vec::new();

        for glob in skip_files {
            let glob = glob.as_ref();
            let (negation, body) = match glob.strip_prefix('!') {
                Some(rest) => ("!", rest),
                None => ("", glob),
            };
            match body.strip_prefix(NODE_INTERNALS_MARKER) {
                Some(internal) => node_internals.push(format!("{}{}", negation, internal)),
                None => authored.push(glob.to_string()),
            }
        }

        let node_internals = (!node_internals.is_empty()).then_some(node_internals);
        Self::new(authored, node_internals, case)
    }

    pub fn authored_globs(&self) -> &[String] {
        self.authored.globs()
    }

    pub fn node_internal_globs(&self) -> Option<&[String]> {
        self.node_internals.as_ref().map(GlobList::globs)
    }

    /// Record the builtin module names discovered in the target.
    pub fn set_builtin_modules(&mut self, names: impl IntoIterator<Item = String>) {
        self.builtin_modules = Some(names.into_iter().collect());
    }

    pub fn builtin_modules(&self) -> Option<&BTreeSet<String>> {
        self.builtin_modules.as_ref()
    }

    /// Whether `url` names a runtime-internal module rather than a user file.
    pub fn is_node_internal(&self, url: &str) -> bool {
        url.starts_with(NODE_SCHEME_PREFIX)
            || INTERNAL_MODULE_SHAPE.is_match(url)
            || self
                .builtin_modules
                .as_ref()
                .is_some_and(|names| names.contains(url))
    }

    pub fn is_skipped(&self, url: &str) -> bool {
        if self.is_node_internal(url) {
            return self.test_node_internal(url);
        }

        if let Some(skipped) = self.overrides.get(&self.normalize_url(url)) {
            return *skipped;
        }

        self.test_authored(url)
    }

    /// Test a node-internal URL against the node-internal globs.
    ///
    /// Conservatively false until builtin discovery has completed.
    fn test_node_internal(&self, url: &str) -> bool {
        match (&self.node_internals, &self.builtin_modules) {
            (Some(globs), Some(_)) => globs.is_match(strip_node_scheme(url)),
            _ => false,
        }
    }

    /// Test `url` against the authored globs only, ignoring overrides.
    ///
    /// Both the URL itself and, for `file:` URLs, the decoded path are tried.
    pub fn test_authored(&self, url: &str) -> bool {
        matches_either_form(&self.authored, url, self.case_insensitive)
    }

    /// Case-fold (where the platform is insensitive) and forward-slash a URL.
    pub fn normalize_url(&self, url: &str) -> String {
        normalize(url, self.case_insensitive)
    }

    pub fn override_for(&self, url: &str) -> Option<bool> {
        self.overrides.get(&self.normalize_url(url)).copied()
    }

    /// Force `url` into a skip state regardless of the globs.
    pub fn set_override(&mut self, url: &str, skipped: bool) {
        let key = self.normalize_url(url);
        self.overrides.insert(key, skipped);
    }

    pub fn clear_override(&mut self, url: &str) -> Option<bool> {
        let key = self.normalize_url(url);
        self.overrides.remove(&key)
    }

    /// Make `url` skipped or not by editing the glob list.
    ///
    /// Existing `url`/`!url` entries are removed first; a new entry is only
    /// appended when the remaining globs disagree with `skipped`. Returns
    /// whether the list changed.
    pub fn set_explicit_skip(&mut self, url: &str, skipped: bool) -> bool {
        if self.is_node_internal(url) {
            let expand = self.expand;
            let globs = self
                .node_internals
                .get_or_insert_with(|| GlobList::new(Vec::new(), expand));
            let name = strip_node_scheme(url);
            let before = globs.globs().to_vec();
            edit_literals(globs, &[name.to_string()], skipped, |list| list.is_match(name));
            return globs.globs() != before.as_slice();
        }

        self.clear_override(url);
        let case_insensitive = self.case_insensitive;
        let mut literals = vec![url.to_string()];
        literals.extend(file_url_to_path(url));

        let before = self.authored.globs().to_vec();
        edit_literals(&mut self.authored, &literals, skipped, |list| {
            matches_either_form(list, url, case_insensitive)
        });
        self.authored.globs() != before.as_slice()
    }

    /// The target-wide blackbox pattern list.
    ///
    /// Authored pattern sources, then (once builtin discovery has succeeded
    /// and node-internal globs are configured) the generic internal-module
    /// pattern and one literal pattern per matching builtin module.
    pub fn blackbox_patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self
            .authored
            .compiled()
            .iter()
            .map(|glob| glob.source())
            .collect();

        if let (Some(globs), Some(names)) = (&self.node_internals, &self.builtin_modules) {
            if !globs.is_empty() {
                patterns.push(INTERNAL_MODULE_PATTERN.to_string());
                for name in names.iter().filter(|name| globs.is_match(name)) {
                    let escaped = fancy_regex::escape(name);
                    patterns.push(format!("^{}$", escaped));
                    patterns.push(format!("^{}{}$", NODE_SCHEME_PREFIX, escaped));
                }
            }
        }

        patterns
    }
}

/// Remove every entry naming one of `literals`, then append entries only if
/// the remaining list disagrees with `skipped`.
///
/// `literals` are the alternative spellings of one URL. A single positive
/// entry is enough to skip it, but each spelling needs its own negation.
fn edit_literals(
    globs: &mut GlobList,
    literals: &[String],
    skipped: bool,
    currently_matches: impl Fn(&GlobList) -> bool,
) {
    globs.retain(|glob| {
        let literal = glob.strip_prefix('!').unwrap_or(glob);
        !literals.iter().any(|l| l == literal)
    });

    if currently_matches(globs) == skipped {
        return;
    }

    if skipped {
        globs.push(literals[0].clone());
    } else {
        for literal in literals {
            globs.push(format!("!{}", literal));
        }
    }
}

fn matches_either_form(globs: &GlobList, url: &str, case_insensitive: bool) -> bool {
    if globs.is_match(&normalize(url, case_insensitive)) {
        return true;
    }
    file_url_to_path(url).is_some_and(|path| globs.is_match(&normalize(&path, case_insensitive)))
}

fn normalize(url: &str, case_insensitive: bool) -> String {
    let url = url.replace('\\', "/");
    if case_insensitive {
        url.to_lowercase()
    } else {
        url
    }
}

fn strip_node_scheme(url: &str) -> &str {
    url.strip_prefix(NODE_SCHEME_PREFIX).unwrap_or(url)
}

/// Decoded absolute path of a `file:` URL, with forward slashes.
pub fn file_url_to_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    let path = parsed.to_file_path().ok()?;
    Some(path.to_string_lossy().replace('\\', "/"))
}
