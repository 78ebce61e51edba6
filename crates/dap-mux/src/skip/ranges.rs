//! Blackboxed range computation for compiled sources.
//!
//! A compiled source that bundles several authored files gets a list of
//! ranges marking the authored files whose skip state differs from the
//! compiled source's own state. The runtime inverts the script-wide
//! decision inside those ranges.

use super::policy::SkipPolicy;
use dap_mux_core::protocol::Position;
use dap_mux_core::source::Source;
use dap_mux_core::traits::SourceGraph;
use dap_mux_core::id::SourceReference;
use std::collections::HashSet;
use tracing::warn;

/// Ranges computed for one compiled (or intermediate) source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeUpdate {
    pub source: Source,
    /// Alternating start/end positions, sorted and non-overlapping.
    pub positions: Vec<Position>,
}

/// Record a skip state for every authored source below `compiled`.
///
/// Authored sources that already carry an override keep it. Others become
/// skipped when their parent is skipped or when an authored glob matches
/// them. Nested source maps are walked depth first.
pub fn propagate_explicit_overrides(policy: &mut SkipPolicy, graph: &dyn SourceGraph, compiled: &Source) {
    let mut visited = HashSet::new();
    propagate_inner(policy, graph, compiled, &mut visited);
}

fn propagate_inner(
    policy: &mut SkipPolicy,
    graph: &dyn SourceGraph,
    compiled: &Source,
    visited: &mut HashSet<SourceReference>,
) {
    if !visited.insert(compiled.source_reference) {
        return;
    }

    let parent_skipped = policy.is_skipped(&compiled.url);
    for authored in graph.authored_sources_of(compiled) {
        if policy.override_for(authored.url()).is_none() {
            let skipped = parent_skipped || policy.test_authored(authored.url());
            policy.set_override(authored.url(), skipped);
        }
        propagate_inner(policy, graph, &authored.source, visited);
    }
}

/// Force every authored source below `compiled` into `skipped`.
pub fn force_authored_state(policy: &mut SkipPolicy, graph: &dyn SourceGraph, compiled: &Source, skipped: bool) {
    let mut visited = HashSet::new();
    force_inner(policy, graph, compiled, skipped, &mut visited);
}

fn force_inner(
    policy: &mut SkipPolicy,
    graph: &dyn SourceGraph,
    compiled: &Source,
    skipped: bool,
    visited: &mut HashSet<SourceReference>,
) {
    if !visited.insert(compiled.source_reference) {
        return;
    }

    for authored in graph.authored_sources_of(compiled) {
        policy.set_override(authored.url(), skipped);
        force_inner(policy, graph, &authored.source, skipped, visited);
    }
}

/// Compute range updates for `compiled` and every nested level below it.
///
/// Children are listed before their parents.
pub fn collect_range_updates(policy: &SkipPolicy, graph: &dyn SourceGraph, compiled: &Source) -> Vec<RangeUpdate> {
    let mut visited = HashSet::new();
    let mut updates = Vec::new();
    collect_inner(policy, graph, compiled, &mut visited, &mut updates);
    updates
}

fn collect_inner(
    policy: &SkipPolicy,
    graph: &dyn SourceGraph,
    compiled: &Source,
    visited: &mut HashSet<SourceReference>,
    updates: &mut Vec<RangeUpdate>,
) {
    if !visited.insert(compiled.source_reference) {
        return;
    }

    let authored = graph.authored_sources_of(compiled);
    for nested in &authored {
        collect_inner(policy, graph, &nested.source, visited, updates);
    }

    if authored.is_empty() {
        return;
    }

    updates.push(RangeUpdate {
        source: compiled.clone(),
        positions: compute_ranges(policy, graph, compiled),
    });
}

/// Ranges of `compiled` whose skip state differs from its own.
///
/// Adjacent authored sources with the same differing state share a range.
/// Authored sources whose start or end cannot be mapped are dropped with a
/// warning.
pub fn compute_ranges(policy: &SkipPolicy, graph: &dyn SourceGraph, compiled: &Source) -> Vec<Position> {
    let parent_skipped = policy.is_skipped(&compiled.url);
    let mut pairs: Vec<(Position, Position)> = Vec::new();
    let mut in_range = false;

    for authored in graph.authored_sources_of(compiled) {
        let skipped = policy.override_for(authored.url()).unwrap_or(parent_skipped);
        if skipped == parent_skipped {
            in_range = false;
            continue;
        }

        let start = graph.map_to_compiled_location(&authored.source, compiled, authored.start());
        let end = graph.map_to_compiled_location(&authored.source, compiled, authored.end);
        let (Some(start), Some(end)) = (start, end) else {
            warn!(
                authored = %authored.url(),
                compiled = %compiled.url,
                "Could not map authored source into compiled source, dropping its range"
            );
            in_range = false;
            continue;
        };

        if end < start {
            warn!(authored = %authored.url(), "Authored source maps to an inverted range, dropping it");
            in_range = false;
            continue;
        }

        match pairs.last_mut() {
            Some(last) if in_range && start >= last.0 => last.1 = last.1.max(end),
            _ => pairs.push((start, end)),
        }
        in_range = true;
    }

    flatten(merge_pairs(pairs))
}

/// Sort `pairs` by start and merge overlapping ones.
pub fn merge_pairs(mut pairs: Vec<(Position, Position)>) -> Vec<(Position, Position)> {
    pairs.sort();
    let mut merged: Vec<(Position, Position)> = Vec::with_capacity(pairs.len());
    for (start, end) in pairs {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

fn flatten(pairs: Vec<(Position, Position)>) -> Vec<Position> {
    pairs.into_iter().flat_map(|(start, end)| [start, end]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSourceGraph;
    use dap_mux_core::config::PathCase;
    use dap_mux_core::source::AuthoredSource;

    fn pos(line: u32, column: u32) -> Position {
        Position::new(line, column)
    }

    fn bundle() -> (MockSourceGraph, Source) {
        let graph = MockSourceGraph::new();
        let compiled = Source::new(1, "file:///app/dist/bundle.js");
        graph.add_bundle(
            &compiled,
            vec![
                (AuthoredSource::new(Source::new(2, "file:///app/src/a.ts"), pos(9, 0)), pos(0, 0), pos(9, 0)),
                (
                    AuthoredSource::new(Source::new(3, "file:///app/node_modules/x/b.ts"), pos(19, 0)),
                    pos(10, 0),
                    pos(29, 0),
                ),
                (
                    AuthoredSource::new(Source::new(4, "file:///app/node_modules/y/c.ts"), pos(4, 0)),
                    pos(30, 0),
                    pos(34, 0),
                ),
                (AuthoredSource::new(Source::new(5, "file:///app/src/d.ts"), pos(4, 0)), pos(35, 0), pos(39, 0)),
            ],
        );
        (graph, compiled)
    }

    #[test]
    fn test_adjacent_skipped_sources_share_range() {
        let (graph, compiled) = bundle();
        let mut policy = SkipPolicy::from_skip_files(&["**/node_modules/**"], PathCase::Sensitive);
        propagate_explicit_overrides(&mut policy, &graph, &compiled);

        let ranges = compute_ranges(&policy, &graph, &compiled);
        assert_eq!(ranges, vec![pos(10, 0), pos(34, 0)]);
    }

    #[test]
    fn test_skipped_parent_forces_children() {
        let (graph, compiled) = bundle();
        let mut policy = SkipPolicy::from_skip_files(&["**/dist/**"], PathCase::Sensitive);
        propagate_explicit_overrides(&mut policy, &graph, &compiled);

        assert_eq!(policy.override_for("file:///app/src/a.ts"), Some(true));
        assert!(compute_ranges(&policy, &graph, &compiled).is_empty());
    }

    #[test]
    fn test_unskipped_child_of_skipped_parent_gets_range() {
        let (graph, compiled) = bundle();
        let mut policy = SkipPolicy::from_skip_files(&["**/dist/**"], PathCase::Sensitive);
        propagate_explicit_overrides(&mut policy, &graph, &compiled);
        policy.set_override("file:///app/src/d.ts", false);

        assert_eq!(compute_ranges(&policy, &graph, &compiled), vec![pos(35, 0), pos(39, 0)]);
    }

    #[test]
    fn test_existing_override_is_kept() {
        let (graph, compiled) = bundle();
        let mut policy = SkipPolicy::from_skip_files(&["**/node_modules/**"], PathCase::Sensitive);
        policy.set_override("file:///app/node_modules/x/b.ts", false);
        propagate_explicit_overrides(&mut policy, &graph, &compiled);

        assert_eq!(policy.override_for("file:///app/node_modules/x/b.ts"), Some(false));
        assert_eq!(compute_ranges(&policy, &graph, &compiled), vec![pos(30, 0), pos(34, 0)]);
    }

    #[test]
    fn test_unmappable_source_is_dropped() {
        let graph = MockSourceGraph::new();
        let compiled = Source::new(1, "file:///app/dist/bundle.js");
        let lost = AuthoredSource::new(Source::new(2, "file:///app/node_modules/lost.ts"), pos(3, 0));
        graph.add_authored(&compiled, lost);

        let mut policy = SkipPolicy::from_skip_files(&["**/node_modules/**"], PathCase::Sensitive);
        propagate_explicit_overrides(&mut policy, &graph, &compiled);
        assert!(compute_ranges(&policy, &graph, &compiled).is_empty());
    }

    #[test]
    fn test_merge_pairs_sorts_and_merges() {
        let merged = merge_pairs(vec![
            (pos(20, 0), pos(30, 0)),
            (pos(0, 0), pos(5, 0)),
            (pos(25, 0), pos(40, 0)),
        ]);
        assert_eq!(merged, vec![(pos(0, 0), pos(5, 0)), (pos(20, 0), pos(40, 0))]);
    }

    #[test]
    fn test_nested_levels_are_listed_children_first() {
        let graph = MockSourceGraph::new();
        let bundle = Source::new(1, "file:///app/dist/bundle.js");
        let middle = Source::new(2, "file:///app/build/lib.js");
        let leaf = Source::new(3, "file:///app/src/lib.ts");
        graph.add_bundle(
            &bundle,
            vec![(AuthoredSource::new(middle.clone(), pos(9, 0)), pos(0, 0), pos(9, 0))],
        );
        graph.add_bundle(
            &middle,
            vec![(AuthoredSource::new(leaf.clone(), pos(9, 0)), pos(0, 0), pos(9, 0))],
        );

        let mut policy = SkipPolicy::from_skip_files(&["**/dist/**"], PathCase::Sensitive);
        propagate_explicit_overrides(&mut policy, &graph, &bundle);
        assert_eq!(policy.override_for(&leaf.url), Some(true));

        let updates = collect_range_updates(&policy, &graph, &bundle);
        let order: Vec<_> = updates.iter().map(|u| u.source.source_reference).collect();
        assert_eq!(order, vec![2, 1]);
    }
}
