//! Skip Synchronization Tests
//!
//! Toggles made against one target must show up in every sibling target
//! under the same root session, and nowhere else. Pattern pushes are
//! debounced per target while every toggle still takes effect locally.

use anyhow::Result;
use dap_mux::skip::{SkipPropagator, SkipSyncBus};
use dap_mux::target::{Target, TargetKind, TargetTree};
use dap_mux::testing::{MockInspector, MockSourceGraph};
use dap_mux_core::config::PathCase;
use dap_mux_core::id::ScriptId;
use dap_mux_core::protocol::{Position, ToggleSkipFileOutcome, ToggleSkipFileParams};
use dap_mux_core::source::{AuthoredSource, Source};
use dap_mux_core::MuxConfig;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Session {
    skipper: Arc<SkipPropagator>,
    inspector: Arc<MockInspector>,
}

fn config(skip_files: &[&str]) -> MuxConfig {
    MuxConfig {
        skip_files: skip_files.iter().map(|s| s.to_string()).collect(),
        path_case: PathCase::Sensitive,
        ..MuxConfig::default()
    }
}

fn session(target: &Arc<Target>, bus: &Arc<SkipSyncBus>, skip_files: &[&str]) -> Session {
    session_with_graph(target, bus, skip_files, Arc::new(MockSourceGraph::new()))
}

fn session_with_graph(
    target: &Arc<Target>,
    bus: &Arc<SkipSyncBus>,
    skip_files: &[&str],
    graph: Arc<MockSourceGraph>,
) -> Session {
    let inspector = Arc::new(MockInspector::new());
    let skipper = SkipPropagator::new(target, &config(skip_files), inspector.clone(), graph, bus.clone());
    Session { skipper, inspector }
}

fn resource(url: &str) -> ToggleSkipFileParams {
    ToggleSkipFileParams::Resource {
        resource: url.to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_node_modules_end_to_end() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let bus = SkipSyncBus::new();
    let a = session(&page, &bus, &["**/node_modules/**"]);

    assert!(a.skipper.is_script_skipped("file:///app/node_modules/lib/index.js"));
    assert!(!a.skipper.is_script_skipped("file:///app/src/index.js"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_toggle_reaches_sibling_under_same_root() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let worker = tree.add("worker".into(), "worker.js", TargetKind::Worker, Some(&"page".into()))?;
    let other = tree.add("other".into(), "other.html", TargetKind::Page, None)?;

    let bus = SkipSyncBus::new();
    let a = session(&page, &bus, &[]);
    let b = session(&worker, &bus, &[]);
    let c = session(&other, &bus, &[]);

    let url = "file:///app/src/util.js";
    let outcome = a.skipper.toggle_skipping_file(&resource(url)).await;
    assert_eq!(
        outcome,
        ToggleSkipFileOutcome::Toggled {
            url: url.to_string(),
            skipped: true
        }
    );

    assert!(a.skipper.is_script_skipped(url));
    assert!(b.skipper.is_script_skipped(url));
    assert!(!c.skipper.is_script_skipped(url));

    // Toggling back from the worker flows up to the page.
    b.skipper.toggle_skipping_file(&resource(url)).await;
    assert!(!a.skipper.is_script_skipped(url));
    assert!(!b.skipper.is_script_skipped(url));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sibling_applies_value_not_flip() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let worker = tree.add("worker".into(), "worker.js", TargetKind::Worker, Some(&"page".into()))?;

    let bus = SkipSyncBus::new();
    let a = session(&page, &bus, &[]);
    let b = session(&worker, &bus, &["**/vendor/**"]);

    let url = "file:///app/vendor/x.js";
    assert!(!a.skipper.is_script_skipped(url));
    assert!(b.skipper.is_script_skipped(url));

    a.skipper.toggle_skipping_file(&resource(url)).await;
    assert!(a.skipper.is_script_skipped(url));
    assert!(b.skipper.is_script_skipped(url));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_dropped_sibling_is_not_notified() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let worker = tree.add("worker".into(), "worker.js", TargetKind::Worker, Some(&"page".into()))?;

    let bus = SkipSyncBus::new();
    let a = session(&page, &bus, &[]);
    let b = session(&worker, &bus, &[]);
    assert_eq!(bus.subscriber_count(&"page".into()), 2);

    drop(b);
    assert_eq!(bus.subscriber_count(&"page".into()), 1);

    a.skipper.toggle_skipping_file(&resource("file:///app/a.js")).await;
    assert!(a.skipper.is_script_skipped("file:///app/a.js"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_toggles_pushes_patterns_once() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let bus = SkipSyncBus::new();
    let a = session(&page, &bus, &[]);

    let first = "file:///app/src/one.js";
    let second = "file:///app/src/two.js";
    a.skipper.toggle_skipping_file(&resource(first)).await;
    a.skipper.toggle_skipping_file(&resource(second)).await;

    // Local effects are immediate.
    assert!(a.skipper.is_script_skipped(first));
    assert!(a.skipper.is_script_skipped(second));
    assert!(a.inspector.pattern_calls().is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;

    let calls = a.inspector.pattern_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        vec![
            "^file:///app/src/one\\.js$".to_string(),
            "^file:///app/src/two\\.js$".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_authored_toggle_pushes_ranges_in_sibling() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let worker = tree.add("worker".into(), "worker.js", TargetKind::Worker, Some(&"page".into()))?;

    let bundle = Source::new(1, "file:///app/dist/bundle.js");
    let lib = Source::new(2, "file:///app/src/lib.ts");
    let graph_for = || {
        let graph = Arc::new(MockSourceGraph::new());
        graph.add_bundle(
            &bundle,
            vec![(
                AuthoredSource::new(lib.clone(), Position::new(20, 0)),
                Position::new(100, 0),
                Position::new(120, 0),
            )],
        );
        graph.add_script(&bundle, ScriptId::from("9"));
        graph
    };

    let bus = SkipSyncBus::new();
    let a = session_with_graph(&page, &bus, &[], graph_for());
    let b = session_with_graph(&worker, &bus, &[], graph_for());
    a.skipper.initialize_skipping_value_for_source(&bundle).await;
    b.skipper.initialize_skipping_value_for_source(&bundle).await;

    a.skipper
        .toggle_skipping_file(&ToggleSkipFileParams::Reference { source_reference: 2 })
        .await;

    let expected = vec![(ScriptId::from("9"), vec![Position::new(100, 0), Position::new(120, 0)])];
    assert_eq!(a.inspector.range_calls(), expected);
    assert_eq!(b.inspector.range_calls(), expected);
    assert!(b.skipper.is_script_skipped(&lib.url));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_pushes_keep_local_state() -> Result<()> {
    let tree = TargetTree::new();
    let page = tree.add("page".into(), "index.html", TargetKind::Page, None)?;
    let bus = SkipSyncBus::new();
    let a = session(&page, &bus, &[]);
    a.inspector.fail_pushes(true);

    a.skipper.toggle_skipping_file(&resource("file:///app/a.js")).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(a.inspector.pattern_calls().len(), 1);
    assert!(a.skipper.is_script_skipped("file:///app/a.js"));
    Ok(())
}
