//! Per-target skip engine.
//!
//! Owns the target's [`SkipPolicy`] and keeps the runtime in sync with it:
//! URL patterns go out through a debounced push, per-script ranges go out
//! as soon as a source is loaded or toggled. Toggles are mirrored to every
//! other session of the same root through the [`SkipSyncBus`].

use super::bus::{SkipSyncBus, SkipSyncListener, SkipToggled, Subscription};
use super::debounce::Debouncer;
use super::policy::SkipPolicy;
use super::ranges::{collect_range_updates, force_authored_state, propagate_explicit_overrides, RangeUpdate};
use crate::target::Target;
use async_trait::async_trait;
use dap_mux_core::config::MuxConfig;
use dap_mux_core::error::{MuxError, Result};
use dap_mux_core::id::{ScriptId, TargetId};
use dap_mux_core::protocol::{Position, ToggleSkipFileOutcome, ToggleSkipFileParams};
use dap_mux_core::source::Source;
use dap_mux_core::traits::{RemoteInspector, SourceGraph};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Expression evaluated in Node-flavoured targets to list builtin modules.
pub const BUILTIN_MODULES_EXPRESSION: &str = "require('module').builtinModules";

#[derive(Debug)]
struct SkipState {
    policy: SkipPolicy,
    /// Scripts that currently have non-empty ranges in the runtime.
    scripts_with_skipping: HashSet<ScriptId>,
}

impl SkipState {
    /// Turn range updates into per-script pushes.
    ///
    /// Empty ranges are only sent to scripts that previously had some.
    fn plan_pushes(&mut self, graph: &dyn SourceGraph, updates: Vec<RangeUpdate>) -> Vec<(ScriptId, Vec<Position>)> {
        let mut pushes: Vec<(ScriptId, Vec<Position>)> = Vec::new();
        let mut index: HashMap<ScriptId, usize> = HashMap::new();

        for update in updates {
            for script in graph.scripts_of(&update.source) {
                if update.positions.is_empty() {
                    if !self.scripts_with_skipping.remove(&script) {
                        continue;
                    }
                } else {
                    self.scripts_with_skipping.insert(script.clone());
                }

                match index.get(&script) {
                    Some(&i) => pushes[i].1 = update.positions.clone(),
                    None => {
                        index.insert(script.clone(), pushes.len());
                        pushes.push((script, update.positions.clone()));
                    }
                }
            }
        }

        pushes
    }
}

/// Skip engine of one target.
pub struct SkipPropagator {
    target_id: TargetId,
    root_id: TargetId,
    weak_self: Weak<SkipPropagator>,
    state: Mutex<SkipState>,
    inspector: Arc<dyn RemoteInspector>,
    graph: Arc<dyn SourceGraph>,
    bus: Arc<SkipSyncBus>,
    pattern_debounce: Duration,
    debouncer: Mutex<Debouncer>,
    /// Serializes range computation and pushes so they reach the runtime in order.
    range_pushes: tokio::sync::Mutex<()>,
    subscription: Mutex<Option<Subscription>>,
    discovery: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SkipPropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipPropagator")
            .field("target_id", &self.target_id)
            .field("root_id", &self.root_id)
            .finish_non_exhaustive()
    }
}

impl SkipPropagator {
    /// Create the engine for `target` and subscribe it to `bus`.
    ///
    /// Must be called within a Tokio runtime. For Node-flavoured targets
    /// builtin module discovery starts immediately in the background.
    pub fn new(
        target: &Arc<Target>,
        config: &MuxConfig,
        inspector: Arc<dyn RemoteInspector>,
        graph: Arc<dyn SourceGraph>,
        bus: Arc<SkipSyncBus>,
    ) -> Arc<Self> {
        let policy = SkipPolicy::from_skip_files(&config.skip_files, config.path_case.resolve());
        let root_id = target.root().id().clone();

        let this = Arc::new_cyclic(|weak_self| Self {
            target_id: target.id().clone(),
            root_id,
            weak_self: weak_self.clone(),
            state: Mutex::new(SkipState {
                policy,
                scripts_with_skipping: HashSet::new(),
            }),
            inspector,
            graph,
            bus,
            pattern_debounce: config.pattern_debounce(),
            debouncer: Mutex::new(Debouncer::new()),
            range_pushes: tokio::sync::Mutex::new(()),
            subscription: Mutex::new(None),
            discovery: Mutex::new(None),
        });

        let listener: Weak<dyn SkipSyncListener> = Arc::downgrade(&this) as Weak<dyn SkipSyncListener>;
        let subscription = this
            .bus
            .subscribe(this.root_id.clone(), this.target_id.clone(), listener);
        *this.subscription.lock() = Some(subscription);

        if target.kind().is_node_like() {
            this.spawn_builtin_discovery();
        }

        debug!(target_id = %this.target_id, root = %this.root_id, "Skip propagator created");
        this
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    pub fn root_id(&self) -> &TargetId {
        &self.root_id
    }

    /// Snapshot of the current policy.
    pub fn policy(&self) -> SkipPolicy {
        self.state.lock().policy.clone()
    }

    pub fn is_script_skipped(&self, url: &str) -> bool {
        self.state.lock().policy.is_skipped(url)
    }

    /// Establish the skip state of a freshly loaded source and push its ranges.
    pub async fn initialize_skipping_value_for_source(&self, source: &Source) {
        let _ordered = self.range_pushes.lock().await;

        let pushes = {
            let mut state = self.state.lock();
            propagate_explicit_overrides(&mut state.policy, self.graph.as_ref(), source);
            let updates = collect_range_updates(&state.policy, self.graph.as_ref(), source);
            state.plan_pushes(self.graph.as_ref(), updates)
        };

        self.push_ranges(pushes).await;
        self.schedule_pattern_update();
    }

    /// Flip the skip state of a file and mirror the change to sibling sessions.
    pub async fn toggle_skipping_file(&self, params: &ToggleSkipFileParams) -> ToggleSkipFileOutcome {
        let Some((url, source)) = self.resolve(params) else {
            debug!(target_id = %self.target_id, ?params, "Toggle skip: source not found");
            return ToggleSkipFileOutcome::NotFound;
        };

        let was_skipped = self.is_script_skipped(&url);
        self.apply_skip_state(&url, source.as_ref(), !was_skipped).await;

        // Node internals stay unskipped until builtin discovery succeeds.
        let skipped = self.is_script_skipped(&url);
        if skipped == was_skipped {
            debug!(target_id = %self.target_id, %url, skipped, "Toggle had no effect on this target");
            return ToggleSkipFileOutcome::Toggled { url, skipped };
        }
        info!(target_id = %self.target_id, %url, skipped, "Toggled skipping");

        let event = SkipToggled {
            root_session_id: self.root_id.clone(),
            origin_session_id: self.target_id.clone(),
            url: url.clone(),
            skipped,
        };
        self.bus.publish(&event).await;

        ToggleSkipFileOutcome::Toggled { url, skipped }
    }

    /// Push the current pattern list immediately.
    pub async fn push_patterns(&self) {
        let patterns = self.state.lock().policy.blackbox_patterns();
        debug!(target_id = %self.target_id, count = patterns.len(), "Pushing blackbox patterns");
        if let Err(e) = self.inspector.set_blackbox_patterns(patterns).await {
            warn!(target_id = %self.target_id, error = %e, "Failed to push blackbox patterns");
        }
    }

    fn resolve(&self, params: &ToggleSkipFileParams) -> Option<(String, Option<Source>)> {
        match params {
            ToggleSkipFileParams::Resource { resource } => {
                let source = self.graph.source_by_url(resource);
                let url = source.as_ref().map_or_else(|| resource.clone(), |s| s.url.clone());
                Some((url, source))
            }
            ToggleSkipFileParams::Reference { source_reference } => self
                .graph
                .source_by_reference(*source_reference)
                .map(|source| (source.url.clone(), Some(source))),
        }
    }

    async fn apply_skip_state(&self, url: &str, source: Option<&Source>, skipped: bool) {
        let _ordered = self.range_pushes.lock().await;

        let (pushes, patterns_changed) = {
            let mut state = self.state.lock();
            let graph = self.graph.as_ref();
            let compiled_parents = source.map(|s| graph.compiled_sources_of(s)).unwrap_or_default();

            let mut updates = Vec::new();
            let patterns_changed = if compiled_parents.is_empty() {
                state.policy.set_explicit_skip(url, skipped);
                if let Some(source) = source {
                    force_authored_state(&mut state.policy, graph, source, skipped);
                    updates.extend(collect_range_updates(&state.policy, graph, source));
                }
                true
            } else {
                state.policy.set_override(url, skipped);
                for compiled in &compiled_parents {
                    updates.extend(collect_range_updates(&state.policy, graph, compiled));
                }
                false
            };

            (state.plan_pushes(graph, updates), patterns_changed)
        };

        self.push_ranges(pushes).await;
        if patterns_changed {
            self.schedule_pattern_update();
        }
    }

    async fn push_ranges(&self, pushes: Vec<(ScriptId, Vec<Position>)>) {
        if pushes.is_empty() {
            return;
        }

        let inspector = &self.inspector;
        let results = join_all(pushes.into_iter().map(|(script, positions)| async move {
            let result = inspector.set_blackboxed_ranges(&script, positions).await;
            (script, result)
        }))
        .await;

        for (script, result) in results {
            if let Err(e) = result {
                warn!(target_id = %self.target_id, script = %script, error = %e, "Failed to push blackboxed ranges");
            }
        }
    }

    fn schedule_pattern_update(&self) {
        let weak = self.weak_self.clone();
        self.debouncer.lock().fire_new(self.pattern_debounce, move || async move {
            if let Some(this) = weak.upgrade() {
                this.push_patterns().await;
            }
        });
    }

    fn spawn_builtin_discovery(&self) {
        let weak = self.weak_self.clone();
        let inspector = self.inspector.clone();
        let target_id = self.target_id.clone();

        let handle = tokio::spawn(async move {
            let result = inspector
                .evaluate(BUILTIN_MODULES_EXPRESSION)
                .await
                .and_then(|value| serde_json::from_value::<Vec<String>>(value).map_err(MuxError::from));

            let Some(this) = weak.upgrade() else {
                return;
            };

            match result {
                Ok(names) => {
                    debug!(target_id = %target_id, count = names.len(), "Discovered builtin modules");
                    this.state.lock().policy.set_builtin_modules(names);
                    this.schedule_pattern_update();
                }
                Err(e) => {
                    debug!(target_id = %target_id, error = %e, "Builtin module discovery failed, node internals will not be skipped");
                }
            }
        });

        *self.discovery.lock() = Some(handle);
    }
}

#[async_trait]
impl SkipSyncListener for SkipPropagator {
    async fn on_skip_toggled(&self, event: &SkipToggled) -> Result<()> {
        debug!(
            target_id = %self.target_id,
            origin = %event.origin_session_id,
            url = %event.url,
            skipped = event.skipped,
            "Applying skip toggle from sibling session"
        );
        let source = self.graph.source_by_url(&event.url);
        self.apply_skip_state(&event.url, source.as_ref(), event.skipped).await;
        Ok(())
    }
}

impl Drop for SkipPropagator {
    fn drop(&mut self) {
        if let Some(handle) = self.discovery.lock().take() {
            handle.abort();
        }
    }
}
