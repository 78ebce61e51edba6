//! The tree of debuggable targets discovered in one debugging run.

use dap_mux_core::error::{MuxError, Result};
use dap_mux_core::id::TargetId;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::debug;

/// What a target is, as reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetKind {
    Page,
    Iframe,
    Worker,
    SharedWorker,
    ServiceWorker,
    Node,
    ChildProcess,
    ExtensionHost,
    Other,
}

impl TargetKind {
    /// Targets running a Node-flavoured runtime with builtin modules.
    pub fn is_node_like(self) -> bool {
        matches!(self, Self::Node | Self::ChildProcess | Self::ExtensionHost)
    }
}

/// One debuggable entity.
///
/// Children are owned by their parent; the parent link is weak.
#[derive(Debug)]
pub struct Target {
    id: TargetId,
    name: String,
    kind: TargetKind,
    parent: Option<Weak<Target>>,
    children: Mutex<Vec<Arc<Target>>>,
}

impl Target {
    pub fn id(&self) -> &TargetId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn parent(&self) -> Option<Arc<Target>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn children(&self) -> Vec<Arc<Target>> {
        self.children.lock().clone()
    }

    /// Walk up to the root of this target's tree.
    pub fn root(self: &Arc<Self>) -> Arc<Target> {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    fn detach_child(&self, id: &TargetId) {
        self.children.lock().retain(|child| child.id() != id);
    }
}

/// Index of all live targets.
#[derive(Debug, Default)]
pub struct TargetTree {
    targets: DashMap<TargetId, Arc<Target>>,
}

impl TargetTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target. `parent` must already be registered.
    pub fn add(
        &self,
        id: TargetId,
        name: impl Into<String>,
        kind: TargetKind,
        parent: Option<&TargetId>,
    ) -> Result<Arc<Target>> {
        if self.targets.contains_key(&id) {
            return Err(MuxError::DuplicateTarget(id));
        }

        let parent = match parent {
            Some(parent_id) => Some(
                self.get(parent_id)
                    .ok_or_else(|| MuxError::UnknownTarget(parent_id.clone()))?,
            ),
            None => None,
        };

        let target = Arc::new(Target {
            id: id.clone(),
            name: name.into(),
            kind,
            parent: parent.as_ref().map(Arc::downgrade),
            children: Mutex::new(Vec::new()),
        });

        if let Some(parent) = &parent {
            parent.children.lock().push(target.clone());
        }

        debug!(target_id = %id, ?kind, parent = ?parent.as_ref().map(|p| p.id().clone()), "Target added");
        self.targets.insert(id, target.clone());
        Ok(target)
    }

    pub fn get(&self, id: &TargetId) -> Option<Arc<Target>> {
        self.targets.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &TargetId) -> bool {
        self.targets.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn root_of(&self, id: &TargetId) -> Option<Arc<Target>> {
        self.get(id).map(|target| target.root())
    }

    /// Remove a target and its whole subtree.
    ///
    /// Returns the removed targets, descendants before ancestors.
    pub fn remove(&self, id: &TargetId) -> Vec<Arc<Target>> {
        let Some(target) = self.get(id) else {
            return Vec::new();
        };

        if let Some(parent) = target.parent() {
            parent.detach_child(id);
        }

        let mut removed = Vec::new();
        self.remove_subtree(target, &mut removed);
        debug!(target_id = %id, removed = removed.len(), "Target subtree removed");
        removed
    }

    fn remove_subtree(&self, target: Arc<Target>, removed: &mut Vec<Arc<Target>>) {
        let children = std::mem::take(&mut *target.children.lock());
        for child in children {
            self.remove_subtree(child, removed);
        }
        self.targets.remove(target.id());
        removed.push(target);
    }
}
