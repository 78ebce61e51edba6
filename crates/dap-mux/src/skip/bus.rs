//! Skip-state synchronization between sessions of one debugging tree.
//!
//! Every session's skip propagator subscribes under the id of its root
//! session. A toggle published by one session is delivered to every other
//! live subscriber under the same root, and to nobody else. Delivery is
//! awaited in subscription order, so by the time `publish` returns all
//! siblings have applied the change.
//!
//! Subscriptions are RAII guards: dropping the [`Subscription`] removes the
//! subscriber, and the bus only holds weak references to listeners, so a
//! torn-down session can never be called.

use async_trait::async_trait;
use dap_mux_core::error::Result;
use dap_mux_core::id::TargetId;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

static GLOBAL_BUS: Lazy<Arc<SkipSyncBus>> = Lazy::new(SkipSyncBus::new);

/// A skip state change made by one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkipToggled {
    pub root_session_id: TargetId,
    /// Session that made the change; it is not notified of its own event.
    pub origin_session_id: TargetId,
    pub url: String,
    pub skipped: bool,
}

/// Receiver of skip changes made by sibling sessions.
///
/// Implementations apply the change locally and must not publish it again.
#[async_trait]
pub trait SkipSyncListener: Send + Sync {
    async fn on_skip_toggled(&self, event: &SkipToggled) -> Result<()>;
}

struct Subscriber {
    id: u64,
    session_id: TargetId,
    listener: Weak<dyn SkipSyncListener>,
}

/// Topic-per-root broadcast of skip toggles.
pub struct SkipSyncBus {
    topics: RwLock<HashMap<TargetId, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SkipSyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkipSyncBus")
            .field("topics", &self.topics.read().len())
            .finish()
    }
}

impl SkipSyncBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// The process-wide bus.
    pub fn global() -> Arc<Self> {
        GLOBAL_BUS.clone()
    }

    /// Subscribe `session_id` under `root_session_id`.
    pub fn subscribe(
        self: &Arc<Self>,
        root_session_id: TargetId,
        session_id: TargetId,
        listener: Weak<dyn SkipSyncListener>,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(root = %root_session_id, session = %session_id, "Subscribing to skip sync");

        self.topics
            .write()
            .entry(root_session_id.clone())
            .or_default()
            .push(Subscriber {
                id,
                session_id,
                listener,
            });

        Subscription {
            bus: Arc::downgrade(self),
            root_session_id,
            id,
        }
    }

    /// Deliver `event` to every live sibling of its origin.
    ///
    /// Returns the number of listeners reached. Listener errors are logged
    /// and do not stop delivery to the rest.
    pub async fn publish(&self, event: &SkipToggled) -> usize {
        let listeners: Vec<Arc<dyn SkipSyncListener>> = {
            let topics = self.topics.read();
            match topics.get(&event.root_session_id) {
                Some(subscribers) => subscribers
                    .iter()
                    .filter(|s| s.session_id != event.origin_session_id)
                    .filter_map(|s| s.listener.upgrade())
                    .collect(),
                None => Vec::new(),
            }
        };

        debug!(
            root = %event.root_session_id,
            url = %event.url,
            skipped = event.skipped,
            listeners = listeners.len(),
            "Publishing skip toggle"
        );

        for listener in &listeners {
            if let Err(e) = listener.on_skip_toggled(event).await {
                error!(root = %event.root_session_id, error = %e, "Skip sync listener failed");
            }
        }

        listeners.len()
    }

    pub fn subscriber_count(&self, root_session_id: &TargetId) -> usize {
        self.topics
            .read()
            .get(root_session_id)
            .map_or(0, |subscribers| subscribers.len())
    }

    fn unsubscribe(&self, root_session_id: &TargetId, id: u64) {
        let mut topics = self.topics.write();
        if let Some(subscribers) = topics.get_mut(root_session_id) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                topics.remove(root_session_id);
            }
        }
    }
}

/// Guard that keeps one bus subscription alive.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<SkipSyncBus>,
    root_session_id: TargetId,
    id: u64,
}

impl Subscription {
    pub fn root_session_id(&self) -> &TargetId {
        &self.root_session_id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(&self.root_session_id, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<SkipToggled>>,
    }

    #[async_trait]
    impl SkipSyncListener for Recorder {
        async fn on_skip_toggled(&self, event: &SkipToggled) -> Result<()> {
            self.events.lock().push(event.clone());
            Ok(())
        }
    }

    fn event(root: &str, origin: &str) -> SkipToggled {
        SkipToggled {
            root_session_id: TargetId::from(root),
            origin_session_id: TargetId::from(origin),
            url: "file:///app/a.js".to_string(),
            skipped: true,
        }
    }

    fn subscribe(bus: &Arc<SkipSyncBus>, root: &str, session: &str) -> (Arc<Recorder>, Subscription) {
        let recorder = Arc::new(Recorder::default());
        let listener: Weak<dyn SkipSyncListener> = Arc::downgrade(&recorder) as Weak<dyn SkipSyncListener>;
        let subscription = bus.subscribe(TargetId::from(root), TargetId::from(session), listener);
        (recorder, subscription)
    }

    #[tokio::test]
    async fn test_publish_reaches_siblings_only() {
        let bus = SkipSyncBus::new();
        let (a, _sa) = subscribe(&bus, "root", "a");
        let (b, _sb) = subscribe(&bus, "root", "b");
        let (other, _so) = subscribe(&bus, "other-root", "c");

        let delivered = bus.publish(&event("root", "a")).await;

        assert_eq!(delivered, 1);
        assert!(a.events.lock().is_empty());
        assert_eq!(b.events.lock().len(), 1);
        assert!(other.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let bus = SkipSyncBus::new();
        let (_a, sa) = subscribe(&bus, "root", "a");
        let (b, sb) = subscribe(&bus, "root", "b");
        assert_eq!(bus.subscriber_count(&TargetId::from("root")), 2);

        drop(sb);
        assert_eq!(bus.publish(&event("root", "a")).await, 0);
        assert!(b.events.lock().is_empty());

        drop(sa);
        assert_eq!(bus.subscriber_count(&TargetId::from("root")), 0);
    }

    #[tokio::test]
    async fn test_dead_listener_is_skipped() {
        let bus = SkipSyncBus::new();
        let (b, _sb) = subscribe(&bus, "root", "b");
        drop(b);

        assert_eq!(bus.publish(&event("root", "a")).await, 0);
    }
}
