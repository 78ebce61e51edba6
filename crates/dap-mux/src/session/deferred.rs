use tokio::sync::watch;

/// Settlement state of a [`Deferred`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement<T> {
    Pending,
    Resolved(T),
    Rejected(String),
}

/// A one-shot value settled from the outside.
///
/// Any number of [`Waiter`]s may await it. Settling twice is a no-op, and
/// dropping an unsettled deferred rejects every waiter.
#[derive(Debug)]
pub struct Deferred<T> {
    tx: watch::Sender<Settlement<T>>,
}

impl<T: Clone> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Deferred<T> {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Settlement::Pending);
        Self { tx }
    }

    /// Resolve with `value`. Returns false if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Settlement::Resolved(value))
    }

    /// Reject with `reason`. Returns false if already settled.
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(Settlement::Rejected(reason.into()))
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.tx.borrow(), Settlement::Pending)
    }

    pub fn waiter(&self) -> Waiter<T> {
        Waiter {
            rx: self.tx.subscribe(),
        }
    }

    fn settle(&self, settlement: Settlement<T>) -> bool {
        self.tx.send_if_modified(move |current| {
            if matches!(current, Settlement::Pending) {
                *current = settlement;
                true
            } else {
                false
            }
        })
    }
}

/// Awaits the settlement of one [`Deferred`].
#[derive(Debug, Clone)]
pub struct Waiter<T> {
    rx: watch::Receiver<Settlement<T>>,
}

impl<T: Clone> Waiter<T> {
    /// Wait until settled. A dropped deferred counts as rejected.
    pub async fn wait(mut self) -> Result<T, String> {
        match self.rx.wait_for(|s| !matches!(s, Settlement::Pending)).await {
            Ok(settled) => match &*settled {
                Settlement::Resolved(value) => Ok(value.clone()),
                Settlement::Rejected(reason) => Err(reason.clone()),
                Settlement::Pending => Err("settled without a value".to_string()),
            },
            Err(_) => Err("dropped before settling".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_wakes_all_waiters() {
        let deferred = Deferred::new();
        let a = deferred.waiter();
        let b = deferred.waiter();

        assert!(deferred.resolve(7));
        assert_eq!(a.wait().await, Ok(7));
        assert_eq!(b.wait().await, Ok(7));
    }

    #[tokio::test]
    async fn test_first_settlement_wins() {
        let deferred = Deferred::new();
        assert!(deferred.reject("gone"));
        assert!(!deferred.resolve(1));
        assert!(deferred.is_settled());
        assert_eq!(deferred.waiter().wait().await, Err("gone".to_string()));
    }

    #[tokio::test]
    async fn test_waiter_created_after_settlement() {
        let deferred = Deferred::new();
        deferred.resolve("ok");
        assert_eq!(deferred.waiter().wait().await, Ok("ok"));
    }

    #[tokio::test]
    async fn test_drop_rejects() {
        let deferred: Deferred<u32> = Deferred::new();
        let waiter = deferred.waiter();
        drop(deferred);
        assert!(waiter.wait().await.is_err());
    }
}
