use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

/// Handle returned by [`ChangeBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

type Callback<P> = Arc<dyn Fn(&str, &P) + Send + Sync>;

struct Registration<P> {
    id: SubscriptionId,
    callback: Callback<P>,
}

/// Publish/subscribe channel for one category of change.
///
/// Subscribers register against a string label and receive every payload
/// published under that label. An owner keeps one bus per category it
/// emits, so the payload type `P` tells a subscriber exactly what it gets.
///
/// The subscriber table is guarded by a lock that is never held while a
/// callback runs: `publish` copies the matching callbacks out first. A
/// callback may therefore publish, subscribe, or unsubscribe on the same bus.
/// A callback removed during a publish still receives that publish.
pub struct ChangeBus<P> {
    category: &'static str,
    subscribers: Mutex<BTreeMap<String, Vec<Registration<P>>>>,
}

impl<P> ChangeBus<P> {
    /// Create an empty bus. `category` only appears in log output.
    pub fn new(category: &'static str) -> Self {
        Self {
            category,
            subscribers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn category(&self) -> &'static str {
        self.category
    }

    /// Register `callback` for events published under `label`.
    pub fn subscribe<F>(&self, label: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&str, &P) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let label = label.into();
        tracing::trace!(category = self.category, %label, "subscribe");
        self.subscribers
            .lock()
            .entry(label)
            .or_default()
            .push(Registration {
                id,
                callback: Arc::new(callback),
            });
        id
    }

    /// Remove a registration. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let mut removed = false;
        subscribers.retain(|_, regs| {
            let before = regs.len();
            regs.retain(|r| r.id != id);
            removed |= regs.len() != before;
            !regs.is_empty()
        });
        removed
    }

    /// Deliver `payload` to every callback registered under `label`.
    ///
    /// Returns how many callbacks completed. A panicking callback is logged
    /// and skipped.
    pub fn publish(&self, label: &str, payload: &P) -> usize {
        let callbacks: Vec<Callback<P>> = match self.subscribers.lock().get(label) {
            Some(regs) => regs.iter().map(|r| Arc::clone(&r.callback)).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for callback in callbacks {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(label, payload))) {
                Ok(()) => delivered += 1,
                Err(cause) => {
                    tracing::warn!(
                        category = self.category,
                        label,
                        reason = panic_reason(cause.as_ref()),
                        "subscriber panicked, continuing delivery"
                    );
                }
            }
        }
        delivered
    }

    /// Number of callbacks registered under `label`.
    pub fn subscriber_count(&self, label: &str) -> usize {
        self.subscribers.lock().get(label).map_or(0, Vec::len)
    }

    /// Labels that currently have at least one subscriber.
    pub fn labels(&self) -> Vec<String> {
        self.subscribers.lock().keys().cloned().collect()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }
}

impl<P> fmt::Debug for ChangeBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subscribers = self.subscribers.lock();
        f.debug_struct("ChangeBus")
            .field("category", &self.category)
            .field(
                "subscribers",
                &subscribers
                    .iter()
                    .map(|(label, regs)| (label.as_str(), regs.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn panic_reason(cause: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
