//! Provider capability contract.
//!
//! Anything that can produce a ranked list of links and emit change
//! notifications can be registered with the [`LinkStore`]: the remote
//! directory cache, a history/frecency backend, or a fixed-list provider.
//!
//! [`LinkStore`]: crate::store::LinkStore

use crate::error::LinkResult;
use crate::observer::{LinkObserver, ObserverRegistry};
use crate::types::{Link, LinkPatch};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// External source of ranked links.
///
/// Implementations must be `Send + Sync`; they are shared behind `Arc`s and
/// fetched concurrently during a store populate.
#[async_trait]
pub trait LinkProvider: Send + Sync {
    /// Short identifier used in notifications and logs.
    fn name(&self) -> &str;

    /// Produce the provider's current links. May suspend (network, disk).
    async fn fetch_links(&self) -> LinkResult<Vec<Link>>;

    /// Per-provider cap on how many of this provider's links are eligible
    /// for merging. `None` means unbounded.
    fn max_links(&self) -> Option<usize> {
        None
    }

    /// Register an observer for this provider's change notifications.
    fn subscribe(&self, observer: Arc<dyn LinkObserver>);

    /// Remove a previously subscribed observer. Default is a no-op for
    /// providers that never notify.
    fn unsubscribe(&self, _observer: &Arc<dyn LinkObserver>) {}
}

/// Provider over a fixed, replaceable list of links.
///
/// Useful on its own for pinned links, and as the workhorse of the store
/// tests: `set_links` plus the `notify_*` methods drive the incremental and
/// bulk change paths.
pub struct StaticLinkProvider {
    name: String,
    links: Mutex<Vec<Link>>,
    max_links: Option<usize>,
    observers: ObserverRegistry,
}

impl StaticLinkProvider {
    pub fn new(name: impl Into<String>, links: Vec<Link>) -> Self {
        Self {
            name: name.into(),
            links: Mutex::new(links),
            max_links: None,
            observers: ObserverRegistry::new(),
        }
    }

    pub fn with_max_links(mut self, max_links: usize) -> Self {
        self.max_links = Some(max_links);
        self
    }

    /// Replace the provider's links without notifying anyone. Pair with
    /// [`notify_many_links_changed`](Self::notify_many_links_changed) to
    /// announce the change.
    pub fn set_links(&self, links: Vec<Link>) {
        *self.links.lock().unwrap() = links;
    }

    pub fn notify_link_changed(&self, patch: &LinkPatch) {
        self.observers.notify_link_changed(&self.name, patch);
    }

    pub fn notify_many_links_changed(&self) {
        self.observers.notify_many_links_changed(&self.name);
    }
}

#[async_trait]
impl LinkProvider for StaticLinkProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_links(&self) -> LinkResult<Vec<Link>> {
        Ok(self.links.lock().unwrap().clone())
    }

    fn max_links(&self) -> Option<usize> {
        self.max_links
    }

    fn subscribe(&self, observer: Arc<dyn LinkObserver>) {
        self.observers.add_observer(observer);
    }

    fn unsubscribe(&self, observer: &Arc<dyn LinkObserver>) {
        self.observers.remove_observer(observer);
    }
}
