//! The link store: one capped, sorted merged view across all registered
//! providers.
//!
//! Responsibilities:
//! - Fan out `fetch_links` over every provider and merge the results into a
//!   single rank-ordered view, truncated to the store-wide cap.
//! - Keep the view current through the cheap incremental patch path
//!   (`apply_link_change`) and the coarse invalidate/refetch path
//!   (`refresh_provider`).
//! - Forward change notifications to store-level observers strictly after
//!   the view swap they describe.
//!
//! A provider's own `max_links` cap is applied to its contribution before
//! merging, so the sub-cap holds even when the global cap has room.

use crate::observer::{LinkObserver, ObserverRegistry};
use crate::provider::LinkProvider;
use crate::types::{sort_by_rank, Link, LinkPatch};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

/// Handle identifying a registered provider within one store.
pub type ProviderId = usize;

pub const DEFAULT_MAX_NUM_LINKS: usize = 12;

struct RegisteredProvider {
    id: ProviderId,
    provider: Arc<dyn LinkProvider>,
    subscription: Arc<dyn LinkObserver>,
    /// Rank-sorted contribution, already truncated to the provider's own
    /// `max_links`. `None` until the first fetch.
    cached: Option<Vec<Link>>,
}

#[derive(Default)]
struct StoreInner {
    providers: Vec<RegisteredProvider>,
    next_id: ProviderId,
    populated: bool,
}

/// Merged, capped, rank-ordered view over all registered providers.
///
/// Lock order is `inner` before `view`; neither lock is ever held across an
/// await point.
pub struct LinkStore {
    max_num_links: usize,
    inner: Mutex<StoreInner>,
    view: RwLock<Vec<Link>>,
    observers: ObserverRegistry,
}

impl LinkStore {
    pub fn new(max_num_links: usize) -> Self {
        Self {
            max_num_links,
            inner: Mutex::new(StoreInner::default()),
            view: RwLock::new(Vec::new()),
            observers: ObserverRegistry::new(),
        }
    }

    pub fn max_num_links(&self) -> usize {
        self.max_num_links
    }

    /// Register a provider and subscribe the store to its notifications.
    /// No fetch happens here; the provider contributes on the next
    /// `populate_cache` or its first bulk-change notification.
    pub fn add_provider(self: &Arc<Self>, provider: Arc<dyn LinkProvider>) -> ProviderId {
        let (id, subscription) = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_id;
            inner.next_id += 1;
            let subscription: Arc<dyn LinkObserver> = Arc::new(StoreSubscription {
                store: Arc::downgrade(self),
                provider_id: id,
            });
            inner.providers.push(RegisteredProvider {
                id,
                provider: provider.clone(),
                subscription: subscription.clone(),
                cached: None,
            });
            (id, subscription)
        };
        provider.subscribe(subscription);
        log::debug!("registered link provider {} as #{}", provider.name(), id);
        id
    }

    /// Unsubscribe and drop the provider's contribution, then rebuild the
    /// view from the remaining cached contributions (no refetch).
    pub fn remove_provider(&self, provider: ProviderId) {
        let removed = {
            let mut inner = self.inner.lock().unwrap();
            match inner.providers.iter().position(|p| p.id == provider) {
                Some(pos) => {
                    let entry = inner.providers.remove(pos);
                    let merged = Self::merge_locked(&inner, self.max_num_links);
                    Some((entry, merged))
                }
                None => None,
            }
        };
        if let Some((entry, merged)) = removed {
            entry.provider.unsubscribe(&entry.subscription);
            *self.view.write().unwrap() = merged;
            log::debug!("removed link provider {}", entry.provider.name());
        }
    }

    /// Fetch every provider concurrently and swap in a freshly merged view.
    ///
    /// A no-op when the cache is already populated and `force` is false.
    /// Resolves exactly once, after all providers' fetches settle. A failing
    /// provider contributes zero links for this cycle; the others still
    /// merge.
    pub async fn populate_cache(&self, force: bool) {
        let to_fetch: Vec<(ProviderId, Arc<dyn LinkProvider>)> = {
            let inner = self.inner.lock().unwrap();
            if inner.populated && !force {
                return;
            }
            inner
                .providers
                .iter()
                .map(|p| (p.id, p.provider.clone()))
                .collect()
        };

        let fetches = to_fetch.into_iter().map(|(id, provider)| async move {
            let result = provider.fetch_links().await;
            (id, provider, result)
        });
        let results = join_all(fetches).await;

        let merged = {
            let mut inner = self.inner.lock().unwrap();
            for (id, provider, result) in results {
                let links = match result {
                    Ok(links) => links,
                    Err(e) => {
                        log::warn!("provider {} failed to fetch links: {}", provider.name(), e);
                        Vec::new()
                    }
                };
                if let Some(entry) = inner.providers.iter_mut().find(|p| p.id == id) {
                    entry.cached = Some(Self::cap_contribution(links, provider.max_links()));
                }
            }
            inner.populated = true;
            Self::merge_locked(&inner, self.max_num_links)
        };
        *self.view.write().unwrap() = merged;
    }

    /// Snapshot of the current merged view. Never blocks on a fetch; may be
    /// stale relative to an in-flight `populate_cache`.
    pub fn get_links(&self) -> Vec<Link> {
        self.view.read().unwrap().clone()
    }

    /// Incremental change path: patch (or insert) the entry with the
    /// patch's url, re-sort, and evict the lowest-ranked entry on overflow.
    /// Pure in-memory; never fetches.
    pub fn apply_link_change(&self, provider: ProviderId, patch: LinkPatch) {
        let provider_name = {
            let mut inner = self.inner.lock().unwrap();
            let entry = match inner.providers.iter_mut().find(|p| p.id == provider) {
                Some(entry) => entry,
                None => {
                    log::debug!("link change for unregistered provider #{} dropped", provider);
                    return;
                }
            };
            // Keep the provider's cached contribution in step so a later
            // rebuild does not resurrect the pre-patch entry.
            let sub_cap = entry.provider.max_links();
            if let Some(cached) = entry.cached.as_mut() {
                patch_into(cached, &patch, sub_cap);
            }
            entry.provider.name().to_string()
        };

        {
            let mut view = self.view.write().unwrap();
            patch_into(&mut view, &patch, Some(self.max_num_links));
        }
        self.observers.notify_link_changed(&provider_name, &patch);
    }

    /// Coarse change path: refetch one provider's links and re-merge.
    /// Unknown providers are a no-op.
    pub async fn refresh_provider(&self, provider: ProviderId) {
        let target = {
            let inner = self.inner.lock().unwrap();
            inner
                .providers
                .iter()
                .find(|p| p.id == provider)
                .map(|p| p.provider.clone())
        };
        let target = match target {
            Some(target) => target,
            None => return,
        };

        let links = match target.fetch_links().await {
            Ok(links) => links,
            Err(e) => {
                log::warn!("provider {} failed to refresh: {}", target.name(), e);
                Vec::new()
            }
        };

        let merged = {
            let mut inner = self.inner.lock().unwrap();
            match inner.providers.iter_mut().find(|p| p.id == provider) {
                Some(entry) => {
                    entry.cached = Some(Self::cap_contribution(links, target.max_links()));
                }
                // Removed while the fetch was in flight; its links must not
                // reappear.
                None => return,
            }
            inner.populated = true;
            Self::merge_locked(&inner, self.max_num_links)
        };
        *self.view.write().unwrap() = merged;
        self.observers.notify_many_links_changed(target.name());
    }

    /// Store-level observers, notified after view swaps.
    pub fn add_observer(&self, observer: Arc<dyn LinkObserver>) {
        self.observers.add_observer(observer);
    }

    pub fn remove_observer(&self, observer: &Arc<dyn LinkObserver>) {
        self.observers.remove_observer(observer);
    }

    pub fn remove_observers(&self) {
        self.observers.remove_all();
    }

    /// Drop a provider's cached contribution so the next populate refetches
    /// it. Used by the subscription path ahead of the async refresh.
    fn invalidate_provider(&self, provider: ProviderId) {
        let mut inner = self.inner.lock().unwrap();
        match inner.providers.iter_mut().find(|p| p.id == provider) {
            Some(entry) => entry.cached = None,
            None => return,
        }
        inner.populated = false;
    }

    fn cap_contribution(mut links: Vec<Link>, cap: Option<usize>) -> Vec<Link> {
        sort_by_rank(&mut links);
        if let Some(cap) = cap {
            links.truncate(cap);
        }
        links
    }

    /// Merge all cached contributions. Duplicate urls resolve to the
    /// last-registered provider's entry; the result is rank-sorted and
    /// truncated to the store cap.
    fn merge_locked(inner: &StoreInner, cap: usize) -> Vec<Link> {
        let mut by_url: HashMap<String, Link> = HashMap::new();
        for entry in &inner.providers {
            if let Some(links) = &entry.cached {
                for link in links {
                    by_url.insert(link.url.clone(), link.clone());
                }
            }
        }
        let mut merged: Vec<Link> = by_url.into_values().collect();
        sort_by_rank(&mut merged);
        merged.truncate(cap);
        merged
    }
}

impl Default for LinkStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NUM_LINKS)
    }
}

/// Patch or insert into a rank-sorted list, then re-enforce the cap by
/// dropping the lowest-ranked overflow.
fn patch_into(links: &mut Vec<Link>, patch: &LinkPatch, cap: Option<usize>) {
    match links.iter_mut().find(|l| l.url == patch.url) {
        Some(existing) => patch.apply_to(existing),
        None => links.push(patch.clone().into_link()),
    }
    sort_by_rank(links);
    if let Some(cap) = cap {
        links.truncate(cap);
    }
}

/// Forwards one provider's notifications into the owning store.
struct StoreSubscription {
    store: Weak<LinkStore>,
    provider_id: ProviderId,
}

impl LinkObserver for StoreSubscription {
    fn on_link_changed(&self, _provider: &str, patch: &LinkPatch) {
        if let Some(store) = self.store.upgrade() {
            store.apply_link_change(self.provider_id, patch.clone());
        }
    }

    fn on_many_links_changed(&self, _provider: &str) {
        let store = match self.store.upgrade() {
            Some(store) => store,
            None => return,
        };
        // Invalidate synchronously so a concurrent populate cannot serve
        // the stale contribution, then refetch off the notifying thread.
        store.invalidate_provider(self.provider_id);
        let id = self.provider_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { store.refresh_provider(id).await });
            }
            Err(_) => log::warn!(
                "no async runtime for provider #{} refresh; deferred to the next populate",
                id
            ),
        }
    }
}
