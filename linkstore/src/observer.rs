//! Change-notification fan-out shared by the link store and the directory
//! cache.
//!
//! Observers implement whatever subset of the callbacks they care about;
//! the rest default to no-ops. Dispatch runs in registration order and a
//! misbehaving observer never prevents the remaining ones from being
//! notified.

use crate::types::LinkPatch;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

/// Consumer of link-change events. All methods default to no-ops so an
/// observer only implements the callbacks it cares about.
pub trait LinkObserver: Send + Sync {
    fn on_link_changed(&self, _provider: &str, _patch: &LinkPatch) {}
    fn on_many_links_changed(&self, _provider: &str) {}
    fn on_download_fail(&self, _provider: &str) {}
}

/// Registration-ordered observer list with per-observer failure isolation.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Mutex<Vec<Arc<dyn LinkObserver>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn LinkObserver>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Remove by pointer identity. Unknown observers are ignored.
    pub fn remove_observer(&self, observer: &Arc<dyn LinkObserver>) {
        self.observers
            .lock()
            .unwrap()
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    /// Teardown: drop every observer reference.
    pub fn remove_all(&self) {
        self.observers.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.observers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispatch `f` to every observer in registration order. A panicking
    /// observer is logged and skipped; the rest still run.
    pub fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn LinkObserver),
    {
        let snapshot: Vec<Arc<dyn LinkObserver>> = self.observers.lock().unwrap().clone();
        for observer in snapshot {
            if catch_unwind(AssertUnwindSafe(|| f(observer.as_ref()))).is_err() {
                log::warn!("link observer panicked during notification; continuing with the rest");
            }
        }
    }

    pub fn notify_link_changed(&self, provider: &str, patch: &LinkPatch) {
        self.notify(|o| o.on_link_changed(provider, patch));
    }

    pub fn notify_many_links_changed(&self, provider: &str) {
        self.notify(|o| o.on_many_links_changed(provider));
    }

    pub fn notify_download_fail(&self, provider: &str) {
        self.notify(|o| o.on_download_fail(provider));
    }
}
