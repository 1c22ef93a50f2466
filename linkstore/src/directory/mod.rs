//! Remote directory links: locale-aware fetch, throttled download, atomic
//! persistence, and change notification. The [`DirectoryCache`] is itself a
//! [`LinkProvider`](crate::provider::LinkProvider) and plugs into the
//! [`LinkStore`](crate::store::LinkStore) like any other source.

mod cache;
mod source;

pub use cache::{DirectoryCache, DirectoryCacheConfig, DIRECTORY_FRECENCY};
