//! Link aggregation and directory-cache engine.
//!
//! Two coupled halves:
//! - the [`LinkStore`], which merges ranked link lists from any number of
//!   registered [`LinkProvider`]s into one capped, deterministically sorted
//!   view with cheap incremental invalidation;
//! - the [`DirectoryCache`], a provider that downloads a locale-keyed JSON
//!   directory under a throttling policy, persists it atomically, and
//!   announces material changes through the shared observer registry.
//!
//! Providers push changes through [`LinkObserver`] callbacks; registering a
//! provider with a store wires that plumbing up automatically.

pub mod directory;
pub mod error;
pub mod observer;
pub mod provider;
pub mod store;
pub mod types;

pub use directory::{DirectoryCache, DirectoryCacheConfig, DIRECTORY_FRECENCY};
pub use error::{LinkError, LinkResult};
pub use observer::{LinkObserver, ObserverRegistry};
pub use provider::{LinkProvider, StaticLinkProvider};
pub use store::{LinkStore, ProviderId, DEFAULT_MAX_NUM_LINKS};
pub use types::{Link, LinkPatch};
