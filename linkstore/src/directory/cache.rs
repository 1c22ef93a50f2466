//! Locale-aware directory-link cache.
//!
//! Responsibilities:
//! - Resolve the configured source URL (with locale substitution), download
//!   the directory document, and persist it atomically to one cache file.
//! - Throttle downloads (default once per 24h) and gate scheduled downloads
//!   on whether any consumer is actually showing the gated category.
//! - Notify observers of material changes: `on_many_links_changed` after a
//!   durable cache write, `on_download_fail` when a fetch fails.
//!
//! A failed or malformed fetch never touches the existing cache file, and
//! never advances `last_download`, so the next eligible check retries
//! promptly. Fetches are serialized per instance: a stale fetch can never
//! overwrite fresher cached data.

use crate::directory::source::{expand_template, fetch_source_body};
use crate::error::{LinkError, LinkResult};
use crate::observer::{LinkObserver, ObserverRegistry};
use crate::provider::LinkProvider;
use crate::types::Link;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Constant source-level ranking weight attached to directory links.
pub const DIRECTORY_FRECENCY: i64 = 1000;

const PROVIDER_NAME: &str = "directory";
const DEFAULT_LOCALE: &str = "en-US";

/// Injected configuration for one cache instance.
#[derive(Debug, Clone)]
pub struct DirectoryCacheConfig {
    /// Path of the persisted directory document.
    pub cache_path: PathBuf,
    /// Minimum elapsed time between scheduled downloads.
    pub throttle: Duration,
    /// Frecency assigned to every directory-sourced link.
    pub directory_frecency: i64,
    /// Category whose visible-slot count gates scheduled downloads.
    pub gate_category: String,
    pub request_timeout: Duration,
}

impl DirectoryCacheConfig {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            throttle: Duration::from_secs(24 * 60 * 60),
            directory_frecency: DIRECTORY_FRECENCY,
            gate_category: "sponsored".to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_directory_frecency(mut self, frecency: i64) -> Self {
        self.directory_frecency = frecency;
        self
    }

    pub fn with_gate_category(mut self, category: impl Into<String>) -> Self {
        self.gate_category = category.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct DirectoryState {
    locale: String,
    source_url: Option<String>,
    /// Epoch seconds of the last successful download; 0 = never.
    last_download: u64,
    shown_counts: HashMap<String, usize>,
    initialized: bool,
}

impl Default for DirectoryState {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            source_url: None,
            last_download: 0,
            shown_counts: HashMap::new(),
            initialized: false,
        }
    }
}

/// Fetches a locale-keyed directory document, persists it locally, and
/// serves it as a [`LinkProvider`].
pub struct DirectoryCache {
    config: DirectoryCacheConfig,
    state: Mutex<DirectoryState>,
    observers: ObserverRegistry,
    client: reqwest::Client,
    /// Serializes fetch+write+notify sequences per instance.
    fetch_gate: tokio::sync::Mutex<()>,
}

impl DirectoryCache {
    pub fn new(config: DirectoryCacheConfig) -> LinkResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("linkstore-directory/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LinkError::Provider(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            state: Mutex::new(DirectoryState::default()),
            observers: ObserverRegistry::new(),
            client,
            fetch_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Mark the cache live. Idempotent: repeated calls after the first are
    /// no-ops. The reactive locale/source-URL triggers stay inert until
    /// this runs, so configuration can be staged without firing downloads.
    pub fn init(&self) {
        let mut state = self.state.lock().unwrap();
        if state.initialized {
            return;
        }
        state.initialized = true;
        log::debug!("directory cache initialized ({})", self.config.cache_path.display());
    }

    /// Full unwind: clears observers, shown counts, locale/source state,
    /// and the download timestamp. A subsequent `init` starts clean.
    pub fn reset(&self) {
        self.observers.remove_all();
        *self.state.lock().unwrap() = DirectoryState::default();
        log::debug!("directory cache reset");
    }

    pub fn add_observer(&self, observer: std::sync::Arc<dyn LinkObserver>) {
        self.observers.add_observer(observer);
    }

    pub fn remove_observer(&self, observer: &std::sync::Arc<dyn LinkObserver>) {
        self.observers.remove_observer(observer);
    }

    pub fn remove_observers(&self) {
        self.observers.remove_all();
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn locale(&self) -> String {
        self.state.lock().unwrap().locale.clone()
    }

    pub fn source_url(&self) -> Option<String> {
        self.state.lock().unwrap().source_url.clone()
    }

    pub fn last_download(&self) -> u64 {
        self.state.lock().unwrap().last_download
    }

    /// Change the active locale. Once initialized, a changed value forces a
    /// download; setting the same value twice is a no-op. Changes made
    /// before `init` are recorded without triggering a download.
    pub async fn set_locale(&self, locale: &str) {
        let trigger = {
            let mut state = self.state.lock().unwrap();
            if state.locale == locale {
                false
            } else {
                state.locale = locale.to_string();
                state.initialized
            }
        };
        if trigger {
            self.fetch_directory_content(true).await;
        }
    }

    /// Change the source-URL template. Once initialized, a changed value
    /// forces a download; setting the same value twice is a no-op. Changes
    /// made before `init` are recorded without triggering a download.
    pub async fn set_source_url(&self, source_url: &str) {
        let trigger = {
            let mut state = self.state.lock().unwrap();
            if state.source_url.as_deref() == Some(source_url) {
                false
            } else {
                state.source_url = Some(source_url.to_string());
                state.initialized
            }
        };
        if trigger {
            self.fetch_directory_content(true).await;
        }
    }

    /// Pure throttle check against an explicit clock reading.
    pub fn needs_download_at(&self, now_secs: u64) -> bool {
        let last = self.state.lock().unwrap().last_download;
        last == 0 || now_secs.saturating_sub(last) >= self.config.throttle.as_secs()
    }

    /// Throttle check against the wall clock.
    pub fn needs_download(&self) -> bool {
        self.needs_download_at(now_epoch_secs())
    }

    /// Record how many slots of a category are currently visible. A
    /// scheduled download is skipped while the gate category sits at zero.
    pub fn report_shown_count(&self, category: &str, count: usize) {
        self.state
            .lock()
            .unwrap()
            .shown_counts
            .insert(category.to_string(), count);
    }

    fn download_gated(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .shown_counts
            .get(&self.config.gate_category)
            == Some(&0)
    }

    /// Download the configured source if forced or throttle-eligible.
    ///
    /// Success advances `last_download` and notifies
    /// `on_many_links_changed`; failure leaves `last_download` and the cache
    /// file untouched and notifies `on_download_fail`.
    pub async fn fetch_directory_content(&self, force: bool) {
        let _serial = self.fetch_gate.lock().await;

        if !force {
            if self.download_gated() {
                log::debug!("directory download skipped: no visible consumers");
                return;
            }
            if !self.needs_download() {
                log::debug!("directory download skipped: throttled");
                return;
            }
        }

        // Capture the configuration at fetch start; a change arriving while
        // this fetch is in flight queues behind the gate.
        let (template, locale) = {
            let state = self.state.lock().unwrap();
            (state.source_url.clone(), state.locale.clone())
        };
        let template = match template {
            Some(template) => template,
            None => {
                log::debug!("directory download skipped: no source configured");
                return;
            }
        };
        let source_url = expand_template(&template, &locale);

        match self.fetch_and_cache_links(&source_url).await {
            Ok(()) => {
                self.state.lock().unwrap().last_download = now_epoch_secs();
                self.observers.notify_many_links_changed(PROVIDER_NAME);
            }
            Err(e) => {
                log::warn!("directory download failed: {}", e);
                self.observers.notify_download_fail(PROVIDER_NAME);
            }
        }
    }

    /// Fetch one source and atomically replace the cache file with its
    /// parsed JSON document. Any failure leaves the existing file exactly
    /// as it was.
    pub async fn fetch_and_cache_links(&self, source_url: &str) -> LinkResult<()> {
        let locale = self.locale();
        let body = fetch_source_body(&self.client, source_url, &locale).await?;

        let document: serde_json::Value = serde_json::from_str(&body)?;
        if !document.is_object() {
            return Err(LinkError::Serde(format!(
                "directory document from {} is not a JSON object",
                source_url
            )));
        }

        let serialized = serde_json::to_string(&document)?;
        write_atomic(&self.config.cache_path, serialized.as_bytes())?;
        log::debug!("directory cache written from {}", source_url);
        Ok(())
    }

    /// The persisted document, if present and well-formed. Mostly useful
    /// for diagnostics and tests.
    pub fn cached_document(&self) -> Option<serde_json::Value> {
        let content = fs::read_to_string(&self.config.cache_path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Links for the active locale, ranked deterministically: every entry
    /// carries the configured directory frecency and a synthetic last-visit
    /// date descending from the top of the source array. Missing or
    /// malformed cache data, or an absent locale key, yields an empty list.
    pub fn links_for_active_locale(&self) -> Vec<Link> {
        let locale = self.locale();
        let document = match self.cached_document() {
            Some(document) => document,
            None => return Vec::new(),
        };
        // Exact locale match only; no fallback chain.
        let entries = match document.get(locale.as_str()).and_then(|v| v.as_array()) {
            Some(entries) => entries,
            None => return Vec::new(),
        };

        let total = entries.len() as i64;
        entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let url = entry.get("url")?.as_str()?.to_string();
                let title = entry
                    .get("title")
                    .and_then(|t| t.as_str())
                    .map(str::to_string);
                Some(Link {
                    url,
                    title,
                    frecency: self.config.directory_frecency,
                    last_visit_date: total - i as i64,
                })
            })
            .collect()
    }
}

#[async_trait]
impl LinkProvider for DirectoryCache {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_links(&self) -> LinkResult<Vec<Link>> {
        Ok(self.links_for_active_locale())
    }

    fn subscribe(&self, observer: std::sync::Arc<dyn LinkObserver>) {
        self.observers.add_observer(observer);
    }

    fn unsubscribe(&self, observer: &std::sync::Arc<dyn LinkObserver>) {
        self.observers.remove_observer(observer);
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Write-then-rename so readers only ever see a complete document.
fn write_atomic(path: &Path, data: &[u8]) -> LinkResult<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let tmp_name = format!("{}.tmp", uuid::Uuid::new_v4());
    let tmp = match path.parent() {
        Some(dir) => dir.join(tmp_name),
        None => PathBuf::from(tmp_name),
    };
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> DirectoryCache {
        DirectoryCache::new(DirectoryCacheConfig::new(dir.path().join("directoryLinks.json")))
            .unwrap()
    }

    fn write_document(cache: &DirectoryCache, json: &str) {
        write_atomic(&cache.config.cache_path, json.as_bytes()).unwrap();
    }

    #[test]
    fn needs_download_when_never_downloaded() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert_eq!(cache.last_download(), 0);
        assert!(cache.needs_download());
    }

    #[test]
    fn throttle_window_controls_needs_download() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.state.lock().unwrap().last_download = 1_000_000;

        let throttle = cache.config.throttle.as_secs();
        assert!(!cache.needs_download_at(1_000_000 + throttle - 1));
        assert!(cache.needs_download_at(1_000_000 + throttle));
    }

    #[test]
    fn locale_selection_is_exact_match_only() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        write_document(
            &cache,
            r#"{"en-US":[{"url":"http://example.com","title":"US"}]}"#,
        );

        cache.state.lock().unwrap().locale = "zh-CN".to_string();
        assert!(cache.links_for_active_locale().is_empty());

        cache.state.lock().unwrap().locale = "en-US".to_string();
        let links = cache.links_for_active_locale();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title.as_deref(), Some("US"));
    }

    #[test]
    fn directory_links_get_synthetic_ranking() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        write_document(
            &cache,
            r#"{"en-US":[{"url":"http://example.net","title":"first"},{"url":"http://example.net/2","title":"second"}]}"#,
        );

        let links = cache.links_for_active_locale();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].frecency, DIRECTORY_FRECENCY);
        // First entry gets the highest synthetic date.
        assert_eq!(links[0].last_visit_date, 2);
        assert_eq!(links[1].last_visit_date, 1);
    }

    #[test]
    fn missing_or_malformed_cache_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.links_for_active_locale().is_empty());

        write_document(&cache, "not json at all");
        assert!(cache.links_for_active_locale().is_empty());
    }

    #[test]
    fn entries_without_urls_are_skipped() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        write_document(
            &cache,
            r#"{"en-US":[{"title":"no url"},{"url":"http://example.com"}]}"#,
        );
        let links = cache.links_for_active_locale();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "http://example.com");
    }

    #[tokio::test]
    async fn gated_category_skips_scheduled_download() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let json = r#"{"en-US":[{"url":"http://example.com"}]}"#;
        let uri = format!("data:application/json,{}", urlencoding::encode(json));
        cache.state.lock().unwrap().source_url = Some(uri);

        cache.report_shown_count("sponsored", 0);
        cache.fetch_directory_content(false).await;
        assert!(cache.cached_document().is_none());
        assert_eq!(cache.last_download(), 0);

        // A nonzero count lifts the gate.
        cache.report_shown_count("sponsored", 2);
        cache.fetch_directory_content(false).await;
        assert!(cache.cached_document().is_some());
        assert!(cache.last_download() > 0);
    }

    #[tokio::test]
    async fn forced_download_ignores_the_gate() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let json = r#"{"en-US":[{"url":"http://example.com"}]}"#;
        let uri = format!("data:application/json,{}", urlencoding::encode(json));
        cache.state.lock().unwrap().source_url = Some(uri);

        cache.report_shown_count("sponsored", 0);
        cache.fetch_directory_content(true).await;
        assert!(cache.cached_document().is_some());
    }

    #[test]
    fn init_and_reset_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache.init();
        cache.init();
        cache.report_shown_count("sponsored", 3);

        cache.reset();
        assert_eq!(cache.observer_count(), 0);
        assert_eq!(cache.last_download(), 0);
        assert!(cache.source_url().is_none());
        assert_eq!(cache.locale(), "en-US");

        cache.init();
        cache.reset();
        cache.reset();
    }

    #[test]
    fn atomic_write_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_atomic(&path, br#"{"a":1}"#).unwrap();
        write_atomic(&path, br#"{"b":2}"#).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, r#"{"b":2}"#);
        // No temp files left behind.
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty());
    }
}
