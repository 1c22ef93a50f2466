//! Scenario tests for the merged link view: multi-provider merging under
//! the global cap, and live updates through the provider notification path.

use linkstore::{Link, LinkObserver, LinkPatch, LinkStore, StaticLinkProvider};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[tokio::test]
async fn multiple_providers_merge_into_a_capped_sorted_view() {
    let store = Arc::new(LinkStore::default());
    let max = store.max_num_links();

    // One provider emits even frecencies, the other odd; each contributes
    // `max` links so the merged view has to truncate.
    let even: Vec<Link> = (0..max)
        .map(|i| {
            let f = (max * 2 - 2 - 2 * i) as i64;
            Link::new(format!("http://example.com/{}", f), f, 0)
        })
        .collect();
    let odd: Vec<Link> = (0..max)
        .map(|i| {
            let f = (max * 2 - 1 - 2 * i) as i64;
            Link::new(format!("http://example.com/{}", f), f, 0)
        })
        .collect();

    store.add_provider(Arc::new(StaticLinkProvider::new("even", even)));
    store.add_provider(Arc::new(StaticLinkProvider::new("odd", odd)));

    store.populate_cache(false).await;

    let links = store.get_links();
    assert_eq!(links.len(), max);
    for (i, link) in links.iter().enumerate() {
        let frecency = (max * 2 - 1 - i) as i64;
        assert_eq!(link.url, format!("http://example.com/{}", frecency));
        assert_eq!(link.frecency, frecency);
    }
}

#[tokio::test]
async fn incremental_changes_flow_through_the_provider_subscription() {
    let mut expected: Vec<Link> = (1..=10)
        .rev()
        .map(|i| {
            let f = 2 * i;
            Link::new(format!("http://example.com/{}", f), f, 0)
                .with_title(format!("My frecency is {}", f))
        })
        .collect();

    let provider = Arc::new(StaticLinkProvider::new("test", expected.clone()));
    let store = Arc::new(LinkStore::new(11));
    let id = store.add_provider(provider.clone());

    store.populate_cache(false).await;
    assert_eq!(store.get_links(), expected);

    // A new link arrives through the provider's own notification channel.
    let new_link = Link::new("http://example.com/19", 19, 0).with_title("My frecency is 19");
    expected.insert(1, new_link.clone());
    provider.notify_link_changed(&LinkPatch::from(new_link.clone()));
    assert_eq!(store.get_links(), expected);

    // The link's sort criteria change; it moves down one slot.
    let mut moved = new_link.clone();
    moved.frecency = 17;
    expected.remove(1);
    expected.insert(2, moved.clone());
    provider.notify_link_changed(&LinkPatch::new("http://example.com/19").with_frecency(17));
    assert_eq!(store.get_links(), expected);

    // Title-only change keeps the position.
    expected[2].title = Some("My frecency is now 17".to_string());
    provider
        .notify_link_changed(&LinkPatch::new("http://example.com/19").with_title("My frecency is now 17"));
    assert_eq!(store.get_links(), expected);

    // The view is full (11 links, cap 11); one more on top evicts the tail.
    assert_eq!(expected.len(), store.max_num_links());
    let overflow = Link::new("http://example.com/21", 21, 0);
    expected.insert(0, overflow.clone());
    expected.pop();
    provider.notify_link_changed(&LinkPatch::from(overflow));
    assert_eq!(store.get_links(), expected);

    // Bulk change: the provider replaces everything and the store refetches.
    let replacement: Vec<Link> = (1..=3)
        .rev()
        .map(|i| Link::new(format!("http://example.com/{}", i), i, i))
        .collect();
    provider.set_links(replacement.clone());
    store.refresh_provider(id).await;
    assert_eq!(store.get_links(), replacement);
}

#[tokio::test]
async fn bulk_change_notifications_trigger_a_background_refresh() {
    let provider = Arc::new(StaticLinkProvider::new(
        "test",
        vec![Link::new("http://example.com/1", 1, 0)],
    ));
    let store = Arc::new(LinkStore::default());
    store.add_provider(provider.clone());
    store.populate_cache(false).await;
    assert_eq!(store.get_links().len(), 1);

    provider.set_links(vec![
        Link::new("http://example.com/2", 2, 0),
        Link::new("http://example.com/3", 3, 0),
    ]);
    provider.notify_many_links_changed();

    // The refetch runs as a background task on this runtime.
    for _ in 0..50 {
        if store.get_links().len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(store.get_links().len(), 2);
}

#[tokio::test]
async fn store_observers_hear_about_view_changes_after_the_swap() {
    struct ViewWatcher {
        store: Arc<LinkStore>,
        seen: AtomicUsize,
    }
    impl LinkObserver for ViewWatcher {
        fn on_link_changed(&self, _provider: &str, patch: &LinkPatch) {
            // The change must already be observable through a read.
            assert!(self.store.get_links().iter().any(|l| l.url == patch.url));
            self.seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    let provider = Arc::new(StaticLinkProvider::new("test", Vec::new()));
    let store = Arc::new(LinkStore::default());
    let id = store.add_provider(provider);
    store.populate_cache(false).await;

    let watcher = Arc::new(ViewWatcher {
        store: store.clone(),
        seen: AtomicUsize::new(0),
    });
    store.add_observer(watcher.clone());

    store.apply_link_change(id, LinkPatch::new("http://example.com/fresh").with_frecency(5));
    assert_eq!(watcher.seen.load(Ordering::SeqCst), 1);
}
