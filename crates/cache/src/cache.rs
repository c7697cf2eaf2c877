use crate::SourceStream;
use crate::pipeline::fetch_source;
use srcfacts_asyncutils::Replay;
use srcfacts_facts::{FetcherHandle, LinkIdentity, Source};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Tuning knobs for a [`FactCache`].
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Give up on a fetch after this long. A timed-out fetch is treated like
    /// any other failed fetch: the link simply never gets any facts.
    pub fetch_timeout: Option<Duration>,
}

struct Inner {
    fetcher: FetcherHandle,
    options: CacheOptions,
    // Append-only. Entries are never replaced or removed.
    entries: Mutex<HashMap<LinkIdentity, Replay<Source>>>,
}

/// Process-lifetime cache of repository facts, one shared [`Replay`] per link.
///
/// Cloning is cheap and every clone shares the same entries.
///
/// # Examples
///
/// ```
/// use srcfacts_cache::FactCache;
/// use srcfacts_facts::{LinkIdentity, MockFetcher};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = Arc::new(MockFetcher::default().with_facts("https://x/repo", [("stars", "5")]));
/// let cache = FactCache::new(fetcher.clone());
/// let link: LinkIdentity = "https://x/repo".parse().unwrap();
///
/// // Nothing is fetched until somebody actually polls.
/// let first = cache.watch(&link);
/// let second = cache.watch(&link);
/// assert_eq!(fetcher.calls(), 0);
///
/// let (a, b) = tokio::join!(first.value(), second.value());
/// assert_eq!(a, b);
/// assert_eq!(fetcher.calls(), 1);
/// # }
/// ```
#[derive(Clone)]
pub struct FactCache {
    inner: Arc<Inner>,
}

impl FactCache {
    pub fn new(fetcher: FetcherHandle) -> Self {
        Self::with_options(fetcher, CacheOptions::default())
    }

    pub fn with_options(fetcher: FetcherHandle, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                options,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<LinkIdentity, Replay<Source>>> {
        // Nothing panics while holding this lock; the map is always intact.
        self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to the facts for `link`.
    ///
    /// Returns immediately and never fetches by itself: the fetch starts the
    /// first time any subscription for `link` is polled, and runs at most once
    /// for the lifetime of the cache. The stream yields at most one [`Source`]
    /// and never an error.
    pub fn watch(&self, link: &LinkIdentity) -> SourceStream {
        self.entry(link).subscribe()
    }

    /// The shared entry for `link`, created on first request.
    ///
    /// Lookup and insertion happen under one lock acquisition, so two callers
    /// can never both create an entry for the same link.
    pub fn entry(&self, link: &LinkIdentity) -> Replay<Source> {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(link) {
            return existing.clone();
        }
        tracing::trace!(link = %link, "Creating cache entry");
        let replay = self.create(link);
        entries.insert(link.clone(), replay.clone());
        replay
    }

    fn create(&self, link: &LinkIdentity) -> Replay<Source> {
        let fetcher = Arc::clone(&self.inner.fetcher);
        let timeout = self.inner.options.fetch_timeout;
        let link = link.clone();
        Replay::lazy(move || fetch_source(fetcher, link, timeout))
    }

    pub fn contains(&self, link: &LinkIdentity) -> bool {
        self.entries().contains_key(link)
    }

    /// Number of distinct links ever requested.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl fmt::Debug for FactCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactCache")
            .field("fetcher", &self.inner.fetcher.name())
            .field("options", &self.inner.options)
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};
    use rstest::rstest;
    use srcfacts_asyncutils::ReplayState;
    use srcfacts_facts::{Facts, MockFetcher};

    fn link(href: &str) -> LinkIdentity {
        href.parse().unwrap()
    }

    #[tokio::test]
    async fn test_watch_is_lazy() {
        let fetcher = Arc::new(MockFetcher::default().with_facts("https://x/repo", [("stars", "5")]));
        let cache = FactCache::new(fetcher.clone());
        let stream = cache.watch(&link("https://x/repo"));
        assert!(cache.contains(&link("https://x/repo")));
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(cache.entry(&link("https://x/repo")).state(), ReplayState::Idle);

        let source = stream.value().await.unwrap();
        assert_eq!(source.facts().get("stars"), Some("5"));
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_same_link_same_entry() {
        let fetcher = Arc::new(MockFetcher::default().with_facts("https://x/repo", [("stars", "5")]));
        let cache = FactCache::new(fetcher);
        let a = cache.entry(&link("https://x/repo"));
        let b = cache.entry(&link("HTTPS://X/repo"));
        assert!(a.ptr_eq(&b));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_pending_watchers_share_one_fetch() {
        let (fetcher, gate) = MockFetcher::default().gated("https://x/repo");
        let fetcher = Arc::new(fetcher);
        let cache = FactCache::new(fetcher.clone());
        let repo = link("https://x/repo");

        let (a, b, ()) = tokio::join!(cache.watch(&repo).value(), cache.watch(&repo).value(), async {
            tokio::task::yield_now().await;
            gate.open([("stars", "5")]);
        });
        assert_eq!(a, b);
        assert!(a.is_some());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_resolved_entry_replays_without_fetching() {
        let fetcher = Arc::new(MockFetcher::default().with_facts("https://x/repo", [("stars", "5")]));
        let cache = FactCache::new(fetcher.clone());
        let repo = link("https://x/repo");
        cache.watch(&repo).value().await.unwrap();

        // Already resolved: delivered on the first poll, no suspension.
        let replayed = cache.watch(&repo).next().now_or_never();
        assert!(matches!(replayed, Some(Some(_))));
        assert_eq!(fetcher.calls(), 1);
    }

    #[rstest]
    #[case::empty(MockFetcher::default().with_facts("https://x/repo", Facts::new()))]
    #[case::failure(MockFetcher::default().with_failure("https://x/repo"))]
    #[case::unknown(MockFetcher::default())]
    #[tokio::test]
    async fn test_no_value_is_permanent(#[case] fetcher: MockFetcher) {
        let fetcher = Arc::new(fetcher);
        let cache = FactCache::new(fetcher.clone());
        let repo = link("https://x/repo");
        let first: Vec<Source> = cache.watch(&repo).collect().await;
        let second: Vec<Source> = cache.watch(&repo).collect().await;
        assert!(first.is_empty());
        assert!(second.is_empty());
        assert_eq!(cache.entry(&repo).state(), ReplayState::Completed);
        // No retry, ever.
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_distinct_links_fetched_separately() {
        let fetcher = Arc::new(
            MockFetcher::default()
                .with_facts("https://x/a", [("stars", "1")])
                .with_facts("https://x/b", [("stars", "2")]),
        );
        let cache = FactCache::new(fetcher.clone());
        let a = cache.watch(&link("https://x/a")).value().await.unwrap();
        let b = cache.watch(&link("https://x/b")).value().await.unwrap();
        assert_eq!(a.facts().get("stars"), Some("1"));
        assert_eq!(b.facts().get("stars"), Some("2"));
        assert_eq!(fetcher.calls_for("https://x/a"), 1);
        assert_eq!(fetcher.calls_for("https://x/b"), 1);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_timed_out_fetch_completes_empty() {
        let (fetcher, _gate) = MockFetcher::default().gated("https://x/repo");
        let options = CacheOptions { fetch_timeout: Some(Duration::from_millis(10)) };
        let cache = FactCache::with_options(Arc::new(fetcher), options);
        assert!(cache.watch(&link("https://x/repo")).value().await.is_none());
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = FactCache::new(Arc::new(MockFetcher::default()));
        let clone = cache.clone();
        cache.entry(&link("https://x/repo"));
        assert!(clone.contains(&link("https://x/repo")));
        assert!(!clone.is_empty());
    }
}
