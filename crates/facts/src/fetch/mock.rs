//! Scriptable facts fetcher for testing.

use crate::FactsFetcher;
use crate::error::{ErrorKind, Result};
use crate::models::{Facts, LinkIdentity};
use async_trait::async_trait;
use exn::ResultExt;
use futures::channel::oneshot;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Script {
    Facts(Facts),
    Failure,
    Gated(Mutex<Option<oneshot::Receiver<Facts>>>),
}

/// Releases a [gated](MockFetcher::gated) fetch.
///
/// Dropping the gate without opening it makes the pending fetch fail.
#[derive(Debug)]
pub struct Gate(oneshot::Sender<Facts>);
impl Gate {
    /// Resolve the pending fetch with `facts`.
    pub fn open(self, facts: impl Into<Facts>) {
        // Nobody is waiting anymore if the receiver is gone; that's fine.
        _ = self.0.send(facts.into());
    }

    /// Make the pending fetch fail.
    pub fn fail(self) {
        drop(self);
    }
}

/// Scriptable facts fetcher for testing.
///
/// Every link gets one scripted response: facts, a failure, or a gate that
/// holds the fetch open until the test decides to release it. Unscripted links
/// fail with [`ErrorKind::NotFound`]. Every call is recorded, so tests can
/// assert how often a link was really fetched.
///
/// # Examples
///
/// ```
/// use srcfacts_facts::{Facts, FactsFetcher, MockFetcher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (fetcher, gate) = MockFetcher::default()
///     .with_facts("https://x/ready", [("stars", "5")])
///     .with_failure("https://x/broken")
///     .gated("https://x/slow");
///
/// let link = "https://x/ready".parse().unwrap();
/// assert_eq!(fetcher.fetch(&link).await.unwrap().get("stars"), Some("5"));
///
/// gate.open([("forks", "2")]);
/// let link = "https://x/slow".parse().unwrap();
/// assert_eq!(fetcher.fetch(&link).await.unwrap().get("forks"), Some("2"));
/// assert_eq!(fetcher.calls(), 2);
/// # }
/// ```
pub struct MockFetcher {
    name: String,
    scripts: HashMap<LinkIdentity, Script>,
    calls: Mutex<Vec<LinkIdentity>>,
}

impl MockFetcher {
    /// Panics on an invalid link. If test setup is wrong, then test should not
    /// pass.
    fn link(href: &str) -> LinkIdentity {
        match LinkIdentity::parse(href) {
            Ok(link) => link,
            Err(_) => panic!("MockFetcher: invalid link {href}"),
        }
    }

    fn script(mut self, href: impl AsRef<str>, script: Script) -> Self {
        self.scripts.insert(Self::link(href.as_ref()), script);
        self
    }

    /// Resolve `href` immediately with `facts`.
    pub fn with_facts(self, href: impl AsRef<str>, facts: impl Into<Facts>) -> Self {
        self.script(href, Script::Facts(facts.into()))
    }

    /// Fail every fetch of `href`.
    pub fn with_failure(self, href: impl AsRef<str>) -> Self {
        self.script(href, Script::Failure)
    }

    /// Hold the first fetch of `href` open until the returned [`Gate`] is
    /// opened. Any later fetch of the same link fails.
    pub fn gated(self, href: impl AsRef<str>) -> (Self, Gate) {
        let (tx, rx) = oneshot::channel();
        (self.script(href, Script::Gated(Mutex::new(Some(rx)))), Gate(tx))
    }

    /// Total number of fetches across all links.
    pub fn calls(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Number of fetches for one link.
    pub fn calls_for(&self, href: impl AsRef<str>) -> usize {
        let link = Self::link(href.as_ref());
        lock(&self.calls).iter().filter(|called| **called == link).count()
    }
}
impl Default for MockFetcher {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            scripts: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FactsFetcher for MockFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, link: &LinkIdentity) -> Result<Facts> {
        lock(&self.calls).push(link.clone());
        let receiver = match self.scripts.get(link) {
            None => exn::bail!(ErrorKind::NotFound(link.to_string())),
            Some(Script::Facts(facts)) => return Ok(facts.clone()),
            Some(Script::Failure) => exn::bail!(ErrorKind::Network),
            Some(Script::Gated(slot)) => {
                // Guard must be gone before the await below.
                let receiver = lock(slot).take();
                receiver
            },
        };
        match receiver {
            Some(receiver) => receiver.await.or_raise(|| ErrorKind::Network),
            None => exn::bail!(ErrorKind::Network),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls() {
        let fetcher = MockFetcher::default().with_facts("https://x/a", [("stars", "1")]);
        let a = "https://x/a".parse().unwrap();
        let b = "https://x/b".parse().unwrap();
        fetcher.fetch(&a).await.unwrap();
        fetcher.fetch(&a).await.unwrap();
        assert_eq!(*fetcher.fetch(&b).await.unwrap_err(), ErrorKind::NotFound("https://x/b".to_string()));
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(fetcher.calls_for("https://x/a"), 2);
    }

    #[tokio::test]
    async fn test_failure() {
        let fetcher = MockFetcher::default().with_failure("https://x/a");
        let err = fetcher.fetch(&"https://x/a".parse().unwrap()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_gate_dropped_fails_fetch() {
        let (fetcher, gate) = MockFetcher::default().gated("https://x/a");
        gate.fail();
        let err = fetcher.fetch(&"https://x/a".parse().unwrap()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_gate_only_serves_once() {
        let (fetcher, gate) = MockFetcher::default().gated("https://x/a");
        gate.open([("stars", "5")]);
        let link = "https://x/a".parse().unwrap();
        assert!(fetcher.fetch(&link).await.is_ok());
        assert!(fetcher.fetch(&link).await.is_err());
    }
}
