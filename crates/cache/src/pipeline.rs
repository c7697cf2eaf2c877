//! What happens between "somebody subscribed" and "subscribers see a value".

use srcfacts_facts::error::{ErrorKind, Result};
use srcfacts_facts::{Facts, FetcherHandle, LinkIdentity, Source};
use std::time::Duration;
use tracing::instrument;

async fn fetch(fetcher: &FetcherHandle, link: &LinkIdentity, timeout: Option<Duration>) -> Result<Facts> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fetcher.fetch(link)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(exn::Exn::from(ErrorKind::Timeout)),
        },
        None => fetcher.fetch(link).await,
    }
}

/// Fetch the facts for `link` and turn them into at most one [`Source`].
///
/// Never fails: a failed fetch and an empty mapping both come out as `None`.
/// The distinction only survives in the logs.
#[instrument(skip_all, fields(link = %link, fetcher = fetcher.name()))]
pub(crate) async fn fetch_source(
    fetcher: FetcherHandle,
    link: LinkIdentity,
    timeout: Option<Duration>,
) -> Option<Source> {
    tracing::debug!("Fetching repository facts");
    let facts = match fetch(&fetcher, &link, timeout).await {
        Ok(facts) => facts,
        Err(err) => {
            tracing::warn!(error = ?err, retryable = err.is_retryable(), "Repository facts unavailable");
            return None;
        },
    };
    let source = Source::new(facts);
    match &source {
        Some(source) => tracing::debug!(facts = source.facts().len(), "Repository facts resolved"),
        None => tracing::debug!("Repository facts empty; nothing to show"),
    }
    source
}
