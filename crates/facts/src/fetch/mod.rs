//! The fetch seam: where repository facts come from.
//!
//! Retrieval itself (talking to GitHub, GitLab, ...) lives outside this
//! workspace. Implementations only need to turn a [`LinkIdentity`] into
//! [`Facts`] eventually, or fail. Callers treat every failure the same way,
//! so implementations don't need to be clever about error classification.

mod fixture;
#[cfg(feature = "mock")]
mod mock;

pub use self::fixture::FixtureFetcher;
#[cfg(feature = "mock")]
pub use self::mock::{Gate, MockFetcher};
use crate::error::Result;
use crate::models::{Facts, LinkIdentity};
use async_trait::async_trait;
use std::sync::Arc;

pub type FetcherHandle = Arc<dyn FactsFetcher>;

/// Something that knows how to retrieve facts about a repository.
///
/// An empty [`Facts`] mapping is a perfectly valid answer ("nothing to
/// show"), and is distinct from an error only for logging purposes.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use srcfacts_facts::error::Result;
/// use srcfacts_facts::{Facts, FactsFetcher, LinkIdentity};
///
/// struct Constant;
///
/// #[async_trait]
/// impl FactsFetcher for Constant {
///     fn name(&self) -> &str {
///         "constant"
///     }
///
///     async fn fetch(&self, _link: &LinkIdentity) -> Result<Facts> {
///         Ok(Facts::from([("stars", "42")]))
///     }
/// }
/// ```
#[async_trait]
pub trait FactsFetcher: Send + Sync {
    /// Name of the fetcher (used for logging only).
    fn name(&self) -> &str;

    /// Retrieve the facts for the repository at `link`.
    async fn fetch(&self, link: &LinkIdentity) -> Result<Facts>;
}
