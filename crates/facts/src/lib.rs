//! Repository facts: what they are, who they belong to, and where they come from.
//!
//! A *link identity* is the absolute URL an anchor points at. Every anchor
//! pointing at the same URL shares one set of [`Facts`] (star counts, fork
//! counts, the latest release, ...). Facts only become a [`Source`] once they
//! are known to be non-empty.
//!
//! Fetching is a seam: anything implementing [`FactsFetcher`] can provide
//! facts. This crate ships a [`FixtureFetcher`] backed by a JSON document, and
//! (behind the `mock` feature) a scriptable [`MockFetcher`] for tests.

pub mod error;
pub mod fetch;
mod models;

#[cfg(feature = "mock")]
pub use crate::fetch::{Gate, MockFetcher};
pub use crate::fetch::{FactsFetcher, FetcherHandle, FixtureFetcher};
pub use crate::models::{Facts, LinkIdentity, Source};
