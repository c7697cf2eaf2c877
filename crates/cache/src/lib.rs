//! In-memory cache of repository facts, keyed by link identity.
//!
//! The cache hands out subscriptions, not values. The first request for a link
//! creates a [`Replay`] that will fetch the facts the first time anyone polls
//! it, then remembers that replay forever. Every later request for the same
//! link shares it, so each link is fetched at most once per process no matter
//! how many anchors point at it or when they ask.
//!
//! # Pipeline
//! Every fetch outcome goes through the same steps before anyone sees it:
//! 1. A failed (or timed out) fetch becomes "no value". Subscribers complete
//!    without ever seeing an error.
//! 2. An empty facts mapping is dropped.
//! 3. Anything left is wrapped into a [`Source`].
//! 4. The outcome is shared and replayed to every subscriber, past or future.
//!
//! There is deliberately no way to invalidate or refresh an entry.

mod cache;
mod pipeline;

pub use crate::cache::{CacheOptions, FactCache};
pub use srcfacts_asyncutils::{Replay, ReplayState, Subscription};
use srcfacts_facts::Source;

/// The stream handed out by [`FactCache::watch`].
pub type SourceStream = Subscription<Source>;
