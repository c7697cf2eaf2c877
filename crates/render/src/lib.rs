//! Turns repository [`Facts`] into the markup shown inside a source link.
//!
//! The [`RenderFacts`] trait is the seam the component layer renders through;
//! [`FactsRenderer`] is the template-driven implementation.

pub mod error;
mod render;

pub use crate::render::{DEFAULT_TEMPLATE, FactsRenderer, Rendered};
use crate::error::Result;
use srcfacts_facts::Facts;

/// Pure function from facts to display markup.
pub trait RenderFacts: Send + Sync {
    fn render(&self, facts: &Facts) -> Result<Rendered>;
}
