//! Mounts repository facts onto source link elements.
//!
//! [`Mounter::mount`] takes an [`Anchor`] (anything that looks like a link to
//! a repository), subscribes to the shared facts for its target through a
//! [`FactCache`](srcfacts_cache::FactCache), and returns a [`Mount`]: a stream
//! of [`Component`]s tying the facts back to the anchor.
//!
//! Driving the stream is what makes things happen. When facts arrive, the
//! anchor is updated exactly once, in order:
//! 1. the facts are rendered and written with [`Anchor::set_facts`],
//! 2. the anchor is marked [`SourceState::Done`] with [`Anchor::set_state`].
//!
//! When there are no facts (the fetch failed, or came back empty) the stream
//! just ends and the anchor is never touched.

mod anchor;
mod component;
mod dispatch;
mod mount;

pub use crate::anchor::{Anchor, MemoryAnchor, Mutation, SourceState};
pub use crate::component::Component;
pub use crate::dispatch::{Dispatch, DispatchClosed};
pub use crate::mount::{Mount, Mounter};
