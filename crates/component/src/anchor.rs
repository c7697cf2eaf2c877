use derive_more::Display;
use srcfacts_render::Rendered;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State flag written onto an anchor.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Facts have been rendered into the anchor.
    #[display("done")]
    Done,
}

/// A link element pointing at a repository.
///
/// The setters take `&self`: elements are shared (the component only ever
/// holds a weak reference), so implementations provide their own interior
/// mutability.
pub trait Anchor: Send + Sync {
    /// The link target, as written. May be relative if the mounter has a base URL.
    fn href(&self) -> &str;

    /// Write rendered facts into the element.
    fn set_facts(&self, facts: Rendered);

    /// Write the element's state flag.
    fn set_state(&self, state: SourceState);
}

/// A write made to a [`MemoryAnchor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Facts(Rendered),
    State(SourceState),
}

/// An [`Anchor`] that lives in memory and records every write, in order.
#[derive(Debug)]
pub struct MemoryAnchor {
    href: String,
    mutations: Mutex<Vec<Mutation>>,
}

impl MemoryAnchor {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into(), mutations: Mutex::new(Vec::new()) }
    }

    fn mutations(&self) -> MutexGuard<'_, Vec<Mutation>> {
        self.mutations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every write so far, oldest first.
    pub fn history(&self) -> Vec<Mutation> {
        self.mutations().clone()
    }

    /// The most recently written facts.
    pub fn facts(&self) -> Option<Rendered> {
        self.mutations().iter().rev().find_map(|m| match m {
            Mutation::Facts(facts) => Some(facts.clone()),
            Mutation::State(_) => None,
        })
    }

    /// The most recently written state.
    pub fn state(&self) -> Option<SourceState> {
        self.mutations().iter().rev().find_map(|m| match m {
            Mutation::State(state) => Some(*state),
            Mutation::Facts(_) => None,
        })
    }
}

impl Anchor for MemoryAnchor {
    fn href(&self) -> &str {
        &self.href
    }

    fn set_facts(&self, facts: Rendered) {
        self.mutations().push(Mutation::Facts(facts));
    }

    fn set_state(&self, state: SourceState) {
        self.mutations().push(Mutation::State(state));
    }
}
