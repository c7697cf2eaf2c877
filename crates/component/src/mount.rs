use crate::anchor::{Anchor, SourceState};
use crate::component::Component;
use crate::dispatch::Dispatch;
use futures::{Stream, ready};
use pin_project_lite::pin_project;
use srcfacts_cache::{FactCache, Replay, SourceStream};
use srcfacts_facts::error::Result;
use srcfacts_facts::{LinkIdentity, Source};
use srcfacts_render::RenderFacts;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tracing::instrument;
use url::Url;

/// Mounts source components onto anchors.
///
/// Holds everything a mount needs: the shared [`FactCache`], the renderer the
/// side effects go through, and an optional base URL for relative links.
/// Cloning is cheap; clones share the cache.
#[derive(Clone)]
pub struct Mounter {
    cache: FactCache,
    renderer: Arc<dyn RenderFacts>,
    base: Option<Url>,
}

impl Mounter {
    pub fn new(cache: FactCache, renderer: Arc<dyn RenderFacts>) -> Self {
        Self { cache, renderer, base: None }
    }

    /// Resolve relative `href`s against `base`, like a browser resolves them
    /// against the document URL.
    pub fn with_base(mut self, base: impl Into<Option<Url>>) -> Self {
        self.base = base.into();
        self
    }

    pub fn cache(&self) -> &FactCache {
        &self.cache
    }

    /// The link identity `element` points at.
    pub fn identify<E: Anchor + ?Sized>(&self, element: &E) -> Result<LinkIdentity> {
        LinkIdentity::resolve(self.base.as_ref(), element.href())
    }

    /// Mount a source component onto `element`.
    ///
    /// Nothing happens until the returned [`Mount`] is polled. An anchor whose
    /// link can't be resolved gets a mount that ends straight away.
    #[instrument(skip_all, fields(href = element.href()))]
    pub fn mount<E: Anchor + 'static>(&self, element: &Arc<E>) -> Mount<E> {
        let link = match self.identify(element.as_ref()) {
            Ok(link) => link,
            Err(err) => {
                tracing::warn!(error = ?err, "Not a repository link; nothing to mount");
                return Mount::new(element, Replay::empty().subscribe(), Dispatch::closed());
            },
        };
        let dispatch = Dispatch::new(side_effects(Arc::downgrade(element), Arc::clone(&self.renderer)));
        Mount::new(element, self.cache.watch(&link), dispatch)
    }
}

impl fmt::Debug for Mounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mounter").field("cache", &self.cache).field("base", &self.base).finish_non_exhaustive()
    }
}

/// Render the facts, write them, then mark the element as done.
fn side_effects<E: Anchor + 'static>(
    element: Weak<E>,
    renderer: Arc<dyn RenderFacts>,
) -> impl FnOnce(&Source) + Send + 'static {
    move |source: &Source| {
        let Some(element) = element.upgrade() else {
            tracing::debug!("Element went away before its facts arrived");
            return;
        };
        match renderer.render(source.facts()) {
            Ok(rendered) => {
                element.set_facts(rendered);
                element.set_state(SourceState::Done);
            },
            Err(err) => tracing::warn!(href = element.href(), error = ?err, "Failed to render repository facts"),
        }
    }
}

pin_project! {
    /// A mounted source component.
    ///
    /// Yields at most one [`Component`], then ends. The element's side effects
    /// fire the moment that component is produced; once the stream ends (with
    /// or without a value) or is dropped, they can no longer fire.
    #[must_use = "streams do nothing unless polled"]
    pub struct Mount<E> {
        #[pin]
        source: SourceStream,
        element: Weak<E>,
        dispatch: Dispatch<Source>,
    }
}

impl<E> Mount<E> {
    fn new(element: &Arc<E>, source: SourceStream, dispatch: Dispatch<Source>) -> Self {
        Self { source, element: Arc::downgrade(element), dispatch }
    }

    /// Returns `true` once the side effects have fired or can no longer fire.
    pub fn is_closed(&self) -> bool {
        self.dispatch.is_closed()
    }

    pub fn element(&self) -> Option<Arc<E>> {
        self.element.upgrade()
    }
}

impl<E> Stream for Mount<E> {
    type Item = Component<E, Source>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match ready!(this.source.poll_next(cx)) {
            Some(source) => {
                if this.dispatch.dispatch(&source).is_err() {
                    tracing::trace!("Side effects already dispatched");
                }
                Poll::Ready(Some(Component::new(Weak::clone(this.element), source)))
            },
            None => {
                this.dispatch.close();
                Poll::Ready(None)
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.source.size_hint()
    }
}

impl<E> fmt::Debug for Mount<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount").field("source", &self.source).field("dispatch", &self.dispatch).finish()
    }
}
