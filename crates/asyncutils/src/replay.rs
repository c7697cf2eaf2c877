use futures::future::BoxFuture;
use futures::stream::FusedStream;
use futures::task::{ArcWake, waker_ref};
use futures::{FutureExt, Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

type Factory<T> = Box<dyn FnOnce() -> BoxFuture<'static, Option<T>> + Send>;

/// Nothing panics while these locks are held. A panicking future is handled
/// by [`Checkout`], which leaves the state settled.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observable lifecycle of a [`Replay`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplayState {
    /// Nobody has subscribed and polled yet; the future hasn't been created.
    Idle,
    /// The future has been started and is waiting on its outcome.
    Running,
    /// The future produced a value, which is replayed to every subscriber.
    Resolved,
    /// The future finished without a value. Subscribers complete empty.
    Completed,
}

enum State<T> {
    Idle(Factory<T>),
    // `None` while a subscriber has taken the future out to poll it.
    Running(Option<BoxFuture<'static, Option<T>>>),
    Resolved(T),
    Completed,
}

enum Step<T> {
    Ready(Option<T>),
    Wait,
    Start(Factory<T>),
    Drive(BoxFuture<'static, Option<T>>),
}

impl<T: Clone> State<T> {
    /// Decide what the current subscriber should do, taking ownership of the
    /// future if it is the one that gets to drive it.
    fn take(&mut self) -> Step<T> {
        match std::mem::replace(self, State::Running(None)) {
            State::Idle(factory) => Step::Start(factory),
            State::Running(Some(future)) => Step::Drive(future),
            State::Running(None) => Step::Wait,
            State::Resolved(value) => {
                *self = State::Resolved(value.clone());
                Step::Ready(Some(value))
            },
            State::Completed => {
                *self = State::Completed;
                Step::Ready(None)
            },
        }
    }
}

impl<T> State<T> {
    fn observe(&self) -> ReplayState {
        match self {
            State::Idle(_) => ReplayState::Idle,
            State::Running(_) => ReplayState::Running,
            State::Resolved(_) => ReplayState::Resolved,
            State::Completed => ReplayState::Completed,
        }
    }
}

/// Wakes every waiting subscriber whenever the shared future wakes.
///
/// The future is always polled with this waker rather than the waker of
/// whichever subscriber happens to be driving it, otherwise dropping the
/// driving subscriber would leave everyone else asleep forever.
#[derive(Default)]
struct Notifier {
    wakers: Mutex<HashMap<usize, Waker>>,
    woken: AtomicBool,
}
impl Notifier {
    fn register(&self, id: usize, waker: &Waker) {
        let mut wakers = lock(&self.wakers);
        match wakers.get_mut(&id) {
            Some(existing) if existing.will_wake(waker) => {},
            Some(existing) => existing.clone_from(waker),
            None => {
                wakers.insert(id, waker.clone());
            },
        }
    }

    fn unregister(&self, id: usize) {
        lock(&self.wakers).remove(&id);
    }
}
impl ArcWake for Notifier {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::Release);
        let wakers = std::mem::take(&mut *lock(&arc_self.wakers));
        for waker in wakers.into_values() {
            waker.wake();
        }
    }
}

/// Held while a subscriber has the future checked out. If the future (or its
/// factory) panics, the replay completes empty rather than leaving everyone
/// waiting on a future that no longer exists.
struct Checkout<T>(Arc<Inner<T>>);
impl<T> Drop for Checkout<T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            *lock(&self.0.state) = State::Completed;
            ArcWake::wake_by_ref(&self.0.notifier);
        }
    }
}

struct Inner<T> {
    state: Mutex<State<T>>,
    notifier: Arc<Notifier>,
    next_id: AtomicUsize,
}

/// A lazily-started future whose outcome is computed once and replayed to
/// every subscriber.
///
/// - Creating a [`Replay`] never starts anything. The future (or the factory
///   producing it, see [`Replay::lazy`]) only runs once a [`Subscription`] is
///   polled for the first time.
/// - Every subscriber, no matter when it subscribed, observes the same single
///   outcome. A subscription created after the outcome is known yields it on
///   its very first poll, without suspending.
/// - An outcome of `None` is a completion without a value; subscribers simply
///   end without yielding anything.
/// - Cloning a [`Replay`] clones the handle, not the computation.
///
/// ```
/// use futures::StreamExt;
/// use srcfacts_asyncutils::{Replay, ReplayState};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let replay = Replay::lazy(|| async { Some(42) });
/// assert_eq!(replay.state(), ReplayState::Idle);
///
/// let first: Vec<u32> = replay.subscribe().collect().await;
/// let second = replay.subscribe().value().await;
/// assert_eq!(first, vec![42]);
/// assert_eq!(second, Some(42));
/// assert_eq!(replay.state(), ReplayState::Resolved);
/// # }
/// ```
pub struct Replay<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Replay<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: Clone + Send + 'static> Replay<T> {
    fn with_state(state: State<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                notifier: Arc::new(Notifier::default()),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Wrap an already-constructed (but not yet polled) future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Option<T>> + Send + 'static,
    {
        Self::lazy(move || future)
    }

    /// Defer even the construction of the future until the first subscriber
    /// is polled.
    pub fn lazy<F, Fut>(factory: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        Self::with_state(State::Idle(Box::new(move || factory().boxed())))
    }

    /// A replay that is already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        Self::with_state(State::Resolved(value))
    }

    /// A replay that has already completed without a value.
    pub fn empty() -> Self {
        Self::with_state(State::Completed)
    }

    /// Attach a new subscriber.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            inner: Arc::clone(&self.inner),
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            done: false,
        }
    }

    pub fn state(&self) -> ReplayState {
        lock(&self.inner.state).observe()
    }

    /// The resolved value, if there is one yet.
    pub fn peek(&self) -> Option<T> {
        match &*lock(&self.inner.state) {
            State::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns `true` if both handles share the same underlying computation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> fmt::Debug for Replay<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner.state).observe();
        f.debug_struct("Replay").field("state", &state).finish_non_exhaustive()
    }
}

/// One subscriber's view of a [`Replay`].
///
/// A stream that yields the shared value at most once and then ends. Any
/// subscription may end up driving the shared future; which one does is an
/// implementation detail.
pub struct Subscription<T> {
    inner: Arc<Inner<T>>,
    id: usize,
    done: bool,
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Wait for the shared outcome.
    pub async fn value(mut self) -> Option<T> {
        self.next().await
    }

    fn finish(&mut self, value: Option<T>) -> Poll<Option<T>> {
        self.done = true;
        self.inner.notifier.unregister(self.id);
        Poll::Ready(value)
    }

    fn settle(&self, outcome: &Option<T>) {
        *lock(&self.inner.state) = match outcome {
            Some(value) => State::Resolved(value.clone()),
            None => State::Completed,
        };
        ArcWake::wake_by_ref(&self.inner.notifier);
    }
}

impl<T: Clone + Send + 'static> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        let step = {
            let mut state = lock(&this.inner.state);
            let step = state.take();
            // Register while still holding the state lock, so the driver
            // can't settle and wake everyone in between.
            if let Step::Wait = step {
                this.inner.notifier.register(this.id, cx.waker());
            }
            step
        };
        let (checkout, mut future) = match step {
            Step::Ready(value) => return this.finish(value),
            Step::Wait => return Poll::Pending,
            Step::Start(factory) => {
                let checkout = Checkout(Arc::clone(&this.inner));
                (checkout, factory())
            },
            Step::Drive(future) => (Checkout(Arc::clone(&this.inner)), future),
        };

        this.inner.notifier.register(this.id, cx.waker());
        this.inner.notifier.woken.store(false, Ordering::Release);
        let waker = waker_ref(&this.inner.notifier);
        let mut shared_cx = Context::from_waker(&waker);
        match future.poll_unpin(&mut shared_cx) {
            Poll::Ready(outcome) => {
                this.settle(&outcome);
                this.finish(outcome)
            },
            Poll::Pending => {
                *lock(&this.inner.state) = State::Running(Some(future));
                drop(checkout);
                // Woken while the future was checked out: that wake already
                // drained the wakers, and anyone who went back to sleep seeing
                // no future to drive must hear about it even if we're dropped.
                if this.inner.notifier.woken.swap(false, Ordering::AcqRel) {
                    this.inner.notifier.register(this.id, cx.waker());
                    ArcWake::wake_by_ref(&this.inner.notifier);
                }
                Poll::Pending
            },
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done { (0, Some(0)) } else { (0, Some(1)) }
    }
}

impl<T: Clone + Send + 'static> FusedStream for Subscription<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.inner.notifier.unregister(self.id);
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).field("done", &self.done).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::oneshot;
    use rstest::rstest;

    fn counted(counter: &Arc<AtomicUsize>, outcome: Option<u32>) -> Replay<u32> {
        let counter = Arc::clone(counter);
        Replay::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { outcome }
        })
    }

    #[tokio::test]
    async fn test_nothing_runs_until_polled() {
        let counter = Arc::new(AtomicUsize::new(0));
        let replay = counted(&counter, Some(1));
        let subscription = replay.subscribe();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(replay.state(), ReplayState::Idle);

        assert_eq!(subscription.value().await, Some(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outcome_is_computed_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let replay = counted(&counter, Some(7));
        let (a, b) = tokio::join!(replay.subscribe().value(), replay.subscribe().value());
        let c = replay.subscribe().value().await;
        assert_eq!((a, b, c), (Some(7), Some(7), Some(7)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(Some(3), ReplayState::Resolved)]
    #[case(None, ReplayState::Completed)]
    #[tokio::test]
    async fn test_terminal_state(#[case] outcome: Option<u32>, #[case] expected: ReplayState) {
        let counter = Arc::new(AtomicUsize::new(0));
        let replay = counted(&counter, outcome);
        let items: Vec<u32> = replay.subscribe().collect().await;
        assert_eq!(items, outcome.into_iter().collect::<Vec<_>>());
        assert_eq!(replay.state(), expected);
        assert_eq!(replay.peek(), outcome);
    }

    #[test]
    fn test_late_subscriber_does_not_suspend() {
        let replay = Replay::resolved("cached".to_string());
        let mut subscription = replay.subscribe();
        assert_eq!(subscription.next().now_or_never(), Some(Some("cached".to_string())));
        // Fused: the single value is never yielded twice.
        assert!(subscription.is_terminated());
        assert_eq!(subscription.next().now_or_never(), Some(None));
    }

    #[test]
    fn test_empty_completes_immediately() {
        let replay: Replay<u32> = Replay::empty();
        assert_eq!(replay.subscribe().next().now_or_never(), Some(None));
    }

    #[tokio::test]
    async fn test_pending_subscribers_all_woken() {
        let (tx, rx) = oneshot::channel::<u32>();
        let replay = Replay::new(async move { rx.await.ok() });
        let (a, b, ()) = tokio::join!(replay.subscribe().value(), replay.subscribe().value(), async {
            tokio::task::yield_now().await;
            tx.send(11).unwrap();
        });
        assert_eq!((a, b), (Some(11), Some(11)));
    }

    #[tokio::test]
    async fn test_dropping_driver_does_not_strand_others() {
        let (tx, rx) = oneshot::channel::<u32>();
        let replay = Replay::new(async move { rx.await.ok() });

        let mut driver = replay.subscribe();
        assert_eq!(driver.next().now_or_never(), None);
        assert_eq!(replay.state(), ReplayState::Running);
        drop(driver);

        let (value, ()) = tokio::join!(replay.subscribe().value(), async {
            tokio::task::yield_now().await;
            tx.send(5).unwrap();
        });
        assert_eq!(value, Some(5));
    }

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);
    impl ArcWake for CountingWaker {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_wake_during_checkout_reaches_waiters_after_driver_drop() {
        let slot: Arc<Mutex<Option<Subscription<u32>>>> = Arc::default();
        let wakes = Arc::new(CountingWaker::default());
        let polls = AtomicUsize::new(0);
        let replay = {
            let (slot, wakes) = (Arc::clone(&slot), Arc::clone(&wakes));
            Replay::new(futures::future::poll_fn(move |cx| {
                if polls.fetch_add(1, Ordering::SeqCst) > 0 {
                    return Poll::Ready(Some(1));
                }
                // Wake while checked out, then let a second subscriber find
                // nothing to drive and go to sleep.
                cx.waker().wake_by_ref();
                let waker = futures::task::waker(Arc::clone(&wakes));
                if let Some(waiter) = slot.lock().unwrap().as_mut() {
                    assert!(waiter.poll_next_unpin(&mut Context::from_waker(&waker)).is_pending());
                }
                Poll::Pending
            }))
        };
        *slot.lock().unwrap() = Some(replay.subscribe());

        let mut driver = replay.subscribe();
        assert_eq!(driver.next().now_or_never(), None);
        drop(driver);

        assert!(wakes.0.load(Ordering::SeqCst) > 0);
        let waiter = slot.lock().unwrap().take().unwrap();
        assert_eq!(waiter.value().now_or_never(), Some(Some(1)));
    }

    async fn explode() -> Option<u32> {
        panic!("fetch blew up")
    }

    #[test]
    fn test_panicking_future_completes_empty() {
        let replay = Replay::new(explode());
        let mut driver = replay.subscribe();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| driver.next().now_or_never()));
        assert!(outcome.is_err());

        assert_eq!(replay.state(), ReplayState::Completed);
        assert_eq!(replay.subscribe().next().now_or_never(), Some(None));
    }

    #[tokio::test]
    async fn test_clones_share_computation() {
        let counter = Arc::new(AtomicUsize::new(0));
        let replay = counted(&counter, Some(2));
        let clone = replay.clone();
        assert!(replay.ptr_eq(&clone));
        assert_eq!(clone.subscribe().value().await, Some(2));
        assert_eq!(replay.subscribe().value().await, Some(2));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(!replay.ptr_eq(&Replay::resolved(2)));
    }
}
