use crate::{
    cell::{Outcome, SettlementCell},
    task, Error,
};
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    thread,
    time::Duration,
};

/// Where a promise is in its life. Only ever moves away from `Pending`, once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// What a `then`/`catch` callback hands back.
///
/// A [`Step::Deferred`] promise is adopted: the derived promise settles when
/// it does, with the same state and outcome.
pub enum Step<T, E> {
    Value(T),
    Deferred(Promise<T, E>),
    Failure(Error<E>),
}

impl<T, E> Step<T, E> {
    /// Fails the derived promise with a caller-supplied cause.
    pub fn reject(cause: E) -> Self {
        Step::Failure(Error::Rejected(cause))
    }
}

impl<T, E> From<Result<T, E>> for Step<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Step::Value(value),
            Err(cause) => Step::reject(cause),
        }
    }
}

impl<T, E> From<Promise<T, E>> for Step<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Step::Deferred(promise)
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Step<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Step::Deferred(promise) => f.debug_tuple("Deferred").field(promise).finish(),
            Step::Failure(cause) => f.debug_tuple("Failure").field(cause).finish(),
        }
    }
}

/// The write side of a [`Promise`].
///
/// Producers may be cloned and handed to several threads; the first
/// `resolve` or `reject` settles the promise and the rest return `false`.
/// If every clone is dropped while the promise is still pending, it is
/// rejected with [`Error::ProducerDropped`].
///
/// # Examples
///
/// ```
/// use promise_flow::Producer;
/// use futures::executor::block_on;
/// use std::thread;
/// let (producer, promise) = Producer::<String, ()>::new();
/// let waiter = promise.clone();
/// let task1 = thread::spawn(move || block_on(async {
///     println!("Received {:?}", waiter.await);
/// }));
/// assert!(producer.resolve("🍓".into()));
/// assert!(!producer.resolve("🍌".into()));
/// task1.join().expect("The task1 thread has panicked.");
/// assert_eq!(promise.wait(), Ok("🍓".to_string()));
/// ```
pub struct Producer<T, E> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    cell: Arc<SettlementCell<T, E>>,
}

impl<T, E> Drop for Shared<T, E> {
    /// If this was the last producer and nothing settled, wake waiters with an error.
    fn drop(&mut self) {
        if self.cell.state() != State::Pending {
            return;
        }
        let cause = if thread::panicking() {
            Error::Panicked("producer dropped during a panic".into())
        } else {
            Error::ProducerDropped
        };
        if self.cell.reject(cause) {
            tracing::warn!("every producer dropped before settling; promise rejected");
        }
    }
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("state", &self.shared.cell.state())
            .finish()
    }
}

impl<T, E> Producer<T, E> {
    pub fn new() -> (Self, Promise<T, E>) {
        let cell = Arc::new(SettlementCell::new());
        let producer = Self {
            shared: Arc::new(Shared { cell: cell.clone() }),
        };
        (producer, Promise { cell })
    }

    /// Fulfills the promise. Returns `false` if it had already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.shared.cell.resolve(value)
    }

    /// Rejects the promise with `cause`. Returns `false` if it had already settled.
    pub fn reject(&self, cause: E) -> bool {
        self.shared.cell.reject(Error::Rejected(cause))
    }

    pub(crate) fn settle(&self, outcome: Outcome<T, E>) -> bool {
        self.shared.cell.settle(outcome)
    }

    pub fn promise(&self) -> Promise<T, E> {
        Promise {
            cell: self.shared.cell.clone(),
        }
    }
}

/// A single-assignment container for the eventual result of a computation.
///
/// Cloning a `Promise` gives another observer of the same cell. Any number
/// of threads may [`wait`](Promise::wait), `.await` it, or derive new
/// promises from it, before or after it settles.
pub struct Promise<T, E> {
    cell: Arc<SettlementCell<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("state", &self.cell.state())
            .finish()
    }
}

impl<T, E> Promise<T, E> {
    /// A promise that is already fulfilled with `value`.
    pub fn resolve(value: T) -> Self {
        Self {
            cell: Arc::new(SettlementCell::settled(Ok(value))),
        }
    }

    /// A promise that is already rejected with `cause`.
    pub fn reject(cause: E) -> Self {
        Self {
            cell: Arc::new(SettlementCell::settled(Err(Error::Rejected(cause)))),
        }
    }

    pub fn state(&self) -> State {
        self.cell.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    pub fn is_fulfilled(&self) -> bool {
        self.state() == State::Fulfilled
    }

    pub fn is_rejected(&self) -> bool {
        self.state() == State::Rejected
    }

    /// Rejects the promise with [`Error::Cancelled`] if it is still pending.
    ///
    /// The computation producing the value is not interrupted; its eventual
    /// settlement is simply ignored.
    pub fn cancel(&self) -> bool {
        let cancelled = self.cell.reject(Error::Cancelled);
        if cancelled {
            tracing::debug!("promise cancelled");
        }
        cancelled
    }
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    /// Runs `action` on its own thread and returns the promise it settles.
    ///
    /// A panic inside `action` rejects the promise with [`Error::Panicked`].
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_flow::{Error, Promise};
    /// use std::{thread, time::Duration};
    /// let promise = Promise::<u32, String>::create(|producer| {
    ///     thread::sleep(Duration::from_millis(50));
    ///     producer.reject("💥".into());
    /// });
    /// assert!(promise.is_pending());
    /// assert_eq!(promise.wait(), Err(Error::Rejected("💥".to_string())));
    /// ```
    pub fn create<F>(action: F) -> Self
    where
        F: FnOnce(Producer<T, E>) + Send + 'static,
    {
        Self::create_named("promise-create", action)
    }

    pub(crate) fn create_named<F>(name: &str, action: F) -> Self
    where
        F: FnOnce(Producer<T, E>) + Send + 'static,
    {
        let (producer, promise) = Producer::new();
        let driver = producer.clone();
        let spawned = task::spawn(name, move || {
            if let Err(cause) = task::guarded(|| action(driver.clone())) {
                driver.settle(Err(cause));
            }
        });
        if let Err(err) = spawned {
            producer.settle(Err(Error::Spawn(err.to_string())));
        }
        promise
    }

    /// Rejects this promise with [`Error::TimedOut`] unless it settles within `after`.
    ///
    /// The computation behind it keeps running; whichever settles first wins.
    ///
    /// The deadline is watched by its own thread. If that thread cannot be
    /// spawned, a warning is logged and the promise is returned with no
    /// deadline armed.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_flow::{Error, Promise};
    /// use std::{thread, time::Duration};
    /// let slow = Promise::<bool, ()>::create(|producer| {
    ///     thread::sleep(Duration::from_millis(500));
    ///     producer.resolve(false);
    /// })
    /// .timeout(Duration::from_millis(20));
    /// assert_eq!(slow.wait(), Err(Error::TimedOut(Duration::from_millis(20))));
    /// ```
    pub fn timeout(self, after: Duration) -> Self {
        let cell = self.cell.clone();
        let armed = task::spawn("promise-timeout", move || {
            if !cell.wait_for(after) && cell.reject(Error::TimedOut(after)) {
                tracing::debug!(?after, "promise timed out");
            }
        });
        if armed.is_err() {
            tracing::warn!(?after, "timeout not armed");
        }
        self
    }

    fn driven<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(&SettlementCell<T, E>) + Send + 'static,
    {
        let cell = Arc::new(SettlementCell::new());
        task::drive(name, &cell, body);
        Self { cell }
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Blocks the calling thread until the promise settles.
    pub fn wait(&self) -> Result<T, Error<E>> {
        self.cell.wait()
    }

    /// Like [`wait`](Promise::wait), but gives up after `timeout` and returns `None`.
    /// The promise itself is left untouched.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, Error<E>>> {
        if self.cell.wait_for(timeout) {
            self.cell.try_outcome()
        } else {
            None
        }
    }

    /// The outcome, if the promise has settled.
    pub fn try_outcome(&self) -> Option<Result<T, Error<E>>> {
        self.cell.try_outcome()
    }

    /// Derives a promise that runs `on_fulfilled` once this one fulfills.
    ///
    /// A rejection skips the callback and passes through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_flow::{Promise, Step};
    /// let chained = Promise::<i32, ()>::resolve(1)
    ///     .then(|v| Step::Deferred(Promise::resolve(v + 1)))
    ///     .then(|v| Step::Value(v * 2));
    /// assert_eq!(chained.wait(), Ok(4));
    /// ```
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Step<U, E> + Send + 'static,
    {
        let source = self.clone();
        Promise::driven("promise-then", move |out| match source.wait() {
            Ok(value) => adopt(out, task::guarded(|| on_fulfilled(value))),
            Err(cause) => {
                out.reject(cause);
            }
        })
    }

    /// Derives a promise that runs `on_rejected` once this one rejects.
    ///
    /// A fulfilled value passes through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_flow::{Promise, Step};
    /// let recovered = Promise::<i32, String>::reject("no".into())
    ///     .catch(|cause| Step::<i32, ()>::Value(cause.into_cause().map_or(0, |c| c.len() as i32)));
    /// assert_eq!(recovered.wait(), Ok(2));
    /// ```
    pub fn catch<E2, F>(&self, on_rejected: F) -> Promise<T, E2>
    where
        E2: Clone + Send + 'static,
        F: FnOnce(Error<E>) -> Step<T, E2> + Send + 'static,
    {
        let source = self.clone();
        Promise::driven("promise-catch", move |out| match source.wait() {
            Ok(value) => {
                out.resolve(value);
            }
            Err(cause) => adopt(out, task::guarded(|| on_rejected(cause))),
        })
    }

    /// Blocks until the promise settles, hands the outcome to `on_settled`
    /// and returns it.
    ///
    /// This terminates a chain: unlike `then` and `catch` it produces no new
    /// promise, and `on_settled` runs on the calling thread.
    ///
    /// A promise that fulfills with another promise hands back that inner
    /// promise as-is; call [`flatten`](Promise::flatten) first to wait for
    /// the inner outcome.
    pub fn finally<F>(&self, on_settled: F) -> Result<T, Error<E>>
    where
        F: FnOnce(&Result<T, Error<E>>),
    {
        let outcome = self.wait();
        on_settled(&outcome);
        outcome
    }
}

impl<T, E> Promise<Promise<T, E>, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Adopts the state and outcome of the promise this one fulfills with.
    pub fn flatten(&self) -> Promise<T, E> {
        self.then(Step::Deferred)
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.cell.poll_outcome(cx.waker())
    }
}

/// Settles `out` from a callback's result, waiting on a deferred promise if needed.
fn adopt<T, E>(out: &SettlementCell<T, E>, step: Result<Step<T, E>, Error<E>>)
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    let outcome = match step {
        Ok(Step::Value(value)) => Ok(value),
        Ok(Step::Deferred(inner)) => inner.wait(),
        Ok(Step::Failure(cause)) | Err(cause) => Err(cause),
    };
    out.settle(outcome);
}

#[cfg(test)]
mod tests {
    use super::{Producer, Promise, State, Step};
    use crate::Error;
    use futures::executor::block_on;
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    #[test]
    fn test_promise_resolve() {
        let (op, op_a) = Producer::<String, ()>::new();
        let task1 = thread::spawn(move || block_on(async { op_a.await }));
        let task2 = thread::spawn(move || op.resolve(String::from("🍓")));
        assert!(task2.join().expect("The task2 thread has panicked"));
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Ok("🍓".to_string())
        );
    }

    #[test]
    fn test_two_waiters() {
        let (op, op_a) = Producer::<String, ()>::new();
        let op_b = op_a.clone();
        let task1 = thread::spawn(move || block_on(async { op_a.await }));
        let task2 = thread::spawn(move || op_b.wait());
        thread::sleep(Duration::from_millis(20));
        op.resolve("🍓".into());
        assert_eq!(task1.join().expect("task1 panicked"), Ok("🍓".into()));
        assert_eq!(task2.join().expect("task2 panicked"), Ok("🍓".into()));
    }

    #[test]
    fn test_promise_reject() {
        let (a, b) = Producer::<String, String>::new();
        let task1 = thread::spawn(move || b.wait());
        a.reject("reject!!".into());
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Err(Error::Rejected("reject!!".into()))
        );
    }

    #[test]
    fn test_promise_unresolved_producer_dropped() {
        let (op, op_a) = Producer::<String, ()>::new();
        let task2 = thread::spawn(move || {
            // Move the producer into this thread but never resolve it.
            std::mem::drop(op);
        });
        task2.join().expect("The task2 thread has panicked");
        assert_eq!(op_a.wait(), Err(Error::ProducerDropped));
    }

    #[test]
    fn test_producer_clone_keeps_promise_pending() {
        let (op, op_a) = Producer::<u8, ()>::new();
        let other = op.clone();
        drop(op);
        assert!(op_a.is_pending());
        other.resolve(1);
        drop(other);
        assert_eq!(op_a.wait(), Ok(1));
    }

    #[test]
    fn test_create_panic_rejects() {
        let promise = Promise::<u8, ()>::create(|_producer| panic!("💥"));
        assert_eq!(promise.wait(), Err(Error::Panicked("💥".into())));
    }

    #[test]
    fn test_create_without_settling_rejects() {
        let promise = Promise::<u8, ()>::create(|_producer| {});
        assert_eq!(promise.wait(), Err(Error::ProducerDropped));
    }

    #[test]
    fn test_create_producer_handed_to_another_thread() {
        let promise = Promise::<u8, ()>::create(|producer| {
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                producer.resolve(3);
            });
        });
        assert_eq!(promise.wait(), Ok(3));
    }

    #[test]
    fn test_then_skips_rejected_source() {
        let called = Arc::new(AtomicBool::new(false));
        let seen = called.clone();
        let derived = Promise::<u8, &str>::create(|producer| {
            producer.reject("E");
        })
        .then(move |v| {
            seen.store(true, Ordering::SeqCst);
            Step::Value(v)
        });
        assert_eq!(derived.wait(), Err(Error::Rejected("E")));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_then_failure_and_catch() {
        let recovered = Promise::<i32, String>::resolve(2)
            .then(|v| Step::Value(v + 1))
            .then(|v| {
                if v == 3 {
                    Step::reject("it worked".to_string())
                } else {
                    Step::Value(v)
                }
            })
            .catch(|cause| Step::<i32, String>::Value(cause.into_cause().map_or(0, |c| c.len() as i32)));
        assert_eq!(recovered.wait(), Ok(9));
    }

    #[test]
    fn test_then_adopts_rejected_inner() {
        let derived = Promise::<i32, &str>::resolve(1)
            .then(|_| Step::Deferred(Promise::<i32, &str>::reject("inner")));
        assert_eq!(derived.wait(), Err(Error::Rejected("inner")));
        assert!(derived.is_rejected());
    }

    #[test]
    fn test_then_from_result() {
        let ok = Promise::<i32, String>::resolve(4).then(|v| Step::from(Ok::<i32, String>(v * 2)));
        assert_eq!(ok.wait(), Ok(8));
        let err = Promise::<i32, String>::resolve(4).then(|_| Step::from(Err::<i32, String>("bad".to_string())));
        assert_eq!(err.wait(), Err(Error::Rejected("bad".into())));
    }

    #[test]
    fn test_then_callback_panic_rejects() {
        let derived = Promise::<i32, ()>::resolve(1).then(|_| -> Step<i32, ()> { panic!("boom") });
        assert_eq!(derived.wait(), Err(Error::Panicked("boom".into())));
    }

    #[test]
    fn test_catch_passes_value_through() {
        let called = Arc::new(AtomicBool::new(false));
        let seen = called.clone();
        let derived = Promise::<i32, ()>::resolve(5).catch(move |_| {
            seen.store(true, Ordering::SeqCst);
            Step::<i32, ()>::Value(0)
        });
        assert_eq!(derived.wait(), Ok(5));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_catch_can_rethrow() {
        let derived = Promise::<i32, ()>::create(|p| {
            p.reject(());
        })
        .catch(|cause| Step::<i32, ()>::Failure(cause));
        assert_eq!(derived.wait(), Err(Error::Rejected(())));
    }

    #[test]
    fn test_finally_resolve_chain() {
        let mut data = 0;
        let outcome = Promise::<i32, ()>::create(|p| {
            p.resolve(2);
        })
        .then(|v| Step::Deferred(Promise::resolve(v + 1)))
        .then(|v| Step::Deferred(Promise::resolve(v + 1)))
        .finally(|outcome| {
            if let Ok(v) = outcome {
                data = *v;
            }
        });
        assert_eq!(outcome, Ok(4));
        assert_eq!(data, 4);
    }

    #[test]
    fn test_finally_on_rejection() {
        let outcome = Promise::<(), i32>::reject(4).finally(|_| {});
        assert_eq!(outcome, Err(Error::Rejected(4)));
    }

    #[test]
    fn test_flatten() {
        let nested = Promise::<Promise<i32, ()>, ()>::resolve(Promise::resolve(2));
        assert_eq!(nested.flatten().wait(), Ok(2));
    }

    #[test]
    fn test_state_inspection() {
        let (op, promise) = Producer::<i32, ()>::new();
        assert_eq!(promise.state(), State::Pending);
        assert!(promise.is_pending() && !promise.is_fulfilled() && !promise.is_rejected());
        assert_eq!(promise.try_outcome(), None);
        op.resolve(3);
        assert!(!promise.is_pending() && promise.is_fulfilled() && !promise.is_rejected());
        assert_eq!(promise.try_outcome(), Some(Ok(3)));
        assert!(Promise::<(), ()>::reject(()).is_rejected());
    }

    #[test]
    fn test_cancel() {
        let (op, promise) = Producer::<i32, ()>::new();
        assert!(promise.cancel());
        assert!(!promise.cancel());
        assert!(!op.resolve(1));
        assert_eq!(promise.wait(), Err(Error::Cancelled));
    }

    #[test]
    fn test_timeout_loses_to_fast_resolver() {
        let promise = Promise::<i32, ()>::create(|p| {
            p.resolve(1);
        })
        .timeout(Duration::from_millis(200));
        assert_eq!(promise.wait(), Ok(1));
        thread::sleep(Duration::from_millis(250));
        assert_eq!(promise.try_outcome(), Some(Ok(1)));
    }

    #[test]
    fn test_wait_timeout_max_duration() {
        let promise = Promise::<i32, ()>::create(|p| {
            thread::sleep(Duration::from_millis(20));
            p.resolve(5);
        });
        assert_eq!(promise.wait_timeout(Duration::MAX), Some(Ok(5)));
        let settled = Promise::<i32, ()>::resolve(6).timeout(Duration::MAX);
        assert_eq!(settled.wait(), Ok(6));
    }

    #[test]
    fn test_finally_on_nested_promise_after_flatten() {
        let nested = Promise::<Promise<i32, ()>, ()>::resolve(Promise::resolve(8));
        let mut seen = None;
        let outcome = nested.flatten().finally(|outcome| seen = outcome.clone().ok());
        assert_eq!(outcome, Ok(8));
        assert_eq!(seen, Some(8));
    }

    #[test]
    fn test_wait_timeout() {
        let (op, promise) = Producer::<i32, ()>::new();
        assert_eq!(promise.wait_timeout(Duration::from_millis(10)), None);
        assert!(promise.is_pending());
        op.resolve(7);
        assert_eq!(promise.wait_timeout(Duration::from_millis(10)), Some(Ok(7)));
    }
}
