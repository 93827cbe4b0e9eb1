//! Combinators over batches of promises.
//!
//! Each combinator returns an ordinary [`Promise`] settled by its own driver
//! thread. The driver only reads settled outcomes of its inputs and writes to
//! the promise it returned.
use crate::{stream::stream, Error, Promise, Step};
use std::sync::Arc;

/// Settles once every input has settled.
///
/// Fulfills with the values in input order if every input fulfilled.
/// Otherwise rejects with every outcome in input order, values and causes
/// side by side. There is no early exit on the first rejection.
///
/// # Examples
///
/// ```
/// use promise_flow::{all, Error, Promise};
/// let mixed = all(vec![Promise::<&str, &str>::resolve("a"), Promise::reject("x")]);
/// assert_eq!(
///     mixed.wait(),
///     Err(Error::Rejected(vec![Ok("a"), Err(Error::Rejected("x"))]))
/// );
/// ```
pub fn all<T, E, I>(promises: I) -> Promise<Vec<T>, Vec<Result<T, Error<E>>>>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let inputs: Vec<_> = promises.into_iter().collect();
    Promise::create_named("promise-all", move |producer| {
        let outcomes: Vec<_> = inputs.into_iter().map(|promise| promise.wait()).collect();
        let rejected = outcomes.iter().filter(|o| o.is_err()).count();
        if rejected == 0 {
            producer.resolve(outcomes.into_iter().flatten().collect());
        } else {
            tracing::debug!(inputs = outcomes.len(), rejected, "all: inputs rejected");
            producer.reject(outcomes);
        }
    })
}

/// Like [`all`], for batches with gaps.
///
/// A `None` input counts as fulfilled at once and keeps its place as `None`
/// in the fulfilled values or in the rejected outcomes.
///
/// # Examples
///
/// ```
/// use promise_flow::{all_optional, Promise};
/// let sparse = all_optional(vec![None, Some(Promise::<u8, ()>::resolve(4)), None]);
/// assert_eq!(sparse.wait(), Ok(vec![None, Some(4), None]));
/// ```
pub fn all_optional<T, E, I>(
    promises: I,
) -> Promise<Vec<Option<T>>, Vec<Option<Result<T, Error<E>>>>>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Option<Promise<T, E>>>,
{
    let inputs: Vec<_> = promises.into_iter().collect();
    Promise::create_named("promise-all", move |producer| {
        let outcomes: Vec<_> = inputs
            .into_iter()
            .map(|input| input.map(|promise| promise.wait()))
            .collect();
        let rejected = outcomes.iter().filter(|o| matches!(o, Some(Err(_)))).count();
        if rejected == 0 {
            producer.resolve(outcomes.into_iter().map(|o| o.and_then(Result::ok)).collect());
        } else {
            tracing::debug!(inputs = outcomes.len(), rejected, "all: inputs rejected");
            producer.reject(outcomes);
        }
    })
}

/// Fulfills with the first input to fulfill, by time of settlement.
///
/// Rejections are only collected. If no input ever fulfills, the result
/// rejects with every cause in input order; an empty input rejects at once
/// with an empty list.
///
/// # Examples
///
/// ```
/// use promise_flow::{race, Promise};
/// use std::{thread, time::Duration};
/// let slow = Promise::<char, ()>::create(|p| {
///     thread::sleep(Duration::from_millis(200));
///     p.resolve('A');
/// });
/// let fast = Promise::create(|p| {
///     thread::sleep(Duration::from_millis(10));
///     p.resolve('B');
/// });
/// assert_eq!(race(vec![slow, fast]).wait(), Ok('B'));
/// ```
pub fn race<T, E, I>(promises: I) -> Promise<T, Vec<Error<E>>>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let mut arrivals = stream(promises);
    Promise::create_named("promise-race", move |producer| {
        let mut causes: Vec<Option<Error<E>>> = vec![None; arrivals.len()];
        while let Some((index, outcome)) = arrivals.next_indexed() {
            match outcome {
                Ok(value) => {
                    tracing::trace!(winner = index, "race settled");
                    producer.resolve(value);
                    return;
                }
                Err(cause) => causes[index] = Some(cause),
            }
        }
        producer.reject(causes.into_iter().flatten().collect());
    })
}

/// Folds every input's outcome into `seed` as the inputs settle.
///
/// `reducer` receives the arrival ordinal, the accumulator and the outcome
/// (fulfilled or rejected alike). It runs exactly once per input, in arrival
/// order rather than input order, so a non-commutative reducer may give
/// different results from run to run.
///
/// # Examples
///
/// ```
/// use promise_flow::{reduce, Promise};
/// let inputs = vec![Promise::<u32, u32>::resolve(1), Promise::reject(10), Promise::resolve(100)];
/// let total = reduce(inputs, |_, acc, outcome| acc + outcome.unwrap_or_else(|e| *e.cause().unwrap_or(&0)), 0u32);
/// assert_eq!(total.wait(), Ok(111));
/// ```
pub fn reduce<T, E, A, I, F>(promises: I, reducer: F, seed: A) -> Promise<A, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    A: Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
    F: FnMut(usize, A, Result<T, Error<E>>) -> A + Send + 'static,
{
    let arrivals = stream(promises);
    Promise::create_named("promise-reduce", move |producer| {
        let mut reducer = reducer;
        let mut acc = seed;
        for (index, outcome) in arrivals.enumerate() {
            acc = reducer(index, acc, outcome);
        }
        producer.resolve(acc);
    })
}

/// Chains the same `then` callback onto every input.
pub fn map<T, U, E, I, F>(promises: I, on_fulfilled: F) -> Vec<Promise<U, E>>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
    F: Fn(T) -> Step<U, E> + Send + Sync + 'static,
{
    let on_fulfilled = Arc::new(on_fulfilled);
    promises
        .into_iter()
        .map(|promise| {
            let on_fulfilled = on_fulfilled.clone();
            promise.then(move |value| on_fulfilled(value))
        })
        .collect()
}
