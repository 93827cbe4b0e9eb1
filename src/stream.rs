//! Unordered fan-in.
//!
//! A [`Stream`] yields the outcome of each input promise as soon as it
//! settles, in arrival order. Every input gets a waiter thread that sends
//! into a `sync_channel` sized to the input count, so no waiter ever blocks on
//! a slow consumer. The channel closes once the last waiter has sent.
use crate::{cell::Outcome, task, Error, Promise};
use std::{
    fmt,
    sync::mpsc::{sync_channel, Receiver},
};

/// Outcomes of a batch of promises in the order they settle.
///
/// Yields exactly one item per input promise and then ends. Fulfillments and
/// rejections are yielded alike.
pub struct Stream<T, E> {
    receiver: Receiver<(usize, Outcome<T, E>)>,
    remaining: usize,
}

/// Starts draining `promises` in arrival order.
///
/// # Examples
///
/// ```
/// use promise_flow::{stream, Promise};
/// use std::{thread, time::Duration};
/// let slow = Promise::<u8, ()>::create(|p| {
///     thread::sleep(Duration::from_millis(100));
///     p.resolve(1);
/// });
/// let fast = Promise::resolve(2);
/// let arrivals: Vec<_> = stream(vec![slow, fast]).collect();
/// assert_eq!(arrivals, vec![Ok(2), Ok(1)]);
/// ```
pub fn stream<T, E, I>(promises: I) -> Stream<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
    I: IntoIterator<Item = Promise<T, E>>,
{
    let promises: Vec<_> = promises.into_iter().collect();
    let remaining = promises.len();
    let (sender, receiver) = sync_channel(remaining);
    for (index, promise) in promises.into_iter().enumerate() {
        let waiter = sender.clone();
        let spawned = task::spawn("promise-stream", move || {
            // The receiver may be gone already, e.g. after a race found its winner.
            let _ = waiter.send((index, promise.wait()));
        });
        if let Err(err) = spawned {
            let _ = sender.send((index, Err(Error::Spawn(err.to_string()))));
        }
    }
    Stream {
        receiver,
        remaining,
    }
}

impl<T, E> Stream<T, E> {
    /// Next arrival together with the position of its promise in the input.
    pub(crate) fn next_indexed(&mut self) -> Option<(usize, Outcome<T, E>)> {
        if self.remaining == 0 {
            return None;
        }
        let arrival = self.receiver.recv().ok()?;
        self.remaining -= 1;
        Some(arrival)
    }
}

impl<T, E> Iterator for Stream<T, E> {
    type Item = Result<T, Error<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_indexed().map(|(_, outcome)| outcome)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T, E> ExactSizeIterator for Stream<T, E> {}

impl<T, E> fmt::Debug for Stream<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("remaining", &self.remaining)
            .finish()
    }
}
