//! The write-once slot behind every [`Promise`](crate::Promise).
//!
//! A cell holds the outcome under a `parking_lot` mutex. Blocking waiters park
//! on a condvar, async waiters leave a [`Waker`]. Both are released by the one
//! call that moves the cell out of pending; every later call is a no-op.
use crate::{Error, State};
use parking_lot::{Condvar, Mutex};
use std::{
    task::{Poll, Waker},
    time::{Duration, Instant},
};

pub(crate) type Outcome<T, E> = Result<T, Error<E>>;

#[derive(Debug)]
struct Inner<T, E> {
    outcome: Option<Outcome<T, E>>,
    // Every pending poll leaves its waker here; all of them are woken on settlement.
    wakers: Vec<Waker>,
}

#[derive(Debug)]
pub(crate) struct SettlementCell<T, E> {
    inner: Mutex<Inner<T, E>>,
    settled: Condvar,
}

impl<T, E> SettlementCell<T, E> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                outcome: None,
                wakers: vec![],
            }),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn settled(outcome: Outcome<T, E>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                outcome: Some(outcome),
                wakers: vec![],
            }),
            settled: Condvar::new(),
        }
    }

    /// Stores `outcome` if the cell is still pending.
    ///
    /// Returns whether this call performed the transition.
    pub(crate) fn settle(&self, outcome: Outcome<T, E>) -> bool {
        let mut inner = self.inner.lock();
        if inner.outcome.is_some() {
            tracing::debug!(
                rejected = outcome.is_err(),
                "promise already settled; late settlement ignored"
            );
            return false;
        }
        tracing::trace!(fulfilled = outcome.is_ok(), "promise settled");
        inner.outcome = Some(outcome);
        let wakers = std::mem::take(&mut inner.wakers);
        self.settled.notify_all();
        drop(inner);
        for waker in wakers {
            waker.wake()
        }
        true
    }

    pub(crate) fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    pub(crate) fn reject(&self, cause: Error<E>) -> bool {
        self.settle(Err(cause))
    }

    pub(crate) fn state(&self) -> State {
        match self.inner.lock().outcome {
            None => State::Pending,
            Some(Ok(_)) => State::Fulfilled,
            Some(Err(_)) => State::Rejected,
        }
    }

    /// Blocks until the cell is settled or `timeout` elapses.
    ///
    /// Returns whether the cell is settled.
    pub(crate) fn wait_for(&self, timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        // A deadline past what `Instant` can represent is no deadline at all.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while inner.outcome.is_none() {
                self.settled.wait(&mut inner);
            }
            return true;
        };
        while inner.outcome.is_none() {
            if self.settled.wait_until(&mut inner, deadline).timed_out() {
                return inner.outcome.is_some();
            }
        }
        true
    }
}

impl<T: Clone, E: Clone> SettlementCell<T, E> {
    /// Blocks the calling thread until the cell is settled.
    pub(crate) fn wait(&self) -> Outcome<T, E> {
        let mut inner = self.inner.lock();
        loop {
            match inner.outcome {
                Some(ref outcome) => return outcome.clone(),
                None => self.settled.wait(&mut inner),
            }
        }
    }

    pub(crate) fn try_outcome(&self) -> Option<Outcome<T, E>> {
        self.inner.lock().outcome.clone()
    }

    pub(crate) fn poll_outcome(&self, waker: &Waker) -> Poll<Outcome<T, E>> {
        let mut inner = self.inner.lock();
        match inner.outcome {
            Some(ref outcome) => Poll::Ready(outcome.clone()),
            None => {
                if !inner.wakers.iter().any(|w| w.will_wake(waker)) {
                    inner.wakers.push(waker.clone());
                }
                Poll::Pending
            }
        }
    }
}
