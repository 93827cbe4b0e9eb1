//! Single-assignment promises whose settlement can be observed from any
//! number of threads, plus a small set of combinators to compose them.
//!
//! A [`Promise`] starts pending and is settled exactly once, either
//! fulfilled with a value or rejected with a cause. Later attempts to settle
//! it are ignored (the first writer wins) and report `false`.
//!
//! ```
//! use promise_flow::{Promise, Step};
//!
//! let answer = Promise::<i32, String>::create(|producer| {
//!     producer.resolve(2);
//! })
//! .then(|v| Step::Value(v + 1))
//! .then(|v| Step::Deferred(Promise::resolve(v * 10)))
//! .finally(|outcome| println!("settled with {:?}", outcome));
//! assert_eq!(answer, Ok(30));
//! ```
//!
//! Combinators fan several promises into one:
//!
//! ```
//! use promise_flow::{all, race, Promise};
//!
//! let joined = all(vec![Promise::<i32, ()>::resolve(1), Promise::resolve(2)]);
//! assert_eq!(joined.wait(), Ok(vec![1, 2]));
//!
//! let first = race(vec![Promise::<i32, ()>::reject(()), Promise::resolve(7)]);
//! assert_eq!(first.wait(), Ok(7));
//! ```

mod cell;
mod combinators;
mod promise;
mod stream;
mod task;

use std::time::Duration;

pub use combinators::{all, all_optional, map, race, reduce};
pub use promise::{Producer, Promise, State, Step};
pub use stream::{stream, Stream};

/// Why a promise was rejected.
///
/// Causes supplied by callers travel as [`Error::Rejected`]; every other
/// variant is produced by this crate and can be told apart from ordinary
/// rejections.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error<E> {
    #[error("promise rejected: {0:?}")]
    Rejected(E),
    #[error("promise cancelled")]
    Cancelled,
    #[error("promise timed out after {0:?}")]
    TimedOut(Duration),
    #[error("every producer was dropped before the promise settled")]
    ProducerDropped,
    #[error("callback panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn driver thread: {0}")]
    Spawn(String),
}

impl<E> Error<E> {
    /// The caller-supplied cause, if this is an ordinary rejection.
    pub fn cause(&self) -> Option<&E> {
        match self {
            Error::Rejected(cause) => Some(cause),
            _ => None,
        }
    }

    pub fn into_cause(self) -> Option<E> {
        match self {
            Error::Rejected(cause) => Some(cause),
            _ => None,
        }
    }

    /// Converts the caller-supplied cause, leaving synthetic causes as they are.
    pub fn map<F, O>(self, f: F) -> Error<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            Error::Rejected(cause) => Error::Rejected(f(cause)),
            Error::Cancelled => Error::Cancelled,
            Error::TimedOut(after) => Error::TimedOut(after),
            Error::ProducerDropped => Error::ProducerDropped,
            Error::Panicked(message) => Error::Panicked(message),
            Error::Spawn(message) => Error::Spawn(message),
        }
    }

    /// True for causes synthesised by this crate rather than supplied by a caller.
    pub fn is_synthetic(&self) -> bool {
        !matches!(self, Error::Rejected(_))
    }
}
